use serde::{Deserialize, Serialize};

/// Строка `SST`: тип ценной бумаги
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityType {
    /// id типа
    pub id: String,
    /// короткое имя, например `EQUITY`
    pub short_name: String,
    /// полное имя
    pub long_name: String,
}

/// Строка `SLM`: биржа / рынок
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedMarket {
    /// id рынка
    pub id: String,
    /// короткое имя, например `NYSE`
    pub short_name: String,
    /// полное имя
    pub long_name: String,
    /// id группы рынков
    pub group_id: String,
    /// короткое имя группы
    pub short_group_name: String,
}

/// Строка `SBF`: найденный символ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// тикер
    pub symbol: String,
    /// id рынка из `SLM`
    pub listed_market_id: String,
    /// id типа из `SST`
    pub security_type_id: String,
    /// описание
    pub description: String,
}

/// Строка `HTT`: сделка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// время сделки
    pub time_stamp: String,
    /// цена сделки
    pub last: f64,
    /// объём сделки
    pub last_size: u64,
    /// объём за день
    pub total_volume: u64,
    /// лучшая цена покупки
    pub bid: f64,
    /// лучшая цена продажи
    pub ask: f64,
    /// id тика
    pub tick_id: u64,
    /// основание цены последней сделки
    pub basis_for_last: String,
    /// площадка сделки
    pub trade_market_center: String,
    /// коды условий сделки
    pub trade_conditions: String,
    /// сторона-инициатор
    pub trade_aggressor: String,
    /// день месяца торговой сессии
    pub day_code: String,
}

/// Строка `HIT`: интервальный бар
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalBar {
    /// время бара
    pub time_stamp: String,
    /// максимум
    pub high: f64,
    /// минимум
    pub low: f64,
    /// открытие
    pub open: f64,
    /// закрытие
    pub close: f64,
    /// объём за день на момент бара
    pub total_volume: u64,
    /// объём внутри бара
    pub period_volume: u64,
    /// сделок внутри бара
    pub number_of_trades: u64,
}

/// Построение записи из нормализованной строки ответа
pub trait FromRow: Sized {
    /// Имя семейства для логов
    const KIND: &'static str;

    /// `None`, если строка не той ширины или числа не парсятся
    fn from_row(row: &[String]) -> Option<Self>;
}

impl FromRow for SecurityType {
    const KIND: &'static str = "security type";

    fn from_row(row: &[String]) -> Option<Self> {
        let [id, short_name, long_name] = row else {
            return None;
        };
        Some(Self {
            id: id.clone(),
            short_name: short_name.clone(),
            long_name: long_name.clone(),
        })
    }
}

impl FromRow for ListedMarket {
    const KIND: &'static str = "listed market";

    fn from_row(row: &[String]) -> Option<Self> {
        let [id, short_name, long_name, group_id, short_group_name] = row else {
            return None;
        };
        Some(Self {
            id: id.clone(),
            short_name: short_name.clone(),
            long_name: long_name.clone(),
            group_id: group_id.clone(),
            short_group_name: short_group_name.clone(),
        })
    }
}

impl FromRow for SymbolInfo {
    const KIND: &'static str = "symbol";

    fn from_row(row: &[String]) -> Option<Self> {
        let [symbol, listed_market_id, security_type_id, description] = row else {
            return None;
        };
        Some(Self {
            symbol: symbol.clone(),
            listed_market_id: listed_market_id.clone(),
            security_type_id: security_type_id.clone(),
            description: description.clone(),
        })
    }
}

impl FromRow for Tick {
    const KIND: &'static str = "tick";

    fn from_row(row: &[String]) -> Option<Self> {
        if row.len() != 12 {
            return None;
        }
        let mut it = row.iter();
        Some(Self {
            time_stamp: it.next()?.clone(),
            last: it.next()?.parse().ok()?,
            last_size: it.next()?.parse().ok()?,
            total_volume: it.next()?.parse().ok()?,
            bid: it.next()?.parse().ok()?,
            ask: it.next()?.parse().ok()?,
            tick_id: it.next()?.parse().ok()?,
            basis_for_last: it.next()?.clone(),
            trade_market_center: it.next()?.clone(),
            trade_conditions: it.next()?.clone(),
            trade_aggressor: it.next()?.clone(),
            day_code: it.next()?.clone(),
        })
    }
}

impl FromRow for IntervalBar {
    const KIND: &'static str = "interval bar";

    fn from_row(row: &[String]) -> Option<Self> {
        if row.len() != 8 {
            return None;
        }
        let mut it = row.iter();
        Some(Self {
            time_stamp: it.next()?.clone(),
            high: it.next()?.parse().ok()?,
            low: it.next()?.parse().ok()?,
            open: it.next()?.parse().ok()?,
            close: it.next()?.parse().ok()?,
            total_volume: it.next()?.parse().ok()?,
            period_volume: it.next()?.parse().ok()?,
            number_of_trades: it.next()?.parse().ok()?,
        })
    }
}

/// Оставляет контракты корня: корень + код месяца + две цифры года
pub fn filter_symbol_root(symbols: Vec<SymbolInfo>, root: &str) -> Vec<SymbolInfo> {
    symbols
        .into_iter()
        .filter(|s| s.symbol.contains(root) && s.symbol.len() == root.len() + 3)
        .collect()
}

//! Справочники и история, которые отдаёт lookup порт симулятора.

/// Тип бумаги: id, короткое и полное имя
pub(crate) const SECURITY_TYPES: [(&str, &str, &str); 5] = [
    ("1", "EQUITY", "Equity"),
    ("2", "IEOPTION", "Index/Equity Option"),
    ("8", "FUTURE", "Future"),
    ("16", "FOREX", "Foreign Monetary Exchange"),
    ("28", "SPREAD", "Future Spread"),
];

/// Рынок: id, короткое имя, полное имя, id группы, имя группы
pub(crate) const MARKETS: [(&str, &str, &str, &str, &str); 5] = [
    ("5", "NYSE", "New York Stock Exchange", "7", "NYSE"),
    ("7", "NASDAQ", "Nasdaq Global Select", "5", "NASDAQ"),
    ("13", "CBOE", "Chicago Board Options Exchange", "13", "CBOE"),
    ("34", "CME", "Chicago Mercantile Exchange", "34", "CME"),
    ("74", "FXCM", "FXCM Forex Capital Markets", "74", "FXCM"),
];

/// Символ и стартовая цена для генератора котировок
#[derive(Debug, Clone, Copy)]
pub(crate) struct Listing {
    pub(crate) symbol: &'static str,
    pub(crate) market_id: &'static str,
    pub(crate) security_type_id: &'static str,
    pub(crate) description: &'static str,
    pub(crate) price: f64,
}

const fn listing(
    symbol: &'static str,
    market_id: &'static str,
    security_type_id: &'static str,
    description: &'static str,
    price: f64,
) -> Listing {
    Listing {
        symbol,
        market_id,
        security_type_id,
        description,
        price,
    }
}

pub(crate) const LISTINGS: [Listing; 9] = [
    listing("AAPL", "7", "1", "APPLE INC", 185.0),
    listing("MSFT", "7", "1", "MICROSOFT CORP", 410.0),
    listing("TSLA", "7", "1", "TESLA INC", 240.0),
    listing("IBM", "5", "1", "INTERNATIONAL BUSINESS MACHINES", 170.0),
    listing("@ESH25", "34", "8", "E-MINI S&P 500 MARCH 2025", 5900.0),
    listing("@ESM25", "34", "8", "E-MINI S&P 500 JUNE 2025", 5950.0),
    listing("@ESU25", "34", "8", "E-MINI S&P 500 SEPTEMBER 2025", 6000.0),
    listing("@ESGH25", "34", "8", "E-MINI S&P 500 ESG MARCH 2025", 450.0),
    listing("EURUSD.FXCM", "74", "16", "FXCM EUR USD", 1.08),
];

/// Сколько строк истории отдаётся на запрос
pub(crate) const HISTORY_ROWS: usize = 20;

/// Начало торгового дня в канонической истории
const SESSION_OPEN_SECS: u32 = 9 * 3600 + 30 * 60;
const HISTORY_DATE: &str = "2025-01-02";

pub(crate) fn find(symbol: &str) -> Option<&'static Listing> {
    LISTINGS.iter().find(|l| l.symbol == symbol)
}

pub(crate) fn security_type_rows() -> Vec<String> {
    SECURITY_TYPES
        .iter()
        .map(|(id, short, long)| format!("{id},{short},{long}"))
        .collect()
}

pub(crate) fn market_rows() -> Vec<String> {
    MARKETS
        .iter()
        .map(|(id, short, long, gid, gname)| format!("{id},{short},{long},{gid},{gname}"))
        .collect()
}

/// Поиск `SBF`: `field` это `s` или `d`, фильтр `e` (рынок) или `t` (тип)
pub(crate) fn search_rows(field: &str, search: &str, filter_type: &str, filter_value: &str) -> Vec<String> {
    let needle = search.to_ascii_uppercase();
    LISTINGS
        .iter()
        .filter(|l| match field {
            "d" => l.description.contains(&needle),
            _ => l.symbol.contains(&needle),
        })
        .filter(|l| match filter_type {
            "e" => l.market_id == filter_value,
            "t" => l.security_type_id == filter_value,
            _ => true,
        })
        .map(|l| {
            format!(
                "{},{},{},{}",
                l.symbol, l.market_id, l.security_type_id, l.description
            )
        })
        .collect()
}

/// Сделки `HTT`: 12 колонок
pub(crate) fn tick_rows(listing: &Listing) -> Vec<String> {
    let mut total = 0u64;
    (0..HISTORY_ROWS)
        .map(|i| {
            let last = wave(listing.price, i);
            let size = 100 + (i as u64 % 7) * 25;
            total += size;
            let tick = step(listing.price);
            format!(
                "{HISTORY_DATE} {}.{:06},{last:.2},{size},{total},{:.2},{:.2},{},O,{},1,{},{}",
                clock(SESSION_OPEN_SECS + i as u32),
                i * 1000,
                last - tick,
                last + tick,
                i + 1,
                11 + i % 3,
                if i % 2 == 0 { 1 } else { 2 },
                HISTORY_DATE.replace('-', ""),
            )
        })
        .collect()
}

/// Бары `HIT`: 8 колонок
pub(crate) fn bar_rows(listing: &Listing, interval_secs: u32) -> Vec<String> {
    let mut total = 0u64;
    (0..HISTORY_ROWS)
        .map(|i| {
            let open = wave(listing.price, i);
            let close = wave(listing.price, i + 1);
            let tick = step(listing.price);
            let high = open.max(close) + tick;
            let low = open.min(close) - tick;
            let period = 1000 + (i as u64 % 5) * 150;
            total += period;
            format!(
                "{HISTORY_DATE} {},{high:.2},{low:.2},{open:.2},{close:.2},{total},{period},{}",
                clock(SESSION_OPEN_SECS + (i as u32 + 1) * interval_secs.max(1)),
                10 + i % 9,
            )
        })
        .collect()
}

// детерминированная "пила" вокруг стартовой цены
fn wave(base: f64, i: usize) -> f64 {
    let offset = (i % 10) as f64 - 5.0;
    base + offset * step(base)
}

fn step(base: f64) -> f64 {
    (base * 0.0005).max(0.0001)
}

fn clock(secs: u32) -> String {
    let secs = secs % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

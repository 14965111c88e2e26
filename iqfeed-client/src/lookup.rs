//! Справочные и исторические запросы через lookup порт.
//!
//! Каждый запрос открывает именованную сессию (`lookup` или `historical`),
//! проходит через общий ограничитель, читает постраничный ответ, закрывает
//! сессию и превращает строки в типизированные записи.

use log::{info, warn};
use serde::Serialize;

use iqfeed_core::{
    Command, FeedError, FromRow, IntervalBar, ListedMarket, PortKind, QueryResult, SearchField,
    SecurityType, SymbolFilter, SymbolInfo, Tick, records::filter_symbol_root,
};

use crate::query::PaginatedQuery;
use crate::registry::SessionRegistry;

/// Сессия справочных запросов
pub const LOOKUP_SESSION: &str = "lookup";
/// Сессия исторических запросов
pub const HISTORICAL_SESSION: &str = "historical";

/// Формат времени в запросах истории: `CCYYMMDD HHmmSS`
pub const HISTORY_TIME_FORMAT: &str = "%Y%m%d %H%M%S";

type Result<T> = std::result::Result<T, FeedError>;

/// Записи ответа и признак того, что пришёл маркер конца
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome<T> {
    pub records: Vec<T>,
    pub complete: bool,
}

impl<T: FromRow> QueryOutcome<T> {
    /// Строки неверной ширины или с битыми числами пропускаются с предупреждением
    pub fn from_result(res: QueryResult) -> Self {
        let mut records = Vec::with_capacity(res.rows.len());
        for row in &res.rows {
            match T::from_row(row) {
                Some(r) => records.push(r),
                None => warn!("Skipping malformed {} row: {row:?}", T::KIND),
            }
        }
        Self {
            records,
            complete: res.complete,
        }
    }
}

/// Вид исторических данных
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// сделки, `HTT`
    Trades,
    /// бары, `HIT`, интервал в секундах
    Interval(u32),
}

/// Параметры исторического запроса
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub kind: HistoryKind,
    /// `CCYYMMDD HHmmSS`, пусто: с начала доступной истории
    pub start: String,
    /// `CCYYMMDD HHmmSS`, пусто: текущее время
    pub end: String,
    /// DatapointsPerSend; `None`: из настроек клиента
    pub batch_size: Option<u32>,
}

impl HistoryQuery {
    pub fn trades() -> Self {
        Self {
            kind: HistoryKind::Trades,
            start: String::new(),
            end: String::new(),
            batch_size: None,
        }
    }

    pub fn interval(secs: u32) -> Self {
        Self {
            kind: HistoryKind::Interval(secs),
            ..Self::trades()
        }
    }

    pub fn between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = start.into();
        self.end = end.into();
        self
    }
}

/// Записи истории в зависимости от вида запроса
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum History {
    Trades(QueryOutcome<Tick>),
    Interval(QueryOutcome<IntervalBar>),
}

impl History {
    pub fn len(&self) -> usize {
        match self {
            History::Trades(o) => o.records.len(),
            History::Interval(o) => o.records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        match self {
            History::Trades(o) => o.complete,
            History::Interval(o) => o.complete,
        }
    }
}

/// Текущее локальное время в формате запросов истории
pub fn now_stamp() -> String {
    chrono::Local::now().format(HISTORY_TIME_FORMAT).to_string()
}

impl SessionRegistry {
    /// Типы ценных бумаг (`SST`)
    pub fn lookup_security_types(&mut self, request_id: &str) -> Result<QueryOutcome<SecurityType>> {
        let cmd = Command::SecurityTypes {
            request_id: request_id.to_string(),
        };
        let res = self.run_lookup(LOOKUP_SESSION, &cmd, request_id)?;
        Ok(QueryOutcome::from_result(res))
    }

    /// Биржи и рынки (`SLM`)
    pub fn lookup_market_types(&mut self, request_id: &str) -> Result<QueryOutcome<ListedMarket>> {
        let cmd = Command::MarketTypes {
            request_id: request_id.to_string(),
        };
        let res = self.run_lookup(LOOKUP_SESSION, &cmd, request_id)?;
        Ok(QueryOutcome::from_result(res))
    }

    /// Поиск символов (`SBF`).
    ///
    /// С `symbol_root` остаются только контракты этого корня: символ содержит
    /// корень и длиннее него ровно на код месяца и две цифры года.
    pub fn lookup_symbol(
        &mut self,
        search: &str,
        filter: SymbolFilter,
        field: SearchField,
        request_id: &str,
        symbol_root: Option<&str>,
    ) -> Result<QueryOutcome<SymbolInfo>> {
        let cmd = Command::SymbolSearch {
            field,
            search: search.to_string(),
            filter,
            request_id: request_id.to_string(),
        };
        let res = self.run_lookup(LOOKUP_SESSION, &cmd, request_id)?;

        let mut outcome = QueryOutcome::<SymbolInfo>::from_result(res);
        if let Some(root) = symbol_root {
            outcome.records = filter_symbol_root(outcome.records, root);
        }
        Ok(outcome)
    }

    /// Сделки (`HTT`) или бары (`HIT`) по символу
    pub fn query_historical(&mut self, symbol: &str, query: HistoryQuery) -> Result<History> {
        let end = if query.end.is_empty() {
            now_stamp()
        } else {
            query.end
        };
        let batch_size = query
            .batch_size
            .unwrap_or(self.config().history_batch_size);

        let cmd = match query.kind {
            HistoryKind::Trades => Command::TickHistory {
                symbol: symbol.to_string(),
                start: query.start,
                end,
                batch_size,
            },
            HistoryKind::Interval(interval_secs) => Command::IntervalHistory {
                symbol: symbol.to_string(),
                interval_secs,
                start: query.start,
                end,
                batch_size,
            },
        };

        let res = self.run_lookup(HISTORICAL_SESSION, &cmd, "")?;
        Ok(match query.kind {
            HistoryKind::Trades => History::Trades(QueryOutcome::from_result(res)),
            HistoryKind::Interval(_) => History::Interval(QueryOutcome::from_result(res)),
        })
    }

    // Подключиться, запросить, отключиться
    fn run_lookup(&mut self, name: &str, cmd: &Command, request_id: &str) -> Result<QueryResult> {
        info!("Lookup request {name}: {}", cmd.to_string().trim_end());

        let session = self.connect(PortKind::Lookup, name)?;
        let res = PaginatedQuery::new(session).run(cmd, request_id);
        self.disconnect(name);

        match &res {
            Ok(r) if r.is_partial() => {
                warn!("Time out on {name} request, {} rows kept", r.rows.len())
            }
            _ => {}
        }
        res
    }
}

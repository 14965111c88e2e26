use std::fmt;

use crate::types::FieldType;

/// По какому полю ищет `SBF`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    /// По тикеру
    #[default]
    Symbol,
    /// По описанию
    Description,
}

impl SearchField {
    fn code(self) -> &'static str {
        match self {
            SearchField::Symbol => "s",
            SearchField::Description => "d",
        }
    }
}

/// Фильтр `SBF`: по рынку или по типу бумаги, но не по обоим сразу
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolFilter {
    /// Без фильтра
    #[default]
    None,
    /// Id рынка из `SLM`
    ListedMarket(String),
    /// Id типа бумаги из `SST`
    SecurityType(String),
}

impl SymbolFilter {
    fn parts(&self) -> (&str, &str) {
        match self {
            SymbolFilter::None => ("", ""),
            SymbolFilter::ListedMarket(id) => ("e", id),
            SymbolFilter::SecurityType(id) => ("t", id),
        }
    }
}

/// Исходящие команды демону
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `S,SET PROTOCOL`
    SetProtocol(String),
    /// `S,CLIENTSTATS ON`
    ClientStatsOn,
    /// `S,CONNECT`: просит демон подключиться к серверу
    Connect,
    /// Запрос имён полей схемы
    RequestFieldNames(FieldType),
    /// `S,SELECT UPDATE FIELDS`
    SelectUpdateFields(Vec<String>),
    /// `w`: котировки Level 1
    Watch(String),
    /// `r`: снять подписку Level 1
    Unwatch(String),
    /// `f`: снимок фундаментальных данных
    Refresh(String),
    /// `t`: только сделки
    WatchTrades(String),
    /// `WOR`: стакан Level 2
    WatchDepth(String),
    /// `ROR`: снять подписку на стакан
    UnwatchDepth(String),
    /// `BW`: бары на порту производных
    WatchInterval {
        /// символ
        symbol: String,
        /// длина бара в секундах
        interval_secs: u32,
        /// сколько дней истории дослать
        backfill_days: u32,
    },
    /// `SST`: типы бумаг
    SecurityTypes {
        /// id запроса в строках ответа
        request_id: String,
    },
    /// `SLM`: рынки
    MarketTypes {
        /// id запроса в строках ответа
        request_id: String,
    },
    /// `SBF`: поиск символов
    SymbolSearch {
        /// поле поиска
        field: SearchField,
        /// строка поиска
        search: String,
        /// фильтр по рынку или типу
        filter: SymbolFilter,
        /// id запроса в строках ответа
        request_id: String,
    },
    /// `HTT`: сделки за период
    TickHistory {
        /// символ
        symbol: String,
        /// начало, `CCYYMMDD HHmmSS`
        start: String,
        /// конец, `CCYYMMDD HHmmSS`
        end: String,
        /// строк в одной порции
        batch_size: u32,
    },
    /// `HIT`: бары за период
    IntervalHistory {
        /// символ
        symbol: String,
        /// длина бара в секундах
        interval_secs: u32,
        /// начало, `CCYYMMDD HHmmSS`
        start: String,
        /// конец, `CCYYMMDD HHmmSS`
        end: String,
        /// строк в одной порции
        batch_size: u32,
    },
}

impl Command {
    /// Маркер строк ответа для постраничных команд
    pub fn row_marker(&self) -> Option<&'static str> {
        match self {
            Command::SecurityTypes { .. }
            | Command::MarketTypes { .. }
            | Command::SymbolSearch { .. } => Some("LS"),
            Command::TickHistory { .. } | Command::IntervalHistory { .. } => Some("LH"),
            _ => None,
        }
    }
}

/// Текст команды для записи в сокет, включая терминатор
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetProtocol(v) => write!(f, "S,SET PROTOCOL,{v}\r\n"),
            Command::ClientStatsOn => f.write_str("S,CLIENTSTATS ON\r\n"),
            Command::Connect => f.write_str("S,CONNECT\r\n"),
            Command::RequestFieldNames(FieldType::Fundamental) => {
                f.write_str("S,REQUEST FUNDAMENTAL FIELDNAMES\r\n")
            }
            Command::RequestFieldNames(FieldType::Update) => {
                f.write_str("S,REQUEST CURRENT UPDATE FIELDNAMES\r\n")
            }
            Command::SelectUpdateFields(fields) => {
                write!(f, "S,SELECT UPDATE FIELDS,{}\r\n", fields.join(","))
            }
            Command::Watch(s) => write!(f, "w{s}\r\n"),
            Command::Unwatch(s) => write!(f, "r{s}\r\n"),
            Command::Refresh(s) => write!(f, "f{s}\r\n"),
            Command::WatchTrades(s) => write!(f, "t{s}\r\n"),
            Command::WatchDepth(s) => write!(f, "WOR,{s}\r\r\n"),
            Command::UnwatchDepth(s) => write!(f, "ROR,{s}\r\r\n"),
            Command::WatchInterval {
                symbol,
                interval_secs,
                backfill_days,
            } => write!(f, "BW,{symbol},{interval_secs},,{backfill_days}\r\n"),
            Command::SecurityTypes { request_id } => with_request_id(f, "SST", request_id),
            Command::MarketTypes { request_id } => with_request_id(f, "SLM", request_id),
            Command::SymbolSearch {
                field,
                search,
                filter,
                request_id,
            } => {
                let (filter_type, filter_value) = filter.parts();
                write!(
                    f,
                    "SBF,{},{search},{filter_type},{filter_value},{request_id}\r\n",
                    field.code()
                )
            }
            // MaxDatapoints, фильтры времени, направление и RequestID пустые
            Command::TickHistory {
                symbol,
                start,
                end,
                batch_size,
            } => write!(f, "HTT,{symbol},{start},{end},,,,,,{batch_size}\r\n"),
            Command::IntervalHistory {
                symbol,
                interval_secs,
                start,
                end,
                batch_size,
            } => write!(
                f,
                "HIT,{symbol},{interval_secs},{start},{end},,,,,,{batch_size}\r\n"
            ),
        }
    }
}

fn with_request_id(f: &mut fmt::Formatter<'_>, cmd: &str, request_id: &str) -> fmt::Result {
    if request_id.is_empty() {
        write!(f, "{cmd}\r\n")
    } else {
        write!(f, "{cmd},{request_id}\r\n")
    }
}

/// Допустимый интервал `BW`: 1..=300 с, либо до 3600 с кратно минуте
pub fn is_valid_bar_interval(secs: u32) -> bool {
    (1..=300).contains(&secs) || ((300..=3600).contains(&secs) && secs % 60 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_commands_format() {
        assert_eq!(
            Command::SetProtocol("6.2".into()).to_string(),
            "S,SET PROTOCOL,6.2\r\n"
        );
        assert_eq!(
            Command::RequestFieldNames(FieldType::Update).to_string(),
            "S,REQUEST CURRENT UPDATE FIELDNAMES\r\n"
        );
        assert_eq!(
            Command::SelectUpdateFields(vec!["Last".into(), "Bid".into()]).to_string(),
            "S,SELECT UPDATE FIELDS,Last,Bid\r\n"
        );
    }

    #[test]
    fn stream_commands_format() {
        assert_eq!(Command::Watch("AAPL".into()).to_string(), "wAAPL\r\n");
        assert_eq!(Command::WatchDepth("@ES#".into()).to_string(), "WOR,@ES#\r\r\n");
        assert_eq!(
            Command::WatchInterval {
                symbol: "AAPL".into(),
                interval_secs: 60,
                backfill_days: 7
            }
            .to_string(),
            "BW,AAPL,60,,7\r\n"
        );
    }

    #[test]
    fn lookup_commands_omit_empty_request_id() {
        let sst = Command::SecurityTypes {
            request_id: String::new(),
        };
        assert_eq!(sst.to_string(), "SST\r\n");
        assert_eq!(sst.row_marker(), Some("LS"));

        let slm = Command::MarketTypes {
            request_id: "42".into(),
        };
        assert_eq!(slm.to_string(), "SLM,42\r\n");
    }

    #[test]
    fn symbol_search_layout() {
        let cmd = Command::SymbolSearch {
            field: SearchField::Symbol,
            search: "USDJPY".into(),
            filter: SymbolFilter::SecurityType("16".into()),
            request_id: String::new(),
        };
        assert_eq!(cmd.to_string(), "SBF,s,USDJPY,t,16,\r\n");

        let cmd = Command::SymbolSearch {
            field: SearchField::Description,
            search: "crude".into(),
            filter: SymbolFilter::None,
            request_id: "7".into(),
        };
        assert_eq!(cmd.to_string(), "SBF,d,crude,,,7\r\n");
    }

    #[test]
    fn history_layout_has_batch_size_in_tenth_field() {
        let cmd = Command::TickHistory {
            symbol: "AAPL".into(),
            start: "20240102 093000".into(),
            end: "20240102 160000".into(),
            batch_size: 1024,
        };
        let wire = cmd.to_string();
        let fields: Vec<&str> = wire.trim_end().split(',').collect();
        assert_eq!(fields[0], "HTT");
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[9], "1024");
        assert_eq!(cmd.row_marker(), Some("LH"));

        let cmd = Command::IntervalHistory {
            symbol: "AAPL".into(),
            interval_secs: 60,
            start: String::new(),
            end: "20240102 160000".into(),
            batch_size: 500,
        };
        let wire = cmd.to_string();
        let fields: Vec<&str> = wire.trim_end().split(',').collect();
        assert_eq!(fields.len(), 11);
        assert_eq!(fields[2], "60");
        assert_eq!(fields[10], "500");
    }

    #[test]
    fn bar_interval_rules() {
        assert!(is_valid_bar_interval(1));
        assert!(is_valid_bar_interval(300));
        assert!(is_valid_bar_interval(3600));
        assert!(is_valid_bar_interval(600));
        assert!(!is_valid_bar_interval(0));
        assert!(!is_valid_bar_interval(301));
        assert!(!is_valid_bar_interval(3660));
    }
}

//! # iqfeed-core
//!
//! Протокольный слой клиента демона IQFeed (IQConnect).
//!
//! Демон слушает несколько TCP портов с текстовым протоколом:
//! сообщения через запятую, разделитель `\n`, команды чаще всего с `\r\n`.
//!
//! Этот крейт содержит:
//!
//! - [`framing`] — сборка целых сообщений из произвольно нарезанного потока
//! - [`classify`] — отделение ошибок `E,` и пометка системных циклов
//! - [`handshake`] — состояния сессии и проверка стартовой последовательности
//! - [`schema`] — согласование схем полей, проекция `Q` строк, admin статистика
//! - [`paging`] — накопление постраничных ответов до `!ENDMSG!`
//! - [`pacer`] — лимит 50 запросов в секунду
//! - [`protocol`] — исходящие команды
//! - [`records`] — типизированные строки справочников и истории
//! - [`error`] — ошибки
//!
//! ## Пример: кадрирование и классификация
//!
//! ```rust
//! use iqfeed_core::classify::{classify_cycle, ErrorFilter};
//! use iqfeed_core::framing::FrameReader;
//! use std::io::Cursor;
//!
//! let mut reader = FrameReader::new(Cursor::new("S,KEY,1\nE,bad thing\nS,SERVER CONNECTED\n"));
//! let cycle = classify_cycle(reader.read_frame().unwrap(), ErrorFilter::DropAll);
//!
//! assert_eq!(cycle.messages, vec!["S,KEY,1", "S,SERVER CONNECTED"]);
//! assert_eq!(cycle.errors, vec!["bad thing"]);
//! assert!(cycle.is_system);
//! ```
//!
//! ## Пример: проекция обновления на схему
//!
//! ```rust
//! use iqfeed_core::schema::project_update;
//!
//! let schema = vec!["Last".to_string(), "Bid".to_string(), "Ask".to_string()];
//! let row = project_update("Q,AAPL,100,99,101,\r", &schema).unwrap();
//! assert_eq!(row, Some(vec!["100".to_string(), "99".to_string(), "101".to_string()]));
//! ```
//!
//! ## Дизайн
//!
//! Крейт не владеет сокетами: всё чтение идёт через `std::io::Read`,
//! поэтому логику можно гонять на любых источниках байт.
//! Сокеты, сессии и реестр живут в `iqfeed-client`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Классификация сообщений цикла.
pub mod classify;

/// Ошибки `iqfeed-core`.
pub mod error;

/// Сборка сообщений из потока байт.
pub mod framing;

/// Рукопожатие потоковых портов.
pub mod handshake;

/// Лимитер исходящих запросов.
pub mod pacer;

/// Постраничные ответы.
pub mod paging;

/// Исходящие команды.
pub mod protocol;

/// Типизированные записи справочников и истории.
pub mod records;

/// Схемы полей и проекция строк.
pub mod schema;

/// Доменные типы.
pub mod types;

/// Общие константы
mod constants;
pub use constants::*;

// --- Re-exports (публичный фасад API) ---

pub use crate::classify::{Cycle, ErrorFilter};
pub use crate::error::FeedError;
pub use crate::framing::FrameReader;
pub use crate::handshake::SessionState;
pub use crate::pacer::{PacingConfig, RequestPacer, SharedPacer};
pub use crate::paging::{LookupAccumulator, QueryResult, RowFilter};
pub use crate::protocol::{Command, SearchField, SymbolFilter};
pub use crate::records::{FromRow, IntervalBar, ListedMarket, SecurityType, SymbolInfo, Tick};
pub use crate::types::{FieldType, Message, MessageKind, PortKind, ReadOutput, Table};

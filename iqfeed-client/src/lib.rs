//! # iqfeed-client
//!
//! Сессии поверх TCP портов демона IQFeed и сервисные запросы к нему.
//!
//! - [`session`] — одно соединение: рукопожатие, схемы полей, подписки
//! - [`registry`] — именованные сессии, инициализация демона, проверка здоровья
//! - [`query`] — постраничный запрос/ответ до `!ENDMSG!`
//! - [`lookup`] — справочники и история в типизированных записях
//! - [`stream`] — поток чтения обновлений в канал
//!
//! ```no_run
//! use iqfeed_client::{ClientConfig, SessionRegistry};
//!
//! let mut registry = SessionRegistry::new(ClientConfig::default());
//! registry.initialize()?;
//! let types = registry.lookup_security_types("")?;
//! println!("{} security types", types.records.len());
//! registry.shutdown();
//! # Ok::<(), iqfeed_core::FeedError>(())
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod lookup;
pub mod query;
pub mod registry;
pub mod retry;
pub mod session;
pub mod stream;

pub use crate::config::{ClientConfig, Endpoints};
pub use crate::lookup::{History, HistoryKind, HistoryQuery, QueryOutcome};
pub use crate::query::PaginatedQuery;
pub use crate::registry::{ADMIN_SESSION, GHOST_SESSION, SessionRegistry};
pub use crate::retry::{RetryConfig, RetryPolicy};
pub use crate::session::{Session, SessionConfig};
pub use crate::stream::UpdateStream;

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::types::{FieldType, PortKind};

/// Верхнеуровневый тип ошибок клиента демона
#[derive(Debug, Error)]
pub enum FeedError {
    /// Демон не слушает порт
    #[error("connection refused: {0}")]
    TransportRefused(SocketAddr),

    /// За таймаут не пришло ни одного байта
    #[error("read timed out")]
    ReadTimeout,

    /// Демон закрыл соединение
    #[error("connection closed by daemon")]
    Closed,

    /// Стартовая последовательность без `SERVER CONNECTED`
    #[error("handshake failed on {0}")]
    HandshakeFailed(SocketAddr),

    /// Проекция до согласования схемы
    #[error("{0} field schema has not been negotiated")]
    SchemaMissing(FieldType),

    /// Ширина строки не совпадает со схемой
    #[error("row has {got} columns, schema expects {expected}")]
    SchemaMismatch {
        /// колонок в схеме
        expected: usize,
        /// колонок в строке
        got: usize,
    },

    /// Сессия ещё не подключена
    #[error("session is not connected")]
    NotConnected,

    /// Сокет закрытой сессии нельзя переиспользовать
    #[error("session '{0}' was closed; create a new one to reconnect")]
    SessionClosed(String),

    /// Команда не поддерживается портом
    #[error("{op} is not supported on the {kind} port")]
    UnsupportedPort {
        /// операция
        op: &'static str,
        /// тип порта
        kind: PortKind,
    },

    /// Нет символа, за которым следит сессия
    #[error("no active symbol on session")]
    NoActiveSymbol,

    /// Недопустимый интервал баров
    #[error("invalid bar interval: {0}s")]
    InvalidInterval(u32),

    /// Демон так и не стал доступен
    #[error("daemon unavailable after {0} attempts")]
    DaemonUnavailable(u32),

    /// Прочие ошибки ввода-вывода
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FeedError {
    /// Ошибка, после которой постраничный запрос возвращает частичный результат
    pub fn is_partial_stop(&self) -> bool {
        matches!(self, FeedError::ReadTimeout | FeedError::Closed)
    }
}

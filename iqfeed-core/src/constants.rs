use std::time::Duration;

/// Хост демона по умолчанию (он всегда слушает только loopback)
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Level 1: котировки и сделки
pub const LEVEL1_PORT: u16 = 5009;
/// Lookup: справочники и история
pub const LOOKUP_PORT: u16 = 9100;
/// Level 2: стакан
pub const LEVEL2_PORT: u16 = 9200;
/// Admin: статистика и управление демоном
pub const ADMIN_PORT: u16 = 9300;
/// Derivative: интервальные бары
pub const DERIVATIVE_PORT: u16 = 9400;

/// Версия протокола, объявляемая в каждой сессии
pub const PROTOCOL_VERSION: &str = "6.2";

/// Разделитель сообщений на проводе
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// Маркер конца постраничного ответа (после отрезания `\n`)
pub const END_OF_MESSAGE: &str = "!ENDMSG!,\r";

/// Сколько байт читаем за один `read`
pub const READ_CHUNK: usize = 1024;

/// Лимит запросов демона в окне
pub const REQUEST_LIMIT: usize = 50;
/// Окно лимита
pub const PACING_WINDOW: Duration = Duration::from_secs(1);
/// Пауза при насыщении окна
pub const PACING_BACKOFF: Duration = Duration::from_secs(1);

/// Таймаут чтения потоковых и admin сессий
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);
/// Таймаут чтения lookup сессий
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(7);

/// Сколько сообщений присылает Level 1 / Level 2 при подключении
pub const STARTUP_MESSAGE_COUNT: usize = 5;

/// Колонка статуса в строке `S,STATS,...`
pub const STATS_STATUS_COLUMN: usize = 13;
/// Значение статуса, когда демон отключён от upstream
pub const DISCONNECTED_STATUS: &str = "Not Connected";

/// Сколько точек демон копит перед отправкой исторических данных
pub const HISTORY_BATCH_SIZE: u32 = 1024;

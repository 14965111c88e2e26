use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use log::{debug, error, info, warn};

use iqfeed_core::classify::classify_cycle;
use iqfeed_core::handshake::{check_startup, missing_startup_tokens};
use iqfeed_core::protocol::is_valid_bar_interval;
use iqfeed_core::schema::{extract_fieldnames, extract_selection, process_admin, process_stream};
use iqfeed_core::{
    Command, Cycle, ErrorFilter, FeedError, FieldType, FrameReader, LOOKUP_TIMEOUT,
    PROTOCOL_VERSION, PortKind, ReadOutput, STARTUP_MESSAGE_COUNT, STREAM_TIMEOUT, SessionState,
    SharedPacer,
};

const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Сколько дней истории подтягивает `BW`
const INTERVAL_BACKFILL_DAYS: u32 = 7;

type Result<T> = std::result::Result<T, FeedError>;

/// Параметры одной сессии
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub addr: SocketAddr,
    pub kind: PortKind,
    pub name: String,
    pub timeout: Duration,
    pub protocol_version: String,
    pub error_filter: ErrorFilter,
    /// Окно лимита запросов; у сессий одного демона должно быть общим
    pub pacer: SharedPacer,
}

impl SessionConfig {
    pub fn new(addr: SocketAddr, kind: PortKind, name: impl Into<String>) -> Self {
        let timeout = match kind {
            PortKind::Lookup | PortKind::Derivative => LOOKUP_TIMEOUT,
            _ => STREAM_TIMEOUT,
        };
        Self {
            addr,
            kind,
            name: name.into(),
            timeout,
            protocol_version: PROTOCOL_VERSION.to_string(),
            error_filter: ErrorFilter::default(),
            pacer: SharedPacer::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pacer(mut self, pacer: SharedPacer) -> Self {
        self.pacer = pacer;
        self
    }
}

struct Transport {
    reader: FrameReader<TcpStream>,
    writer: TcpStream,
}

/// Одно соединение с портом демона.
///
/// Сокет принадлежит только этой сессии. После `disconnect` (или неудачного
/// `connect`) сессию нельзя подключить снова: нужен новый `Session`.
pub struct Session {
    cfg: SessionConfig,
    state: SessionState,
    closed: bool,
    active_symbol: Option<String>,
    fundamental_fields: Vec<String>,
    update_fields: Vec<String>,
    transport: Option<Transport>,
}

impl Session {
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            cfg,
            state: SessionState::Disconnected,
            closed: false,
            active_symbol: None,
            fundamental_fields: Vec::new(),
            update_fields: Vec::new(),
            transport: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn kind(&self) -> PortKind {
        self.cfg.kind
    }

    pub fn addr(&self) -> SocketAddr {
        self.cfg.addr
    }

    pub fn timeout(&self) -> Duration {
        self.cfg.timeout
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn active_symbol(&self) -> Option<&str> {
        self.active_symbol.as_deref()
    }

    pub fn fundamental_fields(&self) -> &[String] {
        &self.fundamental_fields
    }

    pub fn update_fields(&self) -> &[String] {
        &self.update_fields
    }

    pub fn pacer(&self) -> &SharedPacer {
        &self.cfg.pacer
    }

    /// Подключение и рукопожатие по типу порта
    pub fn connect(&mut self) -> Result<()> {
        if self.closed {
            return Err(FeedError::SessionClosed(self.cfg.name.clone()));
        }
        if self.is_connected() {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        let res = self.open().and_then(|()| self.handshake());

        match &res {
            Ok(()) => info!("Connected {} {}", self.cfg.name, self.cfg.addr),
            Err(e) => {
                warn!("Connection fail {} {}: {e}", self.cfg.name, self.cfg.addr);
                self.drop_transport();
            }
        }
        res
    }

    /// Закрывает сокет; сессия больше не подключаема
    pub fn disconnect(&mut self) {
        let was_connected = self.is_connected();
        self.drop_transport();
        if was_connected {
            info!("Disconnected {} {}", self.cfg.name, self.cfg.addr);
        }
    }

    /// Меняет таймаут чтения (например, для отзывчивой остановки стрима)
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.cfg.timeout = timeout;
        if let Some(t) = &self.transport {
            t.reader.get_ref().set_read_timeout(Some(timeout))?;
        }
        Ok(())
    }

    /// Любая запись проходит через окно лимита запросов
    pub fn write(&mut self, message: &str) -> Result<()> {
        let t = self.transport.as_mut().ok_or(FeedError::NotConnected)?;
        self.cfg.pacer.admit();
        debug!("{} -> {:?}", self.cfg.name, message);
        t.writer.write_all(message.as_bytes())?;
        t.writer.flush()?;
        Ok(())
    }

    pub fn send(&mut self, cmd: &Command) -> Result<()> {
        self.write(&cmd.to_string())
    }

    /// Один цикл чтения без обработки по типу порта
    pub fn read_cycle(&mut self) -> Result<Cycle> {
        let t = self.transport.as_mut().ok_or(FeedError::NotConnected)?;
        match t.reader.read_frame() {
            Ok(raw) => {
                debug!("{} <- {:?}", self.cfg.name, raw);
                Ok(classify_cycle(raw, self.cfg.error_filter))
            }
            Err(FeedError::Closed) => {
                warn!("{} {}: daemon closed the connection", self.cfg.name, self.cfg.addr);
                self.drop_transport();
                Err(FeedError::Closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Цикл чтения, обработанный по типу порта:
    /// admin → таблица статистики, потоковый несистемный цикл → проекция `Q`,
    /// всё остальное → сообщения как есть.
    pub fn read(&mut self) -> Result<ReadOutput> {
        let cycle = self.read_cycle()?;

        match self.cfg.kind {
            PortKind::Admin => Ok(ReadOutput::Table(process_admin(&cycle.messages))),
            PortKind::Level1 | PortKind::Level2 if !cycle.is_system => Ok(ReadOutput::Table(
                process_stream(&cycle.messages, &self.update_fields)?,
            )),
            _ => Ok(ReadOutput::Raw(cycle.messages)),
        }
    }

    /// Объявление версии протокола; обязательно для каждой сессии
    pub fn set_protocol(&mut self) -> Result<()> {
        self.send(&Command::SetProtocol(self.cfg.protocol_version.clone()))?;
        match self.read_cycle() {
            Ok(_) => Ok(()),
            Err(FeedError::ReadTimeout) => {
                warn!("{}: no reply to protocol declaration", self.cfg.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Запрашивает имена полей и запоминает их.
    /// `Ok(None)`: ответа с нужным маркером в цикле не было.
    pub fn request_fieldnames(&mut self, field_type: FieldType) -> Result<Option<Vec<String>>> {
        self.require_streaming("field names")?;
        self.send(&Command::RequestFieldNames(field_type))?;

        let cycle = self.read_cycle()?;
        let found = extract_fieldnames(&cycle.messages, field_type);
        if let Some(fields) = &found {
            match field_type {
                FieldType::Fundamental => self.fundamental_fields = fields.clone(),
                FieldType::Update => self.update_fields = fields.clone(),
            }
        }
        Ok(found)
    }

    /// Сужает схему обновлений до указанных полей
    pub fn select_fieldnames(&mut self, fields: &[String]) -> Result<bool> {
        self.require_streaming("field selection")?;
        self.send(&Command::SelectUpdateFields(fields.to_vec()))?;

        let cycle = self.read_cycle()?;
        match extract_selection(&cycle.messages) {
            Some(sel) => {
                self.update_fields = sel.fields;
                if let Some(symbol) = sel.echoed_symbol {
                    self.active_symbol = Some(symbol);
                }
                Ok(true)
            }
            None => {
                warn!("{}: field selection was not confirmed", self.cfg.name);
                Ok(false)
            }
        }
    }

    /// Level 1: `w`, Level 2: `WOR`
    pub fn symbol_watch(&mut self, symbol: &str) -> Result<()> {
        let cmd = match self.cfg.kind {
            PortKind::Level1 => Command::Watch(symbol.to_string()),
            PortKind::Level2 => Command::WatchDepth(symbol.to_string()),
            kind => return Err(FeedError::UnsupportedPort { op: "watch", kind }),
        };
        self.send(&cmd)?;
        self.active_symbol = Some(symbol.to_string());
        self.refresh_update_schema()
    }

    /// Только сделки, Level 1
    pub fn symbol_watch_trades(&mut self, symbol: &str) -> Result<()> {
        self.require(PortKind::Level1, "trade watch")?;
        info!("Start watching symbol {symbol} on {}", self.cfg.name);
        self.send(&Command::WatchTrades(symbol.to_string()))?;
        self.active_symbol = Some(symbol.to_string());
        self.refresh_update_schema()
    }

    /// Интервальные бары с 7 днями истории, derivative порт
    pub fn symbol_watch_interval(&mut self, symbol: &str, interval_secs: u32) -> Result<()> {
        self.require(PortKind::Derivative, "interval watch")?;
        if !is_valid_bar_interval(interval_secs) {
            return Err(FeedError::InvalidInterval(interval_secs));
        }
        self.send(&Command::WatchInterval {
            symbol: symbol.to_string(),
            interval_secs,
            backfill_days: INTERVAL_BACKFILL_DAYS,
        })?;
        self.active_symbol = Some(symbol.to_string());
        Ok(())
    }

    /// Прекращает обновления по активному символу
    pub fn symbol_terminate(&mut self) -> Result<()> {
        let symbol = self.active_symbol.clone().ok_or(FeedError::NoActiveSymbol)?;
        let cmd = match self.cfg.kind {
            PortKind::Level1 => Command::Unwatch(symbol),
            PortKind::Level2 => Command::UnwatchDepth(symbol),
            kind => return Err(FeedError::UnsupportedPort { op: "terminate", kind }),
        };
        self.send(&cmd)?;
        self.active_symbol = None;
        Ok(())
    }

    /// Принудительное обновление активного символа, Level 1
    pub fn symbol_refresh(&mut self) -> Result<()> {
        self.require(PortKind::Level1, "refresh")?;
        let symbol = self.active_symbol.clone().ok_or(FeedError::NoActiveSymbol)?;
        self.send(&Command::Refresh(symbol))
    }

    fn open(&mut self) -> Result<()> {
        let addr = self.cfg.addr;
        let stream = match TcpStream::connect_timeout(&addr, self.cfg.timeout) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                error!("Connection refused {addr}");
                return Err(FeedError::TransportRefused(addr));
            }
            Err(e) => return Err(e.into()),
        };

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(self.cfg.timeout))?;
        stream.set_write_timeout(Some(TCP_WRITE_TIMEOUT)).ok();

        let writer = stream.try_clone()?;
        self.transport = Some(Transport {
            reader: FrameReader::new(stream),
            writer,
        });
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        // admin / lookup / derivative ничего не присылают при подключении
        if !self.cfg.kind.is_streaming() {
            self.state = SessionState::Connected;
            return self.set_protocol();
        }

        self.state = SessionState::Validating;
        let startup = self.read_startup()?;

        if !check_startup(&startup) {
            return Err(FeedError::HandshakeFailed(self.cfg.addr));
        }
        let missing = missing_startup_tokens(&startup);
        if !missing.is_empty() {
            debug!("{}: startup sequence without {missing:?}", self.cfg.name);
        }

        self.state = SessionState::Connected;
        self.set_protocol()?;

        for field_type in [FieldType::Fundamental, FieldType::Update] {
            match self.request_fieldnames(field_type) {
                Ok(Some(_)) => {}
                Ok(None) | Err(FeedError::ReadTimeout) => {
                    warn!("{}: {field_type} field names were not negotiated", self.cfg.name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // Ждём все стартовые сообщения, иначе хвост уедет в ответы следующих команд
    fn read_startup(&mut self) -> Result<Vec<String>> {
        let mut startup = Vec::with_capacity(STARTUP_MESSAGE_COUNT);

        while startup.len() < STARTUP_MESSAGE_COUNT {
            match self.read_cycle() {
                Ok(cycle) => startup.extend(cycle.messages),
                Err(FeedError::ReadTimeout) if !startup.is_empty() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(startup)
    }

    fn refresh_update_schema(&mut self) -> Result<()> {
        match self.request_fieldnames(FieldType::Update) {
            Ok(Some(_)) => Ok(()),
            Ok(None) | Err(FeedError::ReadTimeout) => {
                warn!("{}: update field names were not refreshed", self.cfg.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn require(&self, kind: PortKind, op: &'static str) -> Result<()> {
        if self.cfg.kind != kind {
            return Err(FeedError::UnsupportedPort {
                op,
                kind: self.cfg.kind,
            });
        }
        Ok(())
    }

    fn require_streaming(&self, op: &'static str) -> Result<()> {
        if !self.cfg.kind.is_streaming() {
            return Err(FeedError::UnsupportedPort {
                op,
                kind: self.cfg.kind,
            });
        }
        Ok(())
    }

    fn drop_transport(&mut self) {
        if let Some(t) = self.transport.take() {
            t.writer.shutdown(Shutdown::Both).ok();
        }
        self.state = SessionState::Disconnected;
        self.closed = true;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.cfg.name)
            .field("addr", &self.cfg.addr)
            .field("kind", &self.cfg.kind)
            .field("state", &self.state)
            .field("active_symbol", &self.active_symbol)
            .finish()
    }
}

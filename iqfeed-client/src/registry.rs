//! Именованные сессии с демоном и их жизненный цикл.
//!
//! Реестр владеет каждой сессией (у каждой свой сокет), отвечает за
//! инициализацию демона через admin порт и за проверку его состояния.

use std::collections::HashMap;
use std::thread;

use log::{debug, info, warn};

use iqfeed_core::schema::{reports_disconnected, stats_status};
use iqfeed_core::{Command, FeedError, PortKind, ReadOutput, SharedPacer};

use crate::config::ClientConfig;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionConfig};

/// Имя admin сессии
pub const ADMIN_SESSION: &str = "admin";
/// Level 1 сессия, которая держит демон запущенным
pub const GHOST_SESSION: &str = "ghost";

type Result<T> = std::result::Result<T, FeedError>;

/// Владелец всех сессий клиента
#[derive(Debug)]
pub struct SessionRegistry {
    config: ClientConfig,
    sessions: HashMap<String, Session>,
    connected: bool,
    pacer: SharedPacer,
}

impl SessionRegistry {
    pub fn new(config: ClientConfig) -> Self {
        let pacer = SharedPacer::new(config.pacing);
        Self {
            config,
            sessions: HashMap::new(),
            connected: false,
            pacer,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Общий ограничитель запросов для всех сессий реестра
    pub fn pacer(&self) -> &SharedPacer {
        &self.pacer
    }

    /// Итог последней проверки здоровья
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Подключённая сессия с этим именем переиспользуется, иначе создаётся новая.
    ///
    /// Неудачная сессия всё равно остаётся в реестре (в закрытом состоянии),
    /// ошибка подключения возвращается вызывающему.
    pub fn connect(&mut self, kind: PortKind, name: &str) -> Result<&mut Session> {
        let reuse = self
            .sessions
            .get(name)
            .is_some_and(|s| s.is_connected() && s.kind() == kind);

        if !reuse {
            if let Some(mut stale) = self.sessions.remove(name) {
                debug!("Replacing session {name} ({})", stale.state());
                stale.disconnect();
            }

            let mut session = Session::new(self.session_config(kind, name));
            let res = session.connect();
            self.sessions.insert(name.to_string(), session);

            match res {
                Ok(()) => info!("Session '{name}' is connected"),
                Err(e) => {
                    warn!("Session '{name}' failed");
                    return Err(e);
                }
            }
        }

        self.sessions.get_mut(name).ok_or(FeedError::NotConnected)
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn session_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(name)
    }

    /// Забирает сессию из реестра (например, в поток чтения)
    pub fn detach(&mut self, name: &str) -> Option<Session> {
        self.sessions.remove(name)
    }

    /// Закрывает сессию; запись остаётся до следующего `connect`
    pub fn disconnect(&mut self, name: &str) {
        if let Some(s) = self.sessions.get_mut(name) {
            s.disconnect();
        }
    }

    pub fn session_names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Читает статистику admin порта и обновляет флаг подключения.
    ///
    /// Нездоров: нет admin сессии, она отключена, статистика не пришла
    /// вовремя или последняя строка `STATS` сообщает `Not Connected`.
    pub fn health_check(&mut self) -> bool {
        self.connected = self.probe_admin();
        self.connected
    }

    /// Ожидание демона и подготовка постоянных сессий.
    ///
    /// Admin сессия подключается с повторами, пока демон не сообщит, что он
    /// на связи. Затем включаются `CLIENTSTATS`, демону отправляется
    /// `S,CONNECT` и открывается ghost сессия на Level 1 порту.
    pub fn initialize(&mut self) -> Result<()> {
        let mut retry = RetryPolicy::new(self.config.connect_retry);

        loop {
            let Some(delay) = retry.next_delay() else {
                self.connected = false;
                return Err(FeedError::DaemonUnavailable(retry.attempts()));
            };

            let reachable = match self.connect(PortKind::Admin, ADMIN_SESSION) {
                Ok(_) => true,
                Err(e) => {
                    debug!("Admin port is not ready: {e}");
                    false
                }
            };
            if reachable && self.health_check() {
                break;
            }
            thread::sleep(delay);
        }
        info!("Created initial connections to IQFeed");

        let admin = self
            .sessions
            .get_mut(ADMIN_SESSION)
            .ok_or(FeedError::NotConnected)?;
        for cmd in [Command::ClientStatsOn, Command::Connect] {
            admin.send(&cmd)?;
            match admin.read_cycle() {
                Ok(cycle) => info!("{}: {:?}", cmd.to_string().trim_end(), cycle.messages),
                Err(FeedError::ReadTimeout) => warn!("No reply to {}", cmd.to_string().trim_end()),
                Err(e) => return Err(e),
            }
        }

        self.connect(PortKind::Level1, GHOST_SESSION)?;
        info!("IQFeed service initialized");
        Ok(())
    }

    /// Закрывает все сессии. Демон завершится сам после последнего сокета.
    pub fn shutdown(&mut self) {
        for (name, s) in self.sessions.iter_mut() {
            debug!("Shutting down session {name}");
            s.disconnect();
        }
        self.connected = false;
    }

    pub(crate) fn session_config(&self, kind: PortKind, name: &str) -> SessionConfig {
        let mut cfg = SessionConfig::new(self.config.endpoints.addr(kind), kind, name)
            .with_timeout(self.config.timeout_for(kind))
            .with_pacer(self.pacer.clone());
        cfg.protocol_version = self.config.protocol_version.clone();
        cfg.error_filter = self.config.error_filter;
        cfg
    }

    fn probe_admin(&mut self) -> bool {
        let Some(admin) = self.sessions.get_mut(ADMIN_SESSION) else {
            warn!("Admin session does not exist");
            return false;
        };
        if !admin.is_connected() {
            warn!("IQFeed service is disconnected from admin port");
            return false;
        }

        match admin.read() {
            Ok(ReadOutput::Table(stats)) if reports_disconnected(&stats) => {
                warn!("Admin STAT: {}", stats_status(&stats).unwrap_or_default());
                warn!("IQFeed service is disconnected from admin port");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("Admin stats unavailable: {e}");
                false
            }
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::retry::RetryConfig;
    use crate::session::tests::{Peer, fake_daemon, serve_level1_handshake};
    use std::net::{SocketAddr, TcpListener};
    use std::time::Duration;

    const STATS_OK: &str = "S,STATS,66.112.156.228,60003,1300,0,1,0,0,0,0,Jan 01 9:00AM,Jan 01 9:01AM,Connected,6.2.0.25,123,0.5,0.1,0.2,1.0,0.3\n";
    const STATS_DOWN: &str = "S,STATS,,,1300,0,1,0,0,0,0,,,Not Connected,6.2.0.25,123,0,0,0,0,0\n";

    fn config(admin: u16, level1: u16) -> ClientConfig {
        let mut cfg = ClientConfig::default().with_endpoints(Endpoints {
            admin,
            level1,
            ..Endpoints::default()
        });
        cfg.stream_timeout = Duration::from_secs(2);
        cfg.lookup_timeout = Duration::from_secs(2);
        cfg.connect_retry = RetryConfig {
            max_attempts: 2,
            interval: Duration::from_millis(10),
            jitter_factor: 0.0,
        };
        cfg
    }

    fn closed_port() -> SocketAddr {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    }

    fn serve_admin(p: &mut Peer, stats: &str) {
        p.expect("S,SET PROTOCOL,6.2");
        p.send("S,CURRENT PROTOCOL,6.2\n");
        // статистика отдельным циклом чтения
        thread::sleep(Duration::from_millis(100));
        p.send(stats);
    }

    #[test]
    fn health_requires_admin_session() {
        let mut reg = SessionRegistry::new(ClientConfig::default());
        assert!(!reg.health_check());
        assert!(!reg.is_connected());
    }

    #[test]
    fn health_follows_stats_status_column() {
        for (stats, healthy) in [(STATS_OK, true), (STATS_DOWN, false)] {
            let (addr, h) = fake_daemon(move |mut p| {
                serve_admin(&mut p, stats);
                p.drain();
            });

            let mut reg = SessionRegistry::new(config(addr.port(), 1));
            reg.connect(PortKind::Admin, ADMIN_SESSION).unwrap();
            assert_eq!(reg.health_check(), healthy, "{stats}");
            assert_eq!(reg.is_connected(), healthy);

            reg.shutdown();
            h.join().unwrap();
        }
    }

    #[test]
    fn silent_admin_is_unhealthy() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.drain();
        });

        let mut cfg = config(addr.port(), 1);
        cfg.stream_timeout = Duration::from_millis(150);
        let mut reg = SessionRegistry::new(cfg);
        reg.connect(PortKind::Admin, ADMIN_SESSION).unwrap();
        assert!(!reg.health_check());

        reg.shutdown();
        h.join().unwrap();
    }

    #[test]
    fn failed_session_is_stored_and_replaced_on_next_connect() {
        let addr = closed_port();
        let mut reg = SessionRegistry::new(config(addr.port(), 1));

        let err = reg.connect(PortKind::Admin, "admin").unwrap_err();
        assert!(matches!(err, FeedError::TransportRefused(_)));
        assert!(!reg.session("admin").unwrap().is_connected());

        // новая сессия, а не повтор закрытой: снова отказ транспорта, не SessionClosed
        let err = reg.connect(PortKind::Admin, "admin").unwrap_err();
        assert!(matches!(err, FeedError::TransportRefused(_)));
        assert_eq!(reg.session_names().count(), 1);
    }

    #[test]
    fn connected_session_is_reused() {
        let (addr, h) = fake_daemon(|mut p| {
            p.expect("S,SET PROTOCOL,6.2");
            p.send("S,CURRENT PROTOCOL,6.2\n");
            p.drain();
        });

        let mut reg = SessionRegistry::new(config(addr.port(), 1));
        reg.connect(PortKind::Admin, "a").unwrap();
        // второй accept у поддельного демона нет: повторный connect не должен открыть сокет
        let s = reg.connect(PortKind::Admin, "a").unwrap();
        assert!(s.is_connected());

        let detached = reg.detach("a").unwrap();
        assert!(reg.session("a").is_none());
        drop(detached);

        h.join().unwrap();
    }

    #[test]
    fn handshake_and_watch_writes_count_in_shared_window() {
        let (addr, h) = fake_daemon(|mut p| {
            serve_level1_handshake(&mut p, "S,CURRENT UPDATE FIELDNAMES,Last,Bid\n");
            p.expect("wAAPL");
            p.expect("S,REQUEST CURRENT UPDATE FIELDNAMES");
            p.send("S,CURRENT UPDATE FIELDNAMES,Last,Bid\n");
            p.drain();
        });

        let mut reg = SessionRegistry::new(config(closed_port().port(), addr.port()));
        reg.connect(PortKind::Level1, "quotes")
            .unwrap()
            .symbol_watch("AAPL")
            .unwrap();
        // SET PROTOCOL, две схемы, wAAPL, повторная схема
        assert_eq!(reg.pacer().in_window(), 5);

        reg.disconnect("quotes");
        h.join().unwrap();
    }

    #[test]
    fn initialize_enables_stats_and_opens_ghost() {
        let (admin, ha) = fake_daemon(|mut p| {
            serve_admin(&mut p, STATS_OK);
            p.expect("S,CLIENTSTATS ON");
            p.send("S,CLIENTSTATS,on\n");
            p.expect("S,CONNECT");
            p.send(STATS_OK);
            p.drain();
        });
        let (level1, hl) = fake_daemon(|mut p| {
            serve_level1_handshake(&mut p, "S,CURRENT UPDATE FIELDNAMES,Symbol,Last\n");
            p.drain();
        });

        let mut reg = SessionRegistry::new(config(admin.port(), level1.port()));
        reg.initialize().unwrap();

        assert!(reg.is_connected());
        assert!(reg.session(GHOST_SESSION).unwrap().is_connected());
        assert_eq!(reg.session(GHOST_SESSION).unwrap().update_fields(), ["Symbol", "Last"]);

        reg.shutdown();
        assert!(!reg.session(ADMIN_SESSION).unwrap().is_connected());
        ha.join().unwrap();
        hl.join().unwrap();
    }

    #[test]
    fn initialize_gives_up_after_retry_budget() {
        let addr = closed_port();
        let mut reg = SessionRegistry::new(config(addr.port(), addr.port()));

        let err = reg.initialize().unwrap_err();
        assert!(matches!(err, FeedError::DaemonUnavailable(2)));
        assert!(!reg.is_connected());
        assert!(reg.session(GHOST_SESSION).is_none());
    }
}

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use iqfeed_core::PortKind;

/// Тик чтения клиентского сокета: между командами рассылаем обновления
pub(crate) const CLIENT_TICK: Duration = Duration::from_millis(10);
pub(crate) const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub const STATS_INTERVAL: Duration = Duration::from_secs(1);
pub const QUOTE_INTERVAL: Duration = Duration::from_millis(500);

/// Размер куска, которыми отдаются ответы lookup порта
pub const RESPONSE_CHUNK: usize = 64;

/// Настройки симулятора
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub host: IpAddr,
    pub level1: u16,
    pub level2: u16,
    pub lookup: u16,
    pub admin: u16,
    pub derivative: u16,
    /// как часто admin порт присылает `S,STATS`
    pub stats_interval: Duration,
    /// как часто генерируются котировки
    pub quote_interval: Duration,
    /// состояние связи демона с сервером данных при старте
    pub upstream_connected: bool,
    pub chunk_size: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            level1: PortKind::Level1.default_port(),
            level2: PortKind::Level2.default_port(),
            lookup: PortKind::Lookup.default_port(),
            admin: PortKind::Admin.default_port(),
            derivative: PortKind::Derivative.default_port(),
            stats_interval: STATS_INTERVAL,
            quote_interval: QUOTE_INTERVAL,
            upstream_connected: true,
            chunk_size: RESPONSE_CHUNK,
        }
    }
}

impl SimConfig {
    /// Все порты выбирает ОС, интервалы короткие (для тестов)
    pub fn ephemeral() -> Self {
        Self {
            level1: 0,
            level2: 0,
            lookup: 0,
            admin: 0,
            derivative: 0,
            stats_interval: Duration::from_millis(100),
            quote_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn port(&self, kind: PortKind) -> u16 {
        match kind {
            PortKind::Level1 => self.level1,
            PortKind::Level2 => self.level2,
            PortKind::Lookup => self.lookup,
            PortKind::Admin => self.admin,
            PortKind::Derivative => self.derivative,
        }
    }

    pub fn bind_addr(&self, kind: PortKind) -> SocketAddr {
        SocketAddr::new(self.host, self.port(kind))
    }
}

pub(crate) type ClientId = u64;

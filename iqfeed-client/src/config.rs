use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use iqfeed_core::{
    ErrorFilter, HISTORY_BATCH_SIZE, LOOKUP_TIMEOUT, PROTOCOL_VERSION, PacingConfig, PortKind,
    STREAM_TIMEOUT,
};

use crate::retry::RetryConfig;

/// Адреса портов демона
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub host: IpAddr,
    pub level1: u16,
    pub level2: u16,
    pub lookup: u16,
    pub admin: u16,
    pub derivative: u16,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            level1: PortKind::Level1.default_port(),
            level2: PortKind::Level2.default_port(),
            lookup: PortKind::Lookup.default_port(),
            admin: PortKind::Admin.default_port(),
            derivative: PortKind::Derivative.default_port(),
        }
    }
}

impl Endpoints {
    pub fn port(&self, kind: PortKind) -> u16 {
        match kind {
            PortKind::Level1 => self.level1,
            PortKind::Level2 => self.level2,
            PortKind::Lookup => self.lookup,
            PortKind::Admin => self.admin,
            PortKind::Derivative => self.derivative,
        }
    }

    pub fn addr(&self, kind: PortKind) -> SocketAddr {
        SocketAddr::new(self.host, self.port(kind))
    }
}

/// Настройки клиента
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub protocol_version: String,
    /// таймаут чтения для Level1 / Level2 / Admin
    pub stream_timeout: Duration,
    /// таймаут чтения для Lookup / Derivative
    pub lookup_timeout: Duration,
    pub pacing: PacingConfig,
    /// ожидание демона при инициализации
    pub connect_retry: RetryConfig,
    pub error_filter: ErrorFilter,
    pub history_batch_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            stream_timeout: STREAM_TIMEOUT,
            lookup_timeout: LOOKUP_TIMEOUT,
            pacing: PacingConfig::default(),
            connect_retry: RetryConfig::default(),
            error_filter: ErrorFilter::default(),
            history_batch_size: HISTORY_BATCH_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Таймаут чтения для сессии данного типа
    pub fn timeout_for(&self, kind: PortKind) -> Duration {
        match kind {
            PortKind::Lookup | PortKind::Derivative => self.lookup_timeout,
            PortKind::Level1 | PortKind::Level2 | PortKind::Admin => self.stream_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints_use_daemon_ports() {
        let e = Endpoints::default();
        assert_eq!(e.addr(PortKind::Admin), "127.0.0.1:9300".parse().unwrap());
        assert_eq!(e.port(PortKind::Level1), 5009);
        assert_eq!(e.port(PortKind::Derivative), 9400);
    }

    #[test]
    fn timeouts_follow_port_kind() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.timeout_for(PortKind::Lookup), LOOKUP_TIMEOUT);
        assert_eq!(cfg.timeout_for(PortKind::Admin), STREAM_TIMEOUT);
    }
}

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use iqfeed_core::{ADMIN_PORT, DERIVATIVE_PORT, LEVEL1_PORT, LEVEL2_PORT, LOOKUP_PORT};
use iqfeed_sim::{RESPONSE_CHUNK, SimConfig};

/// IQFeed Sim - локальный симулятор демона IQFeed на стандартных портах.
#[derive(Parser, Debug, Clone)]
#[command(name = "iqfeed-sim", version, about)]
pub(crate) struct Args {
    /// Адрес, на котором слушают все порты
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: IpAddr,

    #[arg(long, default_value_t = ADMIN_PORT)]
    pub(crate) admin_port: u16,

    #[arg(long, default_value_t = LEVEL1_PORT)]
    pub(crate) level1_port: u16,

    #[arg(long, default_value_t = LEVEL2_PORT)]
    pub(crate) level2_port: u16,

    #[arg(long, default_value_t = LOOKUP_PORT)]
    pub(crate) lookup_port: u16,

    #[arg(long, default_value_t = DERIVATIVE_PORT)]
    pub(crate) derivative_port: u16,

    /// Период S,STATS на admin порту, мс
    #[arg(long, default_value_t = 1000)]
    pub(crate) stats_interval_ms: u64,

    /// Период генерации котировок, мс
    #[arg(long, default_value_t = 500)]
    pub(crate) quote_interval_ms: u64,

    /// Стартовать без связи с сервером данных (STATS: Not Connected)
    #[arg(long)]
    pub(crate) disconnected: bool,

    /// Размер куска ответов lookup порта, байты
    #[arg(long, default_value_t = RESPONSE_CHUNK)]
    pub(crate) chunk_size: usize,
}

impl Args {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.stats_interval_ms == 0 || self.quote_interval_ms == 0 {
            bail!("intervals must be > 0");
        }
        if self.chunk_size == 0 {
            bail!("--chunk-size must be > 0");
        }
        Ok(())
    }

    pub(crate) fn sim_config(&self) -> SimConfig {
        SimConfig {
            host: self.host,
            level1: self.level1_port,
            level2: self.level2_port,
            lookup: self.lookup_port,
            admin: self.admin_port,
            derivative: self.derivative_port,
            stats_interval: Duration::from_millis(self.stats_interval_ms),
            quote_interval: Duration::from_millis(self.quote_interval_ms),
            upstream_connected: !self.disconnected,
            chunk_size: self.chunk_size,
        }
    }
}

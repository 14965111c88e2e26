//! # iqfeed-sim
//!
//! Симулятор демона IQFeed для локальной разработки и интеграционных тестов.
//!
//! Поднимает пять TCP портов с тем же текстовым протоколом:
//!
//! - admin: `S,STATS` раз в `stats_interval`, `S,CLIENTSTATS ON`, `S,CONNECT`
//! - level 1 / level 2: стартовая последовательность, схемы полей, `Q` обновления
//! - lookup: справочники и история кусками, затем `!ENDMSG!`
//! - derivative: `BW` бары
//!
//! ```no_run
//! use iqfeed_core::PortKind;
//! use iqfeed_sim::{SimConfig, Simulator};
//!
//! let sim = Simulator::start(SimConfig::ephemeral())?;
//! println!("admin port: {}", sim.addr(PortKind::Admin));
//! sim.stop();
//! # Ok::<(), anyhow::Error>(())
//! ```

#![forbid(unsafe_code)]

mod catalog;
mod config;
mod generator;
mod hub;
mod session;
mod tcp;

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use log::{debug, info, warn};

use iqfeed_core::PortKind;

pub use crate::config::{QUOTE_INTERVAL, RESPONSE_CHUNK, STATS_INTERVAL, SimConfig};

use crate::config::ClientId;
use crate::generator::{GeneratorConfig, QuoteGenerator};
use crate::hub::Hub;

/// Общее состояние всех портов
pub(crate) struct SimState {
    pub(crate) cfg: SimConfig,
    pub(crate) hub: Hub,
    upstream: AtomicBool,
    next_cid: AtomicU64,
}

impl SimState {
    pub(crate) fn new(cfg: SimConfig) -> Self {
        let upstream = AtomicBool::new(cfg.upstream_connected);
        Self {
            cfg,
            hub: Hub::new(),
            upstream,
            next_cid: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_client_id(&self) -> ClientId {
        self.next_cid.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn upstream_connected(&self) -> bool {
        self.upstream.load(Ordering::Relaxed)
    }

    pub(crate) fn set_upstream_connected(&self, connected: bool) {
        self.upstream.store(connected, Ordering::Relaxed);
    }
}

/// Запущенный симулятор
pub struct Simulator {
    addrs: HashMap<PortKind, SocketAddr>,
    state: Arc<SimState>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Simulator {
    /// Занимает все порты и запускает потоки приёма и генератор котировок
    pub fn start(cfg: SimConfig) -> anyhow::Result<Self> {
        let mut listeners = Vec::with_capacity(PortKind::ALL.len());
        let mut addrs = HashMap::new();
        for kind in PortKind::ALL {
            let bind = cfg.bind_addr(kind);
            let listener =
                TcpListener::bind(bind).with_context(|| format!("bind {kind} listener {bind}"))?;
            let addr = listener.local_addr()?;
            addrs.insert(kind, addr);
            listeners.push((kind, listener));
        }

        let state = Arc::new(SimState::new(cfg));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for (kind, listener) in listeners {
            let state = state.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || {
                if let Err(e) = tcp::run_tcp_listener(listener, kind, state, shutdown) {
                    warn!("{kind} listener stopped: {e:#}");
                }
            }));
        }

        {
            let state = state.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::spawn(move || run_generator(state, shutdown)));
        }

        info!(
            "iqfeed-sim listening: {}",
            PortKind::ALL
                .iter()
                .map(|k| format!("{k}={}", addrs[k]))
                .collect::<Vec<_>>()
                .join(" ")
        );

        Ok(Self {
            addrs,
            state,
            shutdown,
            handles,
        })
    }

    /// Фактический адрес порта (с учётом порта 0 в настройках)
    pub fn addr(&self, kind: PortKind) -> SocketAddr {
        self.addrs[&kind]
    }

    /// Переключает связь демона с сервером данных: статус в `S,STATS`
    /// и `SERVER CONNECTED` / `SERVER DISCONNECTED` для новых клиентов
    pub fn set_upstream_connected(&self, connected: bool) {
        self.state.set_upstream_connected(connected);
    }

    pub fn upstream_connected(&self) -> bool {
        self.state.upstream_connected()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Останавливает все потоки и ждёт их
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for h in self.handles.drain(..) {
            if let Err(panic) = h.join() {
                warn!("simulator thread panicked: {:?}", panic);
            }
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn run_generator(state: Arc<SimState>, shutdown: Arc<AtomicBool>) {
    let mut generator = QuoteGenerator::new(
        catalog::LISTINGS.iter().map(|l| (l.symbol, l.price)),
        GeneratorConfig::default(),
    );

    while !shutdown.load(Ordering::Relaxed) {
        for q in generator.next_batch() {
            let delivery = state.hub.publish(q);
            if delivery.lost() {
                debug!("publish: {delivery}");
            }
        }
        thread::sleep(state.cfg.quote_interval);
    }
}

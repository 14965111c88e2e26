//! Поток чтения обновлений.
//!
//! Сессия целиком переезжает в отдельный поток: он читает циклы, отдаёт
//! непустые таблицы обновлений в bounded канал и возвращает сессию при `join`.
//! Derivative порт отдаёт строки баров как есть (`ReadOutput::Raw`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use log::{debug, info, warn};

use iqfeed_core::{FeedError, PortKind, ReadOutput};

use crate::session::Session;

/// Как часто поток проверяет флаг остановки
pub const STREAM_TICK: Duration = Duration::from_millis(200);

/// Запущенный поток чтения
pub struct UpdateStream {
    rx: Receiver<ReadOutput>,
    handle: JoinHandle<Session>,
}

impl UpdateStream {
    /// Забирает подключённую сессию и запускает поток чтения.
    ///
    /// Таймаут чтения сессии сокращается до `STREAM_TICK`, чтобы поток
    /// замечал `shutdown` без ожидания следующего обновления.
    pub fn spawn(
        mut session: Session,
        shutdown: Arc<AtomicBool>,
        capacity: usize,
    ) -> Result<Self, FeedError> {
        if !session.is_connected() {
            return Err(FeedError::NotConnected);
        }
        session.set_timeout(STREAM_TICK)?;

        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let handle = thread::Builder::new()
            .name(format!("iqfeed-{}", session.name()))
            .spawn(move || run_reader(session, tx, shutdown))?;

        Ok(Self { rx, handle })
    }

    pub fn receiver(&self) -> &Receiver<ReadOutput> {
        &self.rx
    }

    /// Ждёт завершения потока и возвращает сессию
    pub fn join(self) -> Option<Session> {
        drop(self.rx);
        match self.handle.join() {
            Ok(session) => Some(session),
            Err(_) => {
                warn!("update reader panicked");
                None
            }
        }
    }
}

fn run_reader(mut session: Session, tx: Sender<ReadOutput>, shutdown: Arc<AtomicBool>) -> Session {
    info!("Update reader started for {}", session.name());
    let forward_raw = session.kind() == PortKind::Derivative;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let out = match session.read() {
            Ok(ReadOutput::Table(t)) if t.is_empty() => continue,
            Ok(ReadOutput::Raw(msgs)) if !forward_raw => {
                debug!("{}: system cycle {msgs:?}", session.name());
                continue;
            }
            Ok(out) => out,
            // тик цикла
            Err(FeedError::ReadTimeout) => continue,
            Err(e) => {
                warn!("{}: update reader stopped: {e}", session.name());
                break;
            }
        };

        if !forward(&tx, out, &shutdown) {
            break;
        }
    }

    info!("Update reader finished for {}", session.name());
    session
}

// false: получатель ушёл или пора останавливаться
fn forward(tx: &Sender<ReadOutput>, mut out: ReadOutput, shutdown: &AtomicBool) -> bool {
    loop {
        match tx.send_timeout(out, STREAM_TICK) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if shutdown.load(Ordering::Relaxed) {
                    return false;
                }
                out = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                debug!("update receiver dropped");
                return false;
            }
        }
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::constants::{PACING_BACKOFF, PACING_WINDOW, REQUEST_LIMIT};

/// Параметры лимита запросов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Сколько запросов допускается в окне
    pub limit: usize,
    /// Длина скользящего окна
    pub window: Duration,
    /// Пауза, когда окно заполнено
    pub backoff: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            limit: REQUEST_LIMIT,
            window: PACING_WINDOW,
            backoff: PACING_BACKOFF,
        }
    }
}

/// Скользящее окно отметок времени исходящих запросов.
///
/// Лимит у демона общий на все порты, поэтому на одно подключение к демону
/// держим один экземпляр (см. [`SharedPacer`]).
#[derive(Debug)]
pub struct RequestPacer {
    cfg: PacingConfig,
    stamps: VecDeque<Instant>,
}

impl RequestPacer {
    /// Пустое окно
    pub fn new(cfg: PacingConfig) -> Self {
        Self {
            cfg,
            stamps: VecDeque::with_capacity(cfg.limit + 1),
        }
    }

    /// Вызывать перед каждой записью в сокет.
    /// Возвращает, сколько пришлось подождать.
    pub fn admit(&mut self) -> Duration {
        let now = Instant::now();
        self.evict(now);

        let mut waited = Duration::ZERO;
        if self.stamps.len() >= self.cfg.limit {
            debug!(
                "pacing window saturated ({} requests); backing off {:?}",
                self.stamps.len(),
                self.cfg.backoff
            );
            thread::sleep(self.cfg.backoff);
            waited = self.cfg.backoff;
            self.evict(Instant::now());
        }

        self.stamps.push_back(Instant::now());
        waited
    }

    /// Запросов в текущем окне
    pub fn in_window(&self) -> usize {
        self.stamps.len()
    }

    // Идём от самой свежей отметки назад до первой вышедшей из окна
    // и отрезаем её вместе со всем, что старше.
    fn evict(&mut self, now: Instant) {
        let stale = self
            .stamps
            .iter()
            .rposition(|t| now.duration_since(*t) >= self.cfg.window);

        if let Some(idx) = stale {
            self.stamps.drain(..=idx);
        }
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(PacingConfig::default())
    }
}

/// Общий на все сессии экземпляр лимитера
#[derive(Debug, Clone, Default)]
pub struct SharedPacer {
    inner: Arc<Mutex<RequestPacer>>,
}

impl SharedPacer {
    /// Новое окно, общее для всех клонов
    pub fn new(cfg: PacingConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RequestPacer::new(cfg))),
        }
    }

    /// Блокировка держится и на время паузы: окно одно на весь демон
    pub fn admit(&self) -> Duration {
        let mut pacer = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        };
        pacer.admit()
    }

    /// Сколько запросов сейчас в окне
    pub fn in_window(&self) -> usize {
        match self.inner.lock() {
            Ok(g) => g.in_window(),
            Err(poisoned) => poisoned.into_inner().in_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_below_limit_do_not_wait() {
        let mut p = RequestPacer::default();
        for _ in 0..REQUEST_LIMIT {
            assert_eq!(p.admit(), Duration::ZERO);
        }
        assert_eq!(p.in_window(), REQUEST_LIMIT);
    }

    #[test]
    fn request_over_limit_blocks_for_backoff() {
        let mut p = RequestPacer::default();
        let start = Instant::now();
        for _ in 0..REQUEST_LIMIT {
            p.admit();
        }
        assert!(start.elapsed() < Duration::from_millis(200));

        let t = Instant::now();
        let waited = p.admit();
        let elapsed = t.elapsed();

        assert_eq!(waited, PACING_BACKOFF);
        assert!(elapsed >= Duration::from_millis(950), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "elapsed {elapsed:?}");

        // после паузы всё окно устарело, остался только последний запрос
        assert_eq!(p.in_window(), 1);
    }

    #[test]
    fn old_stamps_leave_the_window() {
        let mut p = RequestPacer::new(PacingConfig {
            limit: 3,
            window: Duration::from_millis(50),
            backoff: Duration::from_millis(500),
        });
        for _ in 0..3 {
            p.admit();
        }
        thread::sleep(Duration::from_millis(60));

        let t = Instant::now();
        assert_eq!(p.admit(), Duration::ZERO);
        assert!(t.elapsed() < Duration::from_millis(100));
        assert_eq!(p.in_window(), 1);
    }

    #[test]
    fn shared_pacer_counts_across_clones() {
        let cfg = PacingConfig {
            limit: 2,
            window: Duration::from_millis(200),
            backoff: Duration::from_millis(250),
        };
        let a = SharedPacer::new(cfg);
        let b = a.clone();

        assert_eq!(a.admit(), Duration::ZERO);
        assert_eq!(b.admit(), Duration::ZERO);
        assert_eq!(a.in_window(), 2);

        // третий запрос с любого клона упирается в общий лимит
        assert_eq!(b.admit(), Duration::from_millis(250));

        let h = std::thread::spawn(move || b.in_window());
        assert_eq!(h.join().unwrap(), 1);
    }
}

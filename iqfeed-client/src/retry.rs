//! Ограниченный повтор подключения к демону.
//!
//! Демон после запуска поднимает порты не сразу, поэтому первое подключение
//! к admin порту повторяем с фиксированным интервалом и небольшим джиттером.

use std::time::Duration;

use rand::Rng;

/// Параметры повторов
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Сколько всего попыток (0: без ограничения)
    pub max_attempts: u32,
    /// Пауза между попытками
    pub interval: Duration,
    /// Доля джиттера (0.1 = ±10%)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
            jitter_factor: 0.1,
        }
    }
}

/// Счётчик попыток
#[derive(Debug)]
pub struct RetryPolicy {
    cfg: RetryConfig,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg, attempts: 0 }
    }

    /// Отмечает попытку; `None`, когда бюджет исчерпан
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.cfg.max_attempts > 0 && self.attempts >= self.cfg.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.jitter(self.cfg.interval))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn jitter(&self, d: Duration) -> Duration {
        if self.cfg.jitter_factor <= 0.0 || d.is_zero() {
            return d;
        }
        let base = d.as_secs_f64();
        let range = base * self.cfg.jitter_factor;
        let shift: f64 = rand::rng().random_range(-range..=range);
        Duration::from_secs_f64((base + shift).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_exhausted_after_max_attempts() {
        let mut p = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            interval: Duration::from_millis(10),
            jitter_factor: 0.0,
        });

        for _ in 0..3 {
            assert_eq!(p.next_delay(), Some(Duration::from_millis(10)));
        }
        assert_eq!(p.next_delay(), None);
        assert_eq!(p.attempts(), 3);
    }

    #[test]
    fn jitter_stays_within_factor() {
        let mut p = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            interval: Duration::from_secs(1),
            jitter_factor: 0.1,
        });

        for _ in 0..100 {
            let d = p.next_delay().unwrap();
            assert!(d >= Duration::from_millis(899) && d <= Duration::from_millis(1101), "{d:?}");
        }
    }
}

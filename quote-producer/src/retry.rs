use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Backoff {
    Fixed,
    Exponential,
}

/// Сколько раз отправлять пачку и сколько ждать между попытками.
///
/// Пауза между попытками не связана с паузой между итерациями producer:
/// тесты подставляют `RetryPolicy::immediate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Всего попыток, включая первую (>= 1)
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Backoff,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
    /// Случайная добавка к задержке, в процентах от неё
    pub(crate) jitter_percent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter_percent: 20,
        }
    }
}

impl RetryPolicy {
    /// Без пауз между попытками
    pub(crate) fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_percent: 0,
        }
    }

    /// Задержка перед попыткой `attempt + 1` (attempt считается с 1), без jitter
    pub(crate) fn base_delay_after(&self, attempt: u32) -> Duration {
        let raw = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let exp = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        };
        raw.min(self.max_delay)
    }

    /// Задержка с jitter
    pub(crate) fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay_after(attempt);
        let base_ms = base.as_millis() as u64;
        if base_ms == 0 || self.jitter_percent == 0 {
            return base;
        }

        let jitter_range = std::cmp::max(1, base_ms.saturating_mul(u64::from(self.jitter_percent)) / 100);
        let mut rng = rand::rng();
        Duration::from_millis(base_ms + rng.random_range(0..jitter_range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_policy_never_waits() {
        let p = RetryPolicy::immediate(3);
        assert_eq!(p.max_attempts, 3);
        for attempt in 1..=3 {
            assert_eq!(p.delay_after(attempt), Duration::ZERO);
        }
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let p = RetryPolicy {
            backoff: Backoff::Fixed,
            base_delay: Duration::from_millis(100),
            jitter_percent: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(5), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            backoff: Backoff::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter_percent: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.base_delay_after(1), Duration::from_millis(100));
        assert_eq!(p.base_delay_after(2), Duration::from_millis(200));
        assert_eq!(p.base_delay_after(3), Duration::from_millis(350));
        assert_eq!(p.base_delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_percent() {
        let p = RetryPolicy {
            backoff: Backoff::Fixed,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter_percent: 10,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = p.delay_after(1);
            assert!(d >= Duration::from_millis(1000) && d < Duration::from_millis(1100), "{d:?}");
        }
    }
}

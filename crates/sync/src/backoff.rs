//! Exponential backoff with a bounded number of attempts.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    /// Attempts before the engine gives up and reports `Unavailable`.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Per-call retry state: doubles the delay each attempt, capped at `max`.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    remaining: u32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            next: config.initial,
            max: config.max,
            remaining: config.max_retries,
        }
    }

    /// Returns the delay before the next retry, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let config = BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(300),
            max_retries: 4,
        };
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn zero_retries_exhausts_immediately() {
        let config = BackoffConfig {
            max_retries: 0,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.next_delay(), None);
    }
}

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Minimum spacing between consecutive requests to the same host.
pub struct HostThrottle {
    delay: Duration,
    last: HashMap<String, Instant>,
}

impl HostThrottle {
    pub fn new(delay: Duration) -> Self {
        HostThrottle {
            delay,
            last: HashMap::new(),
        }
    }

    /// Record a request to `host` at or after `now`; returns how long to wait first.
    pub fn reserve(&mut self, host: &str, now: Instant) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let allowed_at = self
            .last
            .get(host)
            .map(|t| *t + self.delay)
            .unwrap_or(now);
        let (wait, scheduled) = if allowed_at > now {
            (allowed_at - now, allowed_at)
        } else {
            (Duration::ZERO, now)
        };
        self.last.insert(host.to_string(), scheduled);
        wait
    }

    pub fn wait(&mut self, host: &str) {
        let wait = self.reserve(host, Instant::now());
        if !wait.is_zero() {
            debug!("Throttling {} for {:.2}s", host, wait.as_secs_f64());
            std::thread::sleep(wait);
        }
    }
}

use std::time::{Duration, Instant};

/// Deadline poller for retry loops.
///
/// The caller performs an attempt, then asks [`Wait::more`] whether to try
/// again. Sleeps between attempts start small and grow along a Fibonacci
/// sequence so short waits stay responsive while long waits don't spin.
#[derive(Debug)]
pub struct Wait {
    begin: Instant,
    timeout: Duration,
    sleep: Duration,
    sleep_prev: Duration,
}

impl Wait {
    pub fn new(timeout: Duration) -> Self {
        let sleep = if timeout >= Duration::from_secs(1) {
            Duration::from_millis(100)
        } else {
            timeout / 10
        };

        Self {
            begin: Instant::now(),
            timeout,
            sleep,
            sleep_prev: Duration::ZERO,
        }
    }

    /// Sleep and return true if there is still time left before the deadline
    pub fn more(&mut self) -> bool {
        if self.sleep.is_zero() {
            return false;
        }

        let elapsed = self.begin.elapsed();
        if elapsed >= self.timeout {
            return false;
        }

        let sleep = self.sleep.min(self.timeout - elapsed);
        std::thread::sleep(sleep);

        let next = self.sleep + self.sleep_prev;
        self.sleep_prev = self.sleep;
        self.sleep = next;

        true
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.begin.elapsed())
    }
}

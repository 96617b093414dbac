//! [`CommandWatchdog`] – velocity command freshness monitor.
//!
//! Every accepted velocity or wheel-percent command calls
//! [`CommandWatchdog::feed`]. The drive loop polls
//! [`CommandWatchdog::expired`] each tick; once the window has passed without
//! a refresh the controller stops the wheels and [`clear`][CommandWatchdog::clear]s
//! the watchdog so the expiry is handled exactly once.
//!
//! Time is passed in explicitly as monotonic milliseconds so the watchdog can
//! be driven by a manual clock in tests.

/// Default command window in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1000;

/// Tracks the timestamp of the last velocity command.
///
/// # Example
///
/// ```
/// use tafy_kernel::watchdog::CommandWatchdog;
///
/// let mut wd = CommandWatchdog::new(1000);
/// wd.feed(0);
/// assert!(!wd.expired(1000));
/// assert!(wd.expired(1001));
/// ```
#[derive(Debug, Clone)]
pub struct CommandWatchdog {
    timeout_ms: u64,
    last_feed_ms: Option<u64>,
}

impl Default for CommandWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT_MS)
    }
}

impl CommandWatchdog {
    /// Create a disarmed watchdog with a `timeout_ms` window.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_feed_ms: None,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Record a command at `now_ms`, arming the watchdog.
    pub fn feed(&mut self, now_ms: u64) {
        self.last_feed_ms = Some(now_ms);
    }

    pub fn is_armed(&self) -> bool {
        self.last_feed_ms.is_some()
    }

    /// `true` when armed and more than the window has elapsed since the last
    /// feed. A disarmed watchdog never expires.
    pub fn expired(&self, now_ms: u64) -> bool {
        match self.last_feed_ms {
            Some(last) => now_ms.saturating_sub(last) > self.timeout_ms,
            None => false,
        }
    }

    /// Disarm until the next [`feed`][Self::feed].
    pub fn clear(&mut self) {
        self.last_feed_ms = None;
    }
}

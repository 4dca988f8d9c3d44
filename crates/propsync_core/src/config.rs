//! Configuration for the sync client.

use crate::scheduler::Backoff;
use std::time::Duration;

/// How the client's scheduler is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// `start()` blocks on an internal tokio event loop.
    #[default]
    EventLoop,
    /// The host calls `update()` repeatedly.
    Polled,
}

/// Configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device ID used to derive the discovery topic.
    pub device_id: String,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Ping the broker after this long without a publish. Zero disables pings.
    pub keepalive: Duration,
    /// Interval of the sync task (discovery and push).
    pub sync_interval: Duration,
    /// Interval of property tasks that do not set their own.
    pub default_interval: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Creates a new client configuration.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            mode: ExecutionMode::default(),
            keepalive: Duration::from_secs(10),
            sync_interval: Duration::from_millis(100),
            default_interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the keepalive interval.
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Sets the sync task interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the default property task interval.
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Sets the reconnection configuration.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for reconnection backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the second connection attempt.
    pub initial_interval: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Upper bound for the delay.
    pub max_interval: Duration,
}

impl ReconnectConfig {
    /// Creates the default reconnection configuration (1 s, x1.2, 4 s cap).
    pub fn new() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 1.2,
            max_interval: Duration::from_secs(4),
        }
    }

    /// Sets the initial interval.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the maximum interval.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Backoff applied to the connection task.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.multiplier, self.max_interval)
    }

    /// Delay after the given number of failed attempts (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.backoff();
        (0..attempt).fold(self.initial_interval, |delay, _| backoff.apply(delay))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new()
    }
}

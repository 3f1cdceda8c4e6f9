//! Gateway configuration.

use std::env;
use std::time::Duration;
use tracing::warn;

use crate::interrupt::DEFAULT_DEBOUNCE;

/// Environment variable holding the initial trace verbosity
pub const TRACE_ENV: &str = "SCHEMEGATE_TRACE";
/// Environment variable holding the `sleep` primitive's pause in milliseconds
pub const SLEEP_MS_ENV: &str = "SCHEMEGATE_SLEEP_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// 0 disables step tracing
    pub trace_verbosity: u8,
    /// How long `(sleep)` pauses the calling thread
    pub sleep_interval: Duration,
    /// Window used when the gateway debounces an interrupt source
    pub interrupt_debounce: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            trace_verbosity: 0,
            sleep_interval: Duration::from_secs(1),
            interrupt_debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl GatewayConfig {
    pub fn with_trace_verbosity(mut self, verbosity: u8) -> Self {
        self.trace_verbosity = verbosity;
        self
    }

    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn with_interrupt_debounce(mut self, window: Duration) -> Self {
        self.interrupt_debounce = window;
        self
    }

    /// Defaults overridden by `SCHEMEGATE_TRACE` and `SCHEMEGATE_SLEEP_MS`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TRACE_ENV) {
            match raw.trim().parse::<u8>() {
                Ok(verbosity) => config.trace_verbosity = verbosity,
                Err(err) => warn!(var = TRACE_ENV, value = %raw, error = %err, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(SLEEP_MS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.sleep_interval = Duration::from_millis(ms),
                Err(err) => warn!(var = SLEEP_MS_ENV, value = %raw, error = %err, "ignoring invalid value"),
            }
        }

        config
    }
}

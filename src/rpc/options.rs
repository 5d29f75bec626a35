//! Bridge configuration.
//!
//! Controls call timeouts and the pending-call limit.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use panel_bridge::BridgeOptions;
//!
//! let options = BridgeOptions::new()
//!     .with_default_timeout(Duration::from_secs(10))
//!     .with_method_timeout("document/getContent", Duration::from_secs(60))
//!     .with_max_pending(32);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::warn;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for an outbound call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on concurrently pending outbound calls.
pub const DEFAULT_MAX_PENDING: usize = 100;

/// Environment variable overriding the default timeout, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "PANEL_BRIDGE_TIMEOUT_MS";

/// Environment variable overriding the pending-call limit.
pub const ENV_MAX_PENDING: &str = "PANEL_BRIDGE_MAX_PENDING";

// ============================================================================
// BridgeOptions
// ============================================================================

/// Bridge configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Timeout applied to calls without a method override.
    pub default_timeout: Duration,

    /// Per-method timeout overrides.
    pub timeouts: FxHashMap<String, Duration>,

    /// Maximum number of outbound calls awaiting a response.
    pub max_pending: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_CALL_TIMEOUT,
            timeouts: FxHashMap::default(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Creates default options overridden by environment variables.
    ///
    /// Reads [`ENV_TIMEOUT_MS`] and [`ENV_MAX_PENDING`]. Unparseable values
    /// are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::new();

        if let Some(ms) = parse_override::<u64>(ENV_TIMEOUT_MS, lookup(ENV_TIMEOUT_MS)) {
            options.default_timeout = Duration::from_millis(ms);
        }

        if let Some(max) = parse_override::<usize>(ENV_MAX_PENDING, lookup(ENV_MAX_PENDING)) {
            options.max_pending = max;
        }

        options
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Sets the default call timeout.
    #[inline]
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Overrides the timeout for one method.
    #[inline]
    #[must_use]
    pub fn with_method_timeout(mut self, method: impl Into<String>, timeout: Duration) -> Self {
        self.timeouts.insert(method.into(), timeout);
        self
    }

    /// Sets the pending-call limit.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl BridgeOptions {
    /// Returns the timeout that applies to `method`.
    #[inline]
    #[must_use]
    pub fn timeout_for(&self, method: &str) -> Duration {
        self.timeouts
            .get(method)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout.is_zero() {
            return Err("Default timeout must be greater than zero".to_string());
        }

        if let Some((method, _)) = self.timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(format!("Timeout for '{method}' must be greater than zero"));
        }

        if self.max_pending == 0 {
            return Err("max_pending must be greater than zero".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: FxHashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let options = BridgeOptions::from_lookup(lookup(&[
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_MAX_PENDING, " 8 "),
        ]));

        assert_eq!(options.default_timeout, Duration::from_millis(1500));
        assert_eq!(options.max_pending, 8);
    }

    #[test]
    fn test_unparseable_env_values_are_ignored() {
        let options = BridgeOptions::from_lookup(lookup(&[
            (ENV_TIMEOUT_MS, "soon"),
            (ENV_MAX_PENDING, "-1"),
        ]));

        assert_eq!(options.default_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(options.max_pending, DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_missing_env_values_keep_defaults() {
        let options = BridgeOptions::from_lookup(lookup(&[(ENV_MAX_PENDING, "3")]));

        assert_eq!(options.default_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(options.max_pending, 3);
    }

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::new();
        assert_eq!(options.default_timeout, Duration::from_secs(30));
        assert_eq!(options.max_pending, 100);
        assert!(options.timeouts.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_method_timeout_override() {
        let options = BridgeOptions::new()
            .with_default_timeout(Duration::from_secs(5))
            .with_method_timeout("slow", Duration::from_millis(10));

        assert_eq!(options.timeout_for("slow"), Duration::from_millis(10));
        assert_eq!(options.timeout_for("other"), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(
            BridgeOptions::new()
                .with_default_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            BridgeOptions::new()
                .with_method_timeout("m", Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(BridgeOptions::new().with_max_pending(0).validate().is_err());
    }
}

//! Configurable size and time budgets
//!
//! `RingConfig` collects every tunable named in the spec: the backend's
//! hard per-transaction limits (5s / 10MB / 100kB, matched to the real
//! limits of the transactional KV stores this design targets), the
//! registry's retention window cap, and the storage layer's slot-scan vs
//! slot-enumeration threshold. Loadable from a `ringtsdb.toml` file the
//! same way `strata-engine`'s `StrataConfig` is loaded from `strata.toml`;
//! `Default` gives sane values for embedding without a config file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_window() -> i64 {
    // ~366 days in seconds: generous enough for hourly-resolution year-long rings.
    31_622_400
}

fn default_transaction_time_limit_ms() -> u64 {
    5_000
}

fn default_max_transaction_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_value_bytes() -> usize {
    100 * 1024
}

fn default_conflict_retry_attempts() -> u32 {
    1
}

fn default_slot_scan_fraction() -> f64 {
    0.5
}

fn default_max_lookup_results() -> usize {
    10_000
}

/// Size and time budgets enforced by the registry, ring storage, and query
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingConfig {
    /// Maximum `step * slots` (seconds) a descriptor may declare.
    #[serde(default = "default_max_window")]
    pub configured_max_window: i64,

    /// Backend transaction wall-clock budget. Operations that need more
    /// time must checkpoint and re-open a transaction.
    #[serde(default = "default_transaction_time_limit_ms")]
    pub transaction_time_limit_ms: u64,

    /// Backend per-transaction byte budget.
    #[serde(default = "default_max_transaction_bytes")]
    pub max_transaction_bytes: usize,

    /// Backend per-value byte budget.
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,

    /// Number of internal retries `ensure` performs on a commit conflict
    /// before surfacing `CONFLICT` to the caller.
    #[serde(default = "default_conflict_retry_attempts")]
    pub conflict_retry_attempts: u32,

    /// Fraction of the ring's full window (`slots * step`) above which
    /// `read_range` prefers a full slot scan over slot enumeration.
    #[serde(default = "default_slot_scan_fraction")]
    pub slot_scan_fraction: f64,

    /// Cap on the number of descriptors a single `lookup` call returns.
    #[serde(default = "default_max_lookup_results")]
    pub max_lookup_results: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            configured_max_window: default_max_window(),
            transaction_time_limit_ms: default_transaction_time_limit_ms(),
            max_transaction_bytes: default_max_transaction_bytes(),
            max_value_bytes: default_max_value_bytes(),
            conflict_retry_attempts: default_conflict_retry_attempts(),
            slot_scan_fraction: default_slot_scan_fraction(),
            max_lookup_results: default_max_lookup_results(),
        }
    }
}

impl RingConfig {
    /// Parse a `ringtsdb.toml`-shaped document.
    pub fn from_toml(s: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Backend transaction budget as a `Duration`.
    pub fn transaction_time_limit(&self) -> Duration {
        Duration::from_millis(self.transaction_time_limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_backend_limits_named_in_spec() {
        let cfg = RingConfig::default();
        assert_eq!(cfg.max_transaction_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.max_value_bytes, 100 * 1024);
        assert_eq!(cfg.transaction_time_limit(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg = RingConfig::from_toml("conflict_retry_attempts = 3\n").unwrap();
        assert_eq!(cfg.conflict_retry_attempts, 3);
        assert_eq!(cfg.max_value_bytes, default_max_value_bytes());
    }
}

//! Engine configuration.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! The drift tolerance is quantized before hashing (multiply by 1e6 and
//! round to i64) so that `params_hash` is stable across platforms and
//! serializer settings.
//!
//! ## Environment
//!
//! - `LEDGER_MAX_DEPTH`: maximum parent hops from a seed (default: 32)
//! - `LEDGER_MAX_NODES`: maximum nodes in one loaded subgraph (default: 10000)
//! - `LEDGER_DRIFT_TOLERANCE`: reconciliation tolerance in litres (default: 0.01)
//! - `LEDGER_BATCH_SIZE`: stocks per reconciliation page (default: 500)

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::types::VOLUME_EPSILON;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Configuration shared by the loader, the engine façade and the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of hops walked upward from any seed, and downward from any root.
    pub max_depth: u32,
    /// Maximum number of nodes in a loaded subgraph.
    pub max_nodes: usize,
    /// Drift beyond this many litres is reported by reconciliation.
    pub drift_tolerance: f64,
    /// Stocks per reconciliation page (one transaction each).
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuantizedConfig {
    max_depth: u32,
    max_nodes: usize,
    drift_tolerance: i64,
    batch_size: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_depth: env_or("LEDGER_MAX_DEPTH", defaults.max_depth),
            max_nodes: env_or("LEDGER_MAX_NODES", defaults.max_nodes),
            drift_tolerance: env_or("LEDGER_DRIFT_TOLERANCE", defaults.drift_tolerance),
            batch_size: env_or("LEDGER_BATCH_SIZE", defaults.batch_size),
        }
    }

    /// Hash of the configuration, stable across platforms.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedConfig {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
            drift_tolerance: (self.drift_tolerance * FLOAT_QUANTIZATION_FACTOR).round() as i64,
            batch_size: self.batch_size,
        })
    }

    /// Small limits for tests.
    #[cfg(test)]
    pub fn minimal() -> Self {
        Self {
            max_depth: 4,
            max_nodes: 16,
            drift_tolerance: VOLUME_EPSILON,
            batch_size: 2,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 10_000,
            drift_tolerance: VOLUME_EPSILON,
            batch_size: 500,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_hash_determinism() {
        assert_eq!(EngineConfig::default().params_hash(), EngineConfig::default().params_hash());
    }

    #[test]
    fn test_params_hash_changes() {
        let a = EngineConfig::default();
        let mut b = EngineConfig::default();
        b.drift_tolerance = 0.1;
        assert_ne!(a.params_hash(), b.params_hash());
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("LEDGER_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}

//! Quantities and commodity conversion factors.
//!
//! Volume is the base unit (litres). Weight and energy content are derived
//! from volume through the fixed factors carried by the [`Biofuel`].
//! Every stored volume is rounded to two decimals, which is also the
//! resolution of the conservation tolerance.

use serde::{Deserialize, Serialize};

/// Conservation tolerance, in base volume units.
pub const VOLUME_EPSILON: f64 = 0.01;

/// Round a value to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether two volumes are equal within [`VOLUME_EPSILON`].
pub fn volumes_match(a: f64, b: f64) -> bool {
    round2((a - b).abs()) <= VOLUME_EPSILON
}

/// Tracked commodity with its conversion factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biofuel {
    /// Commodity code (e.g. `ETH`, `EMHV`, `ETBE`).
    pub code: String,
    /// Density in kg per litre.
    pub density: f64,
    /// Lower heating value in MJ per litre.
    pub lhv_per_litre: f64,
}

impl Biofuel {
    /// Create a commodity definition.
    pub fn new(code: impl Into<String>, density: f64, lhv_per_litre: f64) -> Self {
        Self {
            code: code.into(),
            density,
            lhv_per_litre,
        }
    }

    /// Ethanol.
    pub fn ethanol() -> Self {
        Self::new("ETH", 0.794, 21.0)
    }

    /// Fatty acid methyl ester.
    pub fn emhv() -> Self {
        Self::new("EMHV", 0.883, 33.0)
    }

    /// Ethyl tert-butyl ether.
    pub fn etbe() -> Self {
        Self::new("ETBE", 0.75, 27.0)
    }

    /// Derive a full quantity from a volume.
    pub fn quantity(&self, volume: f64) -> Quantity {
        let volume = round2(volume);
        Quantity {
            volume,
            weight: round2(volume * self.density),
            lhv_amount: round2(volume * self.lhv_per_litre),
        }
    }
}

/// Volume with its derived weight and energy content.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quantity {
    /// Volume in litres.
    pub volume: f64,
    /// Weight in kg.
    pub weight: f64,
    /// Energy content in MJ.
    pub lhv_amount: f64,
}

impl Quantity {
    /// Zero quantity.
    pub fn zero() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(99.994), 99.99);
    }

    #[test]
    fn test_quantity_derivation() {
        let q = Biofuel::ethanol().quantity(1000.0);
        assert_eq!(q.volume, 1000.0);
        assert_eq!(q.weight, 794.0);
        assert_eq!(q.lhv_amount, 21000.0);
    }

    #[test]
    fn test_volumes_match_tolerance() {
        assert!(volumes_match(100.0, 100.01));
        assert!(!volumes_match(100.0, 100.02));
    }
}

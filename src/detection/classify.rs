//! Size-based coin classification.

use serde::{Deserialize, Serialize};

use crate::error::{CoinError, CoinResult};
use crate::models::CoinKind;

/// Lower bounds of `r² / R²` for each denomination, `R` being the largest
/// radius in the photo (assumed to be a quarter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioThresholds {
    pub quarter: f32,
    pub nickel: f32,
    pub penny: f32,
    pub dime: f32,
}

impl Default for RatioThresholds {
    fn default() -> Self {
        Self {
            quarter: 0.85,
            nickel: 0.68,
            penny: 0.60,
            dime: 0.40,
        }
    }
}

impl RatioThresholds {
    pub fn validate(&self) -> CoinResult<()> {
        let ordered = self.quarter > self.nickel && self.nickel > self.penny && self.penny > self.dime;
        if !ordered || self.dime < 0.0 || self.quarter > 1.0 {
            return Err(CoinError::InvalidParameters(format!(
                "ratio thresholds must satisfy 1 >= quarter > nickel > penny > dime >= 0, got {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Classify by area ratio against the largest coin.
    /// Ratios below the dime bound stay unclassified.
    pub fn classify(&self, radius: f32, largest_radius: f32) -> Option<CoinKind> {
        if largest_radius <= 0.0 {
            return None;
        }
        let ratio = (radius * radius) / (largest_radius * largest_radius);
        if ratio >= self.quarter {
            Some(CoinKind::Quarter)
        } else if ratio >= self.nickel {
            Some(CoinKind::Nickel)
        } else if ratio >= self.penny {
            Some(CoinKind::Penny)
        } else if ratio >= self.dime {
            Some(CoinKind::Dime)
        } else {
            None
        }
    }
}

/// Absolute pixel-radius bands, tuned for one camera setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusBands {
    pub nickel: (u32, u32),
    pub dime: (u32, u32),
}

impl Default for RadiusBands {
    fn default() -> Self {
        Self {
            nickel: (30, 40),
            dime: (20, 25),
        }
    }
}

impl RadiusBands {
    pub fn validate(&self) -> CoinResult<()> {
        for (name, (lo, hi)) in [("nickel", self.nickel), ("dime", self.dime)] {
            if lo > hi {
                return Err(CoinError::InvalidParameters(format!("{name} radius band {lo}..{hi} is inverted")));
            }
        }
        Ok(())
    }

    /// Bands are inclusive on the rounded radius
    pub fn classify(&self, radius: f32) -> CoinKind {
        let r = radius.round() as u32;
        if (self.nickel.0..=self.nickel.1).contains(&r) {
            CoinKind::Nickel
        } else if (self.dime.0..=self.dime.1).contains(&r) {
            CoinKind::Dime
        } else {
            CoinKind::Unknown
        }
    }
}

use serde::{Deserialize, Serialize};

/// Relative weight of each scoring dimension. Values need not sum to 1; they
/// are normalized on use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_performance")]
    pub performance: f64,
    #[serde(default = "default_stability")]
    pub stability: f64,
    #[serde(default = "default_compatibility")]
    pub compatibility: f64,
    #[serde(default = "default_uniqueness")]
    pub uniqueness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            performance: default_performance(),
            stability: default_stability(),
            compatibility: default_compatibility(),
            uniqueness: default_uniqueness(),
        }
    }
}

fn default_performance() -> f64 {
    0.2
}

fn default_stability() -> f64 {
    0.35
}

fn default_compatibility() -> f64 {
    0.2
}

fn default_uniqueness() -> f64 {
    0.25
}

impl ScoringWeights {
    /// Weights scaled to sum to 1. Negative, non-finite, or all-zero input
    /// falls back to the defaults.
    pub fn normalized(&self) -> Self {
        let parts = [
            self.performance,
            self.stability,
            self.compatibility,
            self.uniqueness,
        ];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Self::default().normalized();
        }
        let sum: f64 = parts.iter().sum();
        if sum <= f64::EPSILON {
            return Self::default().normalized();
        }
        Self {
            performance: self.performance / sum,
            stability: self.stability / sum,
            compatibility: self.compatibility / sum,
            uniqueness: self.uniqueness / sum,
        }
    }

    /// Weighted total of the four dimensions, clamped to `[0,1]`.
    pub fn combine(&self, performance: f64, stability: f64, compatibility: f64, uniqueness: f64) -> f64 {
        let w = self.normalized();
        let total = w.performance * performance
            + w.stability * stability
            + w.compatibility * compatibility
            + w.uniqueness * uniqueness;
        total.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_sums_to_one() {
        let w = ScoringWeights {
            performance: 2.0,
            stability: 2.0,
            compatibility: 4.0,
            uniqueness: 0.0,
        }
        .normalized();
        assert!((w.performance + w.stability + w.compatibility + w.uniqueness - 1.0).abs() < 1e-9);
        assert!((w.compatibility - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights_fall_back() {
        let zero = ScoringWeights {
            performance: 0.0,
            stability: 0.0,
            compatibility: 0.0,
            uniqueness: 0.0,
        };
        assert_eq!(zero.normalized(), ScoringWeights::default().normalized());

        let negative = ScoringWeights {
            performance: -1.0,
            ..ScoringWeights::default()
        };
        assert_eq!(negative.normalized(), ScoringWeights::default().normalized());
    }

    #[test]
    fn test_combine_stays_in_range() {
        let w = ScoringWeights::default();
        assert_eq!(w.combine(1.0, 1.0, 1.0, 1.0), 1.0);
        assert_eq!(w.combine(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(w.combine(2.0, 2.0, 2.0, 2.0), 1.0);
    }
}

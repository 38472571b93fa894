//! Framing thresholds for scan projections.
//!
//! These are narrative tuning values. They are kept as named constants and
//! only ever compared against, never derived.

/// Scores strictly below this are framed as divergence.
pub const DIVERGENCE_THRESHOLD: f64 = 50.0;
/// Scores at or above this are framed as synced.
pub const SYNCED_THRESHOLD: f64 = 80.0;
pub const DIVERGENCE_GLITCH_LEVEL: f64 = 0.8;

pub const HEADER_DIVERGENCE: &str = "VISUAL CORTEX: DIVERGENCE DETECTED";
pub const HEADER_SYNCED: &str = "VISUAL CORTEX: SYNCED";
pub const HEADER_ACTIVE: &str = "VISUAL CORTEX: ACTIVE";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingPolicy {
    pub divergence_threshold: f64,
    pub synced_threshold: f64,
    pub divergence_glitch_level: f64,
}

impl Default for FramingPolicy {
    fn default() -> Self {
        Self {
            divergence_threshold: DIVERGENCE_THRESHOLD,
            synced_threshold: SYNCED_THRESHOLD,
            divergence_glitch_level: DIVERGENCE_GLITCH_LEVEL,
        }
    }
}

impl FramingPolicy {
    pub fn is_divergent(&self, score: Option<f64>) -> bool {
        score.is_some_and(|value| value < self.divergence_threshold)
    }

    /// A raw terminal dump is only justified by a divergent score.
    pub fn prefers_artifact(&self, score: Option<f64>) -> bool {
        !self.is_divergent(score)
    }

    pub fn header(&self, score: Option<f64>) -> &'static str {
        match score {
            Some(value) if value < self.divergence_threshold => HEADER_DIVERGENCE,
            Some(value) if value >= self.synced_threshold => HEADER_SYNCED,
            _ => HEADER_ACTIVE,
        }
    }

    pub fn glitch_level(&self, score: Option<f64>) -> f64 {
        if self.is_divergent(score) {
            self.divergence_glitch_level
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_boundaries() {
        let policy = FramingPolicy::default();
        assert_eq!(policy.header(Some(0.0)), HEADER_DIVERGENCE);
        assert_eq!(policy.header(Some(49.9)), HEADER_DIVERGENCE);
        assert_eq!(policy.header(Some(50.0)), HEADER_ACTIVE);
        assert_eq!(policy.header(Some(79.0)), HEADER_ACTIVE);
        assert_eq!(policy.header(Some(80.0)), HEADER_SYNCED);
        assert_eq!(policy.header(None), HEADER_ACTIVE);
    }

    #[test]
    fn null_score_prefers_artifact() {
        let policy = FramingPolicy::default();
        assert!(policy.prefers_artifact(None));
        assert!(policy.prefers_artifact(Some(50.0)));
        assert!(!policy.prefers_artifact(Some(30.0)));
        assert_eq!(policy.glitch_level(None), 0.0);
        assert_eq!(policy.glitch_level(Some(30.0)), DIVERGENCE_GLITCH_LEVEL);
    }
}

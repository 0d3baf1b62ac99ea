//! Session configuration.
//!
//! Every tunable in the pipeline lives here, grouped per component. There is
//! no file or environment loading: the kernel has no process boundary, so a
//! host constructs (or deserializes) a `SessionConfig`, validates it, and can
//! replace it at runtime through `ScanSession::apply_config`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::SimilarityConfig;
use crate::guidance::GuidanceConfig;
use crate::select::SelectorConfig;
use crate::track::TrackerConfig;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    pub tracker: TrackerConfig,
    pub selector: SelectorConfig,
    pub guidance: GuidanceConfig,
    pub similarity: SimilarityConfig,
}

impl SessionConfig {
    /// Cross-component sanity checks on top of the per-component ones.
    pub fn validate(&self) -> Result<()> {
        self.similarity.validate()?;

        if self.tracker.min_confidence < 0.0 || self.tracker.min_confidence > 1.0 {
            return Err(anyhow!("tracker min_confidence must be in [0, 1]"));
        }
        if self.tracker.max_center_distance <= 0.0 {
            return Err(anyhow!("tracker max_center_distance must be positive"));
        }
        if self.tracker.expiry_frames == 0 {
            return Err(anyhow!("tracker expiry_frames must be at least 1"));
        }

        if self.selector.min_area_fraction <= 0.0 {
            return Err(anyhow!("selector min_area_fraction must be positive"));
        }
        if self.selector.plausible_area_max <= self.selector.plausible_area_min {
            return Err(anyhow!(
                "selector plausible area band is empty: [{}, {}]",
                self.selector.plausible_area_min,
                self.selector.plausible_area_max
            ));
        }

        if self.guidance.min_area < self.selector.min_area_fraction {
            return Err(anyhow!(
                "guidance min_area {} is below the selector hard floor {}; \
                 the too-far band would be unreachable",
                self.guidance.min_area,
                self.selector.min_area_fraction
            ));
        }
        if self.guidance.max_area <= self.guidance.min_area {
            return Err(anyhow!("guidance area band is empty"));
        }
        if self.guidance.motion_window == 0 {
            return Err(anyhow!("guidance motion_window must be at least 1"));
        }
        if self.guidance.min_stable_frames == 0 {
            return Err(anyhow!("guidance min_stable_frames must be at least 1"));
        }
        if self.guidance.roi_max_size <= self.guidance.roi_min_size {
            return Err(anyhow!("guidance ROI size bounds are empty"));
        }
        if self.guidance.roi_adapt_rate < 0.0 || self.guidance.roi_adapt_rate > 1.0 {
            return Err(anyhow!("guidance roi_adapt_rate must be in [0, 1]"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_guidance_band_is_rejected() {
        let mut cfg = SessionConfig::default();
        cfg.guidance.min_area = 0.4;
        cfg.guidance.max_area = 0.35;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn guidance_floor_below_selector_floor_is_rejected() {
        let mut cfg = SessionConfig::default();
        cfg.guidance.min_area = 0.01;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_similarity_weights_are_rejected() {
        let mut cfg = SessionConfig::default();
        cfg.similarity.weights.category = 0.0;
        cfg.similarity.weights.label = 0.0;
        cfg.similarity.weights.size = 0.0;
        cfg.similarity.weights.distance = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = SessionConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: SessionConfig = serde_json::from_str(&json).expect("deserialize");
        assert!(back.validate().is_ok());
        assert_eq!(back.similarity.threshold, cfg.similarity.threshold);
        assert_eq!(back.tracker.expiry_frames, cfg.tracker.expiry_frames);
    }
}

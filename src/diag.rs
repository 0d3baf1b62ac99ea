//! Session diagnostics.
//!
//! Degraded conditions never raise errors in the pipeline; they land here as
//! counters so hosts can surface or log them. Counters are plain session
//! state, cleared on `reset()` with everything else.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DiagCounters {
    /// Detections dropped before tracking because their box was malformed.
    pub malformed_dropped: u64,
    /// Commit attempts rejected because no lock was held or the id did not
    /// match the locked candidate.
    pub rejected_commits: u64,
    /// Configuration updates rejected by validation (last valid config kept).
    pub config_rejections: u64,
}

impl DiagCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_everything() {
        let mut diag = DiagCounters {
            malformed_dropped: 3,
            rejected_commits: 2,
            config_rejections: 1,
        };
        diag.reset();
        assert_eq!(diag.malformed_dropped, 0);
        assert_eq!(diag.rejected_commits, 0);
        assert_eq!(diag.config_rejections, 0);
    }
}

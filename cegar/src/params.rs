//! Driver parameters.

use serde::{Deserialize, Serialize};

/// Configuration of a gate-level abstraction run.
///
/// The defaults match the standard interactive use: a handful of starting
/// frames, a one-minute deadline, and no conflict ceiling.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GlaParams {
    /// Frames treated as the initial regime: a failed core reload inside
    /// them is a counterexample rather than an invariant violation.
    pub frames_start: u32,
    /// Maximum number of frames to unroll; 0 means no limit.
    pub frames_max: u32,
    /// Timeframe overlap used when the bootstrap variant reuses prior
    /// refinement cores across frames.
    pub frames_over: u32,
    /// Conflict budget per solver call; 0 means unlimited.
    pub conflict_limit: u64,
    /// Wall-clock budget for the whole run, in seconds; 0 means none.
    pub timeout_sec: u32,
    /// Stop once the abstraction exceeds `(1 - ratio_min/100)` of the
    /// universe.
    pub ratio_min: u32,
    /// Cap on the solver's learnt-clause database; 0 means unlimited.
    pub learnt_max: u32,
    /// Propagate justification marks through fanouts during refinement.
    pub prop_fanout: bool,
    /// Keep a gate-class snapshot of the abstraction every other frame.
    pub dump_intermediate: bool,
    /// Encode flop initialization through a shared terminal variable instead
    /// of one unit clause per flop.
    pub use_term_vars: bool,
    pub verbose: bool,
}

impl Default for GlaParams {
    fn default() -> Self {
        Self {
            frames_start: 5,
            frames_max: 10,
            frames_over: 3,
            conflict_limit: 0,
            timeout_sec: 60,
            ratio_min: 0,
            learnt_max: 0,
            prop_fanout: false,
            dump_intermediate: false,
            use_term_vars: false,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = GlaParams::default();
        assert_eq!(p.frames_start, 5);
        assert_eq!(p.frames_max, 10);
        assert_eq!(p.frames_over, 3);
        assert_eq!(p.timeout_sec, 60);
        assert_eq!(p.conflict_limit, 0);
        assert!(!p.prop_fanout);
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = GlaParams {
            ratio_min: 30,
            prop_fanout: true,
            ..GlaParams::default()
        };
        let json = serde_json::to_string(&p).unwrap();
        let q: GlaParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, q);
    }
}

use std::time::{Duration, Instant};

/// Budget for batch unlock attempts.
///
/// Wordlist runs can be arbitrarily long; the pool checks this between
/// candidates and abandons the rest once either bound is hit. The default
/// is unbounded, which is what single-password unlocking wants.
#[derive(Debug, Clone, Default)]
pub struct UnlockOptions {
    /// Stop after this many candidates have been tried.
    pub candidate_limit: Option<usize>,

    /// Stop once this much wall-clock time has elapsed.
    pub time_budget: Option<Duration>,
}

// ── Implementation ───────────────────────────────────────────────────

impl UnlockOptions {
    /// Bound by candidate count only.
    pub fn limited(candidates: usize) -> Self {
        UnlockOptions {
            candidate_limit: Some(candidates),
            time_budget: None,
        }
    }

    /// Bound by elapsed time only.
    pub fn within(budget: Duration) -> Self {
        UnlockOptions {
            candidate_limit: None,
            time_budget: Some(budget),
        }
    }

    /// True once either bound is exceeded. `tried` counts candidates
    /// already consumed; `started` is when the batch began.
    pub fn exhausted(&self, tried: usize, started: Instant) -> bool {
        if self.candidate_limit.is_some_and(|limit| tried >= limit) {
            return true;
        }
        self.time_budget
            .is_some_and(|budget| started.elapsed() >= budget)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        let opts = UnlockOptions::default();
        assert!(!opts.exhausted(1_000_000, Instant::now()));
    }

    #[test]
    fn candidate_limit_trips_at_the_boundary() {
        let opts = UnlockOptions::limited(3);
        let now = Instant::now();
        assert!(!opts.exhausted(2, now));
        assert!(opts.exhausted(3, now));
        assert!(opts.exhausted(4, now));
    }

    #[test]
    fn zero_time_budget_trips_immediately() {
        let opts = UnlockOptions::within(Duration::ZERO);
        assert!(opts.exhausted(0, Instant::now()));
    }
}

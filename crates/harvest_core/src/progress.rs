use std::time::Duration;

use crate::StopReason;

/// Aggregate progress at one instant of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub collected: u64,
    pub target: u64,
    pub attempts: u64,
    pub elapsed: Duration,
    /// Estimated time to reach the target at the current yield rate.
    /// `None` until the first record is collected.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn compute(collected: u64, target: u64, attempts: u64, elapsed: Duration) -> Self {
        let eta = if collected >= target {
            Some(Duration::ZERO)
        } else if collected == 0 || elapsed.is_zero() {
            None
        } else {
            let per_record = elapsed.as_secs_f64() / collected as f64;
            Some(Duration::from_secs_f64(per_record * (target - collected) as f64))
        };
        Self {
            collected,
            target,
            attempts,
            elapsed,
            eta,
        }
    }

    /// Percentage of the target collected, capped at 100.
    pub fn percent(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        (self.collected as f64 / self.target as f64 * 100.0).min(100.0)
    }

    /// Collected records per second.
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.collected as f64 / secs
        }
    }
}

/// End-of-run counts surfaced to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub attempts: u64,
    pub collected: u64,
    pub duplicates: u64,
    pub misses: u64,
    pub failures: u64,
    pub target: u64,
    pub attempt_ceiling: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn target_met(&self) -> bool {
        self.collected >= self.target
    }

    /// How many records short of the target the run ended.
    pub fn shortfall(&self) -> u64 {
        self.target.saturating_sub(self.collected)
    }
}

use std::time::Duration;

use crate::progress::{ProgressSnapshot, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    BudgetExhausted,
    Cancelled,
}

/// How a single dispatched attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A new code was accepted by the result store.
    Accepted,
    /// A code was returned but had already been collected this run.
    Duplicate,
    /// The exchange succeeded but carried no code.
    Miss,
    /// Transport failure (network, status, timeout).
    Failed,
}

/// Run-wide attempt and yield counters plus the stop condition.
///
/// Pure bookkeeping: callers own the synchronization. The engine keeps one of
/// these behind its own mutex, never nested with any other lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunBudget {
    target: u64,
    attempt_ceiling: u64,
    attempts: u64,
    collected: u64,
    duplicates: u64,
    misses: u64,
    failures: u64,
    stopped: Option<StopReason>,
}

impl RunBudget {
    pub fn new(target: u64, attempt_ceiling: u64) -> Self {
        Self {
            target,
            attempt_ceiling,
            attempts: 0,
            collected: 0,
            duplicates: 0,
            misses: 0,
            failures: 0,
            stopped: None,
        }
    }

    /// Evaluates the stop condition and, if it is clear, reserves one attempt.
    ///
    /// Returns the 1-based attempt number. Once a stop reason has been
    /// observed it latches and every later call fails with it.
    pub fn begin_attempt(&mut self) -> Result<u64, StopReason> {
        if let Some(reason) = self.stopped {
            return Err(reason);
        }
        if let Some(reason) = self.evaluate() {
            self.stopped = Some(reason);
            return Err(reason);
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Records how an attempt ended. Returns the collection sequence number
    /// for accepted records.
    pub fn record(&mut self, outcome: AttemptOutcome) -> Option<u64> {
        match outcome {
            AttemptOutcome::Accepted => {
                self.collected += 1;
                if self.stopped.is_none() && self.collected >= self.target {
                    self.stopped = Some(StopReason::TargetReached);
                }
                return Some(self.collected);
            }
            AttemptOutcome::Duplicate => self.duplicates += 1,
            AttemptOutcome::Miss => self.misses += 1,
            AttemptOutcome::Failed => self.failures += 1,
        }
        None
    }

    /// Stops the run. Latches the natural stop reason if the counters
    /// already satisfy the stop condition, `Cancelled` otherwise. Has no
    /// effect once a stop reason has latched.
    pub fn cancel(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(self.evaluate().unwrap_or(StopReason::Cancelled));
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_reason().is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped.or_else(|| self.evaluate())
    }

    fn evaluate(&self) -> Option<StopReason> {
        if self.collected >= self.target {
            Some(StopReason::TargetReached)
        } else if self.attempts >= self.attempt_ceiling {
            Some(StopReason::BudgetExhausted)
        } else {
            None
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn attempt_ceiling(&self) -> u64 {
        self.attempt_ceiling
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn collected(&self) -> u64 {
        self.collected
    }

    pub fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot::compute(self.collected, self.target, self.attempts, elapsed)
    }

    /// End-of-run counts. A run that never latched a stop reason (all
    /// workers exited some other way) is reported as cancelled.
    pub fn summary(&self, elapsed: Duration) -> RunSummary {
        RunSummary {
            attempts: self.attempts,
            collected: self.collected,
            duplicates: self.duplicates,
            misses: self.misses,
            failures: self.failures,
            target: self.target,
            attempt_ceiling: self.attempt_ceiling,
            stop_reason: self.stop_reason().unwrap_or(StopReason::Cancelled),
            elapsed,
        }
    }
}

pub const DEFAULT_RETRY_FACTOR: u64 = 6;
pub const DEFAULT_CONCURRENCY_MULTIPLIER: u64 = 1;

/// Default attempt ceiling: `target * retry_factor * workers * multiplier`.
///
/// A configuration default only. An explicit ceiling always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CeilingPolicy {
    pub retry_factor: u64,
    pub concurrency_multiplier: u64,
}

impl Default for CeilingPolicy {
    fn default() -> Self {
        Self {
            retry_factor: DEFAULT_RETRY_FACTOR,
            concurrency_multiplier: DEFAULT_CONCURRENCY_MULTIPLIER,
        }
    }
}

impl CeilingPolicy {
    /// Derived ceiling, never below 1.
    pub fn ceiling_for(&self, target: u64, workers: u64) -> u64 {
        target
            .saturating_mul(self.retry_factor)
            .saturating_mul(workers)
            .saturating_mul(self.concurrency_multiplier)
            .max(1)
    }

    /// Uses `explicit` when given and non-zero, the derived ceiling otherwise.
    pub fn resolve(&self, explicit: Option<u64>, target: u64, workers: u64) -> u64 {
        match explicit {
            Some(ceiling) if ceiling > 0 => ceiling,
            _ => self.ceiling_for(target, workers),
        }
    }
}

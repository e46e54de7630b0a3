//! Harvest core: pure identity model, run budget and worker state machines.
mod budget;
mod identity;
mod policy;
mod progress;
mod worker;

pub use budget::{AttemptOutcome, RunBudget, StopReason};
pub use identity::{
    common_prefix, next_index_for_prefix, parse_address, Identity, ParsedAddress, Seed,
    SeedError, DEFAULT_DOMAIN, INDEX_WIDTH, SHORT_SEED_LEN,
};
pub use policy::{CeilingPolicy, DEFAULT_CONCURRENCY_MULTIPLIER, DEFAULT_RETRY_FACTOR};
pub use progress::{ProgressSnapshot, RunSummary};
pub use worker::{advance, WorkerEvent, WorkerPhase};

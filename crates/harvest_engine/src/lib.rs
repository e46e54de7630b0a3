//! Harvest engine: identity allocation, durable results, transport and the worker pool.
mod allocator;
mod engine;
mod extract;
mod persist;
mod store;
mod transport;
mod types;

pub use allocator::{
    AllocatorOptions, AllocatorPaths, IdentityAllocator, SeedProvenance, SeedState, SetupError,
    DEFAULT_HISTORY_FILE, DEFAULT_INDEX_FILE, DEFAULT_SEED_FILE, DEFAULT_USED_FILE,
};
pub use engine::{
    EngineSettings, FallbackPolicy, HarvestEngine, IdentityMode, DEFAULT_PROGRESS_INTERVAL,
};
pub use extract::{code_from_text, code_from_url, extract_code};
pub use persist::{append_line, ensure_dir, read_optional, write_atomic, AtomicFileWriter, PersistError};
pub use store::{
    FlushReport, HarvestRecord, ResultFile, ResultLayout, ResultStore, StoreError, COUPON_COLUMN,
    EMAIL_COLUMN, OPERATOR_COLUMN, USED_COLUMN,
};
pub use transport::{
    FailureKind, ReqwestTransport, Transport, TransportError, TransportSettings,
    DEFAULT_USER_AGENT,
};
pub use types::{ChannelProgressSink, HarvestError, HarvestEvent, ProgressSink};

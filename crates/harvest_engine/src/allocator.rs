use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use engine_logging::{engine_info, engine_warn};
use harvest_core::{common_prefix, next_index_for_prefix, Identity, Seed, SeedError, DEFAULT_DOMAIN};
use rand::Rng;
use thiserror::Error;

use crate::persist::{append_line, read_optional, write_atomic, PersistError};
use crate::store::{ResultFile, StoreError};

pub const DEFAULT_SEED_FILE: &str = "email_seed.txt";
pub const DEFAULT_INDEX_FILE: &str = "email_index.txt";
pub const DEFAULT_USED_FILE: &str = "used_emails.txt";
pub const DEFAULT_HISTORY_FILE: &str = "seeds_history.txt";

/// Durable files the allocator reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorPaths {
    pub seed_file: PathBuf,
    pub index_file: PathBuf,
    pub used_file: PathBuf,
    pub history_file: PathBuf,
    /// Prior result file, consulted to reconstruct a seed or a start index.
    pub result_file: Option<PathBuf>,
}

impl AllocatorPaths {
    /// Default file names inside `dir`, without a result file.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            seed_file: dir.join(DEFAULT_SEED_FILE),
            index_file: dir.join(DEFAULT_INDEX_FILE),
            used_file: dir.join(DEFAULT_USED_FILE),
            history_file: dir.join(DEFAULT_HISTORY_FILE),
            result_file: None,
        }
    }

    pub fn with_result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_file = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Require an existing seed file; never mint or reconstruct.
    pub reuse_seed: bool,
    pub domain: String,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            reuse_seed: false,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedProvenance {
    /// Minted this run.
    Fresh,
    /// Read from the seed file.
    Reused,
    /// Recovered from identities in a prior result file.
    Reconstructed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedState {
    pub seed: Seed,
    pub provenance: SeedProvenance,
}

/// Fatal start-up conditions. Nothing has been sent when these occur.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("reuse-seed requested but seed file {0} is missing")]
    MissingSeedFile(PathBuf),
    #[error("seed file {path} is corrupt: {source}")]
    CorruptSeed {
        path: PathBuf,
        #[source]
        source: SeedError,
    },
    #[error("index file {path} is corrupt: {content:?}")]
    CorruptIndex { path: PathBuf, content: String },
    #[error("prior results unusable: {0}")]
    PriorResults(#[from] StoreError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Hands out collision-free identities for one seed.
///
/// The cursor is persisted before its lock is released, so an index is
/// never handed out twice even if the process dies right after.
#[derive(Debug)]
pub struct IdentityAllocator {
    seed_state: SeedState,
    domain: String,
    start_index: u64,
    index_file: PathBuf,
    used_file: PathBuf,
    cursor: Mutex<u64>,
    ledger: Mutex<()>,
}

impl IdentityAllocator {
    /// Resolves seed and start index from the durable files, writing the
    /// resolved start index back before returning.
    pub fn open(paths: &AllocatorPaths, options: &AllocatorOptions) -> Result<Self, SetupError> {
        Self::open_with(paths, options, || rand::rng().random())
    }

    /// Like [`IdentityAllocator::open`] with a caller-supplied source of seed bits.
    pub fn open_with(
        paths: &AllocatorPaths,
        options: &AllocatorOptions,
        mint: impl FnOnce() -> u64,
    ) -> Result<Self, SetupError> {
        let prior = match &paths.result_file {
            Some(path) => ResultFile::load(path)?,
            None => None,
        };
        let seed_state = resolve_seed(paths, options, prior.as_ref(), mint)?;
        let start_index = resolve_start_index(paths, &seed_state, prior.as_ref())?;
        write_atomic(&paths.index_file, &format!("{start_index}\n"))?;

        engine_info!(
            "Identity allocator ready: seed={} ({:?}) start_index={}",
            seed_state.seed,
            seed_state.provenance,
            start_index
        );

        Ok(Self {
            seed_state,
            domain: options.domain.clone(),
            start_index,
            index_file: paths.index_file.clone(),
            used_file: paths.used_file.clone(),
            cursor: Mutex::new(start_index),
            ledger: Mutex::new(()),
        })
    }

    pub fn seed_state(&self) -> &SeedState {
        &self.seed_state
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// The index the next `allocate` will hand out.
    pub fn next_index(&self) -> u64 {
        *self.lock_cursor()
    }

    fn lock_cursor(&self) -> MutexGuard<'_, u64> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the next identity and advances the durable cursor.
    ///
    /// The cursor only moves once the new value is on disk; a persistence
    /// failure leaves it where it was and is fatal for the run.
    pub fn allocate(&self) -> Result<Identity, PersistError> {
        let mut cursor = self.lock_cursor();
        let identity = Identity::new(&self.seed_state.seed, *cursor);
        let next = *cursor + 1;
        write_atomic(&self.index_file, &format!("{next}\n"))?;
        *cursor = next;
        Ok(identity)
    }

    /// Renders an identity as the address handed to the transport.
    pub fn address(&self, identity: &Identity) -> String {
        identity.address(&self.domain)
    }

    /// Appends `address` to the used ledger. Best-effort: the cursor file is
    /// the authority for resumption, so failures are only logged.
    pub fn record_used(&self, address: &str) {
        let _guard = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = append_line(&self.used_file, address) {
            engine_warn!("Failed to append {} to {:?}: {}", address, self.used_file, err);
        }
    }
}

fn read_seed_file(path: &Path) -> Result<Option<Seed>, SetupError> {
    match read_optional(path)? {
        None => Ok(None),
        Some(text) => text
            .parse::<Seed>()
            .map(Some)
            .map_err(|source| SetupError::CorruptSeed {
                path: path.to_path_buf(),
                source,
            }),
    }
}

fn resolve_seed(
    paths: &AllocatorPaths,
    options: &AllocatorOptions,
    prior: Option<&ResultFile>,
    mint: impl FnOnce() -> u64,
) -> Result<SeedState, SetupError> {
    let existing = read_seed_file(&paths.seed_file)?;

    if options.reuse_seed {
        let seed = existing.ok_or_else(|| SetupError::MissingSeedFile(paths.seed_file.clone()))?;
        return Ok(SeedState {
            seed,
            provenance: SeedProvenance::Reused,
        });
    }

    if let Some(seed) = existing {
        return Ok(SeedState {
            seed,
            provenance: SeedProvenance::Reused,
        });
    }

    if let Some(prefix) = prior.and_then(|file| common_prefix(file.identities())) {
        // Prefixes come from parse_address, so they are always valid seeds.
        if let Ok(seed) = Seed::new(prefix) {
            write_atomic(&paths.seed_file, &format!("{seed}\n"))?;
            engine_info!("Reconstructed seed {} from prior results", seed);
            return Ok(SeedState {
                seed,
                provenance: SeedProvenance::Reconstructed,
            });
        }
    }

    let seed = Seed::from_bits(mint());
    write_atomic(&paths.seed_file, &format!("{seed}\n"))?;
    append_line(
        &paths.history_file,
        &format!("{} {}", Utc::now().to_rfc3339(), seed),
    )?;
    engine_info!(
        "Minted new seed {} (saved to {:?}, logged in {:?})",
        seed,
        paths.seed_file,
        paths.history_file
    );
    Ok(SeedState {
        seed,
        provenance: SeedProvenance::Fresh,
    })
}

fn resolve_start_index(
    paths: &AllocatorPaths,
    seed_state: &SeedState,
    prior: Option<&ResultFile>,
) -> Result<u64, SetupError> {
    if seed_state.provenance == SeedProvenance::Fresh {
        if paths.index_file.exists() {
            engine_warn!(
                "Ignoring index file {:?}: it belongs to an earlier seed",
                paths.index_file
            );
        }
    } else if let Some(content) = read_optional(&paths.index_file)? {
        return content
            .trim()
            .parse::<u64>()
            .map_err(|_| SetupError::CorruptIndex {
                path: paths.index_file.clone(),
                content,
            });
    }

    let prefix = seed_state.seed.short();
    let from_ledger = read_optional(&paths.used_file)?
        .and_then(|text| next_index_for_prefix(text.lines(), prefix));
    let from_results = prior.and_then(|file| next_index_for_prefix(file.identities(), prefix));

    if let (Some(ledger), Some(results)) = (from_ledger, from_results) {
        if results > ledger {
            engine_warn!(
                "Used ledger is behind prior results ({} < {}); resuming after results",
                ledger,
                results
            );
        }
    }
    Ok(from_ledger.max(from_results).unwrap_or(0))
}

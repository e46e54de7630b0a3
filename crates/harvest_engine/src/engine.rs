use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use engine_logging::{engine_info, engine_warn, worker_debug, worker_warn};
use harvest_core::{
    advance, AttemptOutcome, CeilingPolicy, RunBudget, RunSummary, WorkerEvent, WorkerPhase,
};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::allocator::IdentityAllocator;
use crate::store::{ResultFile, ResultStore};
use crate::transport::Transport;
use crate::types::{HarvestError, HarvestEvent, ProgressSink};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(300);
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

/// Where a worker's request identities come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// A fresh allocator identity per attempt.
    Deterministic,
    /// The same operator-supplied address for every attempt.
    Fixed(String),
}

/// Switches a deterministic worker to a fixed address after `after_misses`
/// consecutive attempts without a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub after_misses: u32,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workers: usize,
    pub target: u64,
    pub attempt_ceiling: u64,
    /// Per-worker pause after each attempt.
    pub request_delay: Duration,
    pub progress_interval: Duration,
    pub operator: String,
    pub mode: IdentityMode,
    pub fallback: Option<FallbackPolicy>,
    /// Result file flushed on progress ticks with new records and at the end.
    pub checkpoint_path: Option<PathBuf>,
}

impl EngineSettings {
    /// Deterministic mode with the default attempt ceiling for `target` and `workers`.
    pub fn new(target: u64, workers: usize) -> Self {
        Self {
            workers,
            target,
            attempt_ceiling: CeilingPolicy::default().ceiling_for(target, workers as u64),
            request_delay: Duration::ZERO,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            operator: String::new(),
            mode: IdentityMode::Deterministic,
            fallback: None,
            checkpoint_path: None,
        }
    }
}

/// Bounded pool of workers sharing one allocator, one result store and one
/// run budget.
///
/// Each of the three has its own lock; no worker holds two at once and no
/// lock is held across a request.
pub struct HarvestEngine {
    allocator: Option<Arc<IdentityAllocator>>,
    store: Arc<ResultStore>,
    transport: Arc<dyn Transport>,
    settings: EngineSettings,
}

impl HarvestEngine {
    pub fn new(
        store: Arc<ResultStore>,
        transport: Arc<dyn Transport>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            allocator: None,
            store,
            transport,
            settings,
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<IdentityAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    fn validate(&self) -> Result<(), HarvestError> {
        if self.settings.workers == 0 {
            return Err(HarvestError::Config("at least one worker is required".into()));
        }
        match &self.settings.mode {
            IdentityMode::Deterministic if self.allocator.is_none() => Err(HarvestError::Config(
                "deterministic mode requires an identity allocator".into(),
            )),
            IdentityMode::Fixed(address) if address.trim().is_empty() => {
                Err(HarvestError::Config("fixed identity is empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// Runs until the target is met, the attempt ceiling is reached, or
    /// `cancel` fires. In-flight attempts always complete and are recorded.
    ///
    /// Fatal persistence failures abort the run without a final flush.
    pub async fn run(
        &self,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, HarvestError> {
        self.validate()?;
        // An unreadable result file must fail the run before any request
        // spends a code, not at the first checkpoint.
        if let Some(path) = &self.settings.checkpoint_path {
            ResultFile::load(path)?;
        }

        let settings = &self.settings;
        let ctx = Arc::new(RunContext {
            allocator: self.allocator.clone(),
            store: self.store.clone(),
            transport: self.transport.clone(),
            settings: settings.clone(),
            budget: Mutex::new(RunBudget::new(settings.target, settings.attempt_ceiling)),
            sink,
            stop: cancel.child_token(),
            started: Instant::now(),
        });

        let seed = self
            .allocator
            .as_ref()
            .map(|allocator| allocator.seed_state().seed.to_string());
        let start_index = self.allocator.as_ref().map(|allocator| allocator.next_index());
        engine_info!(
            "Starting harvest: target={} ceiling={} workers={} seed={:?} start_index={:?}",
            settings.target,
            settings.attempt_ceiling,
            settings.workers,
            seed,
            start_index
        );
        ctx.sink.emit(HarvestEvent::Started {
            seed,
            start_index,
            target: settings.target,
            attempt_ceiling: settings.attempt_ceiling,
            workers: settings.workers,
        });

        let ticker = tokio::spawn(progress_loop(ctx.clone()));
        let mut workers = JoinSet::new();
        for worker in 1..=settings.workers {
            workers.spawn(worker_loop(ctx.clone(), worker));
        }

        let mut failure: Option<HarvestError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|err| Err(HarvestError::WorkerTask(err.to_string())));
            if let Err(err) = result {
                engine_warn!("Aborting run: {}", err);
                ctx.lock_budget().cancel();
                ctx.stop.cancel();
                failure.get_or_insert(err);
            }
        }

        ctx.stop.cancel();
        match ticker.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => {
                failure.get_or_insert(HarvestError::WorkerTask(err.to_string()));
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        if let Some(path) = &settings.checkpoint_path {
            self.store.flush(path)?;
        }

        let elapsed = ctx.started.elapsed();
        let (snapshot, summary) = {
            let budget = ctx.lock_budget();
            (budget.snapshot(elapsed), budget.summary(elapsed))
        };
        ctx.sink.emit(HarvestEvent::Progress(snapshot));
        ctx.sink.emit(HarvestEvent::Finished(summary.clone()));
        engine_info!(
            "Harvest finished ({:?}): collected={}/{} attempts={} duplicates={} misses={} failures={}",
            summary.stop_reason,
            summary.collected,
            summary.target,
            summary.attempts,
            summary.duplicates,
            summary.misses,
            summary.failures
        );
        Ok(summary)
    }
}

struct RunContext {
    allocator: Option<Arc<IdentityAllocator>>,
    store: Arc<ResultStore>,
    transport: Arc<dyn Transport>,
    settings: EngineSettings,
    budget: Mutex<RunBudget>,
    sink: Arc<dyn ProgressSink>,
    stop: CancellationToken,
    started: Instant,
}

impl RunContext {
    fn lock_budget(&self) -> MutexGuard<'_, RunBudget> {
        self.budget.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address for the next attempt, and whether it came from the allocator.
    fn next_address(&self, use_fallback: bool) -> Result<(String, bool), HarvestError> {
        if use_fallback {
            if let Some(fallback) = &self.settings.fallback {
                return Ok((fallback.address.clone(), false));
            }
        }
        match (&self.settings.mode, &self.allocator) {
            (IdentityMode::Fixed(address), _) => Ok((address.clone(), false)),
            (IdentityMode::Deterministic, Some(allocator)) => {
                let identity = allocator.allocate()?;
                Ok((allocator.address(&identity), true))
            }
            (IdentityMode::Deterministic, None) => Err(HarvestError::Config(
                "deterministic mode requires an identity allocator".into(),
            )),
        }
    }

    /// Offers a parsed result to the store, then updates the budget.
    ///
    /// The event's `seq` is the record's position in the store, so display
    /// numbering matches row order in the flushed file.
    fn settle(&self, code: Option<String>, address: &str) -> AttemptOutcome {
        let accepted = code
            .as_deref()
            .map(|code| self.store.accept(code, address));
        let outcome = match accepted {
            None => AttemptOutcome::Miss,
            Some(Some(_)) => AttemptOutcome::Accepted,
            Some(None) => AttemptOutcome::Duplicate,
        };
        self.lock_budget().record(outcome);
        match (accepted.flatten(), code) {
            (Some(seq), Some(code)) => self.sink.emit(HarvestEvent::RecordAccepted {
                seq,
                code,
                identity: address.to_string(),
            }),
            _ if outcome == AttemptOutcome::Duplicate => {
                worker_debug!("duplicate code from {}", address);
            }
            _ => {}
        }
        outcome
    }
}

async fn worker_loop(ctx: Arc<RunContext>, worker: usize) -> Result<(), HarvestError> {
    let mut phase = WorkerPhase::Idle;
    let mut misses_in_a_row: u32 = 0;
    let mut use_fallback = false;

    while phase != WorkerPhase::Stopped {
        engine_logging::set_worker_id(worker);
        if ctx.stop.is_cancelled() {
            ctx.lock_budget().cancel();
        }
        let reserved = ctx.lock_budget().begin_attempt();
        let attempt = match reserved {
            Ok(attempt) => attempt,
            Err(reason) => {
                phase = advance(phase, WorkerEvent::StopObserved);
                worker_debug!("stop observed ({:?}), phase {:?}", reason, phase);
                ctx.stop.cancel();
                continue;
            }
        };

        let (address, deterministic) = ctx.next_address(use_fallback)?;
        phase = advance(phase, WorkerEvent::Dispatched);
        worker_debug!("attempt {} as {}", attempt, address);

        let result = ctx.transport.attempt(&address, &ctx.settings.operator).await;
        engine_logging::set_worker_id(worker);
        if deterministic {
            if let Some(allocator) = &ctx.allocator {
                allocator.record_used(&address);
            }
        }

        let outcome = match result {
            Ok(code) => {
                phase = advance(phase, WorkerEvent::ResponseReceived);
                phase = advance(phase, WorkerEvent::Parsed);
                let outcome = ctx.settle(code, &address);
                phase = advance(phase, WorkerEvent::Recorded);
                outcome
            }
            Err(err) => {
                phase = advance(phase, WorkerEvent::TransportFailed);
                worker_warn!("request error: {}", err);
                ctx.lock_budget().record(AttemptOutcome::Failed);
                AttemptOutcome::Failed
            }
        };

        if outcome == AttemptOutcome::Accepted {
            misses_in_a_row = 0;
        } else {
            misses_in_a_row = misses_in_a_row.saturating_add(1);
        }
        if let Some(fallback) = &ctx.settings.fallback {
            if deterministic && misses_in_a_row >= fallback.after_misses {
                worker_warn!(
                    "no new result after {} identities; switching to {}",
                    misses_in_a_row,
                    fallback.address
                );
                use_fallback = true;
            }
        }

        let stopped = ctx.lock_budget().is_stopped();
        if stopped {
            ctx.stop.cancel();
            continue;
        }

        let delay = ctx.settings.request_delay;
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.stop.cancelled() => {}
            }
        }
    }
    Ok(())
}

async fn progress_loop(ctx: Arc<RunContext>) -> Result<(), HarvestError> {
    let mut ticker =
        tokio::time::interval(ctx.settings.progress_interval.max(MIN_PROGRESS_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flushed = 0;

    loop {
        tokio::select! {
            _ = ctx.stop.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let snapshot = ctx.lock_budget().snapshot(ctx.started.elapsed());
        ctx.sink.emit(HarvestEvent::Progress(snapshot));

        if let Some(path) = &ctx.settings.checkpoint_path {
            let accepted = ctx.store.len();
            if accepted > flushed {
                if let Err(err) = ctx.store.flush(path) {
                    engine_warn!("Checkpoint flush to {:?} failed: {}", path, err);
                    ctx.stop.cancel();
                    return Err(err.into());
                }
                flushed = accepted;
            }
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use harvest_core::{CeilingPolicy, DEFAULT_CONCURRENCY_MULTIPLIER, DEFAULT_DOMAIN, DEFAULT_RETRY_FACTOR};
use harvest_engine::{
    AllocatorOptions, AllocatorPaths, EngineSettings, FallbackPolicy, IdentityMode, ResultLayout,
    TransportSettings, DEFAULT_HISTORY_FILE, DEFAULT_INDEX_FILE, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_SEED_FILE, DEFAULT_USED_FILE,
};

/// Command-line arguments for the `coupon-harvest` binary.
///
/// Without `--real` nothing is sent: the run only prints what it would do.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "coupon-harvest",
    version,
    about = "Concurrent reward-code harvester (dry-run unless --real)"
)]
pub struct CliArgs {
    /// Perform real HTTP requests. The default is a dry-run.
    #[arg(long)]
    pub real: bool,

    /// Skip the interactive confirmation (use with --real).
    #[arg(long)]
    pub yes: bool,

    /// Use a fresh seed/index identity for every attempt instead of --email.
    #[arg(long, alias = "no-email")]
    pub deterministic: bool,

    /// Number of unique codes to collect.
    #[arg(long, default_value_t = 1)]
    pub count: u64,

    /// Fixed identity used when not --deterministic, and as the fallback address.
    #[arg(long, default_value = "example@email.com")]
    pub email: String,

    /// Operator label sent with every request.
    #[arg(long, default_value = "CoopVoce")]
    pub operator: String,

    /// Per-worker pause after each request, in seconds.
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Attempts budgeted per target record when deriving the attempt ceiling.
    #[arg(long, default_value_t = DEFAULT_RETRY_FACTOR)]
    pub max_retries: u64,

    /// Total request limit across all workers (0 derives it from
    /// count * max-retries * concurrency * multiplier).
    #[arg(long, default_value_t = 0)]
    pub max_attempts: u64,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = 6)]
    pub concurrency: usize,

    /// Extra factor applied when deriving the attempt ceiling.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY_MULTIPLIER)]
    pub concurrency_max_attempts_multiplier: u64,

    /// Result file (merged, never overwritten).
    #[arg(long, default_value = "results.csv")]
    pub output: PathBuf,

    /// Create new result files with USED and OPERATOR columns.
    #[arg(long)]
    pub extended_output: bool,

    /// Write detailed debug logs to this file.
    #[arg(long)]
    pub log: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_SEED_FILE)]
    pub seed_file: PathBuf,

    #[arg(long, default_value = DEFAULT_INDEX_FILE)]
    pub index_file: PathBuf,

    #[arg(long, default_value = DEFAULT_USED_FILE)]
    pub used_file: PathBuf,

    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    pub history_file: PathBuf,

    /// Domain of generated identities.
    #[arg(long, default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// Require the existing seed in --seed-file instead of minting one.
    #[arg(long)]
    pub reuse_seed: bool,

    /// Endpoint that receives `{"email", "operator"}` (required with --real).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Page checked for a code when the endpoint's answer carries none.
    #[arg(long)]
    pub thanks_url: Option<String>,

    /// Referer header sent with every request.
    #[arg(long)]
    pub referer: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 15.0)]
    pub timeout: f64,

    /// Switch a deterministic worker to --email after this many attempts in
    /// a row without a new code.
    #[arg(long)]
    pub fallback_after: Option<u32>,
}

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub real: bool,
    pub assume_yes: bool,
    pub log_file: Option<PathBuf>,
    pub output: PathBuf,
    pub layout: ResultLayout,
    pub allocator_paths: AllocatorPaths,
    pub allocator_options: AllocatorOptions,
    pub transport: TransportSettings,
    pub engine: EngineSettings,
}

impl HarvestConfig {
    pub fn deterministic(&self) -> bool {
        self.engine.mode == IdentityMode::Deterministic
    }

    /// What the dry-run shows for each planned attempt.
    pub fn planned_identity(&self) -> &str {
        match &self.engine.mode {
            IdentityMode::Deterministic => "<deterministic identity from seed>",
            IdentityMode::Fixed(address) => address,
        }
    }
}

fn seconds(flag: &str, value: f64) -> anyhow::Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("--{flag} must be a non-negative number of seconds, got {value}");
    }
    Ok(Duration::from_secs_f64(value))
}

impl TryFrom<CliArgs> for HarvestConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.concurrency == 0 {
            bail!("--concurrency must be greater than 0");
        }
        if args.count == 0 {
            bail!("--count must be greater than 0");
        }
        if args.max_retries == 0 {
            bail!("--max-retries must be greater than 0");
        }
        if args.concurrency_max_attempts_multiplier == 0 {
            bail!("--concurrency-max-attempts-multiplier must be greater than 0");
        }
        let delay = seconds("delay", args.delay)?;
        let timeout = seconds("timeout", args.timeout)?;
        if timeout.is_zero() {
            bail!("--timeout must be greater than 0");
        }
        if args.domain.trim().is_empty() {
            bail!("--domain must not be empty");
        }

        let email = args.email.trim().to_string();
        let needs_email = !args.deterministic || args.fallback_after.is_some();
        if needs_email && !email.contains('@') {
            bail!("--email must be an address, got {:?}", args.email);
        }

        let fallback = match args.fallback_after {
            None => None,
            Some(_) if !args.deterministic => {
                bail!("--fallback-after only applies with --deterministic")
            }
            Some(0) => bail!("--fallback-after must be greater than 0"),
            Some(after_misses) => Some(FallbackPolicy {
                after_misses,
                address: email.clone(),
            }),
        };

        let endpoint = match (args.real, args.endpoint) {
            (_, Some(endpoint)) if !endpoint.trim().is_empty() => endpoint.trim().to_string(),
            (true, _) => bail!("--endpoint is required with --real"),
            (false, _) => String::new(),
        };

        let policy = CeilingPolicy {
            retry_factor: args.max_retries,
            concurrency_multiplier: args.concurrency_max_attempts_multiplier,
        };
        let attempt_ceiling =
            policy.resolve(Some(args.max_attempts), args.count, args.concurrency as u64);

        let mode = if args.deterministic {
            IdentityMode::Deterministic
        } else {
            IdentityMode::Fixed(email)
        };
        let layout = if args.extended_output {
            ResultLayout::Extended
        } else {
            ResultLayout::Simple
        };

        let allocator_paths = AllocatorPaths {
            seed_file: args.seed_file,
            index_file: args.index_file,
            used_file: args.used_file,
            history_file: args.history_file,
            result_file: Some(args.output.clone()),
        };
        let allocator_options = AllocatorOptions {
            reuse_seed: args.reuse_seed,
            domain: args.domain.trim().to_string(),
        };
        let transport = TransportSettings {
            endpoint,
            thanks_url: args.thanks_url,
            referer: args.referer,
            request_timeout: timeout,
            ..TransportSettings::default()
        };
        let engine = EngineSettings {
            workers: args.concurrency,
            target: args.count,
            attempt_ceiling,
            request_delay: delay,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            operator: args.operator,
            mode,
            fallback,
            checkpoint_path: Some(args.output.clone()),
        };

        Ok(Self {
            real: args.real,
            assume_yes: args.yes,
            log_file: args.log,
            output: args.output,
            layout,
            allocator_paths,
            allocator_options,
            transport,
            engine,
        })
    }
}

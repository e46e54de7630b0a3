//! # `coupon-harvest`
//!
//! Collects unique reward codes from a promotional endpoint with a bounded
//! pool of concurrent workers.
//!
//! ```bash
//! coupon-harvest --count 5                      # dry-run
//! coupon-harvest --real --deterministic --count 5 --endpoint https://...
//! ```

mod cli;
mod display;
mod logging;
mod runner;

use clap::Parser;

use crate::cli::{CliArgs, HarvestConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = HarvestConfig::try_from(args)?;

    logging::initialize(config.log_file.as_deref());
    runner::execute(config).await
}

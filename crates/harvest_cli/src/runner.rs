use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::anyhow;
use engine_logging::{engine_error, engine_info, engine_warn};
use harvest_core::RunSummary;
use harvest_engine::{
    ChannelProgressSink, HarvestEngine, HarvestError, IdentityAllocator, ReqwestTransport,
    ResultFile, ResultStore,
};
use tokio_util::sync::CancellationToken;

use crate::cli::HarvestConfig;
use crate::display::{self, RunHeader};

const CONFIRM_PROMPT: &str = "Are you absolutely sure you want to send real requests now?";

fn run_header(config: &HarvestConfig) -> RunHeader {
    RunHeader {
        target: config.engine.target,
        operator: config.engine.operator.clone(),
        deterministic: config.deterministic(),
        workers: config.engine.workers,
    }
}

/// Asks for a yes/no answer; anything but `y`/`yes` (or end of input) is no.
pub fn confirm(input: &mut impl BufRead, output: &mut impl Write, prompt: &str) -> io::Result<bool> {
    write!(output, "{prompt} [y/N]: ")?;
    output.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Runs one invocation: a dry-run, or a confirmed real harvest.
pub async fn execute(config: HarvestConfig) -> anyhow::Result<()> {
    if !config.real {
        let mut out = io::stdout().lock();
        display::write_dry_run(&mut out, &run_header(&config), config.planned_identity())?;
        return Ok(());
    }

    if !config.assume_yes {
        let confirmed = confirm(&mut io::stdin().lock(), &mut io::stdout(), CONFIRM_PROMPT)?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    harvest(config).await.map(|_| ())
}

async fn harvest(config: HarvestConfig) -> anyhow::Result<RunSummary> {
    // Fail on an unreadable result file before any request is sent.
    ResultFile::load(&config.output)?;
    let allocator = if config.deterministic() {
        let allocator =
            IdentityAllocator::open(&config.allocator_paths, &config.allocator_options)?;
        Some(Arc::new(allocator))
    } else {
        None
    };
    let store = Arc::new(
        ResultStore::new(config.layout).with_operator(config.engine.operator.clone()),
    );
    let transport = Arc::new(ReqwestTransport::new(config.transport.clone())?);

    let mut engine = HarvestEngine::new(store.clone(), transport, config.engine.clone());
    if let Some(allocator) = allocator {
        engine = engine.with_allocator(allocator);
    }

    let (tx, rx) = mpsc::channel();
    let display = display::spawn(rx, run_header(&config));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine_warn!("Interrupted; letting in-flight attempts finish");
                cancel.cancel();
            }
        })
    };

    let outcome = engine
        .run(Arc::new(ChannelProgressSink::new(tx)), cancel)
        .await;
    interrupt.abort();

    if let Err(err) = &outcome {
        engine_error!("Harvest aborted: {}", err);
        // Results already accepted are still worth keeping unless writing
        // them is what failed.
        if !matches!(err, HarvestError::Store(_)) && !store.is_empty() {
            match store.flush(&config.output) {
                Ok(report) => engine_info!("Saved {} record(s) after abort", report.appended),
                Err(flush_err) => engine_error!("Final flush failed: {}", flush_err),
            }
        }
    }

    // The sender was dropped with the run, so the display thread ends once
    // it has drained the channel.
    display
        .join()
        .map_err(|_| anyhow!("display thread panicked"))??;

    Ok(outcome?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliArgs;
    use clap::Parser;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn confirm_accepts_only_explicit_yes() {
        for (input, expected) in [
            ("y\n", true),
            ("YES\n", true),
            ("  yes  \n", true),
            ("n\n", false),
            ("\n", false),
            ("yeah\n", false),
            ("", false),
        ] {
            let mut out = Vec::new();
            let answer = confirm(&mut Cursor::new(input), &mut out, CONFIRM_PROMPT).unwrap();
            assert_eq!(answer, expected, "input {input:?}");
            assert_eq!(
                String::from_utf8(out).unwrap(),
                format!("{CONFIRM_PROMPT} [y/N]: ")
            );
        }
    }

    #[tokio::test]
    async fn corrupt_result_file_fails_before_setup() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("results.csv");
        let seed_file = temp.path().join("email_seed.txt");
        fs::write(&output, "EMAIL,CODE\na-000000@example.com,AB-11111\n").unwrap();
        let args = CliArgs::try_parse_from([
            "coupon-harvest",
            "--real",
            "--yes",
            "--deterministic",
            "--endpoint",
            "http://127.0.0.1:9/hook",
            "--output",
            output.to_str().unwrap(),
            "--seed-file",
            seed_file.to_str().unwrap(),
        ])
        .unwrap();
        let config = HarvestConfig::try_from(args).unwrap();

        let err = harvest(config).await.unwrap_err();
        assert!(err.to_string().contains("missing COUPON column"), "{err}");
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "EMAIL,CODE\na-000000@example.com,AB-11111\n"
        );
        // Nothing was set up: no seed was minted.
        assert!(!seed_file.exists());
    }
}

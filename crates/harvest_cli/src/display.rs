//! Terminal rendering of engine events.
//!
//! Accepted records scroll above a single progress line that is redrawn in
//! place with `\r`.

use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use harvest_core::{ProgressSnapshot, RunSummary, StopReason};
use harvest_engine::HarvestEvent;

const RULE_WIDTH: usize = 60;
const BAR_WIDTH: usize = 30;

/// Static facts about the run shown above the record list.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub target: u64,
    pub operator: String,
    pub deterministic: bool,
    pub workers: usize,
}

fn rule(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}

pub fn write_header(out: &mut impl Write, header: &RunHeader) -> io::Result<()> {
    writeln!(out, "Coupon harvest")?;
    writeln!(out, "Target : {} coupon(s)", header.target)?;
    let mode = if header.deterministic {
        "deterministic seed/index"
    } else {
        "fixed email"
    };
    writeln!(out, "Mode   : {mode}")?;
    writeln!(out, "Oper.  : {}", header.operator)?;
    writeln!(out, "Workers: {}", header.workers)
}

/// Formats a duration as `HH:MM:SS`.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

pub fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let percent = snapshot.percent();
    let filled = ((BAR_WIDTH as f64 * percent / 100.0) as usize).min(BAR_WIDTH);
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled));
    let eta = snapshot
        .eta
        .map(format_clock)
        .unwrap_or_else(|| "--:--:--".to_string());
    format!(
        "{percent:6.2}% |{bar}| {}/{}  attempts:{}  speed:{:.2}/s  ETA:{eta}",
        snapshot.collected,
        snapshot.target,
        snapshot.attempts,
        snapshot.speed()
    )
}

fn stop_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::TargetReached => "target reached",
        StopReason::BudgetExhausted => "attempt limit reached",
        StopReason::Cancelled => "interrupted",
    }
}

/// Renders events to `out` as they arrive.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    header: RunHeader,
    seed: Option<String>,
    bar_len: usize,
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W, header: RunHeader) -> Self {
        Self {
            out,
            header,
            seed: None,
            bar_len: 0,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn clear_bar(&mut self) -> io::Result<()> {
        if self.bar_len > 0 {
            write!(self.out, "\r{:width$}\r", "", width = self.bar_len)?;
            self.bar_len = 0;
        }
        Ok(())
    }

    pub fn handle(&mut self, event: &HarvestEvent) -> io::Result<()> {
        match event {
            HarvestEvent::Started {
                seed,
                start_index,
                attempt_ceiling,
                ..
            } => {
                write_header(&mut self.out, &self.header)?;
                if let (Some(seed), Some(index)) = (seed, start_index) {
                    writeln!(self.out, "Seed   : {seed} (next index {index})")?;
                }
                writeln!(self.out, "Limit  : {attempt_ceiling} attempts")?;
                rule(&mut self.out)?;
                writeln!(self.out, "Coupons:")?;
                rule(&mut self.out)?;
                self.seed = seed.clone();
            }
            HarvestEvent::RecordAccepted {
                seq,
                code,
                identity,
            } => {
                self.clear_bar()?;
                writeln!(self.out, "[{seq:03}] {code:8}  {identity}")?;
            }
            HarvestEvent::Progress(snapshot) => {
                let line = progress_line(snapshot);
                write!(self.out, "\r{line}")?;
                self.bar_len = line.chars().count();
            }
            HarvestEvent::Finished(summary) => {
                if self.bar_len > 0 {
                    writeln!(self.out)?;
                    self.bar_len = 0;
                }
                self.write_summary(summary)?;
            }
        }
        self.out.flush()
    }

    fn write_summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        rule(&mut self.out)?;
        if summary.collected == 0 {
            writeln!(self.out, "No coupons collected ({}).", stop_label(summary.stop_reason))?;
        } else {
            write!(
                self.out,
                "Collected {}/{} coupon(s) ({})",
                summary.collected,
                summary.target,
                stop_label(summary.stop_reason)
            )?;
            match self.seed.as_deref() {
                Some(seed) => writeln!(self.out, ". Seed: {seed}")?,
                None => writeln!(self.out, ".")?,
            }
        }
        if summary.shortfall() > 0 {
            writeln!(self.out, "Short of target by {}.", summary.shortfall())?;
        }
        writeln!(
            self.out,
            "Attempts: {}/{} (duplicates {}, misses {}, failures {}) in {}",
            summary.attempts,
            summary.attempt_ceiling,
            summary.duplicates,
            summary.misses,
            summary.failures,
            format_clock(summary.elapsed)
        )?;
        rule(&mut self.out)
    }
}

/// Drains `events` on a dedicated thread until every sender is gone.
pub fn spawn(events: Receiver<HarvestEvent>, header: RunHeader) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let mut display = ConsoleDisplay::new(io::stdout(), header);
        for event in events {
            display.handle(&event)?;
        }
        Ok(())
    })
}

/// Prints what a real run would send, without touching any state.
pub fn write_dry_run(
    out: &mut impl Write,
    header: &RunHeader,
    identity: &str,
) -> io::Result<()> {
    write_header(out, header)?;
    rule(out)?;
    for i in 1..=header.target {
        writeln!(out, "[DRY] {i:03} {identity}  ({})", header.operator)?;
    }
    rule(out)?;
    writeln!(out, "Dry run complete. No requests sent.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header() -> RunHeader {
        RunHeader {
            target: 2,
            operator: "CoopVoce".to_string(),
            deterministic: true,
            workers: 3,
        }
    }

    #[test]
    fn progress_line_caps_bar_and_formats_eta() {
        let snapshot = ProgressSnapshot::compute(1, 4, 10, Duration::from_secs(2));
        let line = progress_line(&snapshot);
        assert!(line.starts_with(" 25.00% |#######......................."), "{line}");
        assert!(line.contains("1/4  attempts:10  speed:0.50/s  ETA:00:00:06"), "{line}");

        let over = ProgressSnapshot::compute(5, 4, 10, Duration::from_secs(2));
        assert!(progress_line(&over).contains(&"#".repeat(BAR_WIDTH)));
        let none = ProgressSnapshot::compute(0, 4, 3, Duration::from_secs(1));
        assert!(progress_line(&none).ends_with("ETA:--:--:--"));
    }

    #[test]
    fn record_lines_clear_the_progress_bar() {
        let mut display = ConsoleDisplay::new(Vec::new(), header());
        display
            .handle(&HarvestEvent::Progress(ProgressSnapshot::compute(
                0,
                2,
                1,
                Duration::from_secs(1),
            )))
            .unwrap();
        display
            .handle(&HarvestEvent::RecordAccepted {
                seq: 1,
                code: "AB-12345".to_string(),
                identity: "0123abcd-000004@example.com".to_string(),
            })
            .unwrap();

        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(
            text.ends_with("\r[001] AB-12345  0123abcd-000004@example.com\n"),
            "{text:?}"
        );
    }

    #[test]
    fn summary_reports_shortfall_and_seed() {
        let mut display = ConsoleDisplay::new(Vec::new(), header());
        display
            .handle(&HarvestEvent::Started {
                seed: Some("0123abcd99990000".to_string()),
                start_index: Some(4),
                target: 2,
                attempt_ceiling: 36,
                workers: 3,
            })
            .unwrap();
        display
            .handle(&HarvestEvent::Finished(RunSummary {
                attempts: 36,
                collected: 1,
                duplicates: 2,
                misses: 30,
                failures: 3,
                target: 2,
                attempt_ceiling: 36,
                stop_reason: StopReason::BudgetExhausted,
                elapsed: Duration::from_secs(75),
            }))
            .unwrap();

        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(text.contains("Seed   : 0123abcd99990000 (next index 4)\n"), "{text}");
        assert!(
            text.contains("Collected 1/2 coupon(s) (attempt limit reached). Seed: 0123abcd99990000\n"),
            "{text}"
        );
        assert!(text.contains("Short of target by 1.\n"), "{text}");
        assert!(
            text.contains("Attempts: 36/36 (duplicates 2, misses 30, failures 3) in 00:01:15\n"),
            "{text}"
        );
    }

    #[test]
    fn dry_run_lists_planned_identities() {
        let mut out = Vec::new();
        write_dry_run(&mut out, &header(), "<deterministic identity from seed>").unwrap();
        let text = String::from_utf8(out).unwrap();
        let planned: Vec<&str> = text.lines().filter(|l| l.starts_with("[DRY]")).collect();
        assert_eq!(
            planned,
            vec![
                "[DRY] 001 <deterministic identity from seed>  (CoopVoce)",
                "[DRY] 002 <deterministic identity from seed>  (CoopVoce)",
            ]
        );
        assert!(text.ends_with("Dry run complete. No requests sent.\n"));
    }
}

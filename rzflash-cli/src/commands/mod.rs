//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod ports;
pub(crate) mod recover;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rzflash::{BatchReport, Event, NativePort, ScifSession};

use crate::{Cli, CliError, use_fancy_output, was_interrupted};

pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

fn new_transfer_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Event observer drawing one progress bar per payload transfer.
///
/// Bars are only drawn on a terminal and never in quiet mode.
pub(crate) fn transfer_progress(cli: &Cli) -> impl FnMut(&Event) + Send + 'static {
    let fancy = !cli.quiet && use_fancy_output();
    let mut bar: Option<ProgressBar> = None;
    let mut label = String::new();

    move |event| match event {
        Event::ItemStarted { index, total, name } => {
            label = format!("[{index}/{total}] {name}");
        },
        Event::TransferStarted { total } if fancy => {
            let pb = new_transfer_bar(*total as u64);
            pb.set_message(label.clone());
            bar = Some(pb);
        },
        Event::TransferProgress { sent, .. } => {
            if let Some(pb) = &bar {
                pb.set_position(*sent as u64);
            }
        },
        Event::TransferComplete(_) => {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
        },
        _ => {},
    }
}

/// Open the session with the progress observer attached.
pub(crate) fn open_session(cli: &Cli, port: &str, baud: u32) -> Result<ScifSession<NativePort>> {
    let session = ScifSession::open(port, baud)
        .with_context(|| format!("Failed to open serial port {port}"))?;
    Ok(session.with_observer(transfer_progress(cli)))
}

/// Print the batch summary.
pub(crate) fn print_batch_report(report: &BatchReport) {
    for name in &report.flashed {
        let degraded = report.degraded.contains(name);
        if degraded {
            eprintln!(
                "  {} {name} {}",
                style("!").yellow(),
                style("(completion not confirmed by the device)").dim()
            );
        } else {
            eprintln!("  {} {name}", style("✓").green());
        }
    }
    for (name, reason) in &report.skipped {
        eprintln!("  {} {name}: {}", style("-").dim(), style(reason).dim());
    }
}

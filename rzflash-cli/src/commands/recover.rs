//! Full recovery command.

use anyhow::{Context, Result};
use console::style;
use rzflash::Recovery;
use std::path::Path;

use super::{ensure_not_interrupted, open_session, print_batch_report};
use crate::config::Config;
use crate::{Cli, get_port, initial_baud};

/// Recover command implementation.
pub(crate) fn cmd_recover(
    cli: &Cli,
    config: &mut Config,
    flash_writer: Option<&Path>,
    no_speed_up: bool,
) -> Result<()> {
    let soc = config.soc_model(cli.soc.as_deref())?;
    let recovery_config = config.recovery_config(soc, flash_writer, no_speed_up)?;
    recovery_config.validate()?;

    if !cli.quiet {
        eprintln!(
            "{} {} with {}",
            style("📦").cyan(),
            soc,
            recovery_config.flash_writer.display()
        );
        if !recovery_config.firmware.is_empty() {
            eprintln!(
                "{} {} firmware image(s) queued",
                style("ℹ").blue(),
                recovery_config.firmware.len()
            );
        }
    }

    let port = get_port(cli, config)?;
    let baud = initial_baud(cli, config, soc);
    ensure_not_interrupted()?;
    if !cli.quiet {
        eprintln!("{} Using {port} at {baud} baud", style("🔌").cyan());
        eprintln!(
            "{} Power on or reset the board in SCIF download mode...",
            style("⏳").yellow()
        );
    }

    let session = open_session(cli, &port, baud)?;
    let mut recovery = Recovery::new(session, recovery_config);
    let report = recovery.run().context("Recovery failed")?;

    if !cli.quiet {
        if report.banner_seen && report.prompt_seen {
            eprintln!("{} Flash Writer running", style("✓").green());
        } else {
            eprintln!(
                "{} Flash Writer loaded, but its banner or prompt was not seen",
                style("!").yellow()
            );
        }
        eprintln!("{} Link at {} baud", style("ℹ").blue(), report.baud_rate);
        if let Some(batch) = &report.batch {
            print_batch_report(batch);
        }
        eprintln!("{} Recovery complete", style("✓").green().bold());
    }

    Ok(())
}

//! Firmware batch against a running Flash Writer.

use anyhow::{Context, Result, bail};
use console::style;
use rzflash::protocol::keywords;
use rzflash::recovery::FLASH_WRITER_PROMPT_TIMEOUT;
use rzflash::{BatchTiming, flash_firmware_list};

use super::{ensure_not_interrupted, open_session, print_batch_report};
use crate::config::Config;
use crate::{Cli, CliError, get_port, initial_baud};

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &mut Config, skip_wait: bool) -> Result<()> {
    let items = config.firmware_items()?;
    if items.is_empty() {
        return Err(CliError::Config(
            "no [[firmware]] entries to flash; add them to rzflash.toml or pass --config"
                .to_string(),
        )
        .into());
    }
    let soc = config.soc_model(cli.soc.as_deref())?;

    let port = get_port(cli, config)?;
    let baud = initial_baud(cli, config, soc);
    ensure_not_interrupted()?;
    if !cli.quiet {
        eprintln!("{} Using {port} at {baud} baud", style("🔌").cyan());
    }

    let mut session = open_session(cli, &port, baud)?;

    if !skip_wait {
        session.send_line("H")?;
        if !session.wait_for(keywords::PROMPT, FLASH_WRITER_PROMPT_TIMEOUT)? {
            bail!(
                "Flash Writer prompt not detected at {baud} baud (last output: {:?})",
                session.recent_output()
            );
        }
        session.flush_input()?;
        if !cli.quiet {
            eprintln!("{} Flash Writer responding", style("✓").green());
        }
    }

    let report = flash_firmware_list(&mut session, &items, BatchTiming::default())
        .context("Firmware batch failed")?;

    if !cli.quiet {
        print_batch_report(&report);
        eprintln!(
            "{} {} of {} image(s) flashed",
            style("✓").green().bold(),
            report.flashed.len(),
            items.len()
        );
    }

    Ok(())
}

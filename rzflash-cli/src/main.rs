//! rzflash CLI - Command-line tool for recovering Renesas RZ boards.
//!
//! ## Features
//!
//! - Full SCIF download-mode recovery (Flash Writer + firmware batch)
//! - Firmware batch against an already running Flash Writer
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI-level failures with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Bad invocation or missing interactive terminal (exit 2).
    #[error("{0}")]
    Usage(String),
    /// Missing or malformed configuration (exit 3).
    #[error("Configuration error: {0}")]
    Config(String),
    /// Cancelled by the user (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
///
/// 1 generic, 2 usage, 3 configuration, 4 device not found, 130 cancelled.
fn exit_code_for_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<rzflash::Error>() {
        Some(rzflash::Error::Config(_)) => 3,
        Some(rzflash::Error::DeviceNotFound | rzflash::Error::Serial(_)) => 4,
        Some(rzflash::Error::Interrupted) => 130,
        _ => 1,
    }
}

/// rzflash - Recover Renesas RZ boards through SCIF download mode.
///
/// Environment variables:
///   RZFLASH_PORT              - Default serial port
///   RZFLASH_BAUD              - Initial baud rate (default: 115200)
///   RZFLASH_SOC               - SoC model (rzg2l, rzg2lc, rzg2ul, rzv2l, rza3ul, rzfive, rzg3s)
///   RZFLASH_CONFIG            - Configuration file
///   RZFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "rzflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  \
    rzflash recover --config smarc-rzg2l.toml\n  \
    rzflash -p /dev/ttyUSB0 flash --config smarc-rzg2l.toml --skip-wait\n  \
    rzflash list-ports --json")]
struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "RZFLASH_PORT")]
    port: Option<String>,

    /// Initial baud rate (the boot ROM talks at 115200).
    #[arg(short, long, global = true, env = "RZFLASH_BAUD")]
    baud: Option<u32>,

    /// SoC model.
    #[arg(long, global = true, env = "RZFLASH_SOC")]
    soc: Option<String>,

    /// Configuration file (defaults to ./rzflash.toml and the global config).
    #[arg(short = 'c', long = "config", global = true, env = "RZFLASH_CONFIG")]
    config_path: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (warnings and errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Never prompt; fail when a choice is needed.
    #[arg(long, global = true, env = "RZFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full recovery: download mode, Flash Writer, speed-up, firmware.
    Recover {
        /// Flash Writer S-record image (overrides the config).
        #[arg(long)]
        flash_writer: Option<PathBuf>,

        /// Stay at the initial baud rate.
        #[arg(long)]
        no_speed_up: bool,
    },

    /// Program the firmware list through an already running Flash Writer.
    Flash {
        /// Do not probe for the Flash Writer prompt first.
        #[arg(long)]
        skip_wait: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code_for_error(&err);
            if code == 130 {
                eprintln!("{} {err}", style("✗").yellow());
            } else {
                eprintln!("{} {err:#}", style("Error:").red().bold());
            }
            ExitCode::from(code)
        },
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "rzflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    rzflash::set_interrupt_checker(was_interrupted);

    match &cli.command {
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json);
            return Ok(());
        },
        Commands::Completions { shell, install } => {
            return if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: rzflash completions bash \
                         (or use --install to auto-install)"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            };
        },
        Commands::Recover { .. } | Commands::Flash { .. } => {},
    }

    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Recover {
            flash_writer,
            no_speed_up,
        } => commands::recover::cmd_recover(&cli, &mut config, flash_writer.as_deref(), *no_speed_up),
        Commands::Flash { skip_wait } => commands::flash::cmd_flash(&cli, &mut config, *skip_wait),
        Commands::ListPorts { .. } | Commands::Completions { .. } => Ok(()),
    }
}

/// Get serial port from CLI args, config, or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

/// Initial baud rate: `--baud`, then the config, then the SoC's ROM rate.
fn initial_baud(cli: &Cli, config: &Config, soc: rzflash::SocModel) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or_else(|| soc.default_baud())
}

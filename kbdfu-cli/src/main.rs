//! kbdfu CLI - Command-line tool for flashing keyboards in DFU mode.
//!
//! ## Features
//!
//! - Flash Intel HEX images to program flash or EEPROM
//! - Write-then-verify with per-page progress
//! - Inspect HEX files without a device
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use kbdfu::MemoryRegion;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::{Config, Overrides};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors raised by the CLI itself rather than the library.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation.
    #[error("{0}")]
    Usage(String),
    /// The user stopped the operation.
    #[error("{0}")]
    Cancelled(String),
}

/// kbdfu - Flash Intel HEX images onto keyboards in DFU bootloader mode.
///
/// Environment variables:
///   KBDFU_VID       - Bootloader USB vendor ID (hex, default: 01a1)
///   KBDFU_PID       - Bootloader USB product ID (hex, default: 07c8)
///   KBDFU_ATTEMPTS  - Device discovery attempts (default: 10)
#[derive(Parser)]
#[command(name = "kbdfu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Bootloader USB vendor ID (hex).
    #[arg(long, global = true, env = "KBDFU_VID", value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// Bootloader USB product ID (hex).
    #[arg(long, global = true, env = "KBDFU_PID", value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Number of attempts to find the device.
    #[arg(long, global = true, env = "KBDFU_ATTEMPTS")]
    attempts: Option<usize>,

    /// USB transfer timeout in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Device settings given on the command line or through the environment.
    fn overrides(&self) -> Overrides {
        Overrides {
            vid: self.vid,
            pid: self.pid,
            attempts: self.attempts,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Memory region selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Region {
    /// Program flash (128-byte pages).
    Flash,
    /// EEPROM (4-byte pages).
    Eeprom,
}

impl From<Region> for MemoryRegion {
    fn from(region: Region) -> Self {
        match region {
            Region::Flash => MemoryRegion::Program,
            Region::Eeprom => MemoryRegion::Persistent,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Write and verify an Intel HEX image in program flash.
    Flash {
        /// Path to the Intel HEX file.
        file: PathBuf,
    },

    /// Write and verify an Intel HEX image in EEPROM.
    Eeprom {
        /// Path to the Intel HEX file.
        file: PathBuf,
    },

    /// Show the layout of an Intel HEX image.
    Info {
        /// Path to the Intel HEX file.
        file: PathBuf,

        /// Region whose page size is used for padding.
        #[arg(long, value_enum, default_value = "flash")]
        region: Region,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a hexadecimal USB identifier (supports 0x prefix).
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| format!("Invalid hex ID: {e}"))
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            process::exit(code);
        },
    };

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "kbdfu v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        report_error(&err);
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
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
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    kbdfu::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Flash { file } => {
            let config = load_config(cli);
            commands::flash::cmd_flash(cli, &config, file, MemoryRegion::Program)
        },
        Commands::Eeprom { file } => {
            let config = load_config(cli);
            commands::flash::cmd_flash(cli, &config, file, MemoryRegion::Persistent)
        },
        Commands::Info { file, region, json } => {
            commands::info::cmd_info(file, (*region).into(), *json)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn load_config(cli: &Cli) -> Config {
    if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    }
}

/// Print an error and its causes to stderr.
fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err}", style("Error:").red().bold());
    for cause in err.chain().skip(1) {
        eprintln!("  {} {cause}", style("Caused by:").dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from(["kbdfu", "flash", "firmware.hex"]).unwrap();
        match cli.command {
            Commands::Flash { file } => assert_eq!(file, PathBuf::from("firmware.hex")),
            _ => panic!("Expected Flash command"),
        }
    }

    #[test]
    fn test_cli_parse_eeprom() {
        let cli = Cli::try_parse_from(["kbdfu", "eeprom", "settings.hex"]).unwrap();
        match cli.command {
            Commands::Eeprom { file } => assert_eq!(file, PathBuf::from("settings.hex")),
            _ => panic!("Expected Eeprom command"),
        }
    }

    #[test]
    fn test_cli_parse_flash_requires_file() {
        assert!(Cli::try_parse_from(["kbdfu", "flash"]).is_err());
    }

    #[test]
    fn test_cli_parse_info_defaults() {
        let cli = Cli::try_parse_from(["kbdfu", "info", "fw.hex"]).unwrap();
        match cli.command {
            Commands::Info { region, json, .. } => {
                assert_eq!(region, Region::Flash);
                assert!(!json);
            },
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_cli_parse_info_eeprom_json() {
        let cli =
            Cli::try_parse_from(["kbdfu", "info", "fw.hex", "--region", "eeprom", "--json"])
                .unwrap();
        match cli.command {
            Commands::Info { region, json, .. } => {
                assert_eq!(MemoryRegion::from(region), MemoryRegion::Persistent);
                assert!(json);
            },
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["kbdfu", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "kbdfu",
            "-vv",
            "--vid",
            "0x1234",
            "--pid",
            "abcd",
            "--attempts",
            "3",
            "--timeout-ms",
            "250",
            "flash",
            "fw.hex",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.overrides(),
            Overrides {
                vid: Some(0x1234),
                pid: Some(0xABCD),
                attempts: Some(3),
                timeout_ms: Some(250),
            }
        );
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["kbdfu", "flash", "fw.hex", "-q", "--attempts", "1"])
            .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.attempts, Some(1));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["kbdfu"]).is_err());
    }

    #[test]
    fn test_cli_invalid_region() {
        assert!(Cli::try_parse_from(["kbdfu", "info", "fw.hex", "--region", "sram"]).is_err());
    }

    #[test]
    fn test_parse_hex_u16_with_prefix() {
        assert_eq!(parse_hex_u16("0x01A1"), Ok(0x01A1));
        assert_eq!(parse_hex_u16("0X07c8"), Ok(0x07C8));
    }

    #[test]
    fn test_parse_hex_u16_without_prefix() {
        assert_eq!(parse_hex_u16("07c8"), Ok(0x07C8));
        assert_eq!(parse_hex_u16(" 1 "), Ok(1));
    }

    #[test]
    fn test_parse_hex_u16_invalid() {
        assert!(parse_hex_u16("xyz").is_err());
        assert!(parse_hex_u16("").is_err());
    }

    #[test]
    fn test_parse_hex_u16_overflow() {
        assert!(parse_hex_u16("0x10000").is_err());
    }

    #[test]
    fn test_cli_error_display() {
        let err = CliError::Usage("bad input".into());
        assert_eq!(err.to_string(), "bad input");
    }
}

//! Flash and EEPROM command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use kbdfu::{MemoryRegion, PagedFlasher, Phase, ProgramImage};
use log::debug;
use std::path::Path;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Progress bar for one pass over the image.
fn phase_bar(cli: &Cli, phase: Phase, pages: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(pages as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(match phase {
        Phase::Write => "Writing",
        Phase::Verify => "Verifying",
    });
    pb
}

/// Write, verify and reset: `kbdfu flash <FILE>` / `kbdfu eeprom <FILE>`.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    file: &Path,
    region: MemoryRegion,
) -> Result<()> {
    let overrides = cli.overrides();
    let usb = config.usb_config(&overrides);
    let discovery = config.discovery_config(&overrides);
    if discovery.attempts == 0 {
        return Err(CliError::Usage("--attempts must be at least 1".to_string()).into());
    }

    if !cli.quiet {
        eprintln!(
            "{} Loading {}",
            style("📦").cyan(),
            file.display()
        );
    }

    let image = ProgramImage::from_file(file, region)
        .with_context(|| format!("Failed to load image from {}", file.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} pages ({} bytes) for {} at 0x{:04X}",
            style("ℹ").blue(),
            image.page_count(),
            image.payload_len(),
            region,
            image.start_address()
        );
        eprintln!(
            "{} Waiting for {:04x}:{:04x}...",
            style("⏳").yellow(),
            usb.vid,
            usb.pid
        );
    }

    let mut flasher = PagedFlasher::open(&usb, &discovery, region).map_err(cancel_on_interrupt)?;
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }

    let write_bar = phase_bar(cli, Phase::Write, image.page_count());
    let mut verify_bar: Option<ProgressBar> = None;

    let result = flasher.run(&image, |phase, done, total| {
        debug!("{phase}: page {done}/{total}");
        match phase {
            Phase::Write => {
                write_bar.set_position(done as u64);
                if done == total {
                    write_bar.finish();
                }
            },
            Phase::Verify => {
                let bar = verify_bar.get_or_insert_with(|| phase_bar(cli, Phase::Verify, total));
                bar.set_position(done as u64);
                if done == total {
                    bar.finish();
                }
            },
        }
    });

    if let Err(err) = result {
        write_bar.abandon();
        if let Some(bar) = &verify_bar {
            bar.abandon();
        }
        let state = flasher.state();
        return Err(cancel_on_interrupt(err)).with_context(|| format!("Aborted while {state}"));
    }

    if !cli.quiet {
        eprintln!(
            "\n{} {} written and verified, device reset",
            style("🎉").green().bold(),
            file.display()
        );
    }

    Ok(())
}

/// Report a library interruption as a user cancellation.
fn cancel_on_interrupt(err: kbdfu::Error) -> anyhow::Error {
    match err {
        kbdfu::Error::Interrupted => CliError::Cancelled("Interrupted by user".to_string()).into(),
        other => other.into(),
    }
}

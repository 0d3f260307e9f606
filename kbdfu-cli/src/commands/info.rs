//! Image info command implementation.

use {
    anyhow::{Context, Result},
    console::style,
    kbdfu::{MemoryRegion, ProgramImage},
    std::path::Path,
};

/// Info command implementation.
pub(crate) fn cmd_info(file: &Path, region: MemoryRegion, json: bool) -> Result<()> {
    let image = ProgramImage::from_file(file, region)
        .with_context(|| format!("Failed to load image from {}", file.display()))?;
    let summary = image.summary();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "file": file.display().to_string(),
                "region": region,
                "image": summary,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "\n{}",
        style(format!("Image: {}", file.display()))
            .bold()
            .underlined()
    );
    eprintln!("  {:<14} {}", style("Region:").dim(), region);
    eprintln!(
        "  {:<14} 0x{:04X} - 0x{:04X}",
        style("Range:").dim(),
        summary.start_address,
        summary.end_address
    );
    eprintln!(
        "  {:<14} {} bytes",
        style("Data:").dim(),
        summary.payload_len
    );
    eprintln!(
        "  {:<14} {} bytes ({} x {}-byte pages)",
        style("Padded:").dim(),
        summary.padded_len,
        summary.page_count,
        summary.page_size
    );

    Ok(())
}

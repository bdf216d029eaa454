use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::OutputRecord;

pub mod formatters;

pub use formatters::*;

fn render(records: &[OutputRecord], format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => format_as_json(records)?,
        OutputFormat::Jsonl => format_as_jsonl(records)?,
        OutputFormat::Text => format_as_text(records),
    })
}

/// Save output records to file
pub fn save_to_file(records: &[OutputRecord], path: &Path, format: &OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, render(records, format)?)?;
    Ok(())
}

/// Print output records to console
pub fn print_to_console(records: &[OutputRecord], format: &OutputFormat) -> Result<()> {
    println!("{}", render(records, format)?);
    Ok(())
}

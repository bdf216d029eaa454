use anyhow::Result;
use std::fmt::Write;

use crate::pipeline::OutputRecord;

/// Format records as a pretty-printed JSON array
pub fn format_as_json(records: &[OutputRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Format records as one JSON object per line
pub fn format_as_jsonl(records: &[OutputRecord]) -> Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Format records as a human-readable report
pub fn format_as_text(records: &[OutputRecord]) -> String {
    let mut output = String::new();

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let _ = writeln!(output, "Reel: {}", record.url);

        if !record.success {
            let error = record.error.as_deref().unwrap_or("unknown error");
            let _ = writeln!(output, "  Status: failed ({})", error);
            continue;
        }

        if let Some(source) = &record.source {
            let _ = writeln!(output, "  Source: {}", source);
        }
        if !record.author.username.is_empty() {
            if record.author.full_name.is_empty() {
                let _ = writeln!(output, "  Author: @{}", record.author.username);
            } else {
                let _ = writeln!(
                    output,
                    "  Author: {} (@{})",
                    record.author.full_name, record.author.username
                );
            }
        }
        let _ = writeln!(
            output,
            "  Views: {}  Likes: {}  Comments: {}",
            record.view_count, record.like_count, record.comment_count
        );
        if !record.caption.is_empty() {
            let _ = writeln!(output, "  Caption: {}", record.caption);
        }
        if !record.hashtags.is_empty() {
            let _ = writeln!(output, "  Hashtags: {}", record.hashtags.join(" "));
        }
        if !record.video_url.is_empty() {
            let _ = writeln!(output, "  Video: {}", record.video_url);
        }
        if let Some(error) = &record.transcription_error {
            let _ = writeln!(output, "  Transcript: unavailable ({})", error);
        } else if !record.transcript.is_empty() {
            let _ = writeln!(output, "  Transcript: {}", record.transcript);
        }
    }

    output.trim_end().to_string()
}

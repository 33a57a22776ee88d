//! CSV export of call records.

use std::path::Path;

use super::tracker::CallRecord;

pub const CSV_HEADERS: [&str; 6] = [
    "file_name",
    "model",
    "prompt_tokens",
    "completion_tokens",
    "total_tokens",
    "cost",
];

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render records as CSV text, optionally followed by a blank line and
/// `summary_comment` (e.g. [`UsageTracker::csv_footer_comment`](super::UsageTracker::csv_footer_comment)).
pub fn render_usage_csv(records: &[CallRecord], summary_comment: Option<&str>) -> String {
    let mut out = CSV_HEADERS.join(",");
    out.push_str("\r\n");

    for record in records {
        let row = [
            record.file_name.clone(),
            record.model.clone(),
            record.prompt_tokens.to_string(),
            record.completion_tokens.to_string(),
            record.total_tokens.to_string(),
            format!("{:.6}", record.cost),
        ];
        out.push_str(&render_row(&row));
        out.push_str("\r\n");
    }

    if let Some(comment) = summary_comment {
        out.push('\n');
        out.push_str(comment);
        out.push('\n');
    }
    out
}

/// Write the usage CSV to `path`, replacing any previous file.
pub async fn write_usage_csv(
    path: &Path,
    records: &[CallRecord],
    summary_comment: Option<&str>,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, render_usage_csv(records, summary_comment)).await?;
    tracing::info!("Wrote {} usage record(s) to {}", records.len(), path.display());
    Ok(())
}

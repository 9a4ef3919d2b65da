//! Handling of unanticipated failures.
//!
//! An incident is written to `stacktrace.log`, the stop sentinel is created so
//! no further run starts until an operator runs `resume`, and a plain-text
//! notice is posted if the sink still works.

use std::fs::OpenOptions;
use std::io::Write;

use chrono::Utc;

use crate::config::AppConfig;
use crate::publish::PublicationSink;
use crate::Result;

use super::guard;

/// Persist the incident and halt future runs.
///
/// `details` is the full error report (cause chain and backtrace).
pub fn record(config: &AppConfig, summary: &str, details: &str) -> Result<()> {
    let path = config.stacktrace_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(
        file,
        "==== {} ====\n{}\n\n{}\n",
        Utc::now().to_rfc3339(),
        summary,
        details
    )?;

    guard::create_stop_sentinel(config)?;
    tracing::error!(
        "Run halted: {} (details in {})",
        summary,
        path.display()
    );
    Ok(())
}

/// Best-effort public notice; a failure here is only logged
pub async fn announce(sink: &dyn PublicationSink, summary: &str) {
    let text = format!("feedrelay has stopped after an unexpected error: {}", summary);
    if let Err(e) = sink.post_plain_text(&text).await {
        tracing::warn!("Failed to announce incident: {}", e);
    }
}

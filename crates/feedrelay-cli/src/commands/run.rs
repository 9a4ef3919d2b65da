use anyhow::{anyhow, Result};

use feedrelay_core::publish::PublicationSink;
use feedrelay_core::scan::{self, incident, Admission, RunContext, RunOptions, RunSummary, ScanOutcome};
use feedrelay_core::{AppConfig, Error};

pub async fn run(config: AppConfig, options: RunOptions) -> Result<()> {
    let _lock = match scan::admit(&config)? {
        Admission::Granted(lock) => lock,
        Admission::Stopped => {
            println!(
                "Halted by {}. Inspect {} and run `feedrelay resume`.",
                config.stop_path().display(),
                config.stacktrace_path().display()
            );
            return Ok(());
        }
        Admission::Busy => {
            println!("Another run is in progress.");
            return Ok(());
        }
    };

    relay(&config, options).await
}

async fn relay(config: &AppConfig, options: RunOptions) -> Result<()> {
    let ctx = match RunContext::open(config.clone()).await {
        Ok(ctx) => ctx,
        Err(e) => {
            let err = anyhow::Error::from(e).context("Failed to start run");
            halt(config, &err, None).await;
            return Err(err);
        }
    };

    drive(&ctx, options).await
}

/// Execute the run, turning any failure other than a timeout into an incident.
/// The context is closed in every case.
async fn drive(ctx: &RunContext, options: RunOptions) -> Result<()> {
    let config = ctx.config();

    let outcome = match scan::execute(ctx, options).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        // Logged by the runner; the next run starts over
        Err(Error::Timeout(secs)) => Err(anyhow!("Run aborted after {} seconds", secs)),
        Err(e) => {
            let err = anyhow::Error::from(e);
            halt(config, &err, Some(ctx.sink())).await;
            Err(err)
        }
    };

    ctx.close().await;
    outcome
}

async fn halt(config: &AppConfig, err: &anyhow::Error, sink: Option<&dyn PublicationSink>) {
    let summary = format!("{:#}", err);

    if let Err(e) = incident::record(config, &summary, &format!("{:?}", err)) {
        tracing::error!("Failed to record incident: {}", e);
    }

    if let Some(sink) = sink {
        incident::announce(sink, &summary).await;
    }
}

fn print_summary(summary: &RunSummary) {
    for feed in &summary.feeds {
        let status = match &feed.outcome {
            ScanOutcome::Skipped => "skipped (fetch failed)".to_string(),
            ScanOutcome::Unchanged => "unchanged".to_string(),
            ScanOutcome::Advanced(report) if report.halted => format!(
                "{} published, halted after a failed post",
                report.published
            ),
            ScanOutcome::Advanced(report) => format!(
                "{} published ({} evaluated, {} already posted, {} without a link)",
                report.published, report.evaluated, report.duplicates, report.unlinked
            ),
        };
        println!("  {} - {}", feed.url, status);
    }

    println!(
        "\nRun complete. {} entries published from {} feeds.",
        summary.published(),
        summary.feeds.len()
    );

    if let Some(pruned) = summary.pruned {
        println!("Pruned {} ledger records.", pruned);
    }
}

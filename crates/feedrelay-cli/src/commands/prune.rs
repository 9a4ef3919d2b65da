use anyhow::Result;
use chrono::Duration;

use feedrelay_core::scan;
use feedrelay_core::storage::{Database, DedupLedger};
use feedrelay_core::AppConfig;

pub async fn run(config: &AppConfig) -> Result<()> {
    let Some(_lock) = scan::try_lock(config)? else {
        println!("A run is in progress; try again later.");
        return Ok(());
    };

    let days = config.ledger.retention_days;
    println!("Pruning posted entries older than {} days...", days);

    let db = Database::new(config).await?;
    let result = DedupLedger::new(&db)
        .prune(Duration::days(i64::from(days)))
        .await;
    db.close().await;

    let deleted = result?;
    if deleted > 0 {
        println!("Deleted {} records.", deleted);
    } else {
        println!("Nothing to prune.");
    }

    Ok(())
}

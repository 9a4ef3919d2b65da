use anyhow::Result;

use feedrelay_core::scan::{self, guard};
use feedrelay_core::storage::{CheckpointStore, Database, DedupLedger};
use feedrelay_core::AppConfig;

pub async fn run(config: &AppConfig) -> Result<()> {
    let store = CheckpointStore::load(&config.checkpoint_path())?;

    if store.checkpoints().is_empty() {
        println!("No feeds checked yet.");
    } else {
        println!("Checkpoints ({}):\n", store.checkpoints().len());
        for checkpoint in store.checkpoints() {
            println!("  {}", checkpoint.href);
            println!("    Updated: {}", checkpoint.updated);
        }
        println!();
    }

    match ledger_size(config).await? {
        Some(posted) => println!("Posted entries in ledger: {}", posted),
        None => println!("Posted entries in ledger: none yet (no ledger database)"),
    }

    if guard::is_stopped(config) {
        println!("State: HALTED ({} present)", config.stop_path().display());
    } else if scan::try_lock(config)?.is_none() {
        println!("State: running");
    } else {
        println!("State: idle");
    }

    Ok(())
}

/// `None` when no run has created the ledger yet; status never creates it
async fn ledger_size(config: &AppConfig) -> Result<Option<u64>> {
    if !config.database_path().exists() {
        return Ok(None);
    }

    let db = Database::new(config).await?;
    let posted = DedupLedger::new(&db).count().await;
    db.close().await;
    Ok(Some(posted?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.general.data_dir = dir.join("data");
        config.general.log_dir = dir.join("logs");
        config
    }

    #[tokio::test]
    async fn test_status_does_not_create_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        assert_eq!(ledger_size(&config).await.unwrap(), None);
        run(&config).await.unwrap();

        assert!(!config.database_path().exists());
    }

    #[tokio::test]
    async fn test_status_counts_an_existing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let db = Database::new(&config).await.unwrap();
        DedupLedger::new(&db)
            .record("https://news.example.com/1", chrono::Utc::now())
            .await
            .unwrap();
        db.close().await;

        assert_eq!(ledger_size(&config).await.unwrap(), Some(1));
    }
}

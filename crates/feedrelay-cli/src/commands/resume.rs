use anyhow::Result;

use feedrelay_core::scan::guard;
use feedrelay_core::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    if guard::clear_stop_sentinel(config)? {
        println!("Removed {}. Runs are enabled again.", config.stop_path().display());
    } else {
        println!("Not halted; nothing to do.");
    }

    Ok(())
}

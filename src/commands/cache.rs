//! `aidroid cache`

use crate::cli::CacheCommand;
use crate::commands::open_cache;
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;

pub fn handle_cache(config: &Config, command: CacheCommand) -> Result<()> {
    let cache = open_cache(config)?;

    match command {
        CacheCommand::Info => {
            let info = cache.info()?;
            let status = if config.cache.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            println!("Response cache: {}", status);
            println!("Directory:      {}", info.dir.display());
            println!("Entries:        {}", info.file_count);
            println!("Size:           {} bytes", info.total_bytes);
            println!("TTL:            {}s", config.cache.ttl_seconds);
        }
        CacheCommand::Clear => {
            let removed = cache.clear()?;
            println!("{}", format!("Removed {} cached responses", removed).green());
        }
    }

    Ok(())
}

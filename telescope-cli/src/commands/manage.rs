//! Cache maintenance commands.

use telescope::cache::CacheError;
use telescope::codec::FormatPolicy;
use telescope::config::format_size;
use telescope::shared::SharedCache;

use crate::error::CliError;

/// Remove one entry.
pub async fn delete(cache: &SharedCache, url: &str, tag: Option<&str>) -> Result<(), CliError> {
    cache.delete(url, tag).await;
    match tag {
        Some(tag) => println!("Deleted variant '{}' of {}", tag, url),
        None => println!("Deleted {}", url),
    }
    Ok(())
}

/// Remove every entry.
pub async fn clear(cache: &SharedCache) -> Result<(), CliError> {
    let before = cache.disk_entry_count().await.unwrap_or(0);
    println!("Clearing cache at: {}", cache.config().root_dir.display());
    cache.delete_all().await?;
    println!("Deleted {} entries", before);
    Ok(())
}

/// Refetch one image.
pub async fn refresh(cache: &SharedCache, url: &str) -> Result<(), CliError> {
    cache.refresh(url).await?;
    println!("Refreshed {}", url);
    Ok(())
}

/// Refetch every indexed image.
pub async fn refresh_all(cache: &SharedCache) -> Result<(), CliError> {
    let total = cache.indexed_count();
    println!("Refreshing {} images...", total);

    match cache.refresh_all().await {
        Ok(()) => {
            println!("All {} images refreshed", total);
            Ok(())
        }
        Err(CacheError::Refresh { failures }) => {
            println!("{} of {} images refreshed", total - failures.len(), total);
            Err(CliError::Cache(CacheError::Refresh { failures }))
        }
        Err(e) => Err(e.into()),
    }
}

/// Print location, settings and entry counts.
pub async fn stats(cache: &SharedCache) -> Result<(), CliError> {
    let config = cache.config();
    let disk_entries = cache.disk_entry_count().await?;

    println!("Cache: {}", config.root_dir.display());
    println!("  Index:        {}", config.index_file().display());
    println!("  Indexed:      {}", cache.indexed_count());
    println!("  Disk entries: {}", disk_entries);
    println!("  Memory limit: {}", format_size(config.memory_capacity_bytes));
    if config.staleness_enabled() {
        println!("  Refresh TTL:  {}s", config.ttl.as_secs());
    } else {
        println!("  Refresh TTL:  disabled");
    }
    println!("  Format:       {}", describe_policy(config.format_policy));
    println!(
        "  Coalescing:   {}",
        if config.coalesce_fetches { "on" } else { "off" }
    );
    Ok(())
}

fn describe_policy(policy: FormatPolicy) -> String {
    match policy {
        FormatPolicy::Png => "png".to_string(),
        FormatPolicy::PngIfTransparent { quality } => {
            format!("png if transparent, else jpeg at {:.0}%", quality * 100.0)
        }
        FormatPolicy::Jpeg { quality } => format!("jpeg at {:.0}%", quality * 100.0),
    }
}

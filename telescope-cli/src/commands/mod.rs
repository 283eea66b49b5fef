//! CLI command implementations.
//!
//! - [`image`] - Reading images out of the cache (get, resize)
//! - [`manage`] - Cache maintenance (delete, clear, refresh, refresh-all, stats)

pub mod image;
pub mod manage;

use std::path::PathBuf;

use clap::Subcommand;
use telescope::shared::SharedCache;

use crate::error::CliError;

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch an image through the cache
    Get {
        /// Image URL
        url: String,
        /// Read a stored variant instead of the original
        #[arg(long)]
        tag: Option<String>,
        /// Write the image to this file (.png, .jpg or .jpeg)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Produce a resized copy, cached as a variant tagged "<width>x<height>"
    Resize {
        /// Image URL
        url: String,
        /// Target width in pixels
        width: u32,
        /// Target height in pixels
        height: u32,
        /// Write the image to this file (.png, .jpg or .jpeg)
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Remove one image or variant from the cache
    Delete {
        /// Image URL
        url: String,
        /// Remove this variant instead of the original
        #[arg(long)]
        tag: Option<String>,
    },
    /// Remove every cached image
    Clear,
    /// Discard and refetch one image
    Refresh {
        /// Image URL
        url: String,
    },
    /// Refetch every image recorded in the index
    RefreshAll,
    /// Show cache location, settings and contents
    Stats,
}

/// Run `command` against the opened cache.
pub async fn execute(cache: &SharedCache, command: Command) -> Result<(), CliError> {
    match command {
        Command::Get { url, tag, output } => image::get(cache, &url, tag.as_deref(), output).await,
        Command::Resize {
            url,
            width,
            height,
            output,
        } => image::resize(cache, &url, width, height, &output).await,
        Command::Delete { url, tag } => manage::delete(cache, &url, tag.as_deref()).await,
        Command::Clear => manage::clear(cache).await,
        Command::Refresh { url } => manage::refresh(cache, &url).await,
        Command::RefreshAll => manage::refresh_all(cache).await,
        Command::Stats => manage::stats(cache).await,
    }
}

//! Image retrieval commands.

use std::path::{Path, PathBuf};

use telescope::codec::{CachedImage, EncodeFormat, ImageCodec, ImageCrateCodec, DEFAULT_JPEG_QUALITY};
use telescope::shared::SharedCache;

use crate::error::CliError;

/// Print (and optionally save) the image for `url`.
pub async fn get(
    cache: &SharedCache,
    url: &str,
    tag: Option<&str>,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let image = match tag {
        Some(tag) => cache.get_with_tag(url, tag).await?,
        None => cache.get(url).await?,
    };

    println!("{}", url);
    println!("  Size: {}x{}", image.width(), image.height());
    println!("  Color: {:?}", image.color());

    if let Some(path) = output {
        write_image(&image, &path)?;
        println!("  Saved: {}", path.display());
    }
    Ok(())
}

/// Resize the image for `url` and save it.
pub async fn resize(
    cache: &SharedCache,
    url: &str,
    width: u32,
    height: u32,
    output: &Path,
) -> Result<(), CliError> {
    let image = cache.get_resized(url, width, height).await?;
    write_image(&image, output)?;
    println!(
        "Saved {}x{} copy of {} to {}",
        image.width(),
        image.height(),
        url,
        output.display()
    );
    Ok(())
}

/// Output format from the file extension. Anything not JPEG is written as PNG.
fn format_for(path: &Path) -> EncodeFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => EncodeFormat::Jpeg,
        _ => EncodeFormat::Png,
    }
}

fn write_image(image: &CachedImage, path: &Path) -> Result<(), CliError> {
    let bytes = ImageCrateCodec::new()
        .encode(image, format_for(path), DEFAULT_JPEG_QUALITY)
        .map_err(|e| CliError::Encode(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|error| CliError::FileWrite {
        path: path.to_path_buf(),
        error,
    })
}

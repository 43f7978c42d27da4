//! Thumbnail generation
//!
//! Writes a downscaled JPEG next to every decodable image of an object tree
//! as `<file name>.thumb.jpg`. Files that are not images, or images that
//! fail to decode, are skipped with a warning; only I/O failures abort.

use async_trait::async_trait;
use image::{DynamicImage, ImageError, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use wos_common::{Error, Result};

pub const THUMBNAIL_SUFFIX: &str = ".thumb.jpg";

/// MIME types the decoder is built to handle
const DECODABLE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Generate thumbnails for every image under `dir`; returns how many
    async fn process(&self, dir: &Path) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct ImageThumbnailer {
    max_edge: u32,
}

impl ImageThumbnailer {
    pub fn new(max_edge: u32) -> Self {
        Self {
            max_edge: max_edge.max(1),
        }
    }

    pub fn generate(&self, dir: &Path) -> Result<usize> {
        let mut images = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::Io(std::io::Error::other(format!("cannot walk {}: {}", dir.display(), e)))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_thumbnail = entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(THUMBNAIL_SUFFIX))
                .unwrap_or(false);
            if !is_thumbnail {
                images.push(entry.into_path());
            }
        }

        let mut written = 0;
        for path in images {
            let Some(mime) = infer::get_from_path(&path)?.map(|kind| kind.mime_type()) else {
                continue;
            };
            if !DECODABLE_TYPES.contains(&mime) {
                continue;
            }
            if self.thumbnail_one(&path)? {
                written += 1;
            }
        }

        debug!(dir = %dir.display(), written, "Generated thumbnails");
        Ok(written)
    }

    fn thumbnail_one(&self, path: &Path) -> Result<bool> {
        let bytes = std::fs::read(path)?;
        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping undecodable image");
                return Ok(false);
            }
        };

        let scaled = if decoded.width() > self.max_edge || decoded.height() > self.max_edge {
            decoded.thumbnail(self.max_edge, self.max_edge)
        } else {
            decoded
        };

        let target = thumbnail_path(path);
        DynamicImage::ImageRgb8(scaled.to_rgb8())
            .save_with_format(&target, ImageFormat::Jpeg)
            .map_err(|e| match e {
                ImageError::IoError(io) => Error::Io(io),
                other => Error::Internal(format!(
                    "cannot encode thumbnail {}: {}",
                    target.display(),
                    other
                )),
            })?;
        Ok(true)
    }
}

#[async_trait]
impl ThumbnailGenerator for ImageThumbnailer {
    async fn process(&self, dir: &Path) -> Result<usize> {
        let generator = self.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || generator.generate(&dir))
            .await
            .map_err(|e| Error::Internal(format!("thumbnail task failed: {}", e)))?
    }
}

/// `photo.png` becomes `photo.png.thumb.jpg` in the same directory
pub fn thumbnail_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(THUMBNAIL_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_thumbnail_path() {
        assert_eq!(
            thumbnail_path(Path::new("/a/b/photo.png")),
            PathBuf::from("/a/b/photo.png.thumb.jpg")
        );
    }

    #[test]
    fn test_generates_bounded_thumbnails_for_images_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("media")).unwrap();
        write_png(&dir.path().join("media/wide.png"), 400, 100);
        std::fs::write(dir.path().join("index.json"), b"{}").unwrap();

        let thumbnailer = ImageThumbnailer::new(64);
        assert_eq!(thumbnailer.generate(dir.path()).unwrap(), 1);

        let thumb = image::open(dir.path().join("media/wide.png.thumb.jpg")).unwrap();
        assert!(thumb.width() <= 64 && thumb.height() <= 64);
        assert_eq!(thumb.width(), 64);
        assert!(!dir.path().join("index.json.thumb.jpg").exists());

        // Re-running does not thumbnail thumbnails
        assert_eq!(thumbnailer.generate(dir.path()).unwrap(), 1);
        assert!(!dir.path().join("media/wide.png.thumb.jpg.thumb.jpg").exists());
    }

    #[test]
    fn test_small_images_keep_their_size() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("small.png"), 10, 20);

        ImageThumbnailer::new(256).generate(dir.path()).unwrap();
        let thumb = image::open(dir.path().join("small.png.thumb.jpg")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (10, 20));
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let dir = TempDir::new().unwrap();
        // PNG signature followed by garbage
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0xFFu8; 64]);
        std::fs::write(dir.path().join("broken.png"), bytes).unwrap();

        assert_eq!(ImageThumbnailer::new(64).generate(dir.path()).unwrap(), 0);
        assert!(!dir.path().join("broken.png.thumb.jpg").exists());
    }
}

//! Pre-upload file preparation: read, sniff content type, shrink big images.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::config::CompressionConfig;

/// A file ready to be handed to the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Image types the compressor can decode.
pub fn is_compressible(content_type: &str) -> bool {
    matches!(content_type, "image/jpeg" | "image/png")
}

/// Downscale to `max_width` (keeping aspect ratio) and re-encode as JPEG.
pub fn compress_image(bytes: &[u8], config: &CompressionConfig) -> image::ImageResult<Vec<u8>> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width() > config.max_width {
        let height = (u64::from(img.height()) * u64::from(config.max_width)
            / u64::from(img.width()))
        .max(1);
        let height = u32::try_from(height).unwrap_or(u32::MAX);
        img = img.resize_exact(config.max_width, height, FilterType::Triangle);
    }
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, config.quality.clamp(1, 100));
        encoder.encode_image(&img.to_rgb8())?;
    }
    Ok(out.into_inner())
}

/// Read a local attachment and compress it when it is a large image.
///
/// Compression failures are not fatal: the original bytes are uploaded.
pub async fn prepare_file(path: &Path, config: &CompressionConfig) -> Result<PreparedFile, PrepareError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| PrepareError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let prepared = PreparedFile {
        file_name,
        content_type,
        bytes,
    };
    if prepared.bytes.len() as u64 <= config.threshold_bytes
        || !is_compressible(&prepared.content_type)
    {
        return Ok(prepared);
    }

    let original_len = prepared.bytes.len();
    let cfg = config.clone();
    let source = prepared.bytes.clone();
    let compressed = tokio::task::spawn_blocking(move || compress_image(&source, &cfg)).await;
    match compressed {
        Ok(Ok(bytes)) => {
            tracing::debug!(
                file = %prepared.file_name,
                from = original_len,
                to = bytes.len(),
                "compressed image"
            );
            Ok(PreparedFile {
                file_name: jpeg_name(&prepared.file_name),
                content_type: "image/jpeg".to_string(),
                bytes,
            })
        }
        Ok(Err(e)) => {
            tracing::warn!(file = %prepared.file_name, error = %e, "image compression failed, uploading original");
            Ok(prepared)
        }
        Err(e) => {
            tracing::warn!(file = %prepared.file_name, error = %e, "compression task failed, uploading original");
            Ok(prepared)
        }
    }
}

fn jpeg_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    format!("{}.jpg", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn wide_image_is_scaled_to_max_width() {
        let cfg = CompressionConfig {
            threshold_bytes: 0,
            max_width: 100,
            quality: 80,
        };
        let out = compress_image(&png(400, 200), &cfg).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn narrow_image_keeps_size() {
        let cfg = CompressionConfig::default();
        let out = compress_image(&png(64, 32), &cfg).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(compress_image(b"not an image", &CompressionConfig::default()).is_err());
    }

    #[tokio::test]
    async fn small_files_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bill.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let prepared = prepare_file(&path, &CompressionConfig::default()).await.unwrap();
        assert_eq!(prepared.file_name, "bill.pdf");
        assert_eq!(prepared.content_type, "application/pdf");
        assert_eq!(prepared.bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn large_png_becomes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warranty.png");
        std::fs::write(&path, png(300, 100)).unwrap();
        let cfg = CompressionConfig {
            threshold_bytes: 10,
            max_width: 150,
            quality: 80,
        };
        let prepared = prepare_file(&path, &cfg).await.unwrap();
        assert_eq!(prepared.file_name, "warranty.jpg");
        assert_eq!(prepared.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn corrupt_large_image_uploads_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        let cfg = CompressionConfig {
            threshold_bytes: 10,
            ..Default::default()
        };
        let prepared = prepare_file(&path, &cfg).await.unwrap();
        assert_eq!(prepared.file_name, "broken.jpg");
        assert_eq!(prepared.bytes.len(), 64);
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let err = prepare_file(Path::new("/nonexistent/bill.pdf"), &CompressionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::Read { .. }));
    }
}

//! Replacement image references and their decode errors.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageError, ImageReader};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ReplacementImageError
// ---------------------------------------------------------------------------

/// A replacement image could not be turned into pixels.
///
/// Reported per record: the preview substitutes a placeholder, the save
/// applies the configured [`UnreadableImagePolicy`](crate::config::UnreadableImagePolicy).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplacementImageError {
    /// The file could not be read, or its contents are corrupt.
    #[error("cannot read replacement image {image}: {reason}")]
    Unreadable { image: String, reason: String },

    /// The data was read but the format is not one we decode.
    #[error("unsupported replacement image {image}: {reason}")]
    Unsupported { image: String, reason: String },
}

// ---------------------------------------------------------------------------
// ImageRef
// ---------------------------------------------------------------------------

/// Where a replacement image comes from.
///
/// Byte payloads are reference counted so cloning a ledger snapshot for a
/// background save never copies image data.
#[derive(Clone, PartialEq)]
pub enum ImageRef {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl ImageRef {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::from(bytes.into()))
    }

    /// Short human-readable label: the file name for paths, the size for
    /// in-memory payloads.
    pub fn label(&self) -> String {
        match self {
            ImageRef::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImageRef::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }

    /// Decode the referenced image.
    ///
    /// The format is sniffed from the content, not the file extension.
    pub fn load(&self) -> Result<DynamicImage, ReplacementImageError> {
        let decoded = match self {
            ImageRef::Path(path) => Self::decode_path(path),
            ImageRef::Bytes(bytes) => ImageReader::new(Cursor::new(bytes.as_ref()))
                .with_guessed_format()
                .map_err(ImageError::IoError)
                .and_then(|reader| reader.decode()),
        };
        decoded.map_err(|err| self.classify(err))
    }

    fn decode_path(path: &Path) -> Result<DynamicImage, ImageError> {
        ImageReader::open(path)
            .map_err(ImageError::IoError)?
            .with_guessed_format()
            .map_err(ImageError::IoError)?
            .decode()
    }

    fn classify(&self, err: ImageError) -> ReplacementImageError {
        let image = self.label();
        let reason = err.to_string();
        match err {
            ImageError::Unsupported(_) => ReplacementImageError::Unsupported { image, reason },
            _ => ReplacementImageError::Unreadable { image, reason },
        }
    }
}

impl std::fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRef::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ImageRef::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
        }
    }
}

impl From<PathBuf> for ImageRef {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for ImageRef {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::Path(PathBuf::from(value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode png");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn label_uses_file_name() {
        let r = ImageRef::from_path("/tmp/some/dir/b.png");
        assert_eq!(r.label(), "b.png");
    }

    #[test]
    fn label_for_bytes_reports_size() {
        let r = ImageRef::from_bytes(vec![1, 2, 3]);
        assert_eq!(r.label(), "<3 bytes>");
    }

    #[test]
    fn load_decodes_png_bytes() {
        let r = ImageRef::from_bytes(png_bytes(4, 3, [255, 0, 0, 255]));
        let img = r.load().expect("decode");
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn load_sniffs_format_regardless_of_extension() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("actually-a-png.jpg");
        std::fs::write(&path, png_bytes(2, 2, [0, 0, 255, 255])).expect("write");

        assert!(ImageRef::from_path(&path).load().is_ok());
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = ImageRef::from_path("/nonexistent/replacement.png")
            .load()
            .unwrap_err();
        assert!(matches!(err, ReplacementImageError::Unreadable { .. }));
        assert!(err.to_string().contains("replacement.png"));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = ImageRef::from_bytes(b"definitely not an image".to_vec())
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            ReplacementImageError::Unsupported { .. } | ReplacementImageError::Unreadable { .. }
        ));
    }

    #[test]
    fn debug_does_not_dump_payload() {
        let r = ImageRef::from_bytes(vec![0u8; 1024]);
        assert_eq!(format!("{r:?}"), "Bytes(1024)");
    }
}

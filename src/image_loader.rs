// Image loading module
// Handles the file-open and drag-and-drop sources and decoding of their bytes

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use log::debug;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions the file chooser lets the user pick
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "heic"];

/// Type identifiers a drop must advertise to be accepted
pub const ACCEPTED_DROP_TYPES: [&str; 2] = ["public.url", "public.file-url"];

/// Message reported for every file chooser failure
pub const FILE_SELECTION_FAILED: &str = "Failed to get file location";

/// Why an image could not be obtained from a user action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Cancelled, filtered out, unreadable or undecodable file
    #[error("{}", FILE_SELECTION_FAILED)]
    FileSelectionFailed,

    /// The drop was not accepted
    #[error("drop rejected: {0}")]
    DropPayloadUnrecognized(String),

    /// Raw bytes (e.g. from stdin) did not decode
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The loader stopped before producing a result
    #[error("image load was interrupted")]
    Interrupted,
}

/// One item of a drag-and-drop payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropItem {
    /// The first registered type identifier of the item
    pub type_identifier: String,
    /// URL data representation
    pub payload: Vec<u8>,
}

impl DropItem {
    pub fn new(type_identifier: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_identifier: type_identifier.into(),
            payload: payload.into(),
        }
    }

    /// A `public.file-url` item pointing at `url`
    pub fn file_url(url: &str) -> Self {
        Self::new("public.file-url", url.as_bytes())
    }
}

/// Open the file the user picked.
///
/// Every failure collapses into [`LoadError::FileSelectionFailed`]; the
/// underlying cause is only logged.
pub fn open_image(path: &Path) -> Result<DynamicImage, LoadError> {
    read_image(path).map_err(|e| {
        debug!("File selection failed for {}: {:#}", path.display(), e);
        LoadError::FileSelectionFailed
    })
}

fn read_image(path: &Path) -> Result<DynamicImage> {
    if path.is_dir() {
        bail!("{} is a directory", path.display());
    }
    if !has_allowed_extension(path) {
        bail!("{} does not have an image extension", path.display());
    }

    let data = fs::read(path)
        .with_context(|| format!("Failed to read image file: {}", path.display()))?;
    load_from_bytes(&data)
}

/// Whether `path` passes the chooser's extension filter (case-insensitive)
pub fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Resolve a dropped item to the local file it references.
pub fn resolve_drop(item: &DropItem) -> Result<PathBuf, LoadError> {
    debug!("Drop received with identifier {}", item.type_identifier);
    if !ACCEPTED_DROP_TYPES.contains(&item.type_identifier.as_str()) {
        return Err(LoadError::DropPayloadUnrecognized(format!(
            "unsupported type identifier {}",
            item.type_identifier
        )));
    }

    let url = std::str::from_utf8(&item.payload)
        .map_err(|_| LoadError::DropPayloadUnrecognized("payload is not UTF-8".to_string()))?
        .trim();
    file_url_to_path(url).map_err(LoadError::DropPayloadUnrecognized)
}

/// Resolve and decode a dropped item.
pub fn load_dropped(item: &DropItem) -> Result<DynamicImage, LoadError> {
    let path = resolve_drop(item)?;
    let data = fs::read(&path).map_err(|e| {
        LoadError::DropPayloadUnrecognized(format!("cannot read {}: {}", path.display(), e))
    })?;
    load_from_bytes(&data).map_err(|e| {
        LoadError::DropPayloadUnrecognized(format!("cannot decode {}: {:#}", path.display(), e))
    })
}

/// Convert a `file://` URL into a local path, decoding percent-escapes
fn file_url_to_path(url: &str) -> Result<PathBuf, String> {
    let rest = url
        .strip_prefix("file://")
        .ok_or_else(|| format!("{url} is not a file URL"))?;

    // Only an empty host or localhost refers to this machine
    let path = if rest.starts_with('/') {
        rest
    } else if let Some(path) = rest
        .strip_prefix("localhost")
        .filter(|path| path.starts_with('/'))
    {
        path
    } else {
        return Err(format!("{url} does not point at a local file"));
    };

    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        return Err(format!("{url} has no path"));
    }
    percent_decode(path).map(PathBuf::from)
}

fn percent_decode(input: &str) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| format!("invalid percent-escape in {input}"))?;
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| format!("{input} does not decode to UTF-8"))
}

/// Load an image from raw bytes, auto-detecting the format
pub fn load_from_bytes(data: &[u8]) -> Result<DynamicImage> {
    // Try to guess the format from the data
    let format = image::guess_format(data).context("Failed to detect image format")?;
    debug!("Detected image format: {:?}", format);

    let cursor = Cursor::new(data);
    let img = image::load(cursor, format).context("Failed to decode image")?;

    Ok(img)
}

/// Get the image format the `image` crate would use for a chooser extension.
///
/// HEIC passes the chooser filter but has no decoder here.
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    match ext.to_lowercase().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Largest size with the image's aspect ratio that fits a `region`-sided square
pub fn fitted_size(width: u32, height: u32, region: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = (region as f64 / width as f64).min(region as f64 / height as f64);
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, region.max(1));
    (fit(width), fit(height))
}

/// Scale `img` to fit a `region`-sided square, keeping its aspect ratio
pub fn fit_within(img: &DynamicImage, region: u32) -> DynamicImage {
    let (new_width, new_height) = fitted_size(img.width(), img.height(), region);
    if (new_width, new_height) == (img.width(), img.height()) {
        return img.clone();
    }

    // Pixel art stays crisp when enlarged
    let filter = if new_width > img.width() {
        FilterType::Nearest
    } else {
        FilterType::Lanczos3
    };
    img.resize_exact(new_width, new_height, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Write;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8 * 10, y as u8 * 10, 0, if (x + y) % 2 == 0 { 255 } else { 0 }])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(data).unwrap();
        path
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        for name in ["a.png", "b.JPG", "c.jpeg", "d.HeIc"] {
            assert!(has_allowed_extension(Path::new(name)), "{name}");
        }
        for name in ["a.gif", "b", "c.png.txt", ".png"] {
            assert!(!has_allowed_extension(Path::new(name)), "{name}");
        }
    }

    #[test]
    fn open_image_decodes_png() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "tiny.PNG", &png_bytes(3, 2));
        let img = open_image(&path).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn open_image_failures_share_one_message() {
        let dir = TempDir::new().unwrap();
        let wrong_ext = write_file(&dir, "tiny.gif", &png_bytes(1, 1));
        let garbage = write_file(&dir, "broken.png", b"not an image");
        let missing = dir.path().join("missing.png");

        for path in [wrong_ext, garbage, missing, dir.path().to_path_buf()] {
            let err = open_image(&path).unwrap_err();
            assert_eq!(err, LoadError::FileSelectionFailed);
            assert_eq!(err.to_string(), "Failed to get file location");
        }
    }

    #[test]
    fn drop_resolves_file_urls() {
        let path = resolve_drop(&DropItem::file_url("file:///tmp/my%20image.png")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/my image.png"));

        let item = DropItem::new("public.url", "file://localhost/tmp/a.png\n");
        assert_eq!(resolve_drop(&item).unwrap(), PathBuf::from("/tmp/a.png"));
    }

    #[test]
    fn drop_rejects_unknown_payloads() {
        let rejected = [
            DropItem::new("public.png", "file:///tmp/a.png"),
            DropItem::file_url("https://example.com/a.png"),
            DropItem::file_url("file://server/share/a.png"),
            DropItem::file_url("file:///tmp/bad%zz.png"),
            DropItem::new("public.file-url", vec![0xff, 0xfe]),
        ];
        for item in rejected {
            assert!(
                matches!(resolve_drop(&item), Err(LoadError::DropPayloadUnrecognized(_))),
                "{item:?}"
            );
        }
    }

    #[test]
    fn load_dropped_reads_the_referenced_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dropped.png", &png_bytes(4, 4));
        let url = format!("file://{}", path.display());
        let img = load_dropped(&DropItem::file_url(&url)).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));

        let garbage = write_file(&dir, "garbage.png", b"\x00\x01");
        let url = format!("file://{}", garbage.display());
        assert!(matches!(
            load_dropped(&DropItem::file_url(&url)),
            Err(LoadError::DropPayloadUnrecognized(_))
        ));
    }

    #[test]
    fn chooser_extensions_map_to_formats() {
        assert_eq!(format_from_extension("PNG"), Some(ImageFormat::Png));
        assert_eq!(format_from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_extension("heic"), None);
    }

    #[test]
    fn fitted_size_keeps_aspect_ratio() {
        assert_eq!(fitted_size(640, 320, 320), (320, 160));
        assert_eq!(fitted_size(100, 400, 320), (80, 320));
        assert_eq!(fitted_size(8, 8, 320), (320, 320));
        assert_eq!(fitted_size(1000, 1, 320), (320, 1));
        assert_eq!(fitted_size(0, 5, 320), (0, 0));
    }

    #[test]
    fn fit_within_resizes() {
        let img = load_from_bytes(&png_bytes(4, 2)).unwrap();
        let fitted = fit_within(&img, 8);
        assert_eq!((fitted.width(), fitted.height()), (8, 4));
    }
}

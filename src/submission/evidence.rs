use std::path::Path;

use chrono::{DateTime, Utc};
use image::ImageFormat;
use rand::Rng;

use crate::error::{ReadingError, Result};

/// A photo attached to a pending reading. Held in memory until submission.
#[derive(Clone)]
pub struct Evidence {
    bytes: Vec<u8>,
    original_name: String,
    format: ImageFormat,
}

impl std::fmt::Debug for Evidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evidence")
            .field("original_name", &self.original_name)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Evidence {
    /// Only recognised image formats are accepted.
    pub fn new(bytes: Vec<u8>, original_name: impl Into<String>) -> Result<Self> {
        let original_name = original_name.into();
        if bytes.is_empty() {
            return Err(ReadingError::InvalidEvidence(format!("{original_name} is empty")));
        }
        let format = image::guess_format(&bytes).map_err(|_| {
            ReadingError::InvalidEvidence(format!("{original_name} is not a recognised image"))
        })?;
        Ok(Self {
            bytes,
            original_name,
            format,
        })
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// The original file's extension when it has a sane one, otherwise the
    /// sniffed format's canonical extension.
    pub fn extension(&self) -> String {
        let original = Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase());

        original.unwrap_or_else(|| {
            self.format
                .extensions_str()
                .first()
                .map(|ext| ext.to_string())
                .unwrap_or_else(|| "bin".to_string())
        })
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// `<unix-millis>_<16 hex>.<ext>`
pub fn object_name(evidence: &Evidence, now: DateTime<Utc>) -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{}_{:016x}.{}", now.timestamp_millis(), suffix, evidence.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[test]
    fn rejects_non_images() {
        assert!(matches!(
            Evidence::new(b"hello world".to_vec(), "notes.txt"),
            Err(ReadingError::InvalidEvidence(_))
        ));
        assert!(matches!(
            Evidence::new(Vec::new(), "empty.png"),
            Err(ReadingError::InvalidEvidence(_))
        ));
    }

    #[test]
    fn extension_prefers_original_name() {
        let evidence = Evidence::new(PNG.to_vec(), "IMG_0042.PNG").unwrap();
        assert_eq!(evidence.extension(), "png");

        let unnamed = Evidence::new(JPEG.to_vec(), "camera-capture").unwrap();
        assert_eq!(unnamed.extension(), "jpg");
    }

    #[test]
    fn object_names_are_timestamped_and_unique() {
        let evidence = Evidence::new(PNG.to_vec(), "meter.png").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let first = object_name(&evidence, now);
        let second = object_name(&evidence, now);

        assert!(first.starts_with(&format!("{}_", now.timestamp_millis())));
        assert!(first.ends_with(".png"));
        assert_eq!(first.len(), 13 + 1 + 16 + 4);
        assert_ne!(first, second);
    }
}

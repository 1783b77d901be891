//! Text extraction collaborator
//!
//! The pipeline only needs `path -> text`. [`DocumentParser`] is the default
//! implementation; OCR is plugged in through [`OcrEngine`]. With the `ocr`
//! feature, [`LeptessOcr`] provides one backed by tesseract.

#[cfg(feature = "ocr")]
mod ocr;
mod parser;

#[cfg(feature = "ocr")]
pub use ocr::{LeptessOcr, MAX_OCR_PAGES};
pub use parser::{DocumentParser, MAX_TEXT_LENGTH, OCR_FALLBACK_THRESHOLD};

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported file format: .{extension}")]
    Unsupported { extension: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("No text content found")]
    Empty,
}

/// Turns a file into plain text
pub trait TextExtractor: Send + Sync {
    /// Extract text, or `Err(ExtractError::Unsupported)` for unknown formats
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Optical character recognition for scanned documents and images
pub trait OcrEngine: Send + Sync {
    fn recognize_image(&self, path: &Path) -> Result<String, String>;

    fn recognize_pdf(&self, path: &Path) -> Result<String, String>;
}

/// Lowercased extension without the dot, or "" when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn is_image_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tiff"
    )
}

pub fn is_video_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp4" | "mov" | "avi" | "mkv" | "webm"
    )
}

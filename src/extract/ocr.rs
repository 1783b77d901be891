//! Tesseract OCR
//!
//! Images are handed to tesseract directly. Scanned PDFs are rasterized
//! first, which needs the `pdfium` feature and the pdfium library:
//! - macOS: brew install pdfium
//! - Linux: apt install libpdfium-dev
//!
//! Tesseract itself and the language data must be installed for the
//! `ocr` feature to be useful (apt install tesseract-ocr libtesseract-dev).

use leptess::LepTess;
use std::path::Path;

use super::OcrEngine;
use crate::config::{Settings, DEFAULT_OCR_LANGUAGE};

/// Only the first pages of a scanned PDF are read
pub const MAX_OCR_PAGES: usize = 3;

/// OCR through leptess (tesseract + leptonica bindings).
///
/// A fresh `LepTess` is created per call; the handle is not `Sync`.
#[derive(Debug, Clone)]
pub struct LeptessOcr {
    language: String,
    data_path: Option<String>,
}

impl Default for LeptessOcr {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_LANGUAGE)
    }
}

impl LeptessOcr {
    /// `language` uses tesseract codes, several joined with `+` (e.g. "por+eng")
    pub fn new(language: impl Into<String>) -> Self {
        let language = language.into();
        let language = if language.trim().is_empty() {
            DEFAULT_OCR_LANGUAGE.to_string()
        } else {
            language.trim().to_string()
        };
        Self {
            language,
            data_path: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ocr_language.clone()).with_data_path(settings.ocr_data_path.clone())
    }

    /// Directory holding `<lang>.traineddata`, instead of tesseract's default
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Fails when tesseract or the language data cannot be loaded
    pub fn ensure_available(&self) -> Result<(), String> {
        self.engine().map(|_| ())
    }

    fn engine(&self) -> Result<LepTess, String> {
        LepTess::new(self.data_path.as_deref(), &self.language)
            .map_err(|e| format!("init failed ({}): {e}", self.language))
    }
}

impl OcrEngine for LeptessOcr {
    fn recognize_image(&self, path: &Path) -> Result<String, String> {
        let mut lt = self.engine()?;
        lt.set_image(path)
            .map_err(|e| format!("set_image failed: {e}"))?;
        let text = lt
            .get_utf8_text()
            .map_err(|e| format!("get_utf8_text failed: {e}"))?;

        tracing::debug!(
            "[Ocr] {} chars from {} (confidence {})",
            text.trim().len(),
            path.display(),
            lt.mean_text_conf()
        );
        Ok(text.trim().to_string())
    }

    fn recognize_pdf(&self, path: &Path) -> Result<String, String> {
        let pages = render::pdf_pages(path, MAX_OCR_PAGES)?;

        let mut lt = self.engine()?;
        let mut texts = Vec::with_capacity(pages.len());
        for (index, png) in pages.iter().enumerate() {
            lt.set_image_from_mem(png)
                .map_err(|e| format!("page {}: set_image failed: {e}", index + 1))?;
            let text = lt
                .get_utf8_text()
                .map_err(|e| format!("page {}: get_utf8_text failed: {e}", index + 1))?;
            texts.push(text);
        }

        Ok(join_page_texts(&texts))
    }
}

/// Trimmed page texts, empty pages dropped, one blank line between pages
fn join_page_texts(texts: &[String]) -> String {
    texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(feature = "pdfium")]
mod render {
    use image::{DynamicImage, ImageFormat};
    use pdfium_render::prelude::*;
    use std::io::Cursor;
    use std::path::Path;

    /// Rendering resolution for OCR
    const RENDER_DPI: f32 = 200.0;

    /// Maximum page dimension in pixels
    const MAX_PAGE_DIMENSION: f32 = 2400.0;

    /// First `max_pages` pages as grayscale PNG bytes
    pub fn pdf_pages(path: &Path, max_pages: usize) -> Result<Vec<Vec<u8>>, String> {
        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| format!("Failed to initialize pdfium: {}", e))?;
        let pdfium = Pdfium::new(bindings);

        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("Failed to load PDF: {}", e))?;

        let mut rendered = Vec::new();
        for page in document.pages().iter().take(max_pages) {
            let width = page.width().value;
            let height = page.height().value;
            let scale = (MAX_PAGE_DIMENSION / width.max(height)).min(RENDER_DPI / 72.0);

            let config = PdfRenderConfig::new()
                .set_target_width((width * scale) as i32)
                .set_target_height((height * scale) as i32)
                .render_form_data(true);

            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| format!("Failed to render page: {}", e))?;

            // Tesseract does better on grayscale input
            let gray = DynamicImage::ImageLuma8(bitmap.as_image().to_luma8());
            let mut buffer = Vec::new();
            gray.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| format!("Failed to encode image: {}", e))?;
            rendered.push(buffer);
        }

        Ok(rendered)
    }
}

#[cfg(not(feature = "pdfium"))]
mod render {
    use std::path::Path;

    pub fn pdf_pages(path: &Path, _max_pages: usize) -> Result<Vec<Vec<u8>>, String> {
        tracing::debug!("[Ocr] Cannot rasterize {} without pdfium", path.display());
        Err("PDF OCR needs the pdfium feature".to_string())
    }
}

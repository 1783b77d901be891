//! Document Parser
//!
//! Pure Rust text extraction from documents.
//!
//! ## Supported Formats
//! - PDF: text per page via pdf-extract, OCR fallback for scanned documents
//! - Excel: .xlsx, .xls via calamine
//! - Word: .docx via docx-rs
//! - PowerPoint: .pptx slide text via zip
//! - HTML: boilerplate blocks and tags stripped
//! - Text: .txt, .md, .csv, .json, .xml and friends (direct read)
//! - Images: only through an [`OcrEngine`]

use calamine::{open_workbook_auto, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use super::{extension_of, is_image_extension, ExtractError, OcrEngine, TextExtractor};

/// Maximum text length to extract, in bytes
pub const MAX_TEXT_LENGTH: usize = 500_000;

/// PDFs yielding fewer chars than this are retried with OCR
pub const OCR_FALLBACK_THRESHOLD: usize = 100;

/// Blocks whose whole content is dropped from HTML
static HTML_BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "footer", "aside"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("Invalid boilerplate pattern")
        })
        .collect()
});

static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment pattern"));

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag pattern"));

/// DrawingML paragraph and text run inside a slide
static PPTX_PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<a:p(?:\s[^>]*)?>(.*?)</a:p>").expect("Invalid paragraph pattern")
});

static PPTX_TEXT_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("Invalid text run pattern")
});

/// Document parser using pure Rust crates
#[derive(Default, Clone)]
pub struct DocumentParser {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable OCR for images and scanned PDFs
    pub fn with_ocr(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr: Some(ocr) }
    }

    /// Parse a document and extract text
    pub fn parse(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = extension_of(path);

        let text = match ext.as_str() {
            e if Self::is_plain_text_ext(e) => self.read_plain_text(path)?,
            "html" | "htm" => self.read_html(path)?,
            "pdf" => self.extract_pdf(path)?,
            "xlsx" | "xls" => self.extract_spreadsheet(path)?,
            "docx" => self.extract_docx(path)?,
            "pptx" => self.extract_pptx(path)?,
            e if is_image_extension(e) => self.recognize_image(path, e)?,
            _ => return Err(ExtractError::Unsupported { extension: ext }),
        };

        let text = truncate_text(&clean_text(&text));
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }

        tracing::debug!(
            "[DocumentParser] Extracted {} chars from {}",
            text.len(),
            path.display()
        );
        Ok(text)
    }

    /// Check if a file type is supported for text extraction
    pub fn is_supported(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        Self::is_plain_text_ext(&ext)
            || matches!(
                ext.as_str(),
                "html" | "htm" | "pdf" | "xlsx" | "xls" | "docx" | "pptx"
            )
            || (self.ocr.is_some() && is_image_extension(&ext))
    }

    fn is_plain_text_ext(ext: &str) -> bool {
        matches!(
            ext,
            "txt" | "md" | "csv" | "json" | "xml" | "yaml" | "yml" | "log" | "ini" | "cfg"
                | "conf" | "toml"
        )
    }

    fn read_plain_text(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_html(&self, path: &Path) -> Result<String, ExtractError> {
        let raw = self.read_plain_text(path)?;
        Ok(strip_html(&raw))
    }

    /// Extract text from PDF page by page.
    /// Wrapped in catch_unwind: pdf-extract can panic on malformed fonts.
    fn extract_pdf(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;

        let pages = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })) {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                tracing::warn!("[DocumentParser] PDF extraction failed for {}: {}", path.display(), e);
                return self.ocr_pdf_or(path, ExtractError::Parse(e.to_string()));
            }
            Err(_panic) => {
                tracing::warn!(
                    "[DocumentParser] PDF extraction panicked for {} - likely malformed font/glyph",
                    path.display()
                );
                return self.ocr_pdf_or(
                    path,
                    ExtractError::Parse("PDF extraction panicked".to_string()),
                );
            }
        };

        let text = clean_text(&pages.join("\n"));
        let char_count = text.chars().count();

        if char_count >= OCR_FALLBACK_THRESHOLD || pages.is_empty() {
            return Ok(text);
        }

        let Some(ocr) = &self.ocr else {
            return Ok(text);
        };

        tracing::info!(
            "[DocumentParser] PDF text too short ({} chars, {} pages), trying OCR: {}",
            char_count,
            pages.len(),
            path.display()
        );

        match ocr.recognize_pdf(path) {
            Ok(ocr_text) if ocr_text.trim().chars().count() > char_count => Ok(ocr_text),
            Ok(_) => Ok(text),
            Err(e) => {
                tracing::warn!("[DocumentParser] OCR failed for {}: {}", path.display(), e);
                if text.is_empty() {
                    Err(ExtractError::Ocr(e))
                } else {
                    Ok(text)
                }
            }
        }
    }

    fn ocr_pdf_or(&self, path: &Path, err: ExtractError) -> Result<String, ExtractError> {
        match &self.ocr {
            Some(ocr) => ocr.recognize_pdf(path).map_err(ExtractError::Ocr),
            None => Err(err),
        }
    }

    fn recognize_image(&self, path: &Path, ext: &str) -> Result<String, ExtractError> {
        match &self.ocr {
            Some(ocr) => ocr.recognize_image(path).map_err(ExtractError::Ocr),
            None => Err(ExtractError::Unsupported {
                extension: ext.to_string(),
            }),
        }
    }

    /// Extract text from XLSX/XLS using calamine, one line per row
    fn extract_spreadsheet(&self, path: &Path) -> Result<String, ExtractError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let mut all_text = String::new();
        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

        for sheet_name in &sheet_names {
            let Ok(range) = workbook.worksheet_range(sheet_name) else {
                continue;
            };

            for row in range.rows() {
                let row_text: Vec<String> = row
                    .iter()
                    .map(|cell| cell.to_string())
                    .filter(|s| !s.is_empty())
                    .collect();

                if !row_text.is_empty() {
                    all_text.push_str(&row_text.join(" | "));
                    all_text.push('\n');
                }
            }
        }

        Ok(all_text)
    }

    fn extract_docx(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        let doc = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let mut all_text = String::new();
        for child in &doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(para) => {
                    push_paragraph(para, &mut all_text);
                    all_text.push('\n');
                }
                docx_rs::DocumentChild::Table(table) => push_table(table, &mut all_text),
                _ => {}
            }
        }

        Ok(all_text)
    }

    /// Extract slide text from PPTX, one line per paragraph.
    /// Slides live in `ppt/slides/slideN.xml` and are read in N order.
    fn extract_pptx(&self, path: &Path) -> Result<String, ExtractError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractError::Parse(format!("PPTX: {}", e)))?;

        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
            .collect();
        slides.sort();

        let mut all_text = String::new();
        for (_, name) in &slides {
            let mut content = String::new();
            archive
                .by_name(name)
                .map_err(|e| ExtractError::Parse(format!("PPTX: {}", e)))?
                .read_to_string(&mut content)?;

            for paragraph in PPTX_PARAGRAPH.captures_iter(&content) {
                for run in PPTX_TEXT_RUN.captures_iter(&paragraph[1]) {
                    all_text.push_str(&decode_entities(&run[1]));
                }
                all_text.push('\n');
            }
        }

        tracing::debug!(
            "[DocumentParser] {} slides in {}",
            slides.len(),
            path.display()
        );
        Ok(all_text)
    }
}

/// `ppt/slides/slide12.xml` -> 12
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

impl TextExtractor for DocumentParser {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        self.parse(path)
    }
}

fn push_runs(children: &[docx_rs::RunChild], output: &mut String) {
    for child in children {
        if let docx_rs::RunChild::Text(text) = child {
            output.push_str(&text.text);
        }
    }
}

fn push_paragraph(para: &docx_rs::Paragraph, output: &mut String) {
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_runs(&run.children, output),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = inner {
                        push_runs(&run.children, output);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_table(table: &docx_rs::Table, output: &mut String) {
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        for cell in &tr.cells {
            let docx_rs::TableRowChild::TableCell(tc) = cell;
            for content in &tc.children {
                if let docx_rs::TableCellContent::Paragraph(para) = content {
                    push_paragraph(para, output);
                    output.push_str(" | ");
                }
            }
        }
        output.push('\n');
    }
}

/// Drop script/style/nav/footer/aside blocks, comments and tags
pub(crate) fn strip_html(html: &str) -> String {
    let mut text = HTML_COMMENT.replace_all(html, " ").into_owned();
    for block in HTML_BOILERPLATE.iter() {
        text = block.replace_all(&text, " ").into_owned();
    }
    let text = HTML_TAG.replace_all(&text, "\n");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Trim lines and drop blank ones
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cap text at MAX_TEXT_LENGTH bytes, on a char boundary
fn truncate_text(text: &str) -> String {
    if text.len() <= MAX_TEXT_LENGTH {
        return text.to_string();
    }

    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];

    // Prefer a word boundary
    match truncated.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated.to_string(),
    }
}

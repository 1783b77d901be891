//! Runtime settings
//!
//! Everything is read from the environment (optionally seeded from a `.env`
//! file). Unset values fall back to the defaults below; unparsable values
//! are a configuration error.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FolioError, Result};

/// Application folder name under the per-OS config directory
pub const APP_DIR_NAME: &str = "folio";

const MIN_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 120;
const MAX_ATTEMPTS_CEILING: u32 = 4;

/// Tesseract language code used for OCR
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Highest keyword threshold that still accepts category-name matches
pub const MAX_KEYWORD_THRESHOLD: f32 = 0.97;

/// Settings for a classification process
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the remote classifier (e.g. https://project.functions.host)
    pub remote_url: Option<String>,

    /// Bearer key for the remote classifier
    pub remote_key: Option<String>,

    /// Upper bound on a single remote call
    pub remote_timeout: Duration,

    /// Total attempts per remote call (first try included)
    pub remote_max_attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt
    pub remote_base_delay: Duration,

    /// Confidence assumed when the remote response omits one
    pub default_confidence: f32,

    /// Filename keyword results must score strictly above this to be accepted
    pub keyword_threshold: f32,

    /// Whether a file found unprocessable during the remote stage costs a credit
    pub charge_unprocessable: bool,

    /// Directory holding the per-user cache files
    pub data_dir: PathBuf,

    /// Starting credits for the local account
    pub credits: u32,

    /// Tesseract languages, joined with `+` (only used with the `ocr` feature)
    pub ocr_language: String,

    /// Tesseract data directory override
    pub ocr_data_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_key: None,
            remote_timeout: Duration::from_secs(MAX_TIMEOUT_SECS),
            remote_max_attempts: 3,
            remote_base_delay: Duration::from_millis(2000),
            default_confidence: 0.3,
            keyword_threshold: 0.8,
            charge_unprocessable: true,
            data_dir: default_data_dir(),
            credits: 0,
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            ocr_data_path: None,
        }
    }
}

impl Settings {
    /// Load `.env` (current dir first, then parent) and read settings
    pub fn load() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_path("../.env");
        }
        Self::from_env()
    }

    /// Read settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout_secs = parse_var::<u64>(&lookup, "FOLIO_REMOTE_TIMEOUT_SECS")?
            .unwrap_or(MAX_TIMEOUT_SECS)
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);

        let max_attempts = parse_var::<u32>(&lookup, "FOLIO_REMOTE_MAX_ATTEMPTS")?
            .unwrap_or(defaults.remote_max_attempts)
            .clamp(1, MAX_ATTEMPTS_CEILING);

        let base_delay = parse_var::<u64>(&lookup, "FOLIO_REMOTE_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.remote_base_delay);

        let default_confidence = parse_var::<f32>(&lookup, "FOLIO_DEFAULT_CONFIDENCE")?
            .unwrap_or(defaults.default_confidence)
            .clamp(0.0, 1.0);

        let keyword_threshold = parse_var::<f32>(&lookup, "FOLIO_KEYWORD_THRESHOLD")?
            .unwrap_or(defaults.keyword_threshold)
            .clamp(0.0, MAX_KEYWORD_THRESHOLD);

        let charge_unprocessable = parse_var::<bool>(&lookup, "FOLIO_CHARGE_UNPROCESSABLE")?
            .unwrap_or(defaults.charge_unprocessable);

        let data_dir = lookup("FOLIO_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let credits = parse_var::<u32>(&lookup, "FOLIO_CREDITS")?.unwrap_or(defaults.credits);

        let ocr_language = non_empty(lookup("FOLIO_OCR_LANGUAGE"))
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.ocr_language);

        Ok(Self {
            remote_url: non_empty(lookup("FOLIO_REMOTE_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),
            remote_key: non_empty(lookup("FOLIO_REMOTE_KEY")),
            remote_timeout: Duration::from_secs(timeout_secs),
            remote_max_attempts: max_attempts,
            remote_base_delay: base_delay,
            default_confidence,
            keyword_threshold,
            charge_unprocessable,
            data_dir,
            credits,
            ocr_language,
            ocr_data_path: non_empty(lookup("TESSDATA_PREFIX")),
        })
    }

    /// Remote classification needs both a URL and a key
    pub fn remote_configured(&self) -> bool {
        self.remote_url.is_some() && self.remote_key.is_some()
    }
}

/// Per-OS application data directory:
/// Linux `~/.config/folio`, macOS `~/Library/Application Support/folio`,
/// Windows `%APPDATA%\folio`.
pub fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| FolioError::Config(format!("{key}={raw}: {e}"))),
    }
}

//! Category taxonomy and classification results

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FolioError, Result};

/// Display name of the "no confident match" bucket
pub const FALLBACK_CATEGORY: &str = "Other";

/// Display name of the "could not be processed" bucket. Never a member of a set.
pub const UNPROCESSABLE_CATEGORY: &str = "Other (Unprocessable)";

pub const IMAGES_CATEGORY: &str = "Images";
pub const VIDEOS_CATEGORY: &str = "Videos";

const FALLBACK_DESCRIPTION: &str = "Documents that do not clearly fit any other category or \
     serve a very mixed purpose. Includes temporary files, assorted downloads, documents without \
     a clear subject, and items waiting for manual classification.";

const IMAGES_DESCRIPTION: &str = "Photos, charts, screenshots, scanned documents and \
     illustrations. This category is mainly for image files.";

/// A single user-visible category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: String,
}

/// Ordered, validated mapping of category name to description.
///
/// Iteration order is insertion order and is used for tie-breaking everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct CategorySet {
    entries: IndexMap<String, String>,
}

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from ordered pairs, validating each one
    pub fn from_pairs<I, N, D>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        let mut set = Self::new();
        for (name, description) in pairs {
            set.insert(name, description)?;
        }
        Ok(set)
    }

    /// Default taxonomy
    pub fn defaults() -> Self {
        let pairs = [
            (
                "Personal",
                "Identity and civil registry documents such as ID cards, taxpayer numbers, \
                 driver's licenses, birth certificates, marriage certificates, passports and \
                 voter registration cards.",
            ),
            (
                "Health",
                "Medical records and information: laboratory exam results (blood, urine, x-ray, \
                 ultrasound, MRI), medical reports, prescriptions, medical certificates, \
                 consultation reports, vaccination history, health plan receipts and medical \
                 expenses.",
            ),
            (
                "Financial",
                "Receipts and statements related to money and financial obligations: bank \
                 slips, utility bills (water, power, gas, phone, internet), credit card \
                 invoices, bank statements, payment receipts, payslips, income tax returns, \
                 investment statements and invoices.",
            ),
            (
                "Legal",
                "Legal documents such as powers of attorney, articles of incorporation, \
                 petitions, employment contracts, terms of service, agreements and court \
                 notices.",
            ),
            (IMAGES_CATEGORY, IMAGES_DESCRIPTION),
            (FALLBACK_CATEGORY, FALLBACK_DESCRIPTION),
        ];

        let entries = pairs
            .into_iter()
            .map(|(name, desc)| (name.to_string(), desc.to_string()))
            .collect();
        Self { entries }
    }

    /// A set holding only the categories that must always exist
    pub fn with_essentials() -> Self {
        let mut set = Self::new();
        set.ensure_essentials();
        set
    }

    /// Add "Other" and "Images" if they are missing
    pub fn ensure_essentials(&mut self) {
        for (name, desc) in [
            (FALLBACK_CATEGORY, FALLBACK_DESCRIPTION),
            (IMAGES_CATEGORY, IMAGES_DESCRIPTION),
        ] {
            if self.find(name).is_none() {
                self.entries.insert(name.to_string(), desc.to_string());
            }
        }
    }

    /// Load a `{name: description}` JSON object, preserving its key order
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let raw: IndexMap<String, String> = serde_json::from_str(&content)?;
        Self::try_from(raw)
    }

    /// Validate and insert a category.
    ///
    /// The name is trimmed and gets its first letter capitalized. It must be
    /// usable as a single folder name. Names are unique ignoring case. Descriptions must be non-empty except for the
    /// fallback category, which is never used for semantic matching on its own.
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) -> Result<()> {
        let name = normalize_name(&name.into())?;
        let description = description.into().trim().to_string();

        if name.eq_ignore_ascii_case(UNPROCESSABLE_CATEGORY) {
            return Err(FolioError::InvalidCategories(format!(
                "'{}' is reserved",
                UNPROCESSABLE_CATEGORY
            )));
        }
        if self.find(&name).is_some() {
            return Err(FolioError::InvalidCategories(format!(
                "category '{}' already exists",
                name
            )));
        }
        if description.is_empty() && name != FALLBACK_CATEGORY {
            return Err(FolioError::InvalidCategories(format!(
                "category '{}' needs a description",
                name
            )));
        }

        self.entries.insert(name, description);
        Ok(())
    }

    /// Remove a category. The essential ones cannot be removed.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let Some(existing) = self.find(name).map(str::to_string) else {
            return Err(FolioError::InvalidCategories(format!(
                "category '{}' does not exist",
                name
            )));
        };
        if existing == FALLBACK_CATEGORY || existing == IMAGES_CATEGORY {
            return Err(FolioError::InvalidCategories(format!(
                "'{}' is an essential category",
                existing
            )));
        }
        self.entries.shift_remove(&existing);
        Ok(())
    }

    /// Exact membership
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Case-insensitive lookup, returning the stored spelling
    pub fn find(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.entries
            .keys()
            .find(|key| key.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn categories(&self) -> Vec<Category> {
        self.iter()
            .map(|(name, description)| Category {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw name to description map, as sent to the remote classifier
    pub fn as_map(&self) -> &IndexMap<String, String> {
        &self.entries
    }
}

impl TryFrom<IndexMap<String, String>> for CategorySet {
    type Error = FolioError;

    fn try_from(raw: IndexMap<String, String>) -> Result<Self> {
        Self::from_pairs(raw)
    }
}

impl From<CategorySet> for IndexMap<String, String> {
    fn from(set: CategorySet) -> Self {
        set.entries
    }
}

fn normalize_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    // Names become folder names under the organized folder
    if trimmed.contains(['/', '\\', '\0']) || trimmed == "." || trimmed == ".." {
        return Err(FolioError::InvalidCategories(format!(
            "category name '{}' cannot be used as a folder name",
            trimmed
        )));
    }
    let mut chars = trimmed.chars();
    match chars.next() {
        None => Err(FolioError::InvalidCategories(
            "category name cannot be empty".to_string(),
        )),
        Some(first) => Ok(first.to_uppercase().chain(chars).collect()),
    }
}

/// Outcome of classifying one file.
///
/// Collapses to a display string only through [`Classification::display_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Classified(String),
    Unmatched,
    Unprocessable,
}

impl Classification {
    /// Interpret a category name coming from a classifier or the cache
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name == FALLBACK_CATEGORY {
            Self::Unmatched
        } else if name == UNPROCESSABLE_CATEGORY {
            Self::Unprocessable
        } else {
            Self::Classified(name.to_string())
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Classified(name) => name,
            Self::Unmatched => FALLBACK_CATEGORY,
            Self::Unprocessable => UNPROCESSABLE_CATEGORY,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Classified(_))
    }

    pub fn is_unprocessable(&self) -> bool {
        matches!(self, Self::Unprocessable)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How a file's category was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Retrieved from the per-user cache
    Cache,
    /// Category name or domain keyword found in the filename
    FilenameKeyword,
    /// Embedding similarity against category descriptions
    LocalEmbedding,
    /// Remote classifier given the raw file
    RemoteFile,
    /// Remote classifier given extracted text
    RemoteText,
    /// No usable text or bytes could be obtained
    Unprocessable,
    /// Changed by the user after the run
    ManualOverride,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::FilenameKeyword => "filename_keyword",
            Self::LocalEmbedding => "local_embedding",
            Self::RemoteFile => "remote_file",
            Self::RemoteText => "remote_text",
            Self::Unprocessable => "unprocessable",
            Self::ManualOverride => "manual_override",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteFile | Self::RemoteText)
    }
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an organize plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub filename: String,
    pub category: String,
    pub method: ClassificationMethod,
    pub sequence_index: usize,
    pub confidence: f32,
    /// Set when an Unmatched image/video was moved to Images/Videos
    pub extension_redirect: bool,
}

impl ClassificationRecord {
    pub fn is_unprocessable(&self) -> bool {
        self.category == UNPROCESSABLE_CATEGORY
    }
}

//! Classification orchestrator
//!
//! Per file: cache lookup, then remote (file, then text) while the budget
//! lasts, then the local chain (filename keywords, then embeddings), then
//! category-validity correction and the image/video redirect.
//!
//! Files are processed one at a time. Failures on a single file degrade that
//! file and never abort the run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::cache::{CacheMap, ClassificationCache};
use crate::categories::{
    CategorySet, Classification, ClassificationMethod, ClassificationRecord, FALLBACK_CATEGORY,
    IMAGES_CATEGORY, UNPROCESSABLE_CATEGORY, VIDEOS_CATEGORY,
};
use crate::classify::{filename, semantic, CategoryEmbeddings, SemanticModel};
use crate::config::Settings;
use crate::error::{FolioError, Result};
use crate::extract::{extension_of, is_image_extension, is_video_extension, TextExtractor};
use crate::fingerprint::{fingerprint_file, Fingerprint};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};
use crate::remote::{is_native_extension, RemoteGateway, RemoteOutcome};

/// Confidence attached to cache hits and manual choices
const CERTAIN: f32 = 1.0;

/// Per-run ceiling on remote classifications. One unit per file at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteBudget {
    ceiling: u32,
    used: u32,
}

impl RemoteBudget {
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling, used: 0 }
    }

    pub fn has_remaining(&self) -> bool {
        self.used < self.ceiling
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling - self.used
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    /// Take one unit. Returns false when the ceiling is already reached.
    pub fn charge(&mut self) -> bool {
        if self.has_remaining() {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

/// Tunables of the decision policy
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Filename results must score strictly above this
    pub keyword_threshold: f32,
    /// Whether a file found unprocessable in the remote stage costs a unit
    /// even when no remote call completed
    pub charge_unprocessable: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            keyword_threshold: 0.8,
            charge_unprocessable: true,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            keyword_threshold: settings.keyword_threshold,
            charge_unprocessable: settings.charge_unprocessable,
        }
    }
}

/// Inputs of one organize-preview run
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub folder: &'a Path,
    pub categories: &'a CategorySet,
    /// Cache scope, see [`crate::account::cache_scope`]
    pub scope: &'a str,
    pub remote_enabled: bool,
    pub remote_budget: u32,
}

impl<'a> RunRequest<'a> {
    /// Local-only run in the given scope
    pub fn new(folder: &'a Path, categories: &'a CategorySet, scope: &'a str) -> Self {
        Self {
            folder,
            categories,
            scope,
            remote_enabled: false,
            remote_budget: 0,
        }
    }

    pub fn with_remote(mut self, budget: u32) -> Self {
        self.remote_enabled = true;
        self.remote_budget = budget;
        self
    }
}

/// Result of a run: one record per file, files grouped by category, and the
/// number of remote units consumed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizePlan {
    pub records: Vec<ClassificationRecord>,
    pub grouping: IndexMap<String, Vec<String>>,
    pub remote_calls_used: u32,
}

impl OrganizePlan {
    /// Replace the category of one record in place.
    ///
    /// Unprocessable records cannot be reassigned, and the new category must
    /// be in `categories` (or be the fallback bucket).
    pub fn override_category(
        &mut self,
        index: usize,
        new_category: &str,
        categories: &CategorySet,
    ) -> Result<()> {
        let resolved = if new_category.trim() == FALLBACK_CATEGORY {
            FALLBACK_CATEGORY.to_string()
        } else if new_category.trim() == UNPROCESSABLE_CATEGORY {
            return Err(FolioError::InvalidOverride(format!(
                "'{}' cannot be assigned manually",
                UNPROCESSABLE_CATEGORY
            )));
        } else {
            categories
                .find(new_category)
                .map(str::to_string)
                .ok_or_else(|| {
                    FolioError::InvalidOverride(format!("unknown category '{}'", new_category))
                })?
        };

        let record = self.records.get_mut(index).ok_or_else(|| {
            FolioError::InvalidOverride(format!("no record at index {}", index))
        })?;

        if record.is_unprocessable() {
            return Err(FolioError::InvalidOverride(format!(
                "'{}' could not be processed and cannot be reassigned",
                record.filename
            )));
        }

        if record.category != resolved {
            tracing::info!(
                "[Plan] Override '{}': {} -> {}",
                record.filename,
                record.category,
                resolved
            );
            record.category = resolved;
            record.method = ClassificationMethod::ManualOverride;
            record.confidence = CERTAIN;
            record.extension_redirect = false;
            self.grouping = build_grouping(&self.records, categories);
        }

        Ok(())
    }
}

/// Group filenames by category: every active category first (possibly
/// empty), in set order, then the fallback and unprocessable buckets if used.
pub fn build_grouping(
    records: &[ClassificationRecord],
    categories: &CategorySet,
) -> IndexMap<String, Vec<String>> {
    let mut grouping: IndexMap<String, Vec<String>> = categories
        .names()
        .map(|name| (name.to_string(), Vec::new()))
        .collect();

    for record in records {
        grouping
            .entry(record.category.clone())
            .or_default()
            .push(record.filename.clone());
    }

    grouping
}

/// What one file ended up as
#[derive(Debug, Clone)]
struct Decision {
    classification: Classification,
    method: ClassificationMethod,
    confidence: f32,
}

impl Decision {
    fn new(classification: Classification, method: ClassificationMethod, confidence: f32) -> Self {
        Self {
            classification,
            method,
            confidence,
        }
    }

    fn unprocessable() -> Self {
        Self::new(
            Classification::Unprocessable,
            ClassificationMethod::Unprocessable,
            0.0,
        )
    }
}

/// Text extraction is attempted at most once per file
enum TextState {
    NotTried,
    Usable(String),
    Unusable,
}

/// Runs the layered classification policy over a folder
pub struct Orchestrator {
    model: Arc<dyn SemanticModel>,
    extractor: Arc<dyn TextExtractor>,
    cache: ClassificationCache,
    gateway: Option<RemoteGateway>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn SemanticModel>,
        extractor: Arc<dyn TextExtractor>,
        cache: ClassificationCache,
    ) -> Self {
        Self {
            model,
            extractor,
            cache,
            gateway: None,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_remote(mut self, gateway: RemoteGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn gateway(&self) -> Option<&RemoteGateway> {
        self.gateway.as_ref()
    }

    /// Classify every regular file directly inside `request.folder`.
    ///
    /// Fails as a whole only when the folder is missing or the semantic
    /// model cannot embed the category descriptions.
    pub async fn run(
        &self,
        request: RunRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<OrganizePlan> {
        let categories = request.categories;

        let files = list_files(request.folder).inspect_err(|e| {
            tracing::error!("[Orchestrator] {}", e);
        })?;
        let total = files.len();

        let remote_enabled = request.remote_enabled && request.remote_budget > 0;
        if remote_enabled && self.gateway.is_none() {
            tracing::warn!("[Orchestrator] Remote classification requested but not configured");
        }
        let remote_enabled = remote_enabled && self.gateway.is_some();

        tracing::info!(
            "[Orchestrator] Classifying {} files in {} (remote: {}, budget: {})",
            total,
            request.folder.display(),
            remote_enabled,
            request.remote_budget
        );

        if total == 0 {
            return Ok(OrganizePlan {
                records: Vec::new(),
                grouping: build_grouping(&[], categories),
                remote_calls_used: 0,
            });
        }

        let embeddings = CategoryEmbeddings::build(self.model.as_ref(), categories)?;
        let mut cache_map = self.cache.load(request.scope);
        let mut cache_updated = false;
        let mut budget = RemoteBudget::new(if remote_enabled {
            request.remote_budget
        } else {
            0
        });

        let mut records = Vec::with_capacity(total);

        for (index, path) in files.iter().enumerate() {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let ext = extension_of(path);
            let fingerprint = fingerprint_file(path);

            let cached = fingerprint
                .as_ref()
                .and_then(|fp| cache_map.get(fp))
                .map(|name| {
                    Decision::new(
                        Classification::from_name(name),
                        ClassificationMethod::Cache,
                        CERTAIN,
                    )
                });

            let decision = match cached {
                Some(decision) => {
                    tracing::debug!("[Orchestrator] Cache hit for '{}'", filename);
                    decision
                }
                None => {
                    self.classify_uncached(
                        path,
                        &filename,
                        &ext,
                        categories,
                        &embeddings,
                        &mut budget,
                    )
                    .await
                }
            };

            let (classification, extension_redirect) =
                correct(decision.classification, &ext, categories);

            if decision.method.is_remote() {
                if let (Some(fp), Classification::Classified(name)) = (&fingerprint, &classification) {
                    if !extension_redirect {
                        remember(&mut cache_map, fp, name);
                        cache_updated = true;
                    }
                }
            }

            tracing::debug!(
                "[Orchestrator] '{}' -> {} via {}{}",
                filename,
                classification,
                decision.method,
                if extension_redirect { " (extension redirect)" } else { "" }
            );

            records.push(ClassificationRecord {
                filename: filename.clone(),
                category: classification.display_name().to_string(),
                method: decision.method,
                sequence_index: index,
                confidence: decision.confidence,
                extension_redirect,
            });

            progress.report(ProgressEvent {
                phase: ProgressPhase::Classifying,
                current: index + 1,
                total,
                current_file: Some(filename),
            });
        }

        if cache_updated {
            if let Err(e) = self.cache.save(request.scope, &cache_map) {
                tracing::warn!("[Orchestrator] Failed to save cache: {}", e);
            }
        }

        let grouping = build_grouping(&records, categories);

        tracing::info!(
            "[Orchestrator] Classified {} files, {} remote units used",
            records.len(),
            budget.used()
        );

        Ok(OrganizePlan {
            records,
            grouping,
            remote_calls_used: budget.used(),
        })
    }

    /// Remote stage (when budgeted) followed by the local chain
    async fn classify_uncached(
        &self,
        path: &Path,
        filename: &str,
        ext: &str,
        categories: &CategorySet,
        embeddings: &CategoryEmbeddings,
        budget: &mut RemoteBudget,
    ) -> Decision {
        let mut text = TextState::NotTried;

        if let Some(gateway) = self.gateway.as_ref().filter(|_| budget.has_remaining()) {
            let (decision, called) = self
                .remote_stage(gateway, path, filename, ext, categories, &mut text)
                .await;

            let unprocessable = decision
                .as_ref()
                .is_some_and(|d| d.classification.is_unprocessable());
            if called || (unprocessable && self.options.charge_unprocessable) {
                budget.charge();
            }

            if let Some(decision) = decision {
                return decision;
            }
            tracing::debug!("[Orchestrator] Remote gave no answer for '{}', using local", filename);
        }

        self.local_chain(path, filename, categories, embeddings, &mut text)
    }

    /// Returns the accepted decision (if any) and whether a remote call completed
    async fn remote_stage(
        &self,
        gateway: &RemoteGateway,
        path: &Path,
        filename: &str,
        ext: &str,
        categories: &CategorySet,
        text: &mut TextState,
    ) -> (Option<Decision>, bool) {
        let mut called = false;

        if is_native_extension(ext) {
            match gateway.classify_file(path, categories).await {
                Ok(outcome) => {
                    called |= matches!(outcome, RemoteOutcome::Decided { .. });
                    if let Some((name, confidence)) = outcome.accepted() {
                        return (
                            Some(Decision::new(
                                Classification::Classified(name.to_string()),
                                ClassificationMethod::RemoteFile,
                                confidence,
                            )),
                            true,
                        );
                    }
                }
                Err(e) => {
                    called |= !e.is_local();
                    tracing::warn!("[Orchestrator] File upload failed for '{}': {}", filename, e);
                }
            }
        }

        let content = match self.extract(path, text) {
            Some(content) => content,
            None => return (Some(Decision::unprocessable()), called),
        };

        match gateway.classify_text(&content, categories).await {
            Ok(outcome) => {
                called |= matches!(outcome, RemoteOutcome::Decided { .. });
                if let Some((name, confidence)) = outcome.accepted() {
                    return (
                        Some(Decision::new(
                            Classification::Classified(name.to_string()),
                            ClassificationMethod::RemoteText,
                            confidence,
                        )),
                        true,
                    );
                }
            }
            Err(e) => {
                called |= !e.is_local();
                tracing::warn!("[Orchestrator] Text classification failed for '{}': {}", filename, e);
            }
        }

        (None, called)
    }

    fn local_chain(
        &self,
        path: &Path,
        filename: &str,
        categories: &CategorySet,
        embeddings: &CategoryEmbeddings,
        text: &mut TextState,
    ) -> Decision {
        let (by_name, confidence) = filename::classify(filename, categories);
        if confidence > self.options.keyword_threshold {
            return Decision::new(by_name, ClassificationMethod::FilenameKeyword, confidence);
        }

        let Some(content) = self.extract(path, text) else {
            return Decision::unprocessable();
        };

        match semantic::classify(&content, self.model.as_ref(), embeddings) {
            Ok((classification, confidence)) => {
                Decision::new(classification, ClassificationMethod::LocalEmbedding, confidence)
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] Embedding failed for '{}': {}", filename, e);
                Decision::new(Classification::Unmatched, ClassificationMethod::LocalEmbedding, 0.0)
            }
        }
    }

    /// Extract text once per file; `None` when there is no usable text
    fn extract(&self, path: &Path, state: &mut TextState) -> Option<String> {
        if let TextState::NotTried = state {
            *state = match self.extractor.extract(path) {
                Ok(text) if !text.trim().is_empty() => TextState::Usable(text),
                Ok(_) => TextState::Unusable,
                Err(e) => {
                    tracing::debug!("[Orchestrator] No text from {}: {}", path.display(), e);
                    TextState::Unusable
                }
            };
        }

        match state {
            TextState::Usable(text) => Some(text.clone()),
            _ => None,
        }
    }
}

/// Enforce category closure, then redirect unmatched images/videos.
///
/// Returns the corrected classification and whether a redirect happened.
fn correct(classification: Classification, ext: &str, categories: &CategorySet) -> (Classification, bool) {
    let classification = match classification {
        Classification::Classified(name) => match categories.find(&name) {
            Some(stored) if stored == FALLBACK_CATEGORY => Classification::Unmatched,
            Some(stored) => Classification::Classified(stored.to_string()),
            None => {
                tracing::debug!("[Orchestrator] '{}' is not an active category", name);
                Classification::Unmatched
            }
        },
        other => other,
    };

    if classification != Classification::Unmatched {
        return (classification, false);
    }

    let redirect = if is_image_extension(ext) {
        categories.find(IMAGES_CATEGORY)
    } else if is_video_extension(ext) {
        categories.find(VIDEOS_CATEGORY)
    } else {
        None
    };

    match redirect {
        Some(name) => (Classification::Classified(name.to_string()), true),
        None => (classification, false),
    }
}

fn remember(cache_map: &mut CacheMap, fingerprint: &Fingerprint, category: &str) {
    cache_map.insert(fingerprint.clone(), category.to_string());
}

/// Regular files directly inside `folder`, sorted by name
pub fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(FolioError::FolderNotFound(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => tracing::warn!("[Orchestrator] Skipping unreadable entry: {}", e),
        }
    }

    Ok(files)
}

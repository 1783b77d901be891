//! Budget-free half of remote classification: builds payloads, applies the
//! retry policy, and interprets responses. Budget accounting is the
//! orchestrator's job.

use std::path::Path;
use std::sync::Arc;

use super::{RemoteClassifier, RemoteError, RemoteVerdict, RetryPolicy};
use crate::categories::{CategorySet, Classification};
use crate::extract::{extension_of, is_image_extension, is_video_extension};

/// Texts shorter than this (in chars, after trimming) are not sent
pub const MIN_REMOTE_TEXT_CHARS: usize = 10;

/// Result of one gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// The remote service answered
    Decided {
        classification: Classification,
        confidence: f32,
    },
    /// Nothing was sent
    Skipped,
}

impl RemoteOutcome {
    fn unmatched() -> Self {
        Self::Decided {
            classification: Classification::Unmatched,
            confidence: 0.0,
        }
    }

    /// The accepted category, if the remote produced a real one
    pub fn accepted(&self) -> Option<(&str, f32)> {
        match self {
            Self::Decided {
                classification: Classification::Classified(name),
                confidence,
            } => Some((name.as_str(), *confidence)),
            _ => None,
        }
    }
}

/// File types the remote classifier consumes directly
pub fn is_native_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("pdf") || is_image_extension(ext) || is_video_extension(ext)
}

/// MIME type sent alongside an uploaded file
pub fn mime_type_for(ext: &str) -> String {
    let ext = ext.to_lowercase();
    if ext == "jpg" || ext == "jpeg" {
        "image/jpeg".to_string()
    } else if is_image_extension(&ext) {
        format!("image/{}", ext)
    } else if is_video_extension(&ext) {
        format!("video/{}", ext)
    } else if ext == "pdf" {
        "application/pdf".to_string()
    } else {
        mime_guess::from_ext(&ext)
            .first_raw()
            .map(str::to_string)
            .unwrap_or_else(|| format!("application/{}", ext))
    }
}

/// Remote classification with retries and soft-failure handling
#[derive(Clone)]
pub struct RemoteGateway {
    client: Arc<dyn RemoteClassifier>,
    retry: RetryPolicy,
    default_confidence: f32,
}

impl RemoteGateway {
    pub fn new(client: Arc<dyn RemoteClassifier>, retry: RetryPolicy, default_confidence: f32) -> Self {
        Self {
            client,
            retry,
            default_confidence,
        }
    }

    /// Send the raw file.
    ///
    /// Malformed or category-less responses are a soft `Unmatched`; other
    /// failures, including exhausted retries, are returned to the caller.
    pub async fn classify_file(
        &self,
        path: &Path,
        categories: &CategorySet,
    ) -> Result<RemoteOutcome, RemoteError> {
        let data = tokio::fs::read(path).await?;
        let mime_type = mime_type_for(&extension_of(path));
        let label = format!("classify_file({})", file_label(path));

        let result = self
            .retry
            .run(&label, || {
                self.client
                    .classify_file(&data, &mime_type, categories)
            })
            .await;

        self.interpret(&label, result)
    }

    /// Send extracted text. Text shorter than [`MIN_REMOTE_TEXT_CHARS`] is skipped.
    pub async fn classify_text(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<RemoteOutcome, RemoteError> {
        if text.trim().chars().count() < MIN_REMOTE_TEXT_CHARS {
            tracing::debug!("[RemoteGateway] Text too short for remote classification");
            return Ok(RemoteOutcome::Skipped);
        }

        let label = "classify_text";
        let result = self
            .retry
            .run(label, || self.client.classify_text(text, categories))
            .await;

        self.interpret(label, result)
    }

    /// Ask the remote service to describe a category
    pub async fn describe_category(&self, name: &str) -> Result<String, RemoteError> {
        let label = format!("describe_category({})", name);
        self.retry
            .run(&label, || self.client.describe_category(name))
            .await
    }

    fn interpret(
        &self,
        label: &str,
        result: Result<RemoteVerdict, RemoteError>,
    ) -> Result<RemoteOutcome, RemoteError> {
        match result {
            Ok(RemoteVerdict {
                category: Some(category),
                confidence,
                ..
            }) if !category.trim().is_empty() => Ok(RemoteOutcome::Decided {
                classification: Classification::from_name(&category),
                confidence: confidence
                    .unwrap_or(self.default_confidence)
                    .clamp(0.0, 1.0),
            }),
            Ok(verdict) => {
                tracing::warn!(
                    "[RemoteGateway] {} returned no category: {}",
                    label,
                    verdict.error.as_deref().unwrap_or("empty response")
                );
                Ok(RemoteOutcome::unmatched())
            }
            Err(RemoteError::MalformedResponse(msg)) => {
                tracing::warn!("[RemoteGateway] {} returned malformed response: {}", label, msg);
                Ok(RemoteOutcome::unmatched())
            }
            Err(e) => Err(e),
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

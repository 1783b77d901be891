//! Remote classifier client
//!
//! Talks to three serverless functions under `{base_url}/functions/v1/`:
//! - `classify-document-file`: raw file as base64 plus the taxonomy
//! - `classify-document-gemini`: extracted text plus the taxonomy
//! - `generate-category-description`: description suggestion for a category name

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::RemoteError;
use crate::categories::CategorySet;
use crate::config::Settings;

const FILE_FUNCTION: &str = "classify-document-file";
const TEXT_FUNCTION: &str = "classify-document-gemini";
const DESCRIBE_FUNCTION: &str = "generate-category-description";

/// Body returned by the classification functions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerdict {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One attempt per call; retries belong to the caller
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify_file(
        &self,
        file_data: &[u8],
        mime_type: &str,
        categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError>;

    async fn classify_text(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError>;

    /// Suggest a description for a new category
    async fn describe_category(&self, name: &str) -> Result<String, RemoteError>;
}

#[derive(Serialize)]
struct FileRequest<'a> {
    file_data_base64: String,
    mime_type: &'a str,
    categories: &'a CategorySet,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    document_text: &'a str,
    categories: &'a CategorySet,
}

#[derive(Serialize)]
struct DescribeRequest<'a> {
    category_name: &'a str,
}

#[derive(Deserialize)]
struct DescribeResponse {
    description: Option<String>,
    error: Option<String>,
}

/// HTTP client for the serverless classification functions
pub struct HttpRemoteClassifier {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpRemoteClassifier {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
                connect: false,
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build a client when both URL and key are configured
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, RemoteError> {
        match (&settings.remote_url, &settings.remote_key) {
            (Some(url), Some(key)) => Self::new(url, key, settings.remote_timeout).map(Some),
            _ => Ok(None),
        }
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    /// POST a JSON body and decode a JSON response, mapping statuses to errors
    async fn post<B, R>(&self, function: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.function_url(function))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(e, self.timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RemoteError::from_reqwest(e, self.timeout))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body: text,
            });
        }
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            RemoteError::MalformedResponse(format!("{}. Content: {}", e, preview(&text)))
        })
    }
}

#[async_trait]
impl RemoteClassifier for HttpRemoteClassifier {
    async fn classify_file(
        &self,
        file_data: &[u8],
        mime_type: &str,
        categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError> {
        let request = FileRequest {
            file_data_base64: base64::engine::general_purpose::STANDARD.encode(file_data),
            mime_type,
            categories,
        };
        self.post(FILE_FUNCTION, &request).await
    }

    async fn classify_text(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError> {
        let request = TextRequest {
            document_text: text,
            categories,
        };
        self.post(TEXT_FUNCTION, &request).await
    }

    async fn describe_category(&self, name: &str) -> Result<String, RemoteError> {
        let response: DescribeResponse = self
            .post(DESCRIBE_FUNCTION, &DescribeRequest { category_name: name })
            .await?;

        match (response.description, response.error) {
            (Some(description), _) if !description.trim().is_empty() => {
                Ok(description.trim().to_string())
            }
            (_, Some(error)) => Err(RemoteError::MalformedResponse(error)),
            _ => Err(RemoteError::MalformedResponse(
                "response has no description".to_string(),
            )),
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

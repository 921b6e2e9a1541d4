use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::media::VisualAsset;
use crate::plan::Metadata;

pub mod elevenlabs;
pub mod gemini;
pub mod google_tts;
pub mod openai;
pub mod pexels;
pub mod twitter;
pub mod youtube;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub json_output: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError>;
}

#[async_trait]
pub trait VisualSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch an image or clip for `keyword` into `dest_dir`. Clips should last at least
    /// `min_duration`; the asset is not yet fitted to the vertical frame.
    async fn fetch(
        &self,
        keyword: &str,
        min_duration: Duration,
        dest_dir: &Path,
    ) -> Result<VisualAsset, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Text(String),
    Video { path: PathBuf, duration: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishStatus {
    Published,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub platform_id: String,
    pub status: PublishStatus,
    pub error: Option<String>,
}

impl PublishResult {
    pub fn published(platform_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            status: PublishStatus::Published,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            platform_id: String::new(),
            status: PublishStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(
        &self,
        artifact: &Artifact,
        metadata: &Metadata,
    ) -> Result<PublishResult, CollaboratorError>;
}

pub(crate) async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CollaboratorError::from_status(service, status, &body))
}

pub(crate) async fn read_json(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<serde_json::Value, CollaboratorError> {
    let text = resp
        .text()
        .await
        .map_err(|e| CollaboratorError::transport(service, &e))?;
    serde_json::from_str(&text).map_err(|e| CollaboratorError::malformed(service, e.to_string()))
}

pub(crate) async fn write_bytes(
    service: &'static str,
    path: &Path,
    bytes: &[u8],
) -> Result<(), CollaboratorError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CollaboratorError::io(service, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| CollaboratorError::io(service, e))
}

use crate::api::{Artifact, PublishResult, Publisher, check_status, read_json};
use crate::config::Visibility;
use crate::error::CollaboratorError;
use crate::plan::Metadata;
use crate::{logi, logok};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::LOCATION;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "youtube";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const MAX_TAGS_CHARS: usize = 500;

pub struct YouTubePublisher {
    client: Client,
    access_token: String,
    visibility: Visibility,
    category_id: String,
}

impl YouTubePublisher {
    pub fn new(
        client: Client,
        access_token: String,
        visibility: Visibility,
        category_id: String,
    ) -> Self {
        Self {
            client,
            access_token,
            visibility,
            category_id,
        }
    }

    fn video_resource(&self, metadata: &Metadata) -> serde_json::Value {
        // The API caps the combined tag length.
        let mut tags = Vec::new();
        let mut used = 0;
        for tag in &metadata.tags {
            let cost = tag.chars().count() + 1;
            if used + cost > MAX_TAGS_CHARS {
                break;
            }
            used += cost;
            tags.push(tag.as_str());
        }

        json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": tags,
                "categoryId": self.category_id,
            },
            "status": {
                "privacyStatus": self.visibility.as_str(),
                "selfDeclaredMadeForKids": false,
            },
        })
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn publish(
        &self,
        artifact: &Artifact,
        metadata: &Metadata,
    ) -> Result<PublishResult, CollaboratorError> {
        let Artifact::Video { path, .. } = artifact else {
            return Err(CollaboratorError::rejected(
                SERVICE,
                "only video artifacts can be uploaded",
            ));
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CollaboratorError::io(SERVICE, e))?;

        logi(format!(
            "Starting resumable upload ({} bytes): {}",
            bytes.len(),
            metadata.title
        ));
        let session = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", bytes.len())
            .json(&self.video_resource(metadata))
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;
        let session = check_status(SERVICE, session).await?;

        let upload_url = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no upload session location"))?;

        let resp = self
            .client
            .put(&upload_url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .timeout(Duration::from_secs(1800))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        let id = root
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "upload response has no id"))?;

        logok(format!("Uploaded video id {id}"));
        Ok(PublishResult::published(id))
    }
}

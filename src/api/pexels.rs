use crate::api::{VisualSource, check_status, write_bytes};
use crate::error::CollaboratorError;
use crate::media::{TARGET_HEIGHT, VisualAsset, VisualKind, VisualOrigin};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const SERVICE: &str = "pexels";
const SEARCH_URL: &str = "https://api.pexels.com/videos/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    duration: u64,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    #[serde(default)]
    file_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Best mp4 rendition among videos long enough: portrait first, then tallest
/// file not exceeding the target height.
fn pick_file(videos: &[Video], min_secs: u64) -> Option<&VideoFile> {
    videos
        .iter()
        .filter(|v| v.duration >= min_secs)
        .flat_map(|v| v.video_files.iter())
        .filter(|f| f.file_type == "video/mp4")
        .filter(|f| f.height.unwrap_or(0) <= TARGET_HEIGHT)
        .max_by_key(|f| {
            let (w, h) = (f.width.unwrap_or(0), f.height.unwrap_or(0));
            (h >= w, h)
        })
}

pub struct PexelsSource {
    client: Client,
    api_key: String,
}

impl PexelsSource {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl VisualSource for PexelsSource {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn fetch(
        &self,
        keyword: &str,
        min_duration: Duration,
        dest_dir: &Path,
    ) -> Result<VisualAsset, CollaboratorError> {
        let resp = self
            .client
            .get(SEARCH_URL)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", keyword),
                ("orientation", "portrait"),
                ("per_page", "15"),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let search: SearchResponse = check_status(SERVICE, resp)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;

        let min_secs = min_duration.as_secs_f64().ceil() as u64;
        let file = pick_file(&search.videos, min_secs).ok_or_else(|| {
            CollaboratorError::Unavailable {
                service: SERVICE,
                detail: format!("no clip of at least {min_secs}s for '{keyword}'"),
            }
        })?;

        let bytes = self
            .client
            .get(&file.link)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;
        let bytes = check_status(SERVICE, bytes)
            .await?
            .bytes()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let path = dest_dir.join("stock.mp4");
        write_bytes(SERVICE, &path, &bytes).await?;
        Ok(VisualAsset {
            path,
            kind: VisualKind::Video,
            origin: VisualOrigin::Stock,
        })
    }
}

use crate::api::{GenerationRequest, TextGenerator, VisualSource, check_status, read_json, write_bytes};
use crate::error::CollaboratorError;
use crate::logw;
use crate::media::{VisualAsset, VisualKind, VisualOrigin};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const SERVICE: &str = "openai";
const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";

fn extract_output_text(root: &serde_json::Value) -> Option<String> {
    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            let text = entry.get("text").and_then(|v| v.as_str());
            if let (Some("output_text"), Some(text)) = (typ, text) {
                return Some(text.to_string());
            }
        }
    }

    None
}

pub struct OpenAiText {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiText {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiText {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        let mut body = json!({
            "model": self.model,
            "input": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
        });
        if request.json_output {
            body["text"] = json!({"format": {"type": "json_object"}});
        }

        let resp = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        extract_output_text(&root)
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no output_text in response"))
    }
}

pub struct OpenAiImage {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiImage {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl VisualSource for OpenAiImage {
    fn name(&self) -> &'static str {
        "openai-image"
    }

    async fn fetch(
        &self,
        keyword: &str,
        _min_duration: Duration,
        dest_dir: &Path,
    ) -> Result<VisualAsset, CollaboratorError> {
        let body = json!({
            "model": self.model,
            "prompt": format!(
                "Photorealistic vertical close-up of a {keyword} resting on the steel teeth of an industrial shredder, dramatic studio lighting, no text"
            ),
            "size": "1024x1536",
            "n": 1,
        });

        let resp = self
            .client
            .post(IMAGES_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        let b64 = root
            .pointer("/data/0/b64_json")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no b64_json image in response"))?;
        let bytes = STANDARD
            .decode(b64)
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;

        let path = dest_dir.join("generated.png");
        write_bytes(SERVICE, &path, &bytes).await?;
        Ok(VisualAsset {
            path,
            kind: VisualKind::Image,
            origin: VisualOrigin::Generated,
        })
    }
}

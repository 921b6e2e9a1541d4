use crate::api::{GenerationRequest, TextGenerator, check_status, read_json};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

fn extract_candidate_text(root: &serde_json::Value) -> Option<String> {
    let parts = root.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

pub struct GeminiText {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiText {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiText {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": request.system}]},
            "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        });
        if request.json_output {
            body["generationConfig"] = json!({"responseMimeType": "application/json"});
        }

        let resp = self
            .client
            .post(format!("{BASE_URL}/{}:generateContent", self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        if let Some(reason) = root
            .pointer("/promptFeedback/blockReason")
            .and_then(|v| v.as_str())
        {
            return Err(CollaboratorError::rejected(
                SERVICE,
                format!("prompt blocked: {reason}"),
            ));
        }
        extract_candidate_text(&root)
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no candidate text"))
    }
}

use crate::api::{SpeechSynthesizer, check_status};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const SERVICE: &str = "elevenlabs";

pub struct ElevenLabsVoice {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsVoice {
    pub fn new(client: Client, api_key: String, voice_id: String, model_id: String) -> Self {
        Self {
            client,
            api_key,
            voice_id,
            model_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsVoice {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice_id
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let bytes = check_status(SERVICE, resp)
            .await?
            .bytes()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;
        if bytes.is_empty() {
            return Err(CollaboratorError::malformed(SERVICE, "empty audio body"));
        }
        Ok(bytes.to_vec())
    }
}

use crate::api::{SpeechSynthesizer, check_status, read_json};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "google-tts";
const SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

pub struct GoogleTtsVoice {
    client: Client,
    api_key: String,
    language_code: String,
    voice_name: String,
    speaking_rate: f32,
}

impl GoogleTtsVoice {
    pub fn new(
        client: Client,
        api_key: String,
        language_code: String,
        voice_name: String,
        speaking_rate: f32,
    ) -> Self {
        Self {
            client,
            api_key,
            language_code,
            voice_name,
            speaking_rate,
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "input": {"text": text},
            "voice": {"languageCode": self.language_code, "name": self.voice_name},
            "audioConfig": {"audioEncoding": "MP3", "speakingRate": self.speaking_rate},
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsVoice {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError> {
        let resp = self
            .client
            .post(SYNTHESIZE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(text))
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        let audio = root
            .get("audioContent")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no audioContent"))?;
        STANDARD
            .decode(audio)
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_voice_parameters() {
        let voice = GoogleTtsVoice::new(
            Client::new(),
            "k".into(),
            "en-US".into(),
            "en-US-Standard-C".into(),
            1.15,
        );
        let body = voice.request_body("hello");
        assert_eq!(body["input"]["text"], "hello");
        assert_eq!(body["voice"]["name"], "en-US-Standard-C");
        assert_eq!(body["audioConfig"]["audioEncoding"], "MP3");
    }
}

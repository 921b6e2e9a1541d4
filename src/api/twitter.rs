use crate::api::{Artifact, PublishResult, Publisher, check_status, read_json};
use crate::error::CollaboratorError;
use crate::plan::Metadata;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "twitter";
const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

/// Cut `text` to `max_chars`, ending with "..." when anything was removed.
pub fn fit_post(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub struct TwitterPublisher {
    client: Client,
    bearer_token: String,
    max_chars: usize,
}

impl TwitterPublisher {
    pub fn new(client: Client, bearer_token: String, max_chars: usize) -> Self {
        Self {
            client,
            bearer_token,
            max_chars,
        }
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn publish(
        &self,
        artifact: &Artifact,
        _metadata: &Metadata,
    ) -> Result<PublishResult, CollaboratorError> {
        let Artifact::Text(text) = artifact else {
            return Err(CollaboratorError::rejected(
                SERVICE,
                "only text artifacts can be posted",
            ));
        };

        let text = fit_post(text, self.max_chars);
        let resp = self
            .client
            .post(TWEETS_URL)
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "text": text }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CollaboratorError::transport(SERVICE, &e))?;

        let root = read_json(SERVICE, check_status(SERVICE, resp).await?).await?;
        let id = root
            .pointer("/data/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "post response has no id"))?;
        Ok(PublishResult::published(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_posts_pass_through() {
        assert_eq!(fit_post("  hello  ", 280), "hello");
    }

    #[test]
    fn long_posts_are_cut_with_ellipsis() {
        let long = "a".repeat(300);
        let out = fit_post(&long, 280);
        assert_eq!(out.chars().count(), 280);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..277], &long[..277]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(280);
        assert_eq!(fit_post(&text, 280), text);
    }
}

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::plan::ActionBounds;
use crate::topics::TopicPool;

/// Where a credential lives. Inline secrets are not representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRef {
    Env(String),
    File(PathBuf),
}

impl SecretRef {
    pub fn resolve(&self) -> Result<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        let value = match self {
            Self::Env(name) => lookup(name)
                .with_context(|| format!("environment variable {name} is not set"))?,
            Self::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read secret file {}", path.display()))?,
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            bail!("secret {} is empty", self.describe());
        }
        Ok(value)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Env(name) => format!("env:{name}"),
            Self::File(path) => format!("file:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Continuous,
    SingleShot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    #[default]
    Shorts,
    Post,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum TextProvider {
    Openai {
        api_key: SecretRef,
        #[serde(default = "default_openai_model")]
        model: String,
    },
    Gemini {
        api_key: SecretRef,
        #[serde(default = "default_gemini_model")]
        model: String,
    },
}

fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_text_provider() -> TextProvider {
    TextProvider::Openai {
        api_key: SecretRef::Env("OPENAI_API_KEY".to_string()),
        model: default_openai_model(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum VoiceProvider {
    Elevenlabs {
        api_key: SecretRef,
        #[serde(default = "default_voice_id")]
        voice_id: String,
        #[serde(default = "default_model_id")]
        model_id: String,
    },
    GoogleTts {
        api_key: SecretRef,
        #[serde(default = "default_language_code")]
        language_code: String,
        #[serde(default = "default_voice_name")]
        voice_name: String,
        #[serde(default = "default_speaking_rate")]
        speaking_rate: f32,
    },
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_voice_name() -> String {
    "en-US-Standard-C".to_string()
}

fn default_speaking_rate() -> f32 {
    1.15
}

fn default_voices() -> Vec<VoiceProvider> {
    vec![
        VoiceProvider::Elevenlabs {
            api_key: SecretRef::Env("ELEVENLABS_API_KEY".to_string()),
            voice_id: default_voice_id(),
            model_id: default_model_id(),
        },
        VoiceProvider::GoogleTts {
            api_key: SecretRef::Env("GOOGLE_TTS_API_KEY".to_string()),
            language_code: default_language_code(),
            voice_name: default_voice_name(),
            speaking_rate: default_speaking_rate(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VisualProvider {
    OpenaiImage {
        api_key: SecretRef,
        #[serde(default = "default_image_model")]
        model: String,
    },
    Pexels {
        api_key: SecretRef,
    },
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_visuals() -> Vec<VisualProvider> {
    vec![VisualProvider::Pexels {
        api_key: SecretRef::Env("PEXELS_API_KEY".to_string()),
    }]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PublisherConfig {
    Youtube {
        access_token: SecretRef,
        #[serde(default)]
        visibility: Visibility,
        #[serde(default = "default_category_id")]
        category_id: String,
    },
    Twitter {
        bearer_token: SecretRef,
        #[serde(default = "default_max_chars")]
        max_chars: usize,
    },
}

fn default_category_id() -> String {
    "22".to_string()
}

fn default_max_chars() -> usize {
    280
}

fn default_publisher() -> PublisherConfig {
    PublisherConfig::Youtube {
        access_token: SecretRef::Env("YOUTUBE_ACCESS_TOKEN".to_string()),
        visibility: Visibility::default(),
        category_id: default_category_id(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(flatten)]
    pub pool: TopicPool,
    #[serde(default = "default_avoid_repeat")]
    pub avoid_repeat: usize,
    #[serde(default)]
    pub news_feed: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
}

fn default_avoid_repeat() -> usize {
    20
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            pool: TopicPool::default(),
            avoid_repeat: default_avoid_repeat(),
            news_feed: None,
            persona: None,
        }
    }
}

const MAX_BLOCK_SECS: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryboardConfig {
    pub hook_secs: f64,
    pub reveal_secs: f64,
    pub default_action_secs: f64,
    pub min_action_secs: f64,
    pub max_action_secs: f64,
    pub music_volume: f32,
}

impl Default for StoryboardConfig {
    fn default() -> Self {
        Self {
            hook_secs: 2.5,
            reveal_secs: 2.0,
            default_action_secs: 5.0,
            min_action_secs: 1.0,
            max_action_secs: 30.0,
            music_volume: 0.15,
        }
    }
}

impl StoryboardConfig {
    pub fn action_bounds(&self) -> ActionBounds {
        ActionBounds {
            default_secs: self.default_action_secs,
            min_secs: self.min_action_secs,
            max_secs: self.max_action_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub error_cooldown_secs: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 12_600,
            jitter_secs: 900,
            rate_limit_cooldown_secs: 1_800,
            error_cooldown_secs: 300,
        }
    }
}

impl CadenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub deployment: Deployment,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_music_dir")]
    pub music_dir: Option<PathBuf>,
    #[serde(default = "default_placeholder")]
    pub placeholder_visual: PathBuf,
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub history_log: Option<PathBuf>,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default = "default_text_provider")]
    pub text: TextProvider,
    #[serde(default = "default_voices")]
    pub voices: Vec<VoiceProvider>,
    #[serde(default = "default_visuals")]
    pub visuals: Vec<VisualProvider>,
    #[serde(default)]
    pub storyboard: StoryboardConfig,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default = "default_publisher")]
    pub publisher: PublisherConfig,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_music_dir() -> Option<PathBuf> {
    Some(PathBuf::from("backgroundmusic"))
}

fn default_placeholder() -> PathBuf {
    PathBuf::from("resources/placeholder.png")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            deployment: Deployment::default(),
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            music_dir: default_music_dir(),
            placeholder_visual: default_placeholder(),
            font_file: None,
            log_file: None,
            history_log: None,
            topics: TopicsConfig::default(),
            text: default_text_provider(),
            voices: default_voices(),
            visuals: default_visuals(),
            storyboard: StoryboardConfig::default(),
            cadence: CadenceConfig::default(),
            publisher: default_publisher(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid config: {}", path.as_ref().display()))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topics.pool.is_empty() && self.topics.news_feed.is_none() {
            bail!("topics: at least one subject or a news_feed is required");
        }
        let sb = &self.storyboard;
        if sb.hook_secs <= 0.0 || sb.reveal_secs <= 0.0 {
            bail!("storyboard: hook_secs and reveal_secs must be positive");
        }
        if sb.min_action_secs <= 0.0 || sb.min_action_secs > sb.max_action_secs {
            bail!("storyboard: action bounds are inverted or non-positive");
        }
        if [sb.hook_secs, sb.reveal_secs, sb.max_action_secs]
            .iter()
            .any(|secs| !secs.is_finite() || *secs > MAX_BLOCK_SECS)
        {
            bail!("storyboard: block lengths must not exceed {MAX_BLOCK_SECS} seconds");
        }
        if !(sb.min_action_secs..=sb.max_action_secs).contains(&sb.default_action_secs) {
            bail!("storyboard: default_action_secs outside action bounds");
        }
        if !(0.0..=1.0).contains(&sb.music_volume) {
            bail!("storyboard: music_volume must be within 0.0..=1.0");
        }
        if self.cadence.jitter_secs >= self.cadence.interval_secs {
            bail!("cadence: jitter_secs must be smaller than interval_secs");
        }
        match (&self.deployment, &self.publisher) {
            (Deployment::Shorts, PublisherConfig::Twitter { .. }) => {
                bail!("deployment shorts needs a video publisher (youtube)")
            }
            (Deployment::Post, PublisherConfig::Youtube { .. }) => {
                bail!("deployment post needs a text publisher (twitter)")
            }
            _ => {}
        }
        if let PublisherConfig::Twitter { max_chars, .. } = &self.publisher {
            if *max_chars < 4 {
                bail!("publisher: max_chars too small");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::Selection;

    #[test]
    fn empty_object_is_a_valid_config() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.cadence.rate_limit_cooldown(), Duration::from_secs(1800));
        assert_eq!(cfg.storyboard.music_volume, 0.15);
    }

    #[test]
    fn parses_full_post_deployment() {
        let cfg = Config::from_json(
            r#"{
                "mode": "single_shot",
                "deployment": "post",
                "topics": {
                    "selection": "round_robin",
                    "categories": [{"name": "Bollywood", "subjects": ["Box Office"]}],
                    "news_feed": "https://example.com/rss",
                    "persona": "sarcastic film critic"
                },
                "text": {"provider": "gemini", "api_key": {"env": "GEMINI_API_KEY"}},
                "publisher": {"platform": "twitter", "bearer_token": {"file": "/run/secrets/x"}}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, RunMode::SingleShot);
        assert_eq!(cfg.topics.pool.selection, Selection::RoundRobin);
        assert!(matches!(cfg.text, TextProvider::Gemini { ref model, .. } if model == "gemini-1.5-flash"));
        assert!(matches!(cfg.publisher, PublisherConfig::Twitter { max_chars: 280, .. }));
    }

    #[test]
    fn inline_secrets_are_rejected() {
        let err = Config::from_json(
            r#"{"text": {"provider": "openai", "api_key": "sk-live-123"}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn mismatched_publisher_is_rejected() {
        let err = Config::from_json(
            r#"{"publisher": {"platform": "twitter", "bearer_token": {"env": "X"}}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn secret_resolution_uses_lookup() {
        let secret = SecretRef::Env("TOKEN".to_string());
        let value = secret
            .resolve_with(|name| (name == "TOKEN").then(|| " abc \n".to_string()))
            .unwrap();
        assert_eq!(value, "abc");
        assert!(secret.resolve_with(|_| None).is_err());
        assert!(secret.resolve_with(|_| Some("  ".into())).is_err());
    }

    #[test]
    fn secret_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "from-file\n").unwrap();
        let value = SecretRef::File(path).resolve().unwrap();
        assert_eq!(value, "from-file");
    }

    #[test]
    fn oversized_storyboard_blocks_are_rejected() {
        for field in ["hook_secs", "reveal_secs", "max_action_secs"] {
            let json = format!(r#"{{"storyboard": {{"{field}": 1e30}}}}"#);
            assert!(Config::from_json(&json).is_err(), "{field}");
        }
        assert!(Config::from_json(r#"{"storyboard": {"hook_secs": 600}}"#).is_ok());
    }
}

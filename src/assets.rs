use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::api::{SpeechSynthesizer, VisualSource};
use crate::error::AssetError;
use crate::media::{MediaToolkit, NarrationAsset, NarrationSource, VisualAsset, VisualKind, VisualOrigin};
use crate::{loge, logi, logok, logw};

pub struct AssetProvider {
    voices: Vec<Box<dyn SpeechSynthesizer>>,
    visuals: Vec<Box<dyn VisualSource>>,
    placeholder: PathBuf,
    music_dir: Option<PathBuf>,
    media: Arc<dyn MediaToolkit>,
    work_dir: PathBuf,
}

impl AssetProvider {
    pub fn new(
        voices: Vec<Box<dyn SpeechSynthesizer>>,
        visuals: Vec<Box<dyn VisualSource>>,
        placeholder: PathBuf,
        media: Arc<dyn MediaToolkit>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            voices,
            visuals,
            placeholder,
            music_dir: None,
            media,
            work_dir,
        }
    }

    pub fn with_music_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.music_dir = dir;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Narration for `text`, never absent: premium voice, then fallbacks, then one second of silence.
    pub async fn narrate(&self, text: &str, label: &str) -> NarrationAsset {
        if text.trim().is_empty() {
            return NarrationAsset::silence();
        }

        let out = self.work_dir.join(format!("narration_{label}.mp3"));
        for voice in &self.voices {
            let bytes = match voice.synthesize(text).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    logw(format!("Voice {} failed for {label}: {err}", voice.name()));
                    continue;
                }
            };
            if let Err(err) = write_file(&out, &bytes).await {
                logw(format!("Could not store narration {}: {err}", out.display()));
                continue;
            }
            match self.media.probe_duration(&out).await {
                Ok(duration) => {
                    logok(format!(
                        "Narration {label} via {} ({:.2}s)",
                        voice.name(),
                        duration.as_secs_f64()
                    ));
                    return NarrationAsset {
                        source: NarrationSource::Audio(out),
                        duration,
                    };
                }
                Err(err) => {
                    logw(format!("Unreadable narration from {}: {err:#}", voice.name()));
                }
            }
        }

        logw(format!("All voices failed for {label}; using silence"));
        NarrationAsset::silence()
    }

    /// Visual for `keyword` fitted to the vertical frame: generated, stock, then the local placeholder.
    pub async fn visualize(
        &self,
        keyword: &str,
        min_duration: Duration,
    ) -> Result<VisualAsset, AssetError> {
        let raw_dir = self.work_dir.join("raw");
        for source in &self.visuals {
            logi(format!("Requesting visual from {} for '{keyword}'", source.name()));
            let raw = match source.fetch(keyword, min_duration, &raw_dir).await {
                Ok(raw) => raw,
                Err(err) => {
                    logw(format!("Visual source {} failed: {err}", source.name()));
                    continue;
                }
            };
            match self.media.fit_vertical(&raw, &self.work_dir).await {
                Ok(fitted) => {
                    logok(format!("Visual ready from {}: {}", source.name(), fitted.path.display()));
                    return Ok(fitted);
                }
                Err(err) => logw(format!("Could not fit {} visual: {err:#}", source.name())),
            }
        }

        if !is_file(&self.placeholder).await {
            loge(format!(
                "No visual source succeeded and placeholder {} is missing",
                self.placeholder.display()
            ));
            return Err(AssetError::NoVisualSource);
        }

        let placeholder = VisualAsset {
            kind: VisualKind::from_path(&self.placeholder),
            path: self.placeholder.clone(),
            origin: VisualOrigin::Placeholder,
        };
        match self.media.fit_vertical(&placeholder, &self.work_dir).await {
            Ok(fitted) => {
                logw(format!("Using placeholder visual {}", self.placeholder.display()));
                Ok(fitted)
            }
            Err(err) => {
                loge(format!("Placeholder visual unusable: {err:#}"));
                Err(AssetError::NoVisualSource)
            }
        }
    }

    pub async fn background_music(&self) -> Option<PathBuf> {
        let dir = self.music_dir.as_ref()?;
        let mut tracks = Vec::new();
        let mut entries = fs::read_dir(dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(OsStr::to_str)
                .map(str::to_ascii_lowercase);
            if matches!(ext.as_deref(), Some("mp3" | "m4a" | "wav")) && is_file(&path).await {
                tracks.push(path);
            }
        }
        if tracks.is_empty() {
            logw("No background music found; output will be narration-only.");
            return None;
        }
        tracks.choose(&mut rand::thread_rng()).cloned()
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await
}

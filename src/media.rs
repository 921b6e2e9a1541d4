use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::timeline::Timeline;

pub const TARGET_WIDTH: u32 = 1080;
pub const TARGET_HEIGHT: u32 = 1920;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    Image,
    Video,
}

impl VisualKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "bmp" => Self::Image,
            _ => Self::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualOrigin {
    Generated,
    Stock,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualAsset {
    pub path: PathBuf,
    pub kind: VisualKind,
    pub origin: VisualOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NarrationSource {
    Audio(PathBuf),
    Silence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationAsset {
    pub source: NarrationSource,
    pub duration: Duration,
}

impl NarrationAsset {
    pub const SILENCE: Duration = Duration::from_secs(1);

    pub fn silence() -> Self {
        Self {
            source: NarrationSource::Silence,
            duration: Self::SILENCE,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.source == NarrationSource::Silence
    }
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<Duration>;

    async fn fit_vertical(&self, asset: &VisualAsset, out_dir: &Path) -> Result<VisualAsset>;

    async fn render(&self, timeline: &Timeline, work_dir: &Path, out: &Path) -> Result<()>;
}

use std::path::PathBuf;
use std::time::Duration;

use crate::assets::AssetProvider;
use crate::config::StoryboardConfig;
use crate::logw;
use crate::media::{NarrationAsset, VisualAsset, VisualKind};
use crate::plan::{ContentPlan, Prediction, SegmentRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Hook,
    Action,
    Reveal,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hook => "hook",
            Self::Action => "action",
            Self::Reveal => "reveal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualRef {
    Clip {
        path: PathBuf,
        kind: VisualKind,
        seek: Duration,
    },
    Still { path: PathBuf, kind: VisualKind },
    LastFrameOf(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub text: String,
    pub badge: Option<Prediction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedBlock {
    pub kind: BlockKind,
    pub start: Duration,
    pub duration: Duration,
    pub narration: NarrationAsset,
    pub visual: VisualRef,
    pub overlay: Option<Overlay>,
}

impl TimedBlock {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicBed {
    pub path: PathBuf,
    pub volume: f32,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub blocks: Vec<TimedBlock>,
    pub music: Option<MusicBed>,
}

impl Timeline {
    pub fn total_duration(&self) -> Duration {
        self.blocks.iter().map(|b| b.duration).sum()
    }

    /// Each block starts where the previous one ended, beginning at zero.
    pub fn is_contiguous(&self) -> bool {
        let mut cursor = Duration::ZERO;
        for block in &self.blocks {
            if block.start != cursor {
                return false;
            }
            cursor = block.end();
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockScript {
    pub kind: BlockKind,
    pub duration: Duration,
    pub narration: String,
    pub overlay: Option<Overlay>,
}

pub struct TimelineAssembler {
    storyboard: StoryboardConfig,
}

impl TimelineAssembler {
    pub fn new(storyboard: StoryboardConfig) -> Self {
        Self { storyboard }
    }

    pub fn storyboard(&self, plan: &ContentPlan) -> Vec<BlockScript> {
        let join = |roles: &[SegmentRole]| {
            roles
                .iter()
                .flat_map(|role| plan.segment_text(*role))
                .collect::<Vec<_>>()
                .join(" ")
        };

        vec![
            BlockScript {
                kind: BlockKind::Hook,
                duration: Duration::from_secs_f64(self.storyboard.hook_secs),
                narration: join(&[SegmentRole::Hook]),
                overlay: Some(Overlay {
                    text: plan.subject.clone(),
                    badge: None,
                }),
            },
            BlockScript {
                kind: BlockKind::Action,
                duration: Duration::from_secs_f64(plan.clip_duration),
                narration: join(&[SegmentRole::Reveal, SegmentRole::GrindAction]),
                overlay: None,
            },
            BlockScript {
                kind: BlockKind::Reveal,
                duration: Duration::from_secs_f64(self.storyboard.reveal_secs),
                narration: join(&[SegmentRole::Outcome]),
                overlay: Some(Overlay {
                    text: plan.subject.clone(),
                    badge: plan.predicted_outcome,
                }),
            },
        ]
    }

    pub async fn assemble(
        &self,
        plan: &ContentPlan,
        visual: &VisualAsset,
        assets: &AssetProvider,
    ) -> Timeline {
        let mut blocks = Vec::with_capacity(3);
        let mut start = Duration::ZERO;
        let mut action_index = None;

        for script in self.storyboard(plan) {
            let narration = assets.narrate(&script.narration, script.kind.label()).await;
            if narration.duration > script.duration {
                logw(format!(
                    "Narration for {} runs {:.2}s, cut to {:.2}s",
                    script.kind.label(),
                    narration.duration.as_secs_f64(),
                    script.duration.as_secs_f64()
                ));
            }

            let visual_ref = match script.kind {
                BlockKind::Hook => VisualRef::Still {
                    path: visual.path.clone(),
                    kind: visual.kind,
                },
                BlockKind::Action => {
                    action_index = Some(blocks.len());
                    VisualRef::Clip {
                        path: visual.path.clone(),
                        kind: visual.kind,
                        seek: Duration::ZERO,
                    }
                }
                BlockKind::Reveal => match action_index {
                    Some(idx) => VisualRef::LastFrameOf(idx),
                    None => VisualRef::Still {
                        path: visual.path.clone(),
                        kind: visual.kind,
                    },
                },
            };

            blocks.push(TimedBlock {
                kind: script.kind,
                start,
                duration: script.duration,
                narration,
                visual: visual_ref,
                overlay: script.overlay,
            });
            start += script.duration;
        }

        let total = start;
        let music = assets.background_music().await.map(|path| MusicBed {
            path,
            volume: self.storyboard.music_volume,
            duration: total,
        });

        Timeline { blocks, music }
    }
}

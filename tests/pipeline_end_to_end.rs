use anyhow::Result;
use async_trait::async_trait;
use auto_shorts::api::{
    Artifact, GenerationRequest, PublishResult, Publisher, SpeechSynthesizer, TextGenerator,
    VisualSource,
};
use auto_shorts::assets::AssetProvider;
use auto_shorts::config::{CadenceConfig, RunMode, StoryboardConfig};
use auto_shorts::error::CollaboratorError;
use auto_shorts::media::{MediaToolkit, VisualAsset, VisualKind, VisualOrigin};
use auto_shorts::pipeline::ShortsPipeline;
use auto_shorts::plan::{ActionBounds, Metadata};
use auto_shorts::request::{ContentRequestBuilder, PromptProfile};
use auto_shorts::schedule::{LoopExit, ScheduleLoop, Sleeper};
use auto_shorts::timeline::{Timeline, TimelineAssembler};
use auto_shorts::topics::TopicPool;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GENERATED: &str = r#"{"material_name":"Glass Bottle","clip_duration":5,"prediction":"FAIL","script_segments":[{"text":"Hook!","type":"hook"},{"text":"Reveal","type":"reveal"},{"text":"Grind","type":"grind_action"},{"text":"Outcome","type":"outcome"}],"seo_metadata":{"title":"T","description":"D","tags":"a,b"}}"#;

struct Generator {
    unauthorized: bool,
}

#[async_trait]
impl TextGenerator for Generator {
    fn name(&self) -> &'static str {
        "stub-text"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
        if self.unauthorized {
            return Err(CollaboratorError::Unauthorized {
                service: "stub-text",
                detail: "key revoked".into(),
            });
        }
        Ok(GENERATED.to_string())
    }
}

struct Voice;

#[async_trait]
impl SpeechSynthesizer for Voice {
    fn name(&self) -> &'static str {
        "stub-voice"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError> {
        Ok(text.as_bytes().to_vec())
    }
}

struct Stock;

#[async_trait]
impl VisualSource for Stock {
    fn name(&self) -> &'static str {
        "stub-stock"
    }

    async fn fetch(
        &self,
        _keyword: &str,
        _min_duration: Duration,
        dest_dir: &Path,
    ) -> Result<VisualAsset, CollaboratorError> {
        Ok(VisualAsset {
            path: dest_dir.join("stock.mp4"),
            kind: VisualKind::Video,
            origin: VisualOrigin::Stock,
        })
    }
}

#[derive(Default)]
struct Media {
    rendered: Mutex<Vec<Timeline>>,
}

#[async_trait]
impl MediaToolkit for Media {
    async fn probe_duration(&self, _path: &Path) -> Result<Duration> {
        Ok(Duration::from_millis(800))
    }

    async fn fit_vertical(&self, asset: &VisualAsset, out_dir: &Path) -> Result<VisualAsset> {
        Ok(VisualAsset {
            path: out_dir.join("visual_fitted.mp4"),
            ..asset.clone()
        })
    }

    async fn render(&self, timeline: &Timeline, _work_dir: &Path, out: &Path) -> Result<()> {
        std::fs::create_dir_all(out.parent().unwrap())?;
        std::fs::write(out, b"mp4")?;
        self.rendered.lock().unwrap().push(timeline.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Outbox {
    sent: Arc<Mutex<Vec<(Artifact, Metadata)>>>,
}

#[async_trait]
impl Publisher for Outbox {
    fn name(&self) -> &'static str {
        "stub-publisher"
    }

    async fn publish(
        &self,
        artifact: &Artifact,
        metadata: &Metadata,
    ) -> Result<PublishResult, CollaboratorError> {
        self.sent
            .lock()
            .unwrap()
            .push((artifact.clone(), metadata.clone()));
        Ok(PublishResult::published("yt-123"))
    }
}

#[derive(Default)]
struct Naps(Vec<Duration>);

#[async_trait]
impl Sleeper for Naps {
    async fn sleep(&mut self, duration: Duration) {
        self.0.push(duration);
    }
}

struct Harness {
    root: tempfile::TempDir,
    media: Arc<Media>,
    outbox: Outbox,
}

impl Harness {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            media: Arc::new(Media::default()),
            outbox: Outbox::default(),
        }
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn pipeline(&self, unauthorized: bool, visuals: Vec<Box<dyn VisualSource>>) -> ShortsPipeline {
        let builder = ContentRequestBuilder::new(
            Box::new(Generator { unauthorized }),
            PromptProfile::Shorts,
            ActionBounds::default(),
            10,
        );
        let media: Arc<dyn MediaToolkit> = self.media.clone();
        let assets = AssetProvider::new(
            vec![Box::new(Voice)],
            visuals,
            self.dir("resources/placeholder.png"),
            Arc::clone(&media),
            self.dir("work"),
        );
        ShortsPipeline::new(
            builder,
            TopicPool::single("Everyday Waste", &["Glass Bottle"]),
            assets,
            TimelineAssembler::new(StoryboardConfig::default()),
            media,
            Box::new(self.outbox.clone()),
            self.dir("output"),
        )
    }
}

#[tokio::test]
async fn generated_plan_renders_three_blocks_and_publishes_title() {
    let h = Harness::new();
    let mut schedule = ScheduleLoop::new(
        h.pipeline(false, vec![Box::new(Stock)]),
        Naps::default(),
        CadenceConfig::default(),
        RunMode::SingleShot,
    );

    assert_eq!(schedule.run().await, LoopExit::Published);
    assert!(schedule.sleeper().0.is_empty());

    let rendered = h.media.rendered.lock().unwrap();
    assert_eq!(rendered.len(), 1);
    let durations: Vec<f64> = rendered[0]
        .blocks
        .iter()
        .map(|b| b.duration.as_secs_f64())
        .collect();
    assert_eq!(durations, [2.5, 5.0, 2.0]);
    assert!(rendered[0].is_contiguous());

    let sent = h.outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (artifact, metadata) = &sent[0];
    assert_eq!(metadata.title, "T");
    match artifact {
        Artifact::Video { path, duration } => {
            assert!(path.starts_with(h.dir("output")));
            assert!(path.file_name().unwrap().to_string_lossy().starts_with("glass_bottle_"));
            assert_eq!(*duration, Duration::from_millis(9500));
        }
        other => panic!("expected a video artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_generation_halts_the_loop() {
    let h = Harness::new();
    let mut schedule = ScheduleLoop::new(
        h.pipeline(true, vec![Box::new(Stock)]),
        Naps::default(),
        CadenceConfig::default(),
        RunMode::Continuous,
    )
    .with_cycle_limit(Some(5));

    let exit = schedule.run().await;
    assert_eq!(exit, LoopExit::Halted);
    assert_eq!(exit.exit_code(), 2);
    assert_eq!(schedule.cycles_run(), 1);
    assert!(schedule.sleeper().0.is_empty());
    assert!(h.outbox.sent.lock().unwrap().is_empty());
    assert!(h.media.rendered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_every_visual_source_fails_the_cycle_but_not_the_loop() {
    let h = Harness::new();
    let mut schedule = ScheduleLoop::new(
        h.pipeline(false, vec![]),
        Naps::default(),
        CadenceConfig::default(),
        RunMode::Continuous,
    )
    .with_cycle_limit(Some(2));

    assert_eq!(schedule.run().await, LoopExit::Failed);
    assert_eq!(schedule.cycles_run(), 2);
    assert_eq!(schedule.sleeper().0, [Duration::from_secs(300)]);
    assert!(h.outbox.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn placeholder_keeps_the_pipeline_publishing() {
    let h = Harness::new();
    std::fs::create_dir_all(h.dir("resources")).unwrap();
    std::fs::write(h.dir("resources/placeholder.png"), b"png").unwrap();

    let mut schedule = ScheduleLoop::new(
        h.pipeline(false, vec![]),
        Naps::default(),
        CadenceConfig::default(),
        RunMode::SingleShot,
    );
    assert_eq!(schedule.run().await.exit_code(), 0);
    assert_eq!(h.outbox.sent.lock().unwrap().len(), 1);
}

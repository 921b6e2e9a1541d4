use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use walkdir::WalkDir;

use crate::api::{Artifact, PublishResult, Publisher};
use crate::assets::AssetProvider;
use crate::error::{CollaboratorError, CycleError};
use crate::media::MediaToolkit;
use crate::news::NewsFeed;
use crate::plan::ContentPlan;
use crate::request::ContentRequestBuilder;
use crate::timeline::TimelineAssembler;
use crate::topics::{Topic, TopicPool};
use crate::{logi, logok, logw};

#[async_trait]
pub trait Pipeline: Send {
    fn name(&self) -> &'static str;

    async fn generate(&mut self) -> Result<ContentPlan, CycleError>;

    async fn assemble(&mut self, plan: &ContentPlan) -> Result<Artifact, CycleError>;

    async fn publish(
        &mut self,
        plan: &ContentPlan,
        artifact: &Artifact,
    ) -> Result<PublishResult, CycleError>;
}

/// Credential and quota failures escape to the loop; anything else is a failed publish.
async fn publish_with(
    publisher: &dyn Publisher,
    plan: &ContentPlan,
    artifact: &Artifact,
) -> Result<PublishResult, CycleError> {
    logi(format!("Publishing to {}: {}", publisher.name(), plan.metadata.title));
    match publisher.publish(artifact, &plan.metadata).await {
        Ok(result) => {
            if result.is_published() {
                logok(format!("Published {} as {}", plan.subject, result.platform_id));
            }
            Ok(result)
        }
        Err(err @ (CollaboratorError::Unauthorized { .. } | CollaboratorError::RateLimited { .. })) => {
            Err(err.into())
        }
        Err(err) => Ok(PublishResult::failed(err.to_string())),
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() { "short".to_string() } else { slug }
}

pub async fn clear_directory_contents(dir_path: &Path) -> anyhow::Result<()> {
    if fs::metadata(dir_path).await.is_err() {
        return Ok(());
    }

    for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }
    Ok(())
}

pub struct ShortsPipeline {
    builder: ContentRequestBuilder,
    pool: TopicPool,
    assets: AssetProvider,
    assembler: TimelineAssembler,
    media: Arc<dyn MediaToolkit>,
    publisher: Box<dyn Publisher>,
    output_dir: PathBuf,
}

impl ShortsPipeline {
    pub fn new(
        builder: ContentRequestBuilder,
        pool: TopicPool,
        assets: AssetProvider,
        assembler: TimelineAssembler,
        media: Arc<dyn MediaToolkit>,
        publisher: Box<dyn Publisher>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            builder,
            pool,
            assets,
            assembler,
            media,
            publisher,
            output_dir,
        }
    }

    fn output_path(&self, plan: &ContentPlan) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        self.output_dir
            .join(format!("{}_{stamp}.mp4", slugify(&plan.subject)))
    }
}

#[async_trait]
impl Pipeline for ShortsPipeline {
    fn name(&self) -> &'static str {
        "shorts"
    }

    async fn generate(&mut self) -> Result<ContentPlan, CycleError> {
        self.builder.build(&self.pool).await
    }

    async fn assemble(&mut self, plan: &ContentPlan) -> Result<Artifact, CycleError> {
        let work_dir = self.assets.work_dir().to_path_buf();
        logi(format!("Clearing {}...", work_dir.display()));
        clear_directory_contents(&work_dir)
            .await
            .with_context(|| format!("Failed to clear {}", work_dir.display()))?;
        fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create {}", work_dir.display()))?;

        let min_duration = Duration::from_secs_f64(plan.clip_duration);
        let visual = self
            .assets
            .visualize(&plan.search_keyword, min_duration)
            .await?;
        let timeline = self.assembler.assemble(plan, &visual, &self.assets).await;

        let out = self.output_path(plan);
        self.media
            .render(&timeline, &work_dir, &out)
            .await
            .context("Video render failed")?;

        Ok(Artifact::Video {
            path: out,
            duration: timeline.total_duration(),
        })
    }

    async fn publish(
        &mut self,
        plan: &ContentPlan,
        artifact: &Artifact,
    ) -> Result<PublishResult, CycleError> {
        publish_with(self.publisher.as_ref(), plan, artifact).await
    }
}

pub struct PostPipeline {
    builder: ContentRequestBuilder,
    pool: TopicPool,
    news: Option<NewsFeed>,
    news_category: String,
    publisher: Box<dyn Publisher>,
    rng: StdRng,
}

impl PostPipeline {
    pub fn new(builder: ContentRequestBuilder, pool: TopicPool, publisher: Box<dyn Publisher>) -> Self {
        Self {
            builder,
            pool,
            news: None,
            news_category: "News".to_string(),
            publisher,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_news(mut self, feed: NewsFeed) -> Self {
        self.news = Some(feed);
        self
    }

    async fn news_topic(&mut self) -> Option<Topic> {
        let feed = self.news.as_ref()?;
        let story = feed.pick(&mut self.rng).await?;
        Some(Topic::new(self.news_category.clone(), story.title.clone()).with_context(story.as_context()))
    }
}

#[async_trait]
impl Pipeline for PostPipeline {
    fn name(&self) -> &'static str {
        "post"
    }

    async fn generate(&mut self) -> Result<ContentPlan, CycleError> {
        match self.news_topic().await {
            Some(topic) => self.builder.build_for(topic).await,
            None => {
                if self.news.is_some() {
                    logw("No news story available; using the topic pool.");
                }
                self.builder.build(&self.pool).await
            }
        }
    }

    async fn assemble(&mut self, plan: &ContentPlan) -> Result<Artifact, CycleError> {
        Ok(Artifact::Text(plan.post_text()))
    }

    async fn publish(
        &mut self,
        plan: &ContentPlan,
        artifact: &Artifact,
    ) -> Result<PublishResult, CycleError> {
        publish_with(self.publisher.as_ref(), plan, artifact).await
    }
}

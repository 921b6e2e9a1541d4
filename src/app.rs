use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::elevenlabs::ElevenLabsVoice;
use crate::api::gemini::GeminiText;
use crate::api::google_tts::GoogleTtsVoice;
use crate::api::openai::{OpenAiImage, OpenAiText};
use crate::api::pexels::PexelsSource;
use crate::api::twitter::TwitterPublisher;
use crate::api::youtube::YouTubePublisher;
use crate::api::{Publisher, SpeechSynthesizer, TextGenerator, VisualSource};
use crate::assets::AssetProvider;
use crate::config::{
    Config, Deployment, PublisherConfig, RunMode, SecretRef, TextProvider, VisualProvider,
    VoiceProvider,
};
use crate::ffmpeg::Ffmpeg;
use crate::history::RunHistory;
use crate::media::MediaToolkit;
use crate::news::NewsFeed;
use crate::pipeline::{Pipeline, PostPipeline, ShortsPipeline};
use crate::request::{ContentRequestBuilder, PromptProfile};
use crate::schedule::{LoopExit, ScheduleLoop, TokioSleeper};
use crate::timeline::TimelineAssembler;
use crate::{init, init_logging, loge, logi, logw};

#[derive(Debug, Parser)]
#[command(version, about = "Generate, render and publish short-form content on a schedule")]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Run exactly one cycle and exit with its status
    #[arg(long)]
    pub once: bool,

    /// Stop a continuous run after this many cycles
    #[arg(long)]
    pub cycles: Option<u64>,
}

fn secret(reference: &SecretRef, what: &str) -> Result<String> {
    reference
        .resolve()
        .with_context(|| format!("Missing credential for {what} ({})", reference.describe()))
}

fn optional_secret(reference: &SecretRef, what: &str) -> Option<String> {
    match secret(reference, what) {
        Ok(value) => Some(value),
        Err(err) => {
            logw(format!("Skipping {what}: {err:#}"));
            None
        }
    }
}

fn text_generator(cfg: &TextProvider, client: &Client) -> Result<Box<dyn TextGenerator>> {
    let generator: Box<dyn TextGenerator> = match cfg {
        TextProvider::Openai { api_key, model } => Box::new(OpenAiText::new(
            client.clone(),
            secret(api_key, "openai")?,
            model.clone(),
        )),
        TextProvider::Gemini { api_key, model } => Box::new(GeminiText::new(
            client.clone(),
            secret(api_key, "gemini")?,
            model.clone(),
        )),
    };
    Ok(generator)
}

fn voices(cfg: &[VoiceProvider], client: &Client) -> Vec<Box<dyn SpeechSynthesizer>> {
    cfg.iter()
        .filter_map(|voice| -> Option<Box<dyn SpeechSynthesizer>> {
            let synth: Box<dyn SpeechSynthesizer> = match voice {
                VoiceProvider::Elevenlabs {
                    api_key,
                    voice_id,
                    model_id,
                } => Box::new(ElevenLabsVoice::new(
                    client.clone(),
                    optional_secret(api_key, "elevenlabs")?,
                    voice_id.clone(),
                    model_id.clone(),
                )),
                VoiceProvider::GoogleTts {
                    api_key,
                    language_code,
                    voice_name,
                    speaking_rate,
                } => Box::new(GoogleTtsVoice::new(
                    client.clone(),
                    optional_secret(api_key, "google_tts")?,
                    language_code.clone(),
                    voice_name.clone(),
                    *speaking_rate,
                )),
            };
            Some(synth)
        })
        .collect()
}

fn visuals(cfg: &[VisualProvider], client: &Client) -> Vec<Box<dyn VisualSource>> {
    cfg.iter()
        .filter_map(|visual| -> Option<Box<dyn VisualSource>> {
            let source: Box<dyn VisualSource> = match visual {
                VisualProvider::OpenaiImage { api_key, model } => Box::new(OpenAiImage::new(
                    client.clone(),
                    optional_secret(api_key, "openai_image")?,
                    model.clone(),
                )),
                VisualProvider::Pexels { api_key } => Box::new(PexelsSource::new(
                    client.clone(),
                    optional_secret(api_key, "pexels")?,
                )),
            };
            Some(source)
        })
        .collect()
}

fn publisher(cfg: &PublisherConfig, client: &Client) -> Result<Box<dyn Publisher>> {
    let publisher: Box<dyn Publisher> = match cfg {
        PublisherConfig::Youtube {
            access_token,
            visibility,
            category_id,
        } => Box::new(YouTubePublisher::new(
            client.clone(),
            secret(access_token, "youtube")?,
            *visibility,
            category_id.clone(),
        )),
        PublisherConfig::Twitter {
            bearer_token,
            max_chars,
        } => Box::new(TwitterPublisher::new(
            client.clone(),
            secret(bearer_token, "twitter")?,
            *max_chars,
        )),
    };
    Ok(publisher)
}

fn core_collaborators(
    cfg: &Config,
    client: &Client,
) -> Result<(Box<dyn TextGenerator>, Box<dyn Publisher>)> {
    Ok((
        text_generator(&cfg.text, client)?,
        publisher(&cfg.publisher, client)?,
    ))
}

fn prompt_profile(cfg: &Config) -> PromptProfile {
    match cfg.deployment {
        Deployment::Shorts => PromptProfile::Shorts,
        Deployment::Post => PromptProfile::Post {
            persona: cfg.topics.persona.clone(),
            max_chars: match &cfg.publisher {
                PublisherConfig::Twitter { max_chars, .. } => *max_chars,
                PublisherConfig::Youtube { .. } => 280,
            },
        },
    }
}

async fn drive<P: Pipeline>(
    pipeline: P,
    cfg: &Config,
    mode: RunMode,
    cycles: Option<u64>,
) -> LoopExit {
    logi(format!(
        "Starting {} pipeline ({:?}, every ~{} min)",
        pipeline.name(),
        mode,
        cfg.cadence.interval_secs / 60
    ));
    let mut schedule = ScheduleLoop::new(pipeline, TokioSleeper, cfg.cadence, mode)
        .with_history(cfg.history_log.clone().map(RunHistory::new))
        .with_cycle_limit(cycles);
    schedule.run().await
}

pub async fn run(args: Args, force_single_shot: bool) -> Result<i32> {
    let dotenv = dotenvy::dotenv().ok();
    let cfg = Config::load(&args.config).await?;
    init_logging(cfg.log_file.as_deref())?;
    if let Some(path) = dotenv {
        logi(format!("Loaded environment from {}", path.display()));
    }

    let mode = if args.once || force_single_shot {
        RunMode::SingleShot
    } else {
        cfg.mode
    };

    init::ensure_directories(&cfg).await?;
    if cfg.deployment == Deployment::Shorts && !init::check_ffmpeg().await {
        logw("FFmpeg not found in PATH. Rendering will fail until it is installed.");
    }

    let client = Client::builder()
        .cookie_store(true)
        .build()
        .context("Failed to build HTTP client")?;

    let (text, publisher) = match core_collaborators(&cfg, &client) {
        Ok(pair) => pair,
        Err(err) => {
            loge(format!("CRITICAL: {err:#}. STOPPING."));
            return Ok(LoopExit::Halted.exit_code());
        }
    };
    if let Err(err) = init::preflight(text.as_ref()).await {
        loge(format!("CRITICAL: {err}. STOPPING."));
        return Ok(LoopExit::Halted.exit_code());
    }

    let builder = ContentRequestBuilder::new(
        text,
        prompt_profile(&cfg),
        cfg.storyboard.action_bounds(),
        cfg.topics.avoid_repeat,
    );

    let exit = match cfg.deployment {
        Deployment::Shorts => {
            let media: Arc<dyn MediaToolkit> = Arc::new(Ffmpeg::new(cfg.font_file.clone()));
            let assets = AssetProvider::new(
                voices(&cfg.voices, &client),
                visuals(&cfg.visuals, &client),
                cfg.placeholder_visual.clone(),
                Arc::clone(&media),
                cfg.work_dir.clone(),
            )
            .with_music_dir(cfg.music_dir.clone());
            let pipeline = ShortsPipeline::new(
                builder,
                cfg.topics.pool.clone(),
                assets,
                TimelineAssembler::new(cfg.storyboard),
                media,
                publisher,
                cfg.output_dir.clone(),
            );
            drive(pipeline, &cfg, mode, args.cycles).await
        }
        Deployment::Post => {
            let mut pipeline = PostPipeline::new(builder, cfg.topics.pool.clone(), publisher);
            if let Some(url) = &cfg.topics.news_feed {
                pipeline = pipeline.with_news(NewsFeed::new(client.clone(), url.clone()));
            }
            drive(pipeline, &cfg, mode, args.cycles).await
        }
    };

    Ok(exit.exit_code())
}

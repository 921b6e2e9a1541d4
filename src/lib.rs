use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod api;
pub mod app;
pub mod assets;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod history;
pub mod init;
pub mod media;
pub mod news;
pub mod pipeline;
pub mod plan;
pub mod request;
pub mod schedule;
pub mod timeline;
pub mod topics;

/// Install the global subscriber: stderr always, plus `log_file` (appended, no ANSI) when given.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(handle)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

pub(crate) fn logi(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    tracing::info!("[OK] {}", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    tracing::error!("{}", message.as_ref());
}

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::api::{GenerationRequest, TextGenerator};
use crate::config::{Config, Deployment};
use crate::error::CollaboratorError;
use crate::{logi, logok, logw};

fn required_dirs(cfg: &Config) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg.deployment == Deployment::Shorts {
        dirs.push(cfg.work_dir.clone());
        dirs.push(cfg.output_dir.clone());
        if let Some(music) = &cfg.music_dir {
            dirs.push(music.clone());
        }
        if let Some(parent) = cfg.placeholder_visual.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    for file in [&cfg.log_file, &cfg.history_log].into_iter().flatten() {
        if let Some(parent) = file.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    dirs.retain(|d| !d.as_os_str().is_empty());
    dirs.sort();
    dirs.dedup();
    dirs
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in required_dirs(cfg) {
        if !dir_exists(&dir).await {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn preflight(generator: &dyn TextGenerator) -> Result<(), CollaboratorError> {
    logi(format!("Checking {} credentials...", generator.name()));
    let request = GenerationRequest {
        system: "Answer briefly.".to_string(),
        prompt: "Say 'hello' in one word.".to_string(),
        json_output: false,
    };
    match generator.generate(&request).await {
        Ok(reply) => {
            logok(format!("{} replied: {}", generator.name(), reply.trim()));
            Ok(())
        }
        Err(err @ CollaboratorError::Unauthorized { .. }) => Err(err),
        Err(err) => {
            logw(format!("Preflight did not complete ({err}); continuing."));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Replies(fn() -> Result<String, CollaboratorError>);

    #[async_trait]
    impl TextGenerator for Replies {
        fn name(&self) -> &'static str {
            "replies"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
            assert!(!request.json_output);
            (self.0)()
        }
    }

    #[tokio::test]
    async fn preflight_only_fails_on_bad_credentials() {
        assert!(preflight(&Replies(|| Ok("Hello".into()))).await.is_ok());
        assert!(
            preflight(&Replies(|| Err(CollaboratorError::Unavailable {
                service: "t",
                detail: "503".into()
            })))
            .await
            .is_ok()
        );
        let err = preflight(&Replies(|| {
            Err(CollaboratorError::Unauthorized {
                service: "t",
                detail: "401".into(),
            })
        }))
        .await
        .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn creates_configured_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("out"),
            music_dir: None,
            placeholder_visual: dir.path().join("res/placeholder.png"),
            history_log: Some(dir.path().join("logs/history.jsonl")),
            ..Config::default()
        };
        ensure_directories(&cfg).await.unwrap();
        for sub in ["work", "out", "res", "logs"] {
            assert!(dir.path().join(sub).is_dir(), "{sub}");
        }
    }
}

use crate::media::{MediaToolkit, NarrationSource, TARGET_HEIGHT, TARGET_WIDTH, VisualAsset, VisualKind};
use crate::plan::Prediction;
use crate::timeline::{Overlay, TimedBlock, Timeline, VisualRef};
use crate::{logi, logok};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

const FPS: u32 = 30;
const SAMPLE_RATE: u32 = 44_100;

async fn run_cmd(args: &[String]) -> Result<()> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };

    let output = Command::new(program)
        .args(rest)
        .output()
        .await
        .with_context(|| format!("Failed to spawn {program}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(anyhow!(
            "{program} failed ({}): {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        ));
    }
    Ok(())
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn base_args() -> Vec<String> {
    owned(&["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"])
}

fn video_codec_args() -> Vec<String> {
    owned(&[
        "-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22",
    ])
}

fn audio_codec_args() -> Vec<String> {
    owned(&["-c:a", "aac", "-b:a", "192k", "-ar", "44100", "-ac", "2"])
}

fn secs(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        bail!("ffprobe failed for {}", path.display());
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        bail!("Invalid duration '{text}' for {}", path.display());
    }
    Ok(duration)
}

pub fn fit_filter() -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
        w = TARGET_WIDTH,
        h = TARGET_HEIGHT
    )
}

/// Escape text for a single-quoted drawtext value inside a filtergraph.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\\\\\"),
            '\'' => out.push('\u{2019}'),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn font_opt(font: Option<&Path>) -> String {
    font.map(|f| format!(":fontfile='{}'", escape_drawtext(&f.display().to_string())))
        .unwrap_or_default()
}

pub fn overlay_filter(overlay: &Overlay, font: Option<&Path>) -> String {
    let font = font_opt(font);
    let mut filter = format!(
        "drawtext=text='{}'{font}:fontcolor=white:fontsize=84:borderw=6:bordercolor=black:x=(w-text_w)/2:y=h*0.16",
        escape_drawtext(&overlay.text.to_uppercase())
    );
    if let Some(badge) = overlay.badge {
        let color = match badge {
            Prediction::Pass => "0x1DB954",
            Prediction::Fail => "0xE53935",
        };
        filter.push_str(&format!(
            ",drawtext=text='{}'{font}:fontcolor=white:fontsize=140:box=1:boxcolor={color}@0.9:boxborderw=30:x=(w-text_w)/2:y=h*0.68",
            badge.badge()
        ));
    }
    filter
}

pub fn block_video_filter(overlay: Option<&Overlay>, font: Option<&Path>) -> String {
    let mut chain = format!("{},fps={FPS},format=yuv420p", fit_filter());
    if let Some(overlay) = overlay {
        chain.push(',');
        chain.push_str(&overlay_filter(overlay, font));
    }
    chain
}

/// Concat demuxer list; entries are relative to the list file.
pub fn concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| format!("file '{}'\n", name.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Music bed under narration: volume, cut to the timeline and mixed without normalising narration down.
pub fn music_mix_filter(volume: f32, total: Duration) -> String {
    format!(
        "[1:a]volume={volume:.3},atrim=0:{},asetpts=N/SR/TB[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[a]",
        secs(total)
    )
}

pub struct Ffmpeg {
    font_file: Option<PathBuf>,
}

impl Ffmpeg {
    pub fn new(font_file: Option<PathBuf>) -> Self {
        Self { font_file }
    }

    fn block_args(&self, block: &TimedBlock, picture: &Picture, out: &Path) -> Vec<String> {
        let mut args = base_args();

        match picture {
            Picture::Hold(path) => {
                args.extend(["-loop".into(), "1".into(), "-i".into(), path_arg(path)]);
            }
            Picture::Play { path, seek } => {
                args.extend(owned(&["-stream_loop", "-1"]));
                if !seek.is_zero() {
                    args.extend(["-ss".into(), secs(*seek)]);
                }
                args.extend(["-i".into(), path_arg(path)]);
            }
        }

        match &block.narration.source {
            NarrationSource::Audio(path) => args.extend(["-i".into(), path_arg(path)]),
            NarrationSource::Silence => args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!("anullsrc=r={SAMPLE_RATE}:cl=stereo"),
            ]),
        }

        let video = block_video_filter(block.overlay.as_ref(), self.font_file.as_deref());
        args.extend([
            "-filter_complex".into(),
            format!("[0:v]{video}[v];[1:a]apad[a]"),
            "-map".into(),
            "[v]".into(),
            "-map".into(),
            "[a]".into(),
            "-t".into(),
            secs(block.duration),
        ]);
        args.extend(video_codec_args());
        args.extend(audio_codec_args());
        args.push(path_arg(out));
        args
    }

    async fn last_frame(&self, clip: &Path, out_png: &Path) -> Result<()> {
        let mut args = base_args();
        args.extend([
            "-sseof".into(),
            "-0.1".into(),
            "-i".into(),
            path_arg(clip),
            "-frames:v".into(),
            "1".into(),
            "-update".into(),
            "1".into(),
            path_arg(out_png),
        ]);
        run_cmd(&args).await.context("Last-frame extraction failed")
    }

    async fn first_frame(&self, video: &Path, out_png: &Path) -> Result<()> {
        let mut args = base_args();
        args.extend([
            "-i".into(),
            path_arg(video),
            "-frames:v".into(),
            "1".into(),
            path_arg(out_png),
        ]);
        run_cmd(&args).await.context("First-frame extraction failed")
    }

    async fn picture_for(
        &self,
        idx: usize,
        block: &TimedBlock,
        rendered: &[PathBuf],
        work_dir: &Path,
    ) -> Result<Picture> {
        Ok(match &block.visual {
            VisualRef::Clip { path, kind, seek } => match kind {
                VisualKind::Image => Picture::Hold(path.clone()),
                VisualKind::Video => Picture::Play {
                    path: path.clone(),
                    seek: *seek,
                },
            },
            VisualRef::Still { path, kind } => match kind {
                VisualKind::Image => Picture::Hold(path.clone()),
                VisualKind::Video => {
                    let png = work_dir.join(format!("still_{idx}.png"));
                    self.first_frame(path, &png).await?;
                    Picture::Hold(png)
                }
            },
            VisualRef::LastFrameOf(src) => {
                let clip = rendered
                    .get(*src)
                    .ok_or_else(|| anyhow!("Block {idx} refers to unrendered block {src}"))?;
                let png = work_dir.join(format!("last_frame_{src}.png"));
                self.last_frame(clip, &png).await?;
                Picture::Hold(png)
            }
        })
    }

    async fn concat(&self, list_txt: &Path, out_mp4: &Path) -> Result<()> {
        let mut args = base_args();
        args.extend([
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list_txt),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(out_mp4),
        ]);
        run_cmd(&args).await.context("Concat failed")
    }

    async fn mix_music(
        &self,
        video_in: &Path,
        music: &Path,
        volume: f32,
        total: Duration,
        video_out: &Path,
    ) -> Result<()> {
        let mut args = base_args();
        args.extend([
            "-i".into(),
            path_arg(video_in),
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            path_arg(music),
            "-filter_complex".into(),
            music_mix_filter(volume, total),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "[a]".into(),
            "-c:v".into(),
            "copy".into(),
            "-t".into(),
            secs(total),
        ]);
        args.extend(audio_codec_args());
        args.extend(["-movflags".into(), "+faststart".into(), path_arg(video_out)]);
        run_cmd(&args).await.context("Music mix failed")
    }
}

enum Picture {
    Hold(PathBuf),
    Play { path: PathBuf, seek: Duration },
}

#[async_trait]
impl MediaToolkit for Ffmpeg {
    async fn probe_duration(&self, path: &Path) -> Result<Duration> {
        let seconds = ffprobe_duration_seconds(path).await?;
        Ok(Duration::from_secs_f64(seconds))
    }

    async fn fit_vertical(&self, asset: &VisualAsset, out_dir: &Path) -> Result<VisualAsset> {
        fs::create_dir_all(out_dir).await?;
        let out = match asset.kind {
            VisualKind::Image => out_dir.join("visual_fitted.png"),
            VisualKind::Video => out_dir.join("visual_fitted.mp4"),
        };

        let mut args = base_args();
        args.extend(["-i".into(), path_arg(&asset.path), "-vf".into(), fit_filter()]);
        match asset.kind {
            VisualKind::Image => args.extend(owned(&["-frames:v", "1"])),
            VisualKind::Video => {
                args.push("-an".into());
                args.extend(video_codec_args());
            }
        }
        args.push(path_arg(&out));

        run_cmd(&args)
            .await
            .with_context(|| format!("Vertical fit failed for {}", asset.path.display()))?;
        Ok(VisualAsset {
            path: out,
            kind: asset.kind,
            origin: asset.origin,
        })
    }

    async fn render(&self, timeline: &Timeline, work_dir: &Path, out: &Path) -> Result<()> {
        fs::create_dir_all(work_dir).await?;
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut rendered = Vec::with_capacity(timeline.blocks.len());
        for (idx, block) in timeline.blocks.iter().enumerate() {
            let picture = self.picture_for(idx, block, &rendered, work_dir).await?;
            let block_out = work_dir.join(format!("block_{idx}_{}.mp4", block.kind.label()));
            logi(format!(
                "Rendering {} block ({:.2}s)",
                block.kind.label(),
                block.duration.as_secs_f64()
            ));
            run_cmd(&self.block_args(block, &picture, &block_out))
                .await
                .with_context(|| format!("Render of {} block failed", block.kind.label()))?;
            rendered.push(block_out);
        }

        let list_txt = work_dir.join("concat_list.txt");
        fs::write(&list_txt, concat_list(&rendered)).await?;

        match &timeline.music {
            Some(bed) => {
                let joined = work_dir.join("joined.mp4");
                self.concat(&list_txt, &joined).await?;
                self.mix_music(&joined, &bed.path, bed.volume, bed.duration, out)
                    .await?;
            }
            None => self.concat(&list_txt, out).await?,
        }

        logok(format!(
            "Rendered {} ({:.2}s)",
            out.display(),
            timeline.total_duration().as_secs_f64()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NarrationAsset;
    use crate::timeline::BlockKind;

    fn block(overlay: Option<Overlay>) -> TimedBlock {
        TimedBlock {
            kind: BlockKind::Hook,
            start: Duration::ZERO,
            duration: Duration::from_millis(2500),
            narration: NarrationAsset::silence(),
            visual: VisualRef::Still {
                path: PathBuf::from("fitted.png"),
                kind: VisualKind::Image,
            },
            overlay,
        }
    }

    #[test]
    fn drawtext_escaping() {
        assert_eq!(escape_drawtext("It's 50%: a,b"), "It\u{2019}s 50\\%\\: a,b");
        assert_eq!(escape_drawtext("two\nlines"), "two lines");
    }

    #[test]
    fn fit_targets_vertical_frame() {
        let f = fit_filter();
        assert!(f.starts_with("scale=1080:1920:force_original_aspect_ratio=decrease"));
        assert!(f.contains("pad=1080:1920"));
    }

    #[test]
    fn badge_is_drawn_only_when_predicted() {
        let plain = Overlay {
            text: "Glass Bottle".into(),
            badge: None,
        };
        let filter = overlay_filter(&plain, None);
        assert!(filter.contains("text='GLASS BOTTLE'"));
        assert_eq!(filter.matches("drawtext").count(), 1);

        let badged = Overlay {
            badge: Some(Prediction::Fail),
            ..plain
        };
        let filter = overlay_filter(&badged, Some(Path::new("fonts/Bold.ttf")));
        assert_eq!(filter.matches("drawtext").count(), 2);
        assert!(filter.contains("text='FAIL'"));
        assert!(filter.contains("0xE53935"));
        assert!(filter.contains("fontfile='fonts/Bold.ttf'"));
    }

    #[test]
    fn block_args_hold_still_and_pad_silence() {
        let ff = Ffmpeg::new(None);
        let b = block(None);
        let args = ff.block_args(
            &b,
            &Picture::Hold(PathBuf::from("fitted.png")),
            Path::new("work/block_0_hook.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-loop 1 -i fitted.png"));
        assert!(joined.contains("anullsrc=r=44100:cl=stereo"));
        assert!(joined.contains("[1:a]apad[a]"));
        assert!(joined.contains("-t 2.500"));
        assert_eq!(args.last().map(String::as_str), Some("work/block_0_hook.mp4"));
    }

    #[test]
    fn block_args_loop_clips() {
        let ff = Ffmpeg::new(None);
        let mut b = block(None);
        b.narration = NarrationAsset {
            source: NarrationSource::Audio(PathBuf::from("narration_action.mp3")),
            duration: Duration::from_secs(7),
        };
        let args = ff.block_args(
            &b,
            &Picture::Play {
                path: PathBuf::from("clip.mp4"),
                seek: Duration::ZERO,
            },
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-stream_loop -1 -i clip.mp4"));
        assert!(joined.contains("-i narration_action.mp3"));
        assert!(!joined.contains("-ss"));
    }

    #[test]
    fn concat_list_uses_file_names() {
        let list = concat_list(&[
            PathBuf::from("work/block_0_hook.mp4"),
            PathBuf::from("work/block_1_action.mp4"),
        ]);
        assert_eq!(list, "file 'block_0_hook.mp4'\nfile 'block_1_action.mp4'\n");
    }

    #[test]
    fn music_is_cut_to_timeline() {
        let f = music_mix_filter(0.15, Duration::from_millis(9500));
        assert!(f.contains("volume=0.150"));
        assert!(f.contains("atrim=0:9.500"));
        assert!(f.contains("duration=first"));
    }
}

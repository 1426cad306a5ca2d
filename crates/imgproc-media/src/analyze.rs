//! Stage one: frame timing, frame extraction and padding.
//!
//! The raw file lives in the task working directory; frames are written to
//! `<working_dir>/frames/dump_NNNN.png` and then padded in place towards the
//! requested aspect ratio.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use imgproc_models::image::{frame_file_name, frame_pattern, FRAMES_DIR};
use imgproc_models::{AspectRatio, ContainerType, Image};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::ToolCommand;
use crate::delays::{clamp_last_delay, parse_avifdump, parse_webpmux};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{count_frames, create_private_dir};
use crate::probe::probe_frame_delay;

/// `format=rgba,pad=...` filter growing the canvas to the X:Y aspect ratio.
///
/// Content stays at the left edge and bottom; added area is transparent.
pub fn pad_filter(aspect_ratio: AspectRatio) -> String {
    let x = aspect_ratio.x;
    let y = aspect_ratio.y;
    format!(
        "format=rgba,pad=h=if(gt(iw/ih\\,{x})\\,iw/{x}\\,ih):w=if(lt(iw/ih\\,{y})\\,ih/{y}\\,iw):x=0:y=(oh-ih):color=#00000000"
    )
}

/// ffmpeg frame dump of any container it can demux.
pub fn extract_command(raw: &Path, frames_dir: &Path) -> ToolCommand {
    ToolCommand::new("ffmpeg")
        .arg("-i")
        .path(raw)
        .args(["-vsync", "0", "-f", "image2", "-start_number", "0"])
        .path(frame_pattern(frames_dir))
}

/// Pad every frame in place.
pub fn pad_command(frames_dir: &Path, aspect_ratio: AspectRatio) -> ToolCommand {
    let pattern = frame_pattern(frames_dir);
    ToolCommand::new("ffmpeg")
        .args(["-f", "image2", "-start_number", "0", "-i"])
        .path(&pattern)
        .arg("-vf")
        .arg(pad_filter(aspect_ratio))
        .args(["-f", "image2", "-start_number", "0", "-y"])
        .path(&pattern)
}

/// AVIF frame dump; prints the per-frame timing table on stdout.
pub fn avifdump_command(raw: &Path, frames_dir: &Path, decoder: &str) -> ToolCommand {
    ToolCommand::new("avifdump")
        .args(["--codec", decoder])
        .args(["--png-compress", "0", "--jobs", "all", "--depth", "16"])
        .path(raw)
        .path(frame_pattern(frames_dir))
}

pub fn anim_dump_command(raw: &Path, frames_dir: &Path) -> ToolCommand {
    ToolCommand::new("anim_dump")
        .arg("-folder")
        .path(frames_dir)
        .path(raw)
}

/// Unoptimize a GIF in place so every frame is a full canvas.
pub fn gif_unoptimize_command(raw: &Path) -> ToolCommand {
    ToolCommand::new("gifsicle")
        .arg("-U")
        .path(raw)
        .arg("-o")
        .path(raw)
}

pub fn webpmux_info_command(raw: &Path) -> ToolCommand {
    ToolCommand::new("webpmux").arg("-info").path(raw)
}

/// Per-frame GIF delays in centiseconds.
pub fn gif_delays(path: &Path) -> MediaResult<Vec<u32>> {
    let file = std::fs::File::open(path)?;
    let decoder = GifDecoder::new(BufReader::new(file))?;
    decoder
        .into_frames()
        .map(|frame| -> MediaResult<u32> {
            let (numer, denom) = frame?.delay().numer_denom_ms();
            if denom == 0 {
                return Ok(0);
            }
            Ok((numer as f64 / denom as f64 / 10.0).round() as u32)
        })
        .collect()
}

/// Run stage one for `raw`.
pub async fn analyze(
    raw: &Path,
    container: ContainerType,
    aspect_ratio: AspectRatio,
    av1_decoder: &str,
    cancel: &CancellationToken,
) -> MediaResult<Image> {
    let working_dir = raw
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| MediaError::internal(format!("{} has no parent", raw.display())))?;
    let frames_dir = working_dir.join(FRAMES_DIR);

    // Timing first for the containers whose tools report it.
    let mut delays = match container {
        ContainerType::Gif => {
            gif_unoptimize_command(raw).run(cancel).await?;
            let path = raw.to_path_buf();
            let delays = tokio::task::spawn_blocking(move || gif_delays(&path))
                .await
                .map_err(|e| MediaError::internal(format!("gif decode task failed: {e}")))??;
            Some(delays)
        }
        ContainerType::Webp => {
            let info = webpmux_info_command(raw).output(cancel).await?;
            Some(parse_webpmux(&info.combined()))
        }
        _ => None,
    };

    create_private_dir(&frames_dir).await?;

    match container {
        ContainerType::Avif => {
            let output = avifdump_command(raw, &frames_dir, av1_decoder)
                .output(cancel)
                .await?;
            delays = Some(parse_avifdump(&output.combined())?);
        }
        ContainerType::Webp => {
            anim_dump_command(raw, &frames_dir).run(cancel).await?;
        }
        _ => {
            extract_command(raw, &frames_dir).run(cancel).await?;
        }
    }

    let mut delays = match delays {
        Some(delays) => delays,
        None => frames_by_rate(raw, &frames_dir, cancel).await?,
    };

    pad_command(&frames_dir, aspect_ratio).run(cancel).await?;
    clamp_last_delay(&mut delays);

    let first = frames_dir.join(frame_file_name(0));
    let (width, height) = first_frame_dimensions(first).await?;

    info!(
        container = %container,
        frames = delays.len(),
        width,
        height,
        "Analyzed input"
    );

    Ok(Image {
        working_dir,
        width,
        height,
        delays,
    })
}

/// Count extracted frames and derive a uniform delay from the frame rate.
async fn frames_by_rate(
    raw: &Path,
    frames_dir: &Path,
    cancel: &CancellationToken,
) -> MediaResult<Vec<u32>> {
    let count = count_frames(frames_dir).await?;
    debug!(count, "Counted extracted frames");
    match count {
        0 => Err(MediaError::NoFrames),
        1 => Ok(vec![0]),
        n => {
            let delay = probe_frame_delay(raw, cancel).await?;
            Ok(vec![delay; n])
        }
    }
}

async fn first_frame_dimensions(path: PathBuf) -> MediaResult<(u32, u32)> {
    if !tokio::fs::try_exists(&path).await? {
        return Err(MediaError::FileNotFound(path));
    }
    tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| MediaError::internal(format!("dimension task failed: {e}")))?
        .map_err(MediaError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_pad_filter() {
        assert_eq!(
            pad_filter(AspectRatio::new(3, 1)),
            "format=rgba,pad=h=if(gt(iw/ih\\,3)\\,iw/3\\,ih):w=if(lt(iw/ih\\,1)\\,ih/1\\,iw):x=0:y=(oh-ih):color=#00000000"
        );
    }

    #[test]
    fn test_extract_command() {
        let cmd = extract_command(Path::new("/w/raw.mp4"), Path::new("/w/frames"));
        assert_eq!(
            cmd.build_args(),
            [
                "-i",
                "/w/raw.mp4",
                "-vsync",
                "0",
                "-f",
                "image2",
                "-start_number",
                "0",
                "/w/frames/dump_%04d.png"
            ]
        );
    }

    #[test]
    fn test_pad_command_rewrites_in_place() {
        let cmd = pad_command(Path::new("/w/frames"), AspectRatio::new(3, 1));
        let args = cmd.build_args();
        assert_eq!(args.first().map(String::as_str), Some("-f"));
        assert_eq!(args.last().map(String::as_str), Some("/w/frames/dump_%04d.png"));
        assert!(args.iter().any(|a| a == "-y"));
        assert!(args.iter().any(|a| a.starts_with("format=rgba,pad=")));
    }

    #[test]
    fn test_avifdump_uses_decoder() {
        let cmd = avifdump_command(Path::new("/w/raw.avif"), Path::new("/w/frames"), "libgav1");
        assert_eq!(cmd.program(), "avifdump");
        assert_eq!(&cmd.build_args()[..2], ["--codec", "libgav1"]);
        assert_eq!(cmd.build_args().last().map(String::as_str), Some("/w/frames/dump_%04d.png"));
    }

    #[test]
    fn test_gif_delays_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.gif");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            let frames = [7u32, 4, 10].map(|centis| {
                Frame::from_parts(
                    RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(centis * 10, 1),
                )
            });
            encoder.encode_frames(frames).unwrap();
        }

        assert_eq!(gif_delays(&path).unwrap(), vec![7, 4, 10]);
    }

    #[tokio::test]
    async fn test_first_frame_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump_0000.png");
        RgbaImage::new(96, 32).save(&path).unwrap();

        assert_eq!(first_frame_dimensions(path).await.unwrap(), (96, 32));

        let missing = dir.path().join("dump_0001.png");
        assert!(matches!(
            first_frame_dimensions(missing).await,
            Err(MediaError::FileNotFound(_))
        ));
    }
}

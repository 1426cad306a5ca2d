//! AVIF: ffmpeg converts frames to a y4m stream, avifenc encodes it.

use imgproc_models::image::frame_pattern;
use imgproc_models::Image;
use tokio_util::sync::CancellationToken;

use super::EncodeTarget;
use crate::command::{run_pipe, ToolCommand};
use crate::error::MediaResult;

/// ffmpeg side of the pipe.
pub fn y4m_command(image: &Image, target: &EncodeTarget) -> ToolCommand {
    let cmd = ToolCommand::new("ffmpeg");
    let cmd = if target.delays(image).len() <= 1 {
        cmd.arg("-i").path(image.size_frame(&target.size_name, 0))
    } else {
        cmd.args(["-f", "image2", "-i"])
            .path(frame_pattern(&image.size_dir(&target.size_name)))
    };
    cmd.args([
        "-vsync",
        "0",
        "-f",
        "yuv4mpegpipe",
        "-pix_fmt",
        "yuva444p",
        "-strict",
        "-1",
        "pipe:1",
    ])
}

/// avifenc side of the pipe. Zero durations are sent as 1.
pub fn avifenc_command(image: &Image, target: &EncodeTarget, encoder: &str) -> ToolCommand {
    let delays = target.delays(image);
    let durations = delays
        .iter()
        .map(|d| (*d).max(1).to_string())
        .collect::<Vec<_>>()
        .join(",");

    ToolCommand::new("avifenc")
        .arg("--stdin-durations")
        .arg(delays.len().to_string())
        .arg(durations)
        .args(["--speed", "3", "--timescale", "100"])
        .args(["--min", "10", "--max", "20", "--minalpha", "10", "--maxalpha", "20"])
        .args(["--jobs", "all", "--codec", encoder, "--stdin"])
        .path(target.output_path(image))
}

pub async fn encode(
    image: &Image,
    target: &EncodeTarget,
    encoder: &str,
    cancel: &CancellationToken,
) -> MediaResult<()> {
    run_pipe(
        &y4m_command(image, target),
        &avifenc_command(image, target, encoder),
        cancel,
    )
    .await
}

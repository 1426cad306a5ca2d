//! FFprobe frame timing.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::ToolCommand;
use crate::delays::{delay_from_frame_rate, parse_frame_rate};
use crate::error::MediaResult;

/// `ffprobe` invocation printing the first video stream's `r_frame_rate`.
pub fn frame_rate_command(input: &Path) -> ToolCommand {
    ToolCommand::new("ffprobe")
        .args(["-v", "error"])
        .args(["-select_streams", "v"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .args(["-show_entries", "stream=r_frame_rate"])
        .path(input)
}

/// Per-frame delay in centiseconds derived from the source frame rate.
pub async fn probe_frame_delay(input: &Path, cancel: &CancellationToken) -> MediaResult<u32> {
    let output = frame_rate_command(input).output(cancel).await?;
    let (num, den) = parse_frame_rate(&output.combined())?;
    let delay = delay_from_frame_rate(num, den);
    debug!(num, den, delay, "Probed frame rate");
    Ok(delay)
}

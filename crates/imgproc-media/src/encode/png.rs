//! Static PNG: first resized frame, losslessly optimized.

use imgproc_models::Image;
use tokio_util::sync::CancellationToken;

use super::EncodeTarget;
use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};

pub fn optimize_command(image: &Image, target: &EncodeTarget) -> ToolCommand {
    ToolCommand::new("optipng")
        .arg("-o7")
        .path(target.output_path(image))
}

pub async fn encode(image: &Image, target: &EncodeTarget, cancel: &CancellationToken) -> MediaResult<()> {
    if cancel.is_cancelled() {
        return Err(MediaError::Cancelled);
    }
    tokio::fs::copy(
        image.size_frame(&target.size_name, 0),
        target.output_path(image),
    )
    .await?;
    optimize_command(image, target).run(cancel).await
}

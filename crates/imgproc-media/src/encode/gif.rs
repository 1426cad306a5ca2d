//! Animated GIF: gifski quantizes, gifsicle restores timing and optimizes.

use imgproc_models::Image;
use tokio_util::sync::CancellationToken;

use super::EncodeTarget;
use crate::command::ToolCommand;
use crate::error::MediaResult;

/// The three commands, in order.
pub fn commands(image: &Image, target: &EncodeTarget) -> [ToolCommand; 3] {
    let output = target.output_path(image);
    let delays = target.delays(image);

    let mut gifski = ToolCommand::new("gifski");
    for index in 0..delays.len() {
        gifski = gifski.path(image.size_frame(&target.size_name, index));
    }
    let gifski = gifski.arg("--output").path(&output);

    let mut timing = ToolCommand::new("gifsicle").arg("-b").path(&output);
    for (index, delay) in delays.iter().enumerate() {
        timing = timing
            .arg(format!("--delay={delay}"))
            .arg(format!("#{index}"));
    }

    let optimize = ToolCommand::new("gifsicle").args(["-b", "-O3"]).path(&output);

    [gifski, timing, optimize]
}

pub async fn encode(image: &Image, target: &EncodeTarget, cancel: &CancellationToken) -> MediaResult<()> {
    for cmd in commands(image, target) {
        cmd.run(cancel).await?;
    }
    Ok(())
}

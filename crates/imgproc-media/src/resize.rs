//! Stage two: per-size thumbnails of every frame.

use imgproc_models::image::frame_file_name;
use imgproc_models::{Image, ImageSize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::ToolCommand;
use crate::error::MediaResult;
use crate::fs_utils::create_private_dir;

/// `vipsthumbnail` over all frames. The `-o` template is resolved relative to
/// each input, so output lands in `frames/<size>/dump_NNNN.png`.
pub fn resize_command(image: &Image, size_name: &str, size: ImageSize) -> ToolCommand {
    let frames_dir = image.frames_dir();
    let mut cmd = ToolCommand::new("vipsthumbnail")
        .arg("-o")
        .arg(format!("{size_name}/%s.png"))
        .arg("--size")
        .arg(format!("{}x{}", size.width, size.height));
    for index in 0..image.frame_count() {
        cmd = cmd.path(frames_dir.join(frame_file_name(index)));
    }
    cmd
}

/// Resize every frame of `image` to fit `size`.
pub async fn resize(
    image: &Image,
    size_name: &str,
    size: ImageSize,
    cancel: &CancellationToken,
) -> MediaResult<()> {
    create_private_dir(image.size_dir(size_name)).await?;
    resize_command(image, size_name, size).run(cancel).await?;
    debug!(size = size_name, frames = image.frame_count(), "Resized frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resize_command() {
        let image = Image {
            working_dir: PathBuf::from("/w"),
            width: 96,
            height: 32,
            delays: vec![4, 4],
        };
        let cmd = resize_command(&image, "2x", ImageSize::new(256, 64));
        assert_eq!(cmd.program(), "vipsthumbnail");
        assert_eq!(
            cmd.build_args(),
            [
                "-o",
                "2x/%s.png",
                "--size",
                "256x64",
                "/w/frames/dump_0000.png",
                "/w/frames/dump_0001.png"
            ]
        );
    }
}

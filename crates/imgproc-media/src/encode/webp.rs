//! WEBP: cwebp for a single frame, img2webp for animations.

use imgproc_models::Image;
use tokio_util::sync::CancellationToken;

use super::EncodeTarget;
use crate::command::ToolCommand;
use crate::error::MediaResult;

pub fn command(image: &Image, target: &EncodeTarget) -> ToolCommand {
    let output = target.output_path(image);
    let delays = target.delays(image);

    if delays.len() <= 1 {
        return ToolCommand::new("cwebp")
            .args(["-z", "5", "-preset", "icon", "-sharpness", "3"])
            .path(image.size_frame(&target.size_name, 0))
            .arg("-o")
            .path(&output);
    }

    let mut cmd = ToolCommand::new("img2webp")
        .arg("-o")
        .path(&output)
        .args(["-loop", "0", "-mixed", "-m", "6", "-kmax", "0", "-q", "75"]);
    // img2webp durations are milliseconds
    for (index, delay) in delays.iter().enumerate() {
        cmd = cmd
            .arg("-d")
            .arg((delay * 10).to_string())
            .path(image.size_frame(&target.size_name, index));
    }
    cmd
}

pub async fn encode(image: &Image, target: &EncodeTarget, cancel: &CancellationToken) -> MediaResult<()> {
    command(image, target).run(cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::tests::animated_image;
    use imgproc_models::OutputFormat;

    #[test]
    fn test_animated_webp() {
        let cmd = command(&animated_image(), &EncodeTarget::new("2x", OutputFormat::Webp));
        assert_eq!(cmd.program(), "img2webp");
        assert_eq!(
            cmd.build_args(),
            [
                "-o",
                "/w/2x.webp",
                "-loop",
                "0",
                "-mixed",
                "-m",
                "6",
                "-kmax",
                "0",
                "-q",
                "75",
                "-d",
                "100",
                "/w/frames/2x/dump_0000.png",
                "-d",
                "200",
                "/w/frames/2x/dump_0001.png",
                "-d",
                "300",
                "/w/frames/2x/dump_0002.png"
            ]
        );
    }

    #[test]
    fn test_static_thumbnail_webp() {
        let cmd = command(&animated_image(), &EncodeTarget::thumbnail("2x", OutputFormat::Webp));
        assert_eq!(cmd.program(), "cwebp");
        assert_eq!(
            cmd.build_args(),
            [
                "-z",
                "5",
                "-preset",
                "icon",
                "-sharpness",
                "3",
                "/w/frames/2x/dump_0000.png",
                "-o",
                "/w/2x_static.webp"
            ]
        );
    }
}

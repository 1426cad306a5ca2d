//! Frame timing parsers.
//!
//! All delays are centiseconds.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{MediaError, MediaResult};

fn avifdump_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s+(\d+)\.\d+").expect("static regex"))
}

fn webpmux_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s+\d+:\s+\d+\s+\d+\s+\w+\s+\d+\s+\d+\s+(\d+)\s+\w+\s+\w+\s+\d+\s+\s+\w+")
            .expect("static regex")
    })
}

fn captured_millis(re: &Regex, text: &str) -> Vec<u32> {
    re.captures_iter(text)
        .map(|c| c[1].parse::<u32>().unwrap_or(0) / 10)
        .collect()
}

/// Delays from `webpmux -info`. A file without an animation table is a
/// single static frame.
pub fn parse_webpmux(info: &str) -> Vec<u32> {
    let delays = captured_millis(webpmux_re(), info);
    if delays.is_empty() {
        vec![0]
    } else {
        delays
    }
}

/// Delays from the per-frame timing table `avifdump` prints.
pub fn parse_avifdump(output: &str) -> MediaResult<Vec<u32>> {
    let delays = captured_millis(avifdump_re(), output);
    if delays.is_empty() {
        return Err(MediaError::bad_response("avifdump", "no frame timings"));
    }
    Ok(delays)
}

/// Parse ffprobe's `num/den` frame rate.
pub fn parse_frame_rate(output: &str) -> MediaResult<(u64, u64)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let (num, den) = line
        .split_once('/')
        .ok_or_else(|| MediaError::bad_response("ffprobe", format!("frame rate {line:?}")))?;
    let num = num
        .trim()
        .parse::<u64>()
        .map_err(|_| MediaError::bad_response("ffprobe", format!("frame rate {line:?}")))?;
    let den = den
        .trim()
        .parse::<u64>()
        .map_err(|_| MediaError::bad_response("ffprobe", format!("frame rate {line:?}")))?;
    if num == 0 || den == 0 {
        return Err(MediaError::bad_response("ffprobe", format!("frame rate {line:?}")));
    }
    Ok((num, den))
}

/// `floor(100 / (num / den))`
pub fn delay_from_frame_rate(num: u64, den: u64) -> u32 {
    (100.0 / (num as f64 / den as f64)).floor() as u32
}

/// Tools reject a zero final frame duration.
pub fn clamp_last_delay(delays: &mut [u32]) {
    if let Some(last) = delays.last_mut() {
        if *last == 0 {
            *last = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBPMUX_ANIMATED: &str = "Canvas size: 112 x 112
Features present: animation transparency
Background color : 0xFFFFFFFF  Loop Count : 0
Number of frames: 3
No.: width height alpha x_offset y_offset duration   dispose blend image_size  compression
  1:   112   112    no        0        0       70       none    no       1918       lossy
  2:   112   112   yes        0        0       40 background   no        994       lossy
  3:   112   112   yes        0        0      100       none    no       1216       lossy
";

    #[test]
    fn test_webpmux_animated() {
        assert_eq!(parse_webpmux(WEBPMUX_ANIMATED), vec![7, 4, 10]);
    }

    #[test]
    fn test_webpmux_static() {
        let info = "Canvas size: 64 x 64\nNo features present.\nSize of the image (with alpha): 2048\n";
        assert_eq!(parse_webpmux(info), vec![0]);
    }

    #[test]
    fn test_avifdump() {
        let out = " * Frame 0:\n 0  100.000000\n 1  40.000000\n 2  250.000000\n";
        assert_eq!(parse_avifdump(out).unwrap(), vec![10, 4, 25]);

        let err = parse_avifdump("avifdump: nothing here").unwrap_err();
        assert!(err.to_string().contains("bad response from avifdump"));
    }

    #[test]
    fn test_frame_rate() {
        assert_eq!(parse_frame_rate("30/1\n").unwrap(), (30, 1));
        assert_eq!(parse_frame_rate(" 30000/1001 ").unwrap(), (30000, 1001));
        assert!(parse_frame_rate("N/A").is_err());
        assert!(parse_frame_rate("25").is_err());
        assert!(parse_frame_rate("0/0").is_err());

        assert_eq!(delay_from_frame_rate(30, 1), 3);
        assert_eq!(delay_from_frame_rate(25, 1), 4);
        assert_eq!(delay_from_frame_rate(30000, 1001), 3);
        assert_eq!(delay_from_frame_rate(10, 1), 10);
    }

    #[test]
    fn test_clamp_last_delay() {
        let mut delays = vec![0, 0, 0];
        clamp_last_delay(&mut delays);
        assert_eq!(delays, vec![0, 0, 1]);

        let mut delays = vec![5];
        clamp_last_delay(&mut delays);
        assert_eq!(delays, vec![5]);

        let mut delays: Vec<u32> = Vec::new();
        clamp_last_delay(&mut delays);
        assert!(delays.is_empty());
    }
}

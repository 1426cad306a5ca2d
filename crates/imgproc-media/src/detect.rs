//! Container detection by magic numbers.
//!
//! Predicates are tried in a fixed order and the first match wins. AVIF is
//! tried last because its test only looks at the `ftyp` box header.

use imgproc_models::ContainerType;

use crate::error::{MediaError, MediaResult};

type Predicate = fn(&[u8]) -> bool;

const PREDICATES: &[(ContainerType, Predicate)] = &[
    (ContainerType::Avi, is_avi),
    (ContainerType::Flv, is_flv),
    (ContainerType::Gif, is_gif),
    (ContainerType::Jpeg, is_jpeg),
    (ContainerType::Mp4, is_mp4),
    (ContainerType::Png, is_png),
    (ContainerType::Tiff, is_tiff),
    (ContainerType::Webm, is_webm),
    (ContainerType::Webp, is_webp),
    (ContainerType::Mov, is_mov),
    (ContainerType::Avif, is_avif),
];

/// Classify a raw buffer.
pub fn detect(data: &[u8]) -> MediaResult<ContainerType> {
    PREDICATES
        .iter()
        .find(|(_, test)| test(data))
        .map(|(kind, _)| *kind)
        .ok_or(MediaError::UnknownFormat)
}

fn at(data: &[u8], offset: usize, magic: &[u8]) -> bool {
    data.get(offset..offset + magic.len()) == Some(magic)
}

fn ends_with(data: &[u8], magic: &[u8]) -> bool {
    data.ends_with(magic)
}

fn is_avi(data: &[u8]) -> bool {
    data.len() >= 16 && at(data, 0, b"RIFF") && at(data, 8, b"AVI LIST")
}

fn is_flv(data: &[u8]) -> bool {
    at(data, 0, b"FLV\x01")
}

fn is_gif(data: &[u8]) -> bool {
    data.len() >= 6
        && (at(data, 0, b"GIF87a") || at(data, 0, b"GIF89a"))
        && ends_with(data, b"\x00;")
}

fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && at(data, 0, &[0xFF, 0xD8]) && ends_with(data, &[0xFF, 0xD9])
}

fn is_mp4(data: &[u8]) -> bool {
    at(data, 4, b"ftyp") && (at(data, 8, b"MSNV") || at(data, 8, b"isom") || at(data, 8, b"mp42"))
}

fn is_png(data: &[u8]) -> bool {
    data.len() >= 8
        && at(data, 0, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
        && ends_with(data, &[b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82])
}

fn is_tiff(data: &[u8]) -> bool {
    data.len() >= 4 && (at(data, 0, b"I I") || at(data, 0, b"II*\x00"))
}

fn is_webm(data: &[u8]) -> bool {
    at(data, 0, &[0x1A, 0x45, 0xDF, 0xA3])
}

fn is_webp(data: &[u8]) -> bool {
    at(data, 0, b"RIFF") && at(data, 8, b"WEBP")
}

fn is_mov(data: &[u8]) -> bool {
    at(data, 4, b"ftyp") && at(data, 8, b"qt  ")
}

fn is_avif(data: &[u8]) -> bool {
    at(data, 0, &[0x00, 0x00])
        && at(data, 4, b"ftyp")
        && (at(data, 8, b"avis") || at(data, 8, b"avif"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ftyp(size: [u8; 4], brand: &[u8; 4]) -> Vec<u8> {
        let mut data = size.to_vec();
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(brand);
        data.extend_from_slice(&[0; 20]);
        data
    }

    #[test]
    fn test_detects_every_signature() {
        let mut avi = b"RIFF\x00\x00\x00\x00AVI LIST".to_vec();
        avi.extend_from_slice(&[0; 8]);
        assert_eq!(detect(&avi).unwrap(), ContainerType::Avi);

        assert_eq!(detect(b"FLV\x01\x05\x00\x00\x00\x09").unwrap(), ContainerType::Flv);
        assert_eq!(detect(b"GIF89a\x01\x00\x01\x00\x00;").unwrap(), ContainerType::Gif);
        assert_eq!(detect(b"GIF87a\x01\x00\x00;").unwrap(), ContainerType::Gif);
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0xFF, 0xD9]).unwrap(), ContainerType::Jpeg);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x18], b"isom")).unwrap(), ContainerType::Mp4);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x18], b"mp42")).unwrap(), ContainerType::Mp4);

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0; 12]);
        png.extend_from_slice(&[b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82]);
        assert_eq!(detect(&png).unwrap(), ContainerType::Png);

        assert_eq!(detect(b"II*\x00\x08\x00").unwrap(), ContainerType::Tiff);
        assert_eq!(detect(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]).unwrap(), ContainerType::Webm);
        assert_eq!(detect(b"RIFF\x24\x00\x00\x00WEBPVP8 ").unwrap(), ContainerType::Webp);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x14], b"qt  ")).unwrap(), ContainerType::Mov);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x20], b"avif")).unwrap(), ContainerType::Avif);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x2C], b"avis")).unwrap(), ContainerType::Avif);
    }

    #[test]
    fn test_stricter_format_wins_over_avif() {
        // Zero size prefix and ftyp box: AVIF's loose header, but an MP4 brand.
        assert_eq!(detect(&ftyp([0, 0, 0, 0x20], b"isom")).unwrap(), ContainerType::Mp4);
        assert_eq!(detect(&ftyp([0, 0, 0, 0x20], b"qt  ")).unwrap(), ContainerType::Mov);
    }

    #[test]
    fn test_truncated_buffers_do_not_match() {
        assert!(matches!(detect(b""), Err(MediaError::UnknownFormat)));
        assert!(matches!(detect(b"RIFF"), Err(MediaError::UnknownFormat)));
        assert!(matches!(detect(b"\x00\x00\x00\x00ftypav"), Err(MediaError::UnknownFormat)));
        // GIF header without the trailer
        assert!(matches!(detect(b"GIF89a\x01\x00\x01\x00"), Err(MediaError::UnknownFormat)));
    }

    #[test]
    fn test_riff_disambiguation() {
        let mut avi = b"RIFF\x00\x00\x00\x00AVI LIST".to_vec();
        avi.extend_from_slice(&[0; 8]);
        assert_ne!(detect(&avi).unwrap(), ContainerType::Webp);
        assert_ne!(detect(b"RIFF\x24\x00\x00\x00WEBPVP8 ").unwrap(), ContainerType::Avi);
    }
}

//! RGBA frame type and pixel format conversion.

use std::time::Instant;

/// A captured RGBA camera frame.
#[derive(Clone)]
pub struct RgbaFrame {
    /// Interleaved RGBA pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    /// Driver frame sequence number.
    pub sequence: u32,
}

impl RgbaFrame {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Encode the frame as JPEG at the given quality (1–100).
    ///
    /// Alpha is discarded; anomaly snapshots use quality 80.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or(FrameError::InvalidLength {
                expected: self.pixel_count() * 4,
                actual: self.data.len(),
            })?;
        let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();

        let mut out = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(rgb.as_raw(), self.width, self.height, image::ExtendedColorType::Rgb8)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }
}

/// Convert packed YUYV (4:2:2) to interleaved RGBA.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]. Both pixels share
/// the chroma pair. Conversion follows ITU-R BT.601.
pub fn yuyv_to_rgba(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: yuyv.len() });
    }

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_yuv_pixel(&mut rgba, y0, u, v);
        push_yuv_pixel(&mut rgba, y1, u, v);
    }
    Ok(rgba)
}

/// Expand 8-bit grayscale to interleaved RGBA by channel replication.
pub fn gray_to_rgba(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if gray.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: gray.len() });
    }

    let mut rgba = Vec::with_capacity(expected * 4);
    for &value in &gray[..expected] {
        rgba.extend_from_slice(&[value, value, value, 255]);
    }
    Ok(rgba)
}

fn push_yuv_pixel(rgba: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    // BT.601 integer approximation.
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    rgba.push(r.clamp(0, 255) as u8);
    rgba.push(g.clamp(0, 255) as u8);
    rgba.push(b.clamp(0, 255) as u8);
    rgba.push(255);
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_mid_gray() {
        // Y=128, U=V=128 is neutral gray; BT.601 maps it to (130, 130, 130).
        let yuyv = vec![128, 128, 128, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1).unwrap();
        assert_eq!(rgba.len(), 8);
        assert_eq!(&rgba[..4], &[130, 130, 130, 255]);
        assert_eq!(&rgba[4..], &[130, 130, 130, 255]);
    }

    #[test]
    fn test_yuyv_black_and_white() {
        // Y=16 is reference black, Y=235 reference white.
        let yuyv = vec![16, 128, 235, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1).unwrap();
        assert_eq!(&rgba[..3], &[0, 0, 0]);
        assert_eq!(&rgba[4..7], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_distinct_luma_per_pixel() {
        let yuyv = vec![60, 128, 200, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1).unwrap();
        assert!(rgba[0] < rgba[4], "first pixel must be darker than second");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![128, 128];
        assert!(yuyv_to_rgba(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_gray_replication() {
        let gray = vec![0, 100, 255];
        let rgba = gray_to_rgba(&gray, 3, 1).unwrap();
        assert_eq!(rgba, vec![0, 0, 0, 255, 100, 100, 100, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn test_gray_invalid_length() {
        assert!(gray_to_rgba(&[1, 2], 2, 2).is_err());
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let frame = RgbaFrame {
            data: vec![128; 16 * 16 * 4],
            width: 16,
            height: 16,
            timestamp: Instant::now(),
            sequence: 0,
        };
        let jpeg = frame.encode_jpeg(80).unwrap();
        // JPEG start-of-image marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_jpeg_rejects_short_buffer() {
        let frame = RgbaFrame {
            data: vec![128; 10],
            width: 16,
            height: 16,
            timestamp: Instant::now(),
            sequence: 0,
        };
        assert!(frame.encode_jpeg(80).is_err());
    }
}

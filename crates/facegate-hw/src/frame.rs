//! Grayscale frames, pixel conversion, dark-frame rejection and PNG encoding.

use facegate_core::CapturedFrame;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Fraction of near-black pixels above which a frame is considered dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A single grayscale still from the camera.
#[derive(Clone)]
pub struct Frame {
    /// One byte per pixel, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// Mean pixel value, 0.0–255.0.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.data, DARK_FRAME_THRESHOLD)
    }

    /// Encode as an 8-bit grayscale PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        let expected = (self.width as usize) * (self.height as usize);
        if self.data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&self.data, self.width, self.height, ExtendedColorType::L8)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(png)
    }

    /// Encode into the upload form expected by the backend.
    pub fn to_captured(&self) -> Result<CapturedFrame, FrameError> {
        Ok(CapturedFrame {
            png: self.encode_png()?,
            width: self.width,
            height: self.height,
        })
    }
}

/// Load an image file and re-encode it as PNG for upload.
pub fn load_image_file(path: &Path) -> Result<CapturedFrame, FrameError> {
    let img = image::open(path).map_err(|e| FrameError::Decode(format!("{}: {e}", path.display())))?;
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(CapturedFrame {
        png: png.into_inner(),
        width: img.width(),
        height: img.height(),
    })
}

/// Extract the luma channel from packed YUYV 4:2:2 (`[Y0, U, Y1, V]` per pixel pair).
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if y16.len() < pixels * 2 {
        return Err(FrameError::InvalidLength {
            expected: pixels * 2,
            actual: y16.len(),
        });
    }
    Ok(y16[..pixels * 2].chunks_exact(2).map(|px| px[1]).collect())
}

/// True if more than `threshold_pct` of pixels are below 32. Empty input is dark.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error("image decoding failed: {0}")]
    Decode(String),
}

impl From<FrameError> for facegate_core::CaptureError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidLength { .. } => Self::Failed(err.to_string()),
            FrameError::Encode(msg) | FrameError::Decode(msg) => Self::Encode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            sequence: 0,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let gray = yuyv_to_grayscale(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_grayscale(&[100, 128], 2, 1).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_dimensions_report_length_without_overflow() {
        // 65536 * 65536 * 2 wraps to zero in u32 arithmetic
        let err = yuyv_to_grayscale(&[0u8; 4], 65536, 65536).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidLength { expected, actual: 4 } if expected == 65536 * 65536 * 2
        ));
        assert!(y16_to_grayscale(&[0u8; 4], 65536, 65536).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let gray = y16_to_grayscale(&[0x34, 0x12, 0xFF, 0x80], 2, 1).unwrap();
        assert_eq!(gray, vec![0x12, 0x80]);
        assert!(y16_to_grayscale(&[0x34, 0x12], 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(is_dark_frame(&[0u8; 1000], DARK_FRAME_THRESHOLD));
        assert!(!is_dark_frame(&[128u8; 1000], DARK_FRAME_THRESHOLD));
        assert!(is_dark_frame(&[], DARK_FRAME_THRESHOLD));

        // 94% dark, 6% bright → not dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!frame(gray, 1000, 1).is_dark());
    }

    #[test]
    fn test_avg_brightness() {
        assert_eq!(frame(vec![0, 100, 200, 100], 2, 2).avg_brightness(), 100.0);
        assert_eq!(frame(vec![], 0, 0).avg_brightness(), 0.0);
    }

    #[test]
    fn test_encode_png() {
        let data: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();
        let captured = frame(data, 8, 8).to_captured().unwrap();

        assert_eq!(&captured.png[..8], &PNG_MAGIC);
        assert_eq!((captured.width, captured.height), (8, 8));

        let decoded = image::load_from_memory(&captured.png).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(1, 0).0, [4]);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let err = frame(vec![0; 10], 4, 4).encode_png().unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidLength {
                expected: 16,
                actual: 10
            }
        ));
    }
}

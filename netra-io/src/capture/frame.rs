//! Captured frame and its JPEG codec

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::time::Instant;

/// One decoded camera image.
///
/// The bitmap is immutable once captured; consumers share it through
/// `Arc<Frame>` and make their own copy when they need to draw on it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
    /// Position in the capture stream (0 for frames built elsewhere)
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Baseline JPEG at the given quality (1-100)
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }

    pub fn decode_jpeg(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8();
        Ok(Self::new(image))
    }

    /// Copy without the bottom `rows` rows (the robot's own chassis is in
    /// view there). Never crops below one row.
    pub fn crop_bottom(&self, rows: u32) -> Frame {
        let keep = self.height().saturating_sub(rows).max(1).min(self.height());
        let image = image::imageops::crop_imm(&self.image, 0, 0, self.width(), keep).to_image();
        Frame {
            image,
            captured_at: self.captured_at,
            sequence: self.sequence,
        }
    }

    /// Dark frame with a hatched border, shown when no real image exists
    /// (idle task, receive timeout).
    pub fn placeholder(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let border = x < 4 || y < 4 || x + 4 >= width || y + 4 >= height;
            if border && (x + y) % 8 < 4 {
                Rgb([255, 200, 0])
            } else {
                Rgb([24, 24, 24])
            }
        });
        Frame::new(image)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((image.width() * image.height() / 8) as usize);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_has_soi_and_eoi() {
        let frame = Frame::placeholder(64, 48);
        let jpeg = frame.encode_jpeg(70).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

        let decoded = Frame::decode_jpeg(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_crop_bottom() {
        let frame = Frame::placeholder(32, 100);
        assert_eq!(frame.crop_bottom(40).height(), 60);
        assert_eq!(frame.crop_bottom(0).height(), 100);
        assert_eq!(frame.crop_bottom(500).height(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode_jpeg(b"not a jpeg").is_err());
    }
}

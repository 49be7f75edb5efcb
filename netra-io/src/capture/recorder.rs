//! Session recorder
//!
//! Writes every captured frame, stamped with the wall-clock time, as a
//! numbered JPEG into one directory per run:
//!
//! ```text
//! <record_dir>/2025-06-01_14-03-22-replay/frame_000001.jpg
//!                                         frame_000002.jpg
//!                                         ...
//! ```
//!
//! File names sort in capture order, so a `ReplayCamera` pointed at the
//! session directory plays it back as recorded.

use super::encode_jpeg;
use crate::error::Result;
use chrono::Local;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

const RECORD_QUALITY: u8 = 85;

const STAMP_ORIGIN: (u32, u32) = (10, 10);
const STAMP_SCALE: u32 = 2;
const STAMP_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// 3x5 glyphs, one row per byte, high bit on the left
fn glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        _ => [0; 5],
    }
}

/// Draw `text` with its top-left corner at (x, y), clipped to the image
fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>, scale: u32) {
    let advance = 4 * scale;
    for (i, c) in text.chars().enumerate() {
        let left = x + i as u32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = left + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < image.width() && py < image.height() {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

/// Records captured frames of one run for later replay
pub struct SessionRecorder {
    dir: PathBuf,
    recorded: u64,
}

impl SessionRecorder {
    /// Create `<root>/<date>-replay` for this run
    pub fn create(root: &Path) -> Result<Self> {
        let started = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let dir = root.join(format!("{}-replay", started));
        fs::create_dir_all(&dir)?;
        log::info!("Recording session to {}", dir.display());
        Ok(Self { dir, recorded: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Stamp and store one frame; the camera's image is left untouched
    pub fn record(&mut self, image: &RgbImage) -> Result<PathBuf> {
        let mut stamped = image.clone();
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        draw_text(
            &mut stamped,
            STAMP_ORIGIN.0,
            STAMP_ORIGIN.1,
            &now,
            STAMP_COLOR,
            STAMP_SCALE,
        );
        let path = self.dir.join(format!("frame_{:06}.jpg", self.recorded + 1));
        fs::write(&path, encode_jpeg(&stamped, RECORD_QUALITY)?)?;
        self.recorded += 1;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Camera, ReplayCamera};

    #[test]
    fn test_draw_text_glyph() {
        let mut image = RgbImage::new(8, 8);
        draw_text(&mut image, 1, 1, "7", Rgb([9, 9, 9]), 1);
        // Top bar of the 7, then only the right column
        assert_eq!(image.get_pixel(1, 1), &Rgb([9, 9, 9]));
        assert_eq!(image.get_pixel(3, 1), &Rgb([9, 9, 9]));
        assert_eq!(image.get_pixel(1, 3), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(3, 5), &Rgb([9, 9, 9]));
    }

    #[test]
    fn test_draw_text_clips_at_edge() {
        let mut image = RgbImage::new(5, 3);
        draw_text(&mut image, 0, 0, "88:88", Rgb([1, 2, 3]), 2);
        assert_eq!(image.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_recorded_session_replays_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(root.path()).unwrap();
        assert_eq!(recorder.dir().parent(), Some(root.path()));
        assert!(
            recorder
                .dir()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("-replay"))
        );

        let colors = [Rgb([220, 20, 20]), Rgb([20, 220, 20]), Rgb([20, 20, 220])];
        for color in colors {
            recorder.record(&RgbImage::from_pixel(96, 64, color)).unwrap();
        }
        assert_eq!(recorder.recorded(), 3);
        assert!(recorder.dir().join("frame_000003.jpg").exists());

        let mut replay = ReplayCamera::open(recorder.dir(), 1000).unwrap();
        assert_eq!(replay.len(), 3);
        for color in colors {
            let image = replay.read().unwrap().unwrap();
            assert_eq!(image.dimensions(), (96, 64));
            // Far corner, away from the timestamp
            let pixel = image.get_pixel(90, 58);
            for channel in 0..3 {
                assert!(pixel[channel].abs_diff(color[channel]) < 30, "{:?}", pixel);
            }
        }
    }

    #[test]
    fn test_record_leaves_source_image_unstamped() {
        let root = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::create(root.path()).unwrap();
        let image = RgbImage::from_pixel(64, 48, Rgb([200, 200, 200]));
        recorder.record(&image).unwrap();
        assert!(image.pixels().all(|p| *p == Rgb([200, 200, 200])));
    }
}

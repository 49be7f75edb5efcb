//! Frame sources for the capture thread

use crate::config::{CameraConfig, CameraSource};
use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Anything that yields camera images
pub trait Camera: Send {
    /// Next image; `Ok(None)` when no image is ready yet
    fn read(&mut self) -> Result<Option<RgbImage>>;

    fn name(&self) -> &str;
}

/// Paces a source to its configured frame rate
struct FramePacer {
    interval: Duration,
    next_due: Instant,
}

impl FramePacer {
    fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: Instant::now(),
        }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + self.interval;
    }
}

/// Moving test pattern: three colored blocks drifting over a gray floor
/// with a dark bar rotating through the middle.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u32,
    pacer: FramePacer,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
            pacer: FramePacer::new(fps),
        }
    }

    fn render(&self) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let block = (w.min(h) / 8).max(2);
        let drift = self.tick % w.max(1);
        let blocks = [
            (Rgb([220, 30, 30]), w / 6),
            (Rgb([30, 200, 40]), w / 2),
            (Rgb([30, 60, 220]), 5 * w / 6),
        ];
        let bar_angle = (self.tick as f64 * 0.02).sin() * 0.5;
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);

        RgbImage::from_fn(w, h, |x, y| {
            for (color, center) in blocks {
                let bx = (center + drift) % w.max(1);
                if x.abs_diff(bx) < block && y.abs_diff(h / 4) < block {
                    return color;
                }
            }
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            let along = dx * bar_angle.cos() + dy * bar_angle.sin();
            let across = -dx * bar_angle.sin() + dy * bar_angle.cos();
            if along.abs() < w as f64 / 4.0 && across.abs() < 3.0 {
                return Rgb([10, 10, 10]);
            }
            let shade = 120 + ((x + y) % 16) as u8;
            Rgb([shade, shade, shade])
        })
    }
}

impl Camera for SyntheticCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        self.pacer.wait();
        let image = self.render();
        self.tick = self.tick.wrapping_add(1);
        Ok(Some(image))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Replays the image files of a directory in name order, looping forever
pub struct ReplayCamera {
    files: Vec<PathBuf>,
    next: usize,
    pacer: FramePacer,
    name: String,
}

impl ReplayCamera {
    pub fn open(dir: &Path, fps: u32) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "no jpg/png files in {}",
                dir.display()
            )));
        }
        log::info!("Replaying {} images from {}", files.len(), dir.display());
        Ok(Self {
            files,
            next: 0,
            pacer: FramePacer::new(fps),
            name: dir.display().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Camera for ReplayCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        self.pacer.wait();
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        Ok(Some(image::open(path)?.to_rgb8()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
}

/// V4L2 camera read through OpenCV
#[cfg(feature = "device-camera")]
pub use device::DeviceCamera;

#[cfg(feature = "device-camera")]
mod device {
    use super::Camera;
    use crate::error::{Error, Result};
    use image::RgbImage;
    use opencv::core::Mat;
    use opencv::prelude::*;
    use opencv::{imgproc, videoio};

    fn camera_error(name: &str, e: opencv::Error) -> Error {
        Error::Camera(format!("{}: {}", name, e))
    }

    /// USB camera in MJPG mode with a one-frame driver buffer, so every
    /// read returns the newest image rather than a queued one.
    pub struct DeviceCamera {
        capture: videoio::VideoCapture,
        bgr: Mat,
        rgb: Mat,
        name: String,
    }

    impl DeviceCamera {
        /// Open `/dev/video<index>`
        pub fn open_index(index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
            let name = format!("/dev/video{}", index);
            let index = i32::try_from(index)
                .map_err(|_| Error::InvalidParameter(format!("camera index {}", index)))?;
            let capture = videoio::VideoCapture::new(index, videoio::CAP_V4L2)
                .map_err(|e| camera_error(&name, e))?;
            Self::configure(capture, name, width, height, fps)
        }

        /// Open a device node such as `/dev/video2`
        pub fn open_path(path: &str, width: u32, height: u32, fps: u32) -> Result<Self> {
            let capture = videoio::VideoCapture::from_file(path, videoio::CAP_V4L2)
                .map_err(|e| camera_error(path, e))?;
            Self::configure(capture, path.to_string(), width, height, fps)
        }

        fn configure(
            mut capture: videoio::VideoCapture,
            name: String,
            width: u32,
            height: u32,
            fps: u32,
        ) -> Result<Self> {
            if !capture.is_opened().map_err(|e| camera_error(&name, e))? {
                return Err(Error::Camera(format!("{}: failed to open", name)));
            }
            let mjpg = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G')
                .map_err(|e| camera_error(&name, e))?;
            let properties = [
                (videoio::CAP_PROP_FOURCC, f64::from(mjpg)),
                (videoio::CAP_PROP_FRAME_WIDTH, f64::from(width)),
                (videoio::CAP_PROP_FRAME_HEIGHT, f64::from(height)),
                (videoio::CAP_PROP_FPS, f64::from(fps)),
                (videoio::CAP_PROP_BUFFERSIZE, 1.0),
            ];
            for (property, value) in properties {
                if !capture.set(property, value).map_err(|e| camera_error(&name, e))? {
                    log::warn!("{} ignored property {} = {}", name, property, value);
                }
            }
            log::info!("Opened camera {} ({}x{} @ {} fps, MJPG)", name, width, height, fps);
            Ok(Self {
                capture,
                bgr: Mat::default(),
                rgb: Mat::default(),
                name,
            })
        }
    }

    impl Camera for DeviceCamera {
        fn read(&mut self) -> Result<Option<RgbImage>> {
            let grabbed = self
                .capture
                .read(&mut self.bgr)
                .map_err(|e| camera_error(&self.name, e))?;
            if !grabbed || self.bgr.rows() == 0 {
                return Ok(None);
            }
            imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)
                .map_err(|e| camera_error(&self.name, e))?;
            let (width, height) = (self.rgb.cols() as u32, self.rgb.rows() as u32);
            let bytes = self
                .rgb
                .data_bytes()
                .map_err(|e| camera_error(&self.name, e))?
                .to_vec();
            RgbImage::from_raw(width, height, bytes).map(Some).ok_or_else(|| {
                Error::Camera(format!(
                    "{}: unexpected {}x{} frame layout",
                    self.name, width, height
                ))
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(feature = "device-camera")]
fn open_device(config: &CameraConfig) -> Result<Box<dyn Camera>> {
    let camera = match &config.device {
        Some(path) => DeviceCamera::open_path(
            &path.to_string_lossy(),
            config.width,
            config.height,
            config.fps,
        )?,
        None => DeviceCamera::open_index(
            config.device_index,
            config.width,
            config.height,
            config.fps,
        )?,
    };
    Ok(Box::new(camera))
}

#[cfg(not(feature = "device-camera"))]
fn open_device(_config: &CameraConfig) -> Result<Box<dyn Camera>> {
    Err(Error::Config(
        "camera.source = \"device\" needs netra-io built with the device-camera feature \
         (use \"synthetic\" or \"replay\" otherwise)"
            .to_string(),
    ))
}

/// Build the configured camera
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn Camera>> {
    match config.source {
        CameraSource::Device => open_device(config),
        CameraSource::Synthetic => Ok(Box::new(SyntheticCamera::new(
            config.width,
            config.height,
            config.fps,
        ))),
        CameraSource::Replay => {
            let dir = config.replay_dir.as_deref().ok_or_else(|| {
                Error::Config("camera.replay_dir is required for the replay source".to_string())
            })?;
            Ok(Box::new(ReplayCamera::open(dir, config.fps)?))
        }
    }
}

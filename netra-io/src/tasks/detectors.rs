//! Reference detectors
//!
//! Plain pixel statistics over the RGB frame: per-color masks for the
//! materials and annuli, a dark-pixel mask for floor markings. Each
//! detector draws what it found onto a copy of the frame.
//!
//! | Name | Record | Finishes |
//! |------|--------|----------|
//! | `material` | `C rgb E` | every frame |
//! | `material_motion` | `C rgb E` | when the area assignment changes |
//! | `right_angle` | `L S AAAA XXX YYY E` | once an elongated marking is seen |
//! | `annulus` | `L 0000 XXX YYY E` | once a hollow round marking is seen |
//! | `annulus_colors` | `R..G..B..` | every frame |
//! | `reset_tracking` | none | immediately (housekeeping) |

use super::records::{AngleRecord, AnnulusColorsRecord, AnnulusRecord, MaterialRecord};
use super::registry::{DetectOutcome, Detection, Detector};
use crate::capture::Frame;
use crate::config::TaskConfig;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::Arc;

/// A channel must reach this value to count as colored
const MIN_CHANNEL: i32 = 100;
/// ...and exceed both other channels by this much
const DOMINANCE: i32 = 50;
/// Luma below this counts as a dark floor marking
const DARK_LUMA: u32 = 60;
/// Smallest color blob taken as a real object
const MIN_BLOB_PIXELS: u32 = 40;
/// Smallest dark region taken as a marking
const MIN_MARKING_PIXELS: u32 = 150;
/// Major/minor axis variance ratio required for a line
const LINE_ELONGATION: f64 = 4.0;

const AREA_COLOR: Rgb<u8> = Rgb([200, 0, 255]);
const FOUND_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Material and annulus colors, in record order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Red,
    Green,
    Blue,
}

impl Marker {
    pub const ALL: [Marker; 3] = [Marker::Red, Marker::Green, Marker::Blue];

    fn index(self) -> usize {
        self as usize
    }

    /// Which marker color a pixel belongs to, if any
    pub fn classify(pixel: &Rgb<u8>) -> Option<Marker> {
        let [r, g, b] = pixel.0.map(i32::from);
        if r >= MIN_CHANNEL && r - g.max(b) >= DOMINANCE {
            Some(Marker::Red)
        } else if g >= MIN_CHANNEL && g - r.max(b) >= DOMINANCE {
            Some(Marker::Green)
        } else if b >= MIN_CHANNEL && b - r.max(g) >= DOMINANCE {
            Some(Marker::Blue)
        } else {
            None
        }
    }
}

/// Pixel statistics of one mask
#[derive(Debug, Clone, Copy)]
struct Blob {
    count: u32,
    sum_x: u64,
    sum_y: u64,
    min: (u32, u32),
    max: (u32, u32),
}

impl Blob {
    fn new() -> Self {
        Self {
            count: 0,
            sum_x: 0,
            sum_y: 0,
            min: (u32::MAX, u32::MAX),
            max: (0, 0),
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.sum_x += u64::from(x);
        self.sum_y += u64::from(y);
        self.min = (self.min.0.min(x), self.min.1.min(y));
        self.max = (self.max.0.max(x), self.max.1.max(y));
    }

    fn center(&self) -> (u32, u32) {
        let n = u64::from(self.count.max(1));
        ((self.sum_x / n) as u32, (self.sum_y / n) as u32)
    }

    fn size(&self) -> (u32, u32) {
        (self.max.0 - self.min.0 + 1, self.max.1 - self.min.1 + 1)
    }
}

fn luma(pixel: &Rgb<u8>) -> u32 {
    let [r, g, b] = pixel.0.map(u32::from);
    (299 * r + 587 * g + 114 * b) / 1000
}

fn is_dark(pixel: &Rgb<u8>) -> bool {
    luma(pixel) < DARK_LUMA
}

/// One blob per marker color, `None` where too few pixels matched
fn color_blobs(image: &RgbImage) -> [Option<Blob>; 3] {
    let mut blobs = [Blob::new(); 3];
    for (x, y, pixel) in image.enumerate_pixels() {
        if let Some(marker) = Marker::classify(pixel) {
            blobs[marker.index()].add(x, y);
        }
    }
    blobs.map(|b| (b.count >= MIN_BLOB_PIXELS).then_some(b))
}

fn dark_pixels(image: &RgbImage) -> (Blob, Vec<(u32, u32)>) {
    let mut blob = Blob::new();
    let mut points = Vec::new();
    for (x, y, pixel) in image.enumerate_pixels() {
        if is_dark(pixel) {
            blob.add(x, y);
            points.push((x, y));
        }
    }
    (blob, points)
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rect(image: &mut RgbImage, min: (u32, u32), max: (u32, u32), color: Rgb<u8>) {
    let (x0, y0, x1, y1) = (
        i64::from(min.0),
        i64::from(min.1),
        i64::from(max.0),
        i64::from(max.1),
    );
    for x in x0..=x1 {
        put(image, x, y0, color);
        put(image, x, y1, color);
    }
    for y in y0..=y1 {
        put(image, x0, y, color);
        put(image, x1, y, color);
    }
}

fn draw_cross(image: &mut RgbImage, center: (u32, u32), color: Rgb<u8>) {
    let (cx, cy) = (i64::from(center.0), i64::from(center.1));
    for d in -5..=5 {
        put(image, cx + d, cy, color);
        put(image, cx, cy + d, color);
    }
}

fn draw_ray(image: &mut RgbImage, from: (u32, u32), degrees: f64, length: u32, color: Rgb<u8>) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    for step in 0..=length {
        let x = f64::from(from.0) + cos * f64::from(step);
        let y = f64::from(from.1) + sin * f64::from(step);
        put(image, x.round() as i64, y.round() as i64, color);
    }
}

fn annotated(frame: &Frame, image: RgbImage) -> Frame {
    Frame {
        image,
        captured_at: frame.captured_at,
        sequence: frame.sequence,
    }
}

/// Area number (1-based) whose rectangle contains `point`
fn area_of(config: &TaskConfig, point: (u32, u32)) -> Option<u8> {
    config
        .areas
        .iter()
        .position(|area| area.contains(point.0, point.1))
        .map(|i| i as u8 + 1)
}

/// Area assignment per marker color plus the annotated image
fn locate_materials(frame: &Frame, config: &TaskConfig) -> ([Option<u8>; 3], RgbImage) {
    let mut image = frame.image.clone();
    for area in &config.areas {
        draw_rect(&mut image, (area.x0, area.y0), (area.x1, area.y1), AREA_COLOR);
    }
    let blobs = color_blobs(&frame.image);
    let mut areas = [None; 3];
    for (slot, blob) in areas.iter_mut().zip(blobs.iter()) {
        if let Some(blob) = blob {
            draw_rect(&mut image, blob.min, blob.max, FOUND_COLOR);
            draw_cross(&mut image, blob.center(), CENTER_COLOR);
            *slot = area_of(config, blob.center());
        }
    }
    (areas, image)
}

fn material_record(areas: [Option<u8>; 3]) -> MaterialRecord {
    MaterialRecord {
        red: areas[0],
        green: areas[1],
        blue: areas[2],
    }
}

/// Reports which area each material is in
pub struct MaterialDetector;

impl Detector for MaterialDetector {
    fn name(&self) -> &str {
        "material"
    }

    fn detect(&mut self, frame: &Frame, config: &TaskConfig) -> Detection {
        let (areas, image) = locate_materials(frame, config);
        Detection::result(material_record(areas), annotated(frame, image))
    }
}

/// Area assignment seen on the previous motion check
#[derive(Debug, Default)]
pub struct MotionTracker {
    last: Option<[Option<u8>; 3]>,
}

impl MotionTracker {
    /// Record `now` and report whether the materials moved to a settled
    /// new layout: the assignment changed and it is either complete
    /// (three different values) or a single material remains.
    pub fn update(&mut self, now: [Option<u8>; 3]) -> bool {
        let last = self.last.replace(now).unwrap_or(now);
        if now == last {
            return false;
        }
        let distinct = {
            let mut values = now.to_vec();
            values.sort();
            values.dedup();
            values.len()
        };
        let missing = now.iter().filter(|a| a.is_none()).count();
        distinct == 3 || missing == 2
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// State shared between detectors built from one set of bindings
#[derive(Default)]
pub struct SharedState {
    motion: Arc<Mutex<MotionTracker>>,
}

/// Reports the material layout once it changes
pub struct MaterialMotionDetector {
    tracker: Arc<Mutex<MotionTracker>>,
}

impl Detector for MaterialMotionDetector {
    fn name(&self) -> &str {
        "material_motion"
    }

    fn detect(&mut self, frame: &Frame, config: &TaskConfig) -> Detection {
        let (areas, image) = locate_materials(frame, config);
        if self.tracker.lock().update(areas) {
            Detection::result(material_record(areas), annotated(frame, image))
        } else {
            Detection::not_yet(annotated(frame, image))
        }
    }
}

/// Forgets the motion history so the next motion check starts fresh
pub struct ResetTracking {
    tracker: Arc<Mutex<MotionTracker>>,
}

impl Detector for ResetTracking {
    fn name(&self) -> &str {
        "reset_tracking"
    }

    fn detect(&mut self, frame: &Frame, _config: &TaskConfig) -> Detection {
        self.tracker.lock().reset();
        Detection {
            outcome: DetectOutcome::Housekeeping,
            annotated: frame.clone(),
        }
    }
}

/// Orientation of the dark floor marking relative to the target angle.
///
/// The marking's principal axis (second-order moments) gives its angle in
/// image coordinates, 0-180° clockwise from +x; its centroid is reported
/// as the reference point.
pub struct RightAngleDetector;

impl Detector for RightAngleDetector {
    fn name(&self) -> &str {
        "right_angle"
    }

    fn detect(&mut self, frame: &Frame, config: &TaskConfig) -> Detection {
        let mut image = frame.image.clone();
        let (blob, points) = dark_pixels(&frame.image);
        if blob.count < MIN_MARKING_PIXELS {
            return Detection::not_yet(annotated(frame, image));
        }

        let n = f64::from(blob.count);
        let (mx, my) = (blob.sum_x as f64 / n, blob.sum_y as f64 / n);
        let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
        for &(x, y) in &points {
            let (dx, dy) = (f64::from(x) - mx, f64::from(y) - my);
            mu20 += dx * dx;
            mu02 += dy * dy;
            mu11 += dx * dy;
        }
        let half_diff = (mu20 - mu02) / 2.0;
        let spread = (half_diff * half_diff + mu11 * mu11).sqrt();
        let mean = (mu20 + mu02) / 2.0;
        let (major, minor) = (mean + spread, mean - spread);
        if major < minor.max(f64::EPSILON) * LINE_ELONGATION {
            return Detection::not_yet(annotated(frame, image));
        }

        let mut angle = 0.5 * (2.0 * mu11).atan2(mu20 - mu02).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        let center = (mx.round() as u32, my.round() as u32);
        draw_rect(&mut image, blob.min, blob.max, FOUND_COLOR);
        draw_cross(&mut image, center, CENTER_COLOR);
        draw_ray(&mut image, center, angle, 100, Rgb([255, 255, 0]));

        let record = AngleRecord {
            deviation: angle - config.target_angle,
            x: center.0,
            y: center.1,
        };
        log::debug!("right_angle: {:.1}° at {:?} -> {}", angle, center, record);
        Detection::result(record, annotated(frame, image))
    }
}

/// Whether a dark region looks like a ring: roughly square extent and a
/// light pixel at its center
fn is_ring(image: &RgbImage, blob: &Blob) -> bool {
    let (w, h) = blob.size();
    if w < 10 || h < 10 {
        return false;
    }
    let aspect = f64::from(w) / f64::from(h);
    if !(0.75..=1.33).contains(&aspect) {
        return false;
    }
    let (cx, cy) = blob.center();
    !is_dark(image.get_pixel(cx, cy))
}

/// Center of the dark ground annulus
pub struct AnnulusDetector;

impl Detector for AnnulusDetector {
    fn name(&self) -> &str {
        "annulus"
    }

    fn detect(&mut self, frame: &Frame, _config: &TaskConfig) -> Detection {
        let mut image = frame.image.clone();
        let (blob, _) = dark_pixels(&frame.image);
        if blob.count < MIN_MARKING_PIXELS || !is_ring(&frame.image, &blob) {
            return Detection::not_yet(annotated(frame, image));
        }
        let (x, y) = blob.center();
        draw_rect(&mut image, blob.min, blob.max, FOUND_COLOR);
        draw_cross(&mut image, (x, y), CENTER_COLOR);
        Detection::result(AnnulusRecord { x, y }, annotated(frame, image))
    }
}

/// Centers of the red, green and blue annuli
pub struct AnnulusColorsDetector;

impl Detector for AnnulusColorsDetector {
    fn name(&self) -> &str {
        "annulus_colors"
    }

    fn detect(&mut self, frame: &Frame, _config: &TaskConfig) -> Detection {
        let mut image = frame.image.clone();
        let blobs = color_blobs(&frame.image);
        let mut centers = [None; 3];
        for (center, blob) in centers.iter_mut().zip(blobs.iter()) {
            if let Some(blob) = blob {
                draw_rect(&mut image, blob.min, blob.max, FOUND_COLOR);
                draw_cross(&mut image, blob.center(), CENTER_COLOR);
                *center = Some(blob.center());
            }
        }
        let record = AnnulusColorsRecord {
            red: centers[0],
            green: centers[1],
            blue: centers[2],
        };
        Detection::result(record, annotated(frame, image))
    }
}

/// Detector for a configured name. Detectors that share tracking state
/// take it from `shared`.
pub fn build(name: &str, shared: &mut SharedState) -> Option<Box<dyn Detector>> {
    let detector: Box<dyn Detector> = match name {
        "material" => Box::new(MaterialDetector),
        "material_motion" => Box::new(MaterialMotionDetector {
            tracker: Arc::clone(&shared.motion),
        }),
        "reset_tracking" => Box::new(ResetTracking {
            tracker: Arc::clone(&shared.motion),
        }),
        "right_angle" => Box::new(RightAngleDetector),
        "annulus" => Box::new(AnnulusDetector),
        "annulus_colors" => Box::new(AnnulusColorsDetector),
        _ => return None,
    };
    Some(detector)
}

//! Configuration for NetraIO
//!
//! Loads configuration from a TOML file (or JSON, chosen by the `.json`
//! extension). Every field has a default so a partial file is enough; the
//! `[task]` section is re-read each time the appliance enters Task mode.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub wifi: Option<WifiConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial control link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// One port, or two for the redundant dual-link setup.
    ///
    /// The first entry is link 1 and wins when both links deliver a
    /// message in the same poll.
    #[serde(default = "default_serial_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Message head sequence (e.g. `@`)
    #[serde(default = "default_head")]
    pub head: String,

    /// Message tail sequence (e.g. `#`)
    #[serde(default = "default_tail")]
    pub tail: String,

    /// Keep running headless when no port can be opened
    #[serde(default = "default_true")]
    pub allow_absent: bool,
}

/// Which video transport the Streaming mode uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

/// Video streaming configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Bind address for the TCP frame server
    #[serde(default = "default_tcp_bind")]
    pub tcp_bind: String,

    /// Bind address for the UDP frame server
    #[serde(default = "default_udp_bind")]
    pub udp_bind: String,

    /// Port frames are sent to on admitted UDP peers (defaults to the server port)
    #[serde(default)]
    pub udp_client_port: Option<u16>,

    /// IPs allowed to register over UDP. Empty admits any sender.
    #[serde(default)]
    pub allowed_clients: Vec<IpAddr>,

    /// How long one `connecting()` poll waits for a peer
    #[serde(default = "default_tcp_connect_timeout_ms")]
    pub tcp_connect_timeout_ms: u64,

    #[serde(default = "default_udp_connect_timeout_ms")]
    pub udp_connect_timeout_ms: u64,

    /// Write timeout on an accepted TCP client
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Frames sent between two mode-switch reads (clamped to 1..=30)
    #[serde(default = "default_switch_check_frames")]
    pub switch_check_frames: u32,
}

/// Frame source for the capture thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// V4L2/USB camera (`device-camera` feature)
    Device,
    /// Generated moving test pattern
    Synthetic,
    /// Loop over the image files of `replay_dir`
    Replay,
}

/// Camera configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_source")]
    pub source: CameraSource,

    /// Video device node, e.g. `/dev/video0`; overrides `device_index`
    #[serde(default)]
    pub device: Option<PathBuf>,

    #[serde(default)]
    pub device_index: u32,

    #[serde(default)]
    pub replay_dir: Option<PathBuf>,

    /// Record every captured frame under this directory, one
    /// `<date>-replay` subdirectory per run
    #[serde(default)]
    pub record_dir: Option<PathBuf>,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

/// GPIO and display configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// sysfs `value` file of the mode switch input
    #[serde(default)]
    pub switch_gpio: Option<PathBuf>,

    /// Invert the switch reading
    #[serde(default)]
    pub switch_invert: bool,

    /// Mode used when no switch is configured
    #[serde(default)]
    pub fixed_mode: Option<String>,

    /// sysfs `value` file of the status LED
    #[serde(default)]
    pub led_gpio: Option<PathBuf>,

    /// Mirror operator messages to the status display
    #[serde(default = "default_true")]
    pub display: bool,
}

/// Rectangle in image pixel coordinates, inclusive on both corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AreaRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl AreaRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x0..=self.x1).contains(&x) && (self.y0..=self.y1).contains(&y)
    }
}

/// Task mode configuration (reloaded on every entry into Task mode)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    /// Material placement areas 1, 2 and 3
    #[serde(default)]
    pub areas: [AreaRect; 3],

    /// Reference angle in degrees for the right-angle record
    #[serde(default = "default_target_angle")]
    pub target_angle: f64,

    /// Rows cropped from the bottom of each frame before detection
    #[serde(default = "default_crop_bottom")]
    pub crop_bottom: u32,

    /// Detection iterations between two mode-switch reads (clamped to 1..=30)
    #[serde(default = "default_switch_check_frames")]
    pub switch_check_interval: u32,

    /// How long one acquisition waits for a fresh frame
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Signal code -> detector name
    #[serde(default = "default_bindings")]
    pub bindings: BTreeMap<String, String>,
}

/// Wireless network joined at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    #[serde(default)]
    pub rescan: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_serial_ports() -> Vec<String> {
    vec!["/dev/ttyS3".to_string()]
}
fn default_baud_rate() -> u32 {
    115200
}
fn default_head() -> String {
    "@".to_string()
}
fn default_tail() -> String {
    "#".to_string()
}
fn default_true() -> bool {
    true
}
fn default_transport() -> TransportKind {
    TransportKind::Tcp
}
fn default_tcp_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_udp_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_tcp_connect_timeout_ms() -> u64 {
    50
}
fn default_udp_connect_timeout_ms() -> u64 {
    500
}
fn default_write_timeout_ms() -> u64 {
    1000
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_switch_check_frames() -> u32 {
    30
}
fn default_camera_source() -> CameraSource {
    CameraSource::Device
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_target_angle() -> f64 {
    45.0
}
fn default_crop_bottom() -> u32 {
    40
}
fn default_acquire_timeout_ms() -> u64 {
    500
}
fn default_bindings() -> BTreeMap<String, String> {
    [
        ("1", "material"),
        ("2", "material_motion"),
        ("3", "right_angle"),
        ("4", "annulus"),
        ("5", "annulus_colors"),
        ("R", "reset_tracking"),
    ]
    .into_iter()
    .map(|(code, name)| (code.to_string(), name.to_string()))
    .collect()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: default_serial_ports(),
            baud_rate: default_baud_rate(),
            head: default_head(),
            tail: default_tail(),
            allow_absent: true,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            tcp_bind: default_tcp_bind(),
            udp_bind: default_udp_bind(),
            udp_client_port: None,
            allowed_clients: Vec::new(),
            tcp_connect_timeout_ms: default_tcp_connect_timeout_ms(),
            udp_connect_timeout_ms: default_udp_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            switch_check_frames: default_switch_check_frames(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_camera_source(),
            device: None,
            device_index: 0,
            replay_dir: None,
            record_dir: None,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            switch_gpio: None,
            switch_invert: false,
            fixed_mode: None,
            led_gpio: None,
            display: true,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            areas: [AreaRect::default(); 3],
            target_angle: default_target_angle(),
            crop_bottom: default_crop_bottom(),
            switch_check_interval: default_switch_check_frames(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            bindings: default_bindings(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML or JSON file
    ///
    /// # Example
    /// ```no_run
    /// use netra_io::config::Config;
    ///
    /// let config = Config::load("/etc/netra.toml")?;
    /// # Ok::<(), netra_io::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents, is_json(path))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str, json: bool) -> Result<Self> {
        if json {
            Ok(serde_json::from_str(contents)?)
        } else {
            Ok(toml::from_str(contents)?)
        }
    }

    /// Reject configurations the control loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.serial.ports.is_empty() || self.serial.ports.len() > 2 {
            return Err(Error::Config(format!(
                "serial.ports must list one or two ports, got {}",
                self.serial.ports.len()
            )));
        }
        if self.serial.head.is_empty() || self.serial.tail.is_empty() {
            return Err(Error::Config(
                "serial.head and serial.tail must not be empty".to_string(),
            ));
        }
        if !self.serial.head.is_ascii() || !self.serial.tail.is_ascii() {
            return Err(Error::Config(
                "serial.head and serial.tail must be ASCII".to_string(),
            ));
        }
        if !(1..=100).contains(&self.streaming.jpeg_quality) {
            return Err(Error::Config(format!(
                "streaming.jpeg_quality must be 1-100, got {}",
                self.streaming.jpeg_quality
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(Error::Config(
                "camera width, height and fps must be non-zero".to_string(),
            ));
        }
        if self.camera.source == CameraSource::Replay && self.camera.replay_dir.is_none() {
            return Err(Error::Config(
                "camera.replay_dir is required for the replay source".to_string(),
            ));
        }
        if let Some(mode) = &self.hardware.fixed_mode
            && mode != "streaming"
            && mode != "task"
        {
            return Err(Error::Config(format!(
                "hardware.fixed_mode must be \"streaming\" or \"task\", got {:?}",
                mode
            )));
        }
        self.task.validate()
    }
}

impl TaskConfig {
    /// Load only the `[task]` section from a full config file
    pub fn reload<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::load(path)?;
        Ok(config.task)
    }

    pub fn validate(&self) -> Result<()> {
        for (code, name) in &self.bindings {
            if code.chars().count() != 1 {
                return Err(Error::Config(format!(
                    "task binding {:?} -> {} must use a single-character code",
                    code, name
                )));
            }
        }
        for (i, area) in self.areas.iter().enumerate() {
            if area.x0 > area.x1 || area.y0 > area.y1 {
                return Err(Error::Config(format!(
                    "task.areas[{}] has inverted corners",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Switch-check interval clamped to the supported range
    pub fn check_interval(&self) -> u32 {
        self.switch_check_interval.clamp(1, 30)
    }
}

impl StreamingConfig {
    pub fn check_interval(&self) -> u32 {
        self.switch_check_frames.clamp(1, 30)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.ports, vec!["/dev/ttyS3"]);
        assert_eq!(config.serial.head, "@");
        assert_eq!(config.serial.tail, "#");
        assert_eq!(config.streaming.transport, TransportKind::Tcp);
        assert_eq!(config.streaming.jpeg_quality, 70);
        assert_eq!(config.task.target_angle, 45.0);
        assert_eq!(config.task.crop_bottom, 40);
        assert_eq!(config.camera.source, CameraSource::Device);
        assert_eq!(config.camera.device_index, 0);
        assert!(config.camera.record_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
ports = ["/dev/ttyUSB0", "/dev/ttyUSB1"]
head = "<"
tail = ">"

[streaming]
transport = "udp"
udp_bind = "0.0.0.0:9000"
allowed_clients = ["192.168.1.20"]

[camera]
source = "replay"
replay_dir = "/var/lib/netra/session1"
record_dir = "run_log"
width = 320
height = 240

[task]
target_angle = 30.0
crop_bottom = 0
areas = [
    { x0 = 0, y0 = 0, x1 = 99, y1 = 99 },
    { x0 = 100, y0 = 0, x1 = 199, y1 = 99 },
    { x0 = 200, y0 = 0, x1 = 299, y1 = 99 },
]

[task.bindings]
"7" = "annulus"

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.ports.len(), 2);
        assert_eq!(config.serial.head, "<");
        assert_eq!(config.streaming.transport, TransportKind::Udp);
        assert_eq!(config.streaming.allowed_clients.len(), 1);
        assert_eq!(config.camera.source, CameraSource::Replay);
        assert_eq!(
            config.camera.replay_dir,
            Some(PathBuf::from("/var/lib/netra/session1"))
        );
        assert_eq!(config.camera.record_dir, Some(PathBuf::from("run_log")));
        assert_eq!(config.task.target_angle, 30.0);
        assert!(config.task.areas[1].contains(150, 50));
        assert_eq!(config.task.bindings.get("7").map(String::as_str), Some("annulus"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_config_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"task": {{"target_angle": 50.0, "crop_bottom": 12}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.task.target_angle, 50.0);
        assert_eq!(config.task.crop_bottom, 12);
        assert_eq!(config.serial.baud_rate, 115200);
    }

    #[test]
    fn test_task_reload_reads_file_again() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[task]\ntarget_angle = 10.0").unwrap();
        assert_eq!(TaskConfig::reload(file.path()).unwrap().target_angle, 10.0);

        std::fs::write(file.path(), "[task]\ntarget_angle = 20.0\n").unwrap();
        assert_eq!(TaskConfig::reload(file.path()).unwrap().target_angle, 20.0);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.serial.ports.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config
            .task
            .bindings
            .insert("12".to_string(), "material".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.hardware.fixed_mode = Some("sideways".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camera_device_source() {
        let config: Config = toml::from_str(
            r#"
[camera]
source = "device"
device_index = 2
fps = 60
"#,
        )
        .unwrap();
        assert_eq!(config.camera.source, CameraSource::Device);
        assert_eq!(config.camera.device_index, 2);
        assert!(config.camera.device.is_none());
        assert_eq!(config.camera.fps, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_check_interval_is_clamped() {
        let mut task = TaskConfig::default();
        task.switch_check_interval = 500;
        assert_eq!(task.check_interval(), 30);
        task.switch_check_interval = 0;
        assert_eq!(task.check_interval(), 1);
    }

    #[test]
    fn test_sample_config_loads() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/netra.toml")).unwrap();
        assert_eq!(config.task.areas[1].x0, 240);
        assert_eq!(config.task.bindings.len(), 6);
        assert_eq!(config.hardware.fixed_mode.as_deref(), Some("streaming"));
        assert_eq!(config.camera.source, CameraSource::Device);
        assert_eq!(config.camera.device, Some(PathBuf::from("/dev/video0")));
        assert!(config.wifi.is_none());
    }
}

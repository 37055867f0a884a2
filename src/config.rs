//! Root configuration.
//!
//! The root data file is flat `key: value` text. Its values become the
//! defaults layer of a `config::Config`, `STLS_*` environment variables
//! override them, and the result deserializes into [`AppConfig`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::detection::VehicleClasses;
use crate::error::{ensure_exists, Error, Result};
use crate::logging::LogSettings;
use crate::queuing::QueueMode;
use crate::relay::RelayPins;

/// Keys whose values are never coerced to numbers.
const PASSTHROUGH_KEYS: &[&str] = &[
    "mqtt_broker",
    "SERVICE_UUID",
    "CHARACTERISTIC_UUID",
    "IP_ESP32_1",
    "IP_ESP32_2",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RootValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl RootValue {
    /// Digits with at most one dot become numbers, anything else stays text.
    fn coerce(value: &str) -> Self {
        let dots = value.matches('.').count();
        let digits = value.replacen('.', "", 1);
        let numeric = dots < 2 && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
        if numeric {
            if dots == 1 {
                if let Ok(v) = value.parse::<f64>() {
                    return RootValue::Float(v);
                }
            } else if let Ok(v) = value.parse::<i64>() {
                return RootValue::Int(v);
            }
        }
        RootValue::Str(value.to_string())
    }
}

impl fmt::Display for RootValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootValue::Str(s) => f.write_str(s),
            RootValue::Int(i) => write!(f, "{}", i),
            RootValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<RootValue> for config::Value {
    fn from(v: RootValue) -> Self {
        match v {
            RootValue::Str(s) => s.into(),
            RootValue::Int(i) => i.into(),
            RootValue::Float(f) => f.into(),
        }
    }
}

/// Parsed root data file, key order preserved for printing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootData {
    entries: BTreeMap<String, RootValue>,
}

impl RootData {
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let parsed = if PASSTHROUGH_KEYS.contains(&key) {
                RootValue::Str(value.to_string())
            } else {
                RootValue::coerce(value)
            };
            entries.insert(key.to_string(), parsed);
        }
        Self { entries }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists("root config", path)?;
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn get(&self, key: &str) -> Option<&RootValue> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RootValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for RootData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "check_params: {{")?;
        for (k, v) in &self.entries {
            writeln!(f, "    {}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_weight_file_path")]
    pub weight_file_path: String,
    #[serde(default = "default_class_list_file_path")]
    pub class_list_file_path: String,
    #[serde(default = "default_zones_file_path")]
    pub zones_file_path: String,
    #[serde(default = "default_detect_sensitivity")]
    pub detect_sensitivity: f32,
    /// Debounce interval in seconds.
    #[serde(default = "default_time_interval")]
    pub time_interval: f64,
    /// Preview window title; `off` disables drawing and the window.
    #[serde(default = "default_frame_name")]
    pub frame_name: String,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    /// Milliseconds to wait for a key press per frame.
    #[serde(default = "default_wait_key")]
    pub wait_key: i32,
    #[serde(default = "default_ord_key")]
    pub ord_key: String,
    #[serde(default = "default_write_points_mode")]
    pub write_points_mode: String,
    #[serde(default = "default_max_zones")]
    pub max_zones: u32,

    /// Camera index (`0`) or a stream URL / file path.
    #[serde(default = "default_camera_source")]
    pub camera_source: String,
    #[serde(default = "default_process_every")]
    pub process_every_n_frames: u32,
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
    #[serde(default = "default_max_capture_failures")]
    pub max_capture_failures: u32,
    #[serde(default = "default_vehicle_classes")]
    pub vehicle_classes: String,
    #[serde(default = "default_queue_mode")]
    pub queue_mode: String,

    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    #[serde(default = "default_relay_car_pin")]
    pub relay_car_pin: u8,
    #[serde(default = "default_relay_motorbike_pin")]
    pub relay_motorbike_pin: u8,
    #[serde(default = "default_relay_default_pin")]
    pub relay_default_pin: u8,
    #[serde(default = "default_relay_active_low")]
    pub relay_active_low: bool,

    pub log_dir: Option<String>,
    /// `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub log_level: Option<String>,
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
}

fn default_weight_file_path() -> String {
    "models/yolo11n.onnx".to_string()
}
fn default_class_list_file_path() -> String {
    "models/coco.txt".to_string()
}
fn default_zones_file_path() -> String {
    "zones.txt".to_string()
}
fn default_detect_sensitivity() -> f32 {
    0.5
}
fn default_time_interval() -> f64 {
    5.0
}
fn default_frame_name() -> String {
    "Traffic Zones".to_string()
}
fn default_frame_width() -> u32 {
    640
}
fn default_frame_height() -> u32 {
    480
}
fn default_wait_key() -> i32 {
    1
}
fn default_ord_key() -> String {
    "q".to_string()
}
fn default_write_points_mode() -> String {
    "false".to_string()
}
fn default_max_zones() -> u32 {
    1
}
fn default_camera_source() -> String {
    "0".to_string()
}
fn default_process_every() -> u32 {
    3
}
fn default_frame_queue_capacity() -> usize {
    2
}
fn default_max_capture_failures() -> u32 {
    30
}
fn default_vehicle_classes() -> String {
    "car,motorbike".to_string()
}
fn default_queue_mode() -> String {
    "coupled".to_string()
}
fn default_nms_threshold() -> f32 {
    0.45
}
fn default_input_size() -> u32 {
    640
}
fn default_relay_car_pin() -> u8 {
    17
}
fn default_relay_motorbike_pin() -> u8 {
    27
}
fn default_relay_default_pin() -> u8 {
    22
}
fn default_relay_active_low() -> bool {
    true
}
fn default_log_to_file() -> bool {
    true
}

/// Which tool the root config selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    WritePoints,
    Monitor,
}

impl RunMode {
    pub const VALUES: &'static [&'static str] = &["true", "false"];
}

impl AppConfig {
    /// Read the root data file and layer `STLS_*` env overrides on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let root = RootData::read(path)?;
        Self::from_root_data(&root, true)
    }

    pub fn from_root_data(root: &RootData, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder();
        for (key, value) in root.iter() {
            // only plain identifiers; anything else would be read as a key path
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                continue;
            }
            builder = builder.set_default(key, config::Value::from(value.clone()))?;
        }
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix("STLS").try_parsing(true));
        }
        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.detect_sensitivity > 0.0 && self.detect_sensitivity <= 1.0) {
            return Err(Error::Config(format!(
                "detect_sensitivity must be in (0, 1], found {}",
                self.detect_sensitivity
            )));
        }
        if Duration::try_from_secs_f64(self.time_interval).is_err() {
            return Err(Error::Config(format!(
                "time_interval must be a non-negative number of seconds, found {}",
                self.time_interval
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(Error::Config(format!(
                "frame size must be non-zero, found {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.input_size == 0 {
            return Err(Error::Config("input_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(Error::Config(format!(
                "nms_threshold must be in [0, 1], found {}",
                self.nms_threshold
            )));
        }
        if self.process_every_n_frames == 0 {
            return Err(Error::Config("process_every_n_frames must be at least 1".into()));
        }
        if self.frame_queue_capacity == 0 {
            return Err(Error::Config("frame_queue_capacity must be at least 1".into()));
        }
        if self.ord_key.chars().count() != 1 {
            return Err(Error::Config(format!(
                "ord_key must be a single character, found '{}'",
                self.ord_key
            )));
        }
        if !self.relay_pins().is_distinct() {
            return Err(Error::Config("relay pins must be distinct".into()));
        }
        Ok(())
    }

    pub fn run_mode(&self) -> Result<RunMode> {
        match self.write_points_mode.trim().to_lowercase().as_str() {
            "true" => Ok(RunMode::WritePoints),
            "false" => Ok(RunMode::Monitor),
            other => Err(Error::InvalidInput {
                field: "write_points_mode",
                expected: RunMode::VALUES,
                found: other.to_string(),
            }),
        }
    }

    pub fn queue_mode(&self) -> Result<QueueMode> {
        self.queue_mode.parse()
    }

    /// Only call on a validated config; `validate` rejects intervals that
    /// do not fit a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_interval).unwrap_or(Duration::ZERO)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            level: self.log_level.clone().filter(|l| !l.trim().is_empty()),
            dir: self.log_dir.clone().filter(|d| !d.trim().is_empty()).map(PathBuf::from),
            to_file: self.log_to_file,
        }
    }

    pub fn vehicle_classes(&self) -> VehicleClasses {
        VehicleClasses::parse(&self.vehicle_classes)
    }

    pub fn relay_pins(&self) -> RelayPins {
        RelayPins {
            car: self.relay_car_pin,
            motorbike: self.relay_motorbike_pin,
            default: self.relay_default_pin,
            active_low: self.relay_active_low,
        }
    }

    pub fn quit_key(&self) -> char {
        self.ord_key.chars().next().unwrap_or('q')
    }

    pub fn display_enabled(&self) -> bool {
        !self.frame_name.eq_ignore_ascii_case("off")
    }
}

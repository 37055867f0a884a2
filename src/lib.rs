//! Single-camera traffic zone monitor.
//!
//! Detections are assigned to polygon zones, a debounce state machine turns
//! zone occupancy into a queued vehicle, and the queued vehicle selects which
//! relay channel is on. A separate authoring tool records the zone polygons.

pub mod assignment;
pub mod authoring;
pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod processor;
pub mod queuing;
pub mod relay;
pub mod zone_file;
pub mod zones;

#[cfg(feature = "vision")]
pub mod authoring_ui;
#[cfg(feature = "vision")]
pub mod camera;
#[cfg(feature = "vision")]
pub mod overlay;
#[cfg(feature = "vision")]
pub mod yolo;

pub use error::{Error, Result};

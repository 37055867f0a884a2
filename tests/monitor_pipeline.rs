use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use stls::detection::{ClassList, Detection, ObjectDetector, VehicleClasses};
use stls::monitor::{FrameSink, FrameSource, Monitor, MonitorSettings, SinkControl, StopReason};
use stls::output::{ActuationChannel, SymbolicOutput};
use stls::processor::{FrameProcessor, Overlay};
use stls::queuing::QueueMode;
use stls::zone_file::{load_zones, ZoneFileWriter};
use stls::zones::Point;

const CLASSES: &str = "person\nbicycle\ncar\nmotorbike\naeroplane\nbus";

/// Frames are just their index; the detector looks the boxes up by index.
struct Frames {
    next: usize,
    total: Option<usize>,
}

impl FrameSource for Frames {
    type Frame = usize;

    fn next_frame(&mut self) -> Result<Option<usize>> {
        if self.total.is_some_and(|t| self.next >= t) {
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(self.next - 1))
    }
}

struct Unplugged;

impl FrameSource for Unplugged {
    type Frame = usize;

    fn next_frame(&mut self) -> Result<Option<usize>> {
        Err(anyhow!("no signal"))
    }
}

struct Scripted {
    boxes: Vec<Detection>,
    fail_on: Option<usize>,
}

impl ObjectDetector<usize> for Scripted {
    fn detect(&mut self, frame: &usize, _confidence: f32) -> Result<Vec<Detection>> {
        if self.fail_on == Some(*frame) {
            return Err(anyhow!("inference failed"));
        }
        Ok(self.boxes.clone())
    }
}

#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<SymbolicOutput>>>);

impl Recording {
    fn calls(&self) -> Vec<SymbolicOutput> {
        self.0.lock().unwrap().clone()
    }
}

impl ActuationChannel for Recording {
    fn activate(&mut self, output: SymbolicOutput) -> Result<()> {
        self.0.lock().unwrap().push(output);
        Ok(())
    }

    fn deactivate_all(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct StatusLog {
    lines: Arc<Mutex<Vec<String>>>,
    quit_after: Option<usize>,
}

impl FrameSink<usize> for StatusLog {
    fn render(&mut self, _frame: &mut usize, overlay: &Overlay<'_>) -> Result<SinkControl> {
        let mut lines = self.lines.lock().unwrap();
        lines.push(overlay.status_line());
        if self.quit_after.is_some_and(|n| lines.len() >= n) {
            return Ok(SinkControl::Quit);
        }
        Ok(SinkControl::Continue)
    }
}

fn processor(dir: &tempfile::TempDir) -> FrameProcessor {
    let path = dir.path().join("zones.txt");
    // authored on a 1280x720 preview, monitored at 640x480
    let mut writer = ZoneFileWriter::new(&path, 1, 1280, 720);
    writer
        .append_zone(&[
            Point::new(200, 150),
            Point::new(800, 150),
            Point::new(800, 450),
            Point::new(200, 450),
        ])
        .unwrap();
    let zones = load_zones(&path, 640, 480).unwrap();
    assert_eq!(zones.get(0).unwrap().points[0], Point::new(100, 100));

    FrameProcessor::new(
        zones,
        ClassList::parse(CLASSES),
        VehicleClasses::default(),
        Duration::from_secs(5),
        QueueMode::Coupled,
    )
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        process_every_n_frames: 1,
        frame_queue_capacity: 64,
        max_capture_failures: 3,
        detect_sensitivity: 0.5,
    }
}

fn car_and_bus() -> Vec<Detection> {
    vec![
        // centre (250, 200) inside the zone
        Detection::new(200.0, 150.0, 300.0, 250.0, 0.88, 2),
        // centre (550, 400) outside
        Detection::new(500.0, 350.0, 600.0, 450.0, 0.91, 5),
    ]
}

#[tokio::test]
async fn test_car_in_zone_actuates_once() {
    let dir = tempfile::tempdir().unwrap();
    let relays = Recording::default();
    let sink = StatusLog::default();

    let summary = Monitor::new(
        Frames { next: 0, total: Some(10) },
        Scripted { boxes: car_and_bus(), fail_on: None },
        sink.clone(),
        relays.clone(),
        processor(&dir),
        settings(),
    )
    .without_signal_handler()
    .run()
    .await
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_captured, 10);
    assert_eq!(summary.frames_forwarded, 10);
    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.actuations, 1);
    assert!(summary.finished_at >= summary.started_at);

    // one Car activation, then the safe state on the way out
    assert_eq!(relays.calls(), vec![SymbolicOutput::Car, SymbolicOutput::Default]);

    let lines = sink.lines.lock().unwrap();
    assert_eq!(lines.len(), 10);
    assert!(lines[0].starts_with("Zone: 0 | NV: 1 | PV: car ["), "{}", lines[0]);
}

#[tokio::test]
async fn test_quit_key_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let relays = Recording::default();
    let sink = StatusLog {
        quit_after: Some(3),
        ..StatusLog::default()
    };

    let summary = Monitor::new(
        Frames { next: 0, total: None },
        Scripted { boxes: Vec::new(), fail_on: None },
        sink,
        relays.clone(),
        processor(&dir),
        settings(),
    )
    .without_signal_handler()
    .run()
    .await
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::QuitKey);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.actuations, 0);
    assert_eq!(relays.calls(), vec![SymbolicOutput::Default]);
}

#[tokio::test]
async fn test_detector_errors_skip_frames() {
    let dir = tempfile::tempdir().unwrap();
    let summary = Monitor::new(
        Frames { next: 0, total: Some(5) },
        Scripted { boxes: car_and_bus(), fail_on: Some(2) },
        StatusLog::default(),
        Recording::default(),
        processor(&dir),
        settings(),
    )
    .without_signal_handler()
    .run()
    .await
    .unwrap();

    assert_eq!(summary.frames_forwarded, 5);
    assert_eq!(summary.frames_processed, 4);
}

#[tokio::test]
async fn test_capture_failures_end_the_run_in_safe_state() {
    let dir = tempfile::tempdir().unwrap();
    let relays = Recording::default();

    let err = Monitor::new(
        Unplugged,
        Scripted { boxes: Vec::new(), fail_on: None },
        StatusLog::default(),
        relays.clone(),
        processor(&dir),
        settings(),
    )
    .without_signal_handler()
    .run()
    .await
    .unwrap_err();

    assert!(format!("{:#}", err).contains("no signal"));
    assert_eq!(relays.calls(), vec![SymbolicOutput::Default]);
}

#[tokio::test]
async fn test_frame_stride() {
    let dir = tempfile::tempdir().unwrap();
    let summary = Monitor::new(
        Frames { next: 0, total: Some(9) },
        Scripted { boxes: Vec::new(), fail_on: None },
        StatusLog::default(),
        Recording::default(),
        processor(&dir),
        MonitorSettings {
            process_every_n_frames: 3,
            ..settings()
        },
    )
    .without_signal_handler()
    .run()
    .await
    .unwrap();

    assert_eq!(summary.frames_captured, 9);
    assert_eq!(summary.frames_forwarded, 3);
    assert_eq!(summary.frames_processed, 3);
}

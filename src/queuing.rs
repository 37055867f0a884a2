//! Zone queuing: turns per-frame vehicle sightings into a debounced
//! "current vehicle" decision.
//!
//! Two states. IDLE moves to COUNTING as soon as the primary zone holds a
//! vehicle, latching its first label. COUNTING returns to IDLE once
//! `interval` has elapsed since the countdown started, and the decision is
//! then re-read from the secondary zone (or becomes "none"). In every other
//! case the decision is left alone. Entry is checked before expiry in the
//! same call.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::assignment::CollectedVehicles;
use crate::error::Error;
use crate::zones::ZoneId;

pub const NONE_LABEL: &str = "none";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuingState {
    refreshing: bool,
    countdown_start: Option<Instant>,
    current_vehicle: Option<String>,
}

/// What one queue step reports for display and output.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueReport {
    pub current_vehicle: Option<String>,
    /// Seconds since the countdown started, 0.0 when idle. Two decimals.
    pub remaining_time: f64,
}

impl QueueReport {
    pub fn vehicle_label(&self) -> &str {
        self.current_vehicle.as_deref().unwrap_or(NONE_LABEL)
    }

    pub fn remaining_text(&self) -> String {
        format!("{:.2}", self.remaining_time)
    }
}

impl QueuingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_counting(&self) -> bool {
        self.refreshing
    }

    pub fn countdown_start(&self) -> Option<Instant> {
        self.countdown_start
    }

    pub fn current_vehicle(&self) -> Option<&str> {
        self.current_vehicle.as_deref()
    }

    /// Step against the whole frame: slot 0 is primary, slot 1 (when more
    /// than one zone is tracked) is read on expiry.
    pub fn step(&mut self, collected: &CollectedVehicles, now: Instant, interval: Duration) -> QueueReport {
        let secondary = if collected.len() > 1 { collected.slot(1) } else { None };
        self.step_slots(collected.slot(0).unwrap_or(&[]), secondary, now, interval)
    }

    pub fn step_slots(
        &mut self,
        primary: &[String],
        secondary: Option<&[String]>,
        now: Instant,
        interval: Duration,
    ) -> QueueReport {
        if !self.refreshing && !primary.is_empty() {
            self.refreshing = true;
            self.countdown_start = Some(now);
            self.current_vehicle = primary.first().cloned();
            debug!("Countdown started for {}", self.label());
        }

        if self.refreshing {
            if let Some(start) = self.countdown_start {
                if now.saturating_duration_since(start) >= interval {
                    self.refreshing = false;
                    self.countdown_start = None;
                    self.current_vehicle = secondary.and_then(|s| s.first()).cloned();
                    info!("Countdown complete, queued vehicle now {}", self.label());
                }
            }
        }

        let remaining_time = self
            .countdown_start
            .map(|start| round2(now.saturating_duration_since(start).as_secs_f64()))
            .unwrap_or(0.0);

        QueueReport {
            current_vehicle: self.current_vehicle.clone(),
            remaining_time,
        }
    }

    fn label(&self) -> &str {
        self.current_vehicle.as_deref().unwrap_or(NONE_LABEL)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// One debounce timer for the whole set, driven by zones 0 and 1.
    Coupled,
    /// An independent debounce timer per zone.
    PerZone,
}

impl QueueMode {
    pub const VALUES: &'static [&'static str] = &["coupled", "per_zone"];
}

impl FromStr for QueueMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coupled" => Ok(QueueMode::Coupled),
            "per_zone" => Ok(QueueMode::PerZone),
            other => Err(Error::InvalidInput {
                field: "queue_mode",
                expected: Self::VALUES,
                found: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueMode::Coupled => "coupled",
            QueueMode::PerZone => "per_zone",
        })
    }
}

/// Result of stepping the queue for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStep {
    /// Decision that drives the outputs.
    pub primary: QueueReport,
    /// Decision per zone id. In coupled mode this is the primary decision
    /// attributed to the first zone.
    pub zones: Vec<(ZoneId, QueueReport)>,
}

/// The queue owned by the run loop, in either mode.
#[derive(Debug, Clone)]
pub enum ZoneQueue {
    Coupled(QueuingState),
    PerZone(BTreeMap<ZoneId, QueuingState>),
}

impl ZoneQueue {
    pub fn new(mode: QueueMode) -> Self {
        match mode {
            QueueMode::Coupled => ZoneQueue::Coupled(QueuingState::new()),
            QueueMode::PerZone => ZoneQueue::PerZone(BTreeMap::new()),
        }
    }

    pub fn step(&mut self, collected: &CollectedVehicles, now: Instant, interval: Duration) -> QueueStep {
        match self {
            ZoneQueue::Coupled(state) => {
                let primary = state.step(collected, now, interval);
                let zones = collected
                    .zone_id(0)
                    .map(|id| vec![(id, primary.clone())])
                    .unwrap_or_default();
                QueueStep { primary, zones }
            }
            ZoneQueue::PerZone(states) => {
                let zones: Vec<(ZoneId, QueueReport)> = collected
                    .iter()
                    .map(|(id, slot)| {
                        let state = states.entry(id).or_default();
                        (id, state.step_slots(slot, None, now, interval))
                    })
                    .collect();
                let primary = zones.first().map(|(_, r)| r.clone()).unwrap_or(QueueReport {
                    current_vehicle: None,
                    remaining_time: 0.0,
                });
                QueueStep { primary, zones }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::assign;
    use crate::detection::{ClassList, Detection, VehicleClasses};
    use crate::zones::{Point, Zone, ZoneSet};

    const INTERVAL: Duration = Duration::from_secs(5);

    fn lists(slots: &[&[&str]]) -> Vec<Vec<String>> {
        slots
            .iter()
            .map(|s| s.iter().map(|l| l.to_string()).collect())
            .collect()
    }

    fn step(state: &mut QueuingState, slots: &[&[&str]], now: Instant) -> QueueReport {
        let l = lists(slots);
        let secondary = if l.len() > 1 { Some(l[1].as_slice()) } else { None };
        let primary = l.first().map(|v| v.as_slice()).unwrap_or(&[]);
        state.step_slots(primary, secondary, now, INTERVAL)
    }

    #[test]
    fn test_idle_to_counting_latches_first_label() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        let r = step(&mut state, &[&["car", "motorbike"], &[]], t0);
        assert!(state.is_counting());
        assert_eq!(state.countdown_start(), Some(t0));
        assert_eq!(r.vehicle_label(), "car");
        assert_eq!(r.remaining_text(), "0.00");
    }

    #[test]
    fn test_counting_ignores_new_detections_until_expiry() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["car"], &[]], t0);

        let r = step(&mut state, &[&["motorbike"], &["motorbike"]], t0 + Duration::from_millis(1500));
        assert_eq!(r.vehicle_label(), "car");
        assert_eq!(r.remaining_text(), "1.50");

        let r = step(&mut state, &[&[], &[]], t0 + Duration::from_millis(4999));
        assert_eq!(r.vehicle_label(), "car");
        assert!(state.is_counting());
    }

    #[test]
    fn test_expiry_reads_second_zone() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["car"], &["motorbike"]], t0);
        let r = step(&mut state, &[&["car"], &["motorbike"]], t0 + INTERVAL);
        assert!(!state.is_counting());
        assert_eq!(state.countdown_start(), None);
        assert_eq!(r.current_vehicle.as_deref(), Some("motorbike"));
        assert_eq!(r.remaining_time, 0.0);
    }

    #[test]
    fn test_expiry_with_single_zone_is_none() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["car"]], t0);
        let r = step(&mut state, &[&["car"]], t0 + Duration::from_secs(6));
        assert_eq!(r.current_vehicle, None);
        assert_eq!(r.vehicle_label(), NONE_LABEL);
    }

    #[test]
    fn test_expiry_with_empty_second_zone_is_none() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["motorbike"], &[]], t0);
        let r = step(&mut state, &[&[], &[]], t0 + INTERVAL);
        assert_eq!(r.current_vehicle, None);
    }

    #[test]
    fn test_idle_decision_is_sticky() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["car"], &["motorbike"]], t0);
        step(&mut state, &[&[], &["motorbike"]], t0 + INTERVAL);
        // idle now, with "motorbike" latched; empty frames keep it
        for i in 1..5 {
            let r = step(&mut state, &[&[], &[]], t0 + INTERVAL + Duration::from_secs(i));
            assert_eq!(r.vehicle_label(), "motorbike");
            assert!(!state.is_counting());
        }
    }

    #[test]
    fn test_reentry_after_expiry() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        step(&mut state, &[&["car"], &[]], t0);
        // expiry frame still has a car in zone 0; entry is evaluated first
        // (already counting), then expiry resets
        let r = step(&mut state, &[&["car"], &[]], t0 + INTERVAL);
        assert_eq!(r.current_vehicle, None);
        let t1 = t0 + INTERVAL + Duration::from_millis(100);
        let r = step(&mut state, &[&["motorbike"], &[]], t1);
        assert_eq!(r.vehicle_label(), "motorbike");
        assert_eq!(state.countdown_start(), Some(t1));
    }

    #[test]
    fn test_zero_interval_enters_and_expires_in_one_call() {
        let t0 = Instant::now();
        let mut state = QueuingState::new();
        let l = lists(&[&["car"], &["motorbike"]]);
        let r = state.step_slots(&l[0], Some(&l[1]), t0, Duration::ZERO);
        assert!(!state.is_counting());
        assert_eq!(r.vehicle_label(), "motorbike");
        assert_eq!(r.remaining_time, 0.0);
    }

    #[test]
    fn test_step_from_collected_vehicles() {
        let zone = |id, x0| {
            Zone::new(
                id,
                vec![
                    Point::new(x0, 0),
                    Point::new(x0 + 100, 0),
                    Point::new(x0 + 100, 100),
                    Point::new(x0, 100),
                ],
            )
        };
        let zones = ZoneSet::new(vec![zone(0, 0), zone(1, 200)], 640, 480);
        let classes = ClassList::parse("person\nbicycle\ncar\nmotorbike");
        let dets = [
            Detection::new(40.0, 40.0, 60.0, 60.0, 0.9, 2),
            Detection::new(240.0, 40.0, 260.0, 60.0, 0.9, 3),
        ];
        let collected = assign(&dets, &zones, &classes, &VehicleClasses::default());

        let t0 = Instant::now();
        let mut state = QueuingState::new();
        assert_eq!(state.step(&collected, t0, INTERVAL).vehicle_label(), "car");
        assert_eq!(state.step(&collected, t0 + INTERVAL, INTERVAL).vehicle_label(), "motorbike");
    }

    #[test]
    fn test_per_zone_mode_debounces_independently() {
        let zones = ZoneSet::new(
            vec![
                Zone::new(0, vec![Point::new(0, 0), Point::new(100, 0), Point::new(100, 100)]),
                Zone::new(4, vec![Point::new(200, 0), Point::new(300, 0), Point::new(300, 100)]),
            ],
            640,
            480,
        );
        let classes = ClassList::parse("person\nbicycle\ncar\nmotorbike");
        let vehicles = VehicleClasses::default();
        let in_zone_4 = [Detection::new(270.0, 10.0, 290.0, 30.0, 0.9, 3)];

        let t0 = Instant::now();
        let mut queue = ZoneQueue::new(QueueMode::PerZone);
        let s = queue.step(&assign(&in_zone_4, &zones, &classes, &vehicles), t0, INTERVAL);
        assert_eq!(s.zones.len(), 2);
        assert_eq!(s.primary.current_vehicle, None);
        assert_eq!(s.zones[1].0, 4);
        assert_eq!(s.zones[1].1.vehicle_label(), "motorbike");

        let s = queue.step(&assign(&[], &zones, &classes, &vehicles), t0 + INTERVAL, INTERVAL);
        assert_eq!(s.zones[1].1.current_vehicle, None);
    }

    #[test]
    fn test_queue_mode_parse() {
        assert_eq!("Coupled".parse::<QueueMode>().unwrap(), QueueMode::Coupled);
        assert_eq!("per_zone".parse::<QueueMode>().unwrap(), QueueMode::PerZone);
        match "fifo".parse::<QueueMode>() {
            Err(Error::InvalidInput { field, found, .. }) => {
                assert_eq!(field, "queue_mode");
                assert_eq!(found, "fifo");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

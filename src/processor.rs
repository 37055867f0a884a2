//! One frame of core work: assignment, queue step, output latch.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::assignment::{place, CollectedVehicles, PlacedDetection};
use crate::detection::{ClassList, Detection, VehicleClasses};
use crate::output::{ActuationChannel, OutputLatch, SymbolicOutput};
use crate::queuing::{QueueMode, QueueStep, ZoneQueue};
use crate::zones::ZoneSet;

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub collected: CollectedVehicles,
    pub placed: Vec<PlacedDetection>,
    pub step: QueueStep,
    /// Output switched on during this frame, if the decision changed.
    pub actuated: Option<SymbolicOutput>,
}

impl FrameOutcome {
    /// The primary zone currently holds a vehicle.
    pub fn primary_occupied(&self) -> bool {
        self.collected.slot(0).map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// Everything a display sink needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    pub zones: &'a ZoneSet,
    pub outcome: &'a FrameOutcome,
    pub processing_ms: f64,
}

impl Overlay<'_> {
    /// `Zone: 0 | NV: <vehicles> | PV: <queued> [<elapsed>]`
    pub fn status_line(&self) -> String {
        let primary = &self.outcome.step.primary;
        format!(
            "Zone: {} | NV: {} | PV: {} [{}]",
            self.outcome.collected.zone_id(0).unwrap_or(0),
            self.outcome.collected.slot(0).map(|s| s.len()).unwrap_or(0),
            primary.vehicle_label(),
            primary.remaining_text()
        )
    }

    /// One line per further zone; only per-zone queues produce these.
    pub fn zone_lines(&self) -> Vec<String> {
        self.outcome
            .step
            .zones
            .iter()
            .skip(1)
            .map(|(id, r)| format!("Zone: {} | PV: {} [{}]", id, r.vehicle_label(), r.remaining_text()))
            .collect()
    }

    pub fn timing_line(&self) -> String {
        format!("Process Time per frame: {:.2} ms", self.processing_ms)
    }
}

/// Owns the per-run decision state. No globals: the run loop holds this
/// and hands it each frame's detections.
pub struct FrameProcessor {
    zones: ZoneSet,
    classes: ClassList,
    vehicles: VehicleClasses,
    interval: Duration,
    queue: ZoneQueue,
    latch: OutputLatch,
}

impl FrameProcessor {
    /// `zones` must already be scaled to the operating frame size.
    pub fn new(
        zones: ZoneSet,
        classes: ClassList,
        vehicles: VehicleClasses,
        interval: Duration,
        mode: QueueMode,
    ) -> Self {
        Self {
            zones,
            classes,
            vehicles,
            interval,
            queue: ZoneQueue::new(mode),
            latch: OutputLatch::new(),
        }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn activations(&self) -> u64 {
        self.latch.activations()
    }

    pub fn process<A>(&mut self, detections: &[Detection], now: Instant, actuator: &mut A) -> Result<FrameOutcome>
    where
        A: ActuationChannel + ?Sized,
    {
        let (collected, placed) = place(detections, &self.zones, &self.classes, &self.vehicles);
        let step = self.queue.step(&collected, now, self.interval);
        let actuated = self.latch.apply(step.primary.current_vehicle.as_deref(), actuator)?;

        debug!(
            "Frame: {} detections, {} placed, {} vehicles, queued={} [{}]",
            detections.len(),
            placed.len(),
            collected.total(),
            step.primary.vehicle_label(),
            step.primary.remaining_text()
        );
        for (id, report) in step.zones.iter().skip(1) {
            debug!("Zone {} queued={} [{}]", id, report.vehicle_label(), report.remaining_text());
        }

        Ok(FrameOutcome {
            collected,
            placed,
            step,
            actuated,
        })
    }

    /// Return the outputs to the fail-safe channel.
    pub fn shutdown<A>(&mut self, actuator: &mut A) -> Result<()>
    where
        A: ActuationChannel + ?Sized,
    {
        self.latch.reset_to_safe(actuator)
    }
}

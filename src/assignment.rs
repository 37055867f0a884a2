//! Detection-to-zone assignment.
//!
//! Each detection is placed by its centroid into the first zone (ascending
//! id) that strictly contains it, and nowhere else. Only vehicle classes end
//! up in the per-zone collection; everything placed is still reported for
//! drawing.

use crate::detection::{ClassList, Detection, VehicleClasses};
use crate::zones::{Point, ZoneId, ZoneSet};

/// Vehicle class names seen in each zone during one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectedVehicles {
    slots: Vec<(ZoneId, Vec<String>)>,
}

impl CollectedVehicles {
    /// One empty slot per zone, in zone id order.
    pub fn for_zones(zones: &ZoneSet) -> Self {
        Self {
            slots: zones.ids().map(|id| (id, Vec::new())).collect(),
        }
    }

    /// Number of zone slots (not the number of vehicles).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&[String]> {
        self.slots.get(index).map(|(_, v)| v.as_slice())
    }

    pub fn zone_id(&self, index: usize) -> Option<ZoneId> {
        self.slots.get(index).map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &[String])> {
        self.slots.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.slots.iter().map(|(_, v)| v.len()).sum()
    }

    /// Plain nested lists, the shape the queue rules are written against.
    pub fn to_lists(&self) -> Vec<Vec<String>> {
        self.slots.iter().map(|(_, v)| v.clone()).collect()
    }

    fn push(&mut self, index: usize, label: &str) {
        if let Some((_, v)) = self.slots.get_mut(index) {
            v.push(label.to_string());
        }
    }
}

/// A detection that landed inside a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedDetection {
    pub detection: Detection,
    pub centroid: Point,
    pub zone_id: ZoneId,
    pub label: String,
    pub is_vehicle: bool,
}

/// Walk every detection once, returning the per-zone vehicle collection
/// together with everything that was placed in some zone.
pub fn place(
    detections: &[Detection],
    zones: &ZoneSet,
    classes: &ClassList,
    vehicles: &VehicleClasses,
) -> (CollectedVehicles, Vec<PlacedDetection>) {
    let mut collected = CollectedVehicles::for_zones(zones);
    let mut placed = Vec::new();

    for det in detections {
        let centroid = det.centroid();
        let Some((slot, zone)) = zones.locate(centroid) else {
            continue;
        };

        let label = classes.name(det.class_id);
        let is_vehicle = label.map(|l| vehicles.is_vehicle(l)).unwrap_or(false);
        if is_vehicle {
            if let Some(l) = label {
                collected.push(slot, l);
            }
        }

        placed.push(PlacedDetection {
            detection: *det,
            centroid,
            zone_id: zone.id,
            label: label
                .map(str::to_string)
                .unwrap_or_else(|| format!("class {}", det.class_id)),
            is_vehicle,
        });
    }

    (collected, placed)
}

pub fn assign(
    detections: &[Detection],
    zones: &ZoneSet,
    classes: &ClassList,
    vehicles: &VehicleClasses,
) -> CollectedVehicles {
    place(detections, zones, classes, vehicles).0
}

pub fn locate(
    detections: &[Detection],
    zones: &ZoneSet,
    classes: &ClassList,
    vehicles: &VehicleClasses,
) -> Vec<PlacedDetection> {
    place(detections, zones, classes, vehicles).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Zone;

    fn classes() -> ClassList {
        ClassList::parse("person\nbicycle\ncar\nmotorbike\naeroplane\nbus")
    }

    fn rect(id: ZoneId, x0: i32, y0: i32, x1: i32, y1: i32) -> Zone {
        Zone::new(
            id,
            vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
        )
    }

    fn boxed(cx: f32, cy: f32, class_id: usize) -> Detection {
        Detection::new(cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0, 0.8, class_id)
    }

    #[test]
    fn test_one_slot_per_zone_even_when_empty() {
        let zones = ZoneSet::new(vec![rect(0, 0, 0, 100, 100), rect(1, 200, 0, 300, 100)], 640, 480);
        let collected = assign(&[], &zones, &classes(), &VehicleClasses::default());
        assert_eq!(collected.len(), 2);
        assert_eq!(collected.slot(0), Some(&[][..]));
        assert_eq!(collected.slot(1), Some(&[][..]));
        assert_eq!(collected.slot(2), None);
    }

    #[test]
    fn test_vehicles_collected_per_zone_in_order() {
        let zones = ZoneSet::new(vec![rect(0, 0, 0, 100, 100), rect(1, 200, 0, 300, 100)], 640, 480);
        let dets = vec![
            boxed(250.0, 50.0, 3), // motorbike in zone 1
            boxed(50.0, 50.0, 2),  // car in zone 0
            boxed(60.0, 40.0, 3),  // motorbike in zone 0
            boxed(50.0, 50.0, 0),  // person in zone 0, not a vehicle
            boxed(500.0, 400.0, 2), // car outside
        ];
        let (collected, placed) = place(&dets, &zones, &classes(), &VehicleClasses::default());
        assert_eq!(
            collected.to_lists(),
            vec![vec!["car".to_string(), "motorbike".to_string()], vec!["motorbike".to_string()]]
        );
        assert_eq!(placed.len(), 4);
        assert!(placed.iter().any(|p| p.label == "person" && !p.is_vehicle));
    }

    #[test]
    fn test_overlapping_zones_first_id_wins() {
        let zones = ZoneSet::new(vec![rect(7, 0, 0, 200, 200), rect(3, 50, 50, 150, 150)], 640, 480);
        let collected = assign(&[boxed(100.0, 100.0, 2)], &zones, &classes(), &VehicleClasses::default());
        assert_eq!(collected.zone_id(0), Some(3));
        assert_eq!(collected.to_lists(), vec![vec!["car".to_string()], vec![]]);
        assert_eq!(collected.total(), 1);
    }

    #[test]
    fn test_centroid_on_edge_is_not_inside() {
        let zones = ZoneSet::new(vec![rect(0, 0, 0, 100, 100)], 640, 480);
        let collected = assign(&[boxed(100.0, 50.0, 2)], &zones, &classes(), &VehicleClasses::default());
        assert_eq!(collected.total(), 0);
    }

    #[test]
    fn test_unknown_class_id_is_not_a_vehicle() {
        let zones = ZoneSet::new(vec![rect(0, 0, 0, 100, 100)], 640, 480);
        let placed = locate(&[boxed(50.0, 50.0, 42)], &zones, &classes(), &VehicleClasses::default());
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].label, "class 42");
        assert!(!placed[0].is_vehicle);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let zones = ZoneSet::new(
            vec![rect(2, 0, 0, 300, 300), rect(0, 100, 100, 200, 200), rect(1, 50, 50, 250, 250)],
            640,
            480,
        );
        let dets: Vec<Detection> = (0..30)
            .map(|i| boxed(20.0 + i as f32 * 9.0, 30.0 + i as f32 * 8.0, 2 + i % 2))
            .collect();
        let first = assign(&dets, &zones, &classes(), &VehicleClasses::default());
        for _ in 0..5 {
            assert_eq!(assign(&dets, &zones, &classes(), &VehicleClasses::default()), first);
        }
        let placed = locate(&dets, &zones, &classes(), &VehicleClasses::default());
        assert!(placed.len() <= dets.len());
        assert_eq!(first.total(), placed.iter().filter(|p| p.is_vehicle).count());
    }
}

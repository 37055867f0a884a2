use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ensure_exists, Result};
use crate::zones::Point;

/// One detector output box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Self {
        Self { x1, y1, x2, y2, confidence, class_id }
    }

    /// Corners truncated to integer pixels.
    pub fn corners(&self) -> (Point, Point) {
        (
            Point::new(self.x1 as i32, self.y1 as i32),
            Point::new(self.x2 as i32, self.y2 as i32),
        )
    }

    /// Integer midpoint of the truncated corners.
    pub fn centroid(&self) -> Point {
        let (a, b) = self.corners();
        Point::new(
            (a.x as i64 + b.x as i64).div_euclid(2) as i32,
            (a.y as i64 + b.y as i64).div_euclid(2) as i32,
        )
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.iou(&det) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

/// Class names indexed by model class id, one per line in the class file.
#[derive(Debug, Clone, Default)]
pub struct ClassList {
    names: Vec<String>,
}

impl ClassList {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn parse(text: &str) -> Self {
        Self::new(text.lines().map(|l| l.trim().to_string()).collect())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists("class list", path)?;
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Predicate over class names deciding what counts as a queued vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleClasses {
    names: HashSet<String>,
}

impl VehicleClasses {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Comma separated list, e.g. `car, motorbike`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn is_vehicle(&self, class_name: &str) -> bool {
        self.names.contains(class_name)
    }
}

impl Default for VehicleClasses {
    fn default() -> Self {
        Self::new(["car", "motorbike"])
    }
}

/// Detection model seam. Implementations return boxes in the pixel space of
/// the frame they were given.
pub trait ObjectDetector<F> {
    fn detect(&mut self, frame: &F, confidence: f32) -> anyhow::Result<Vec<Detection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_truncates_then_halves() {
        let d = Detection::new(10.9, 20.2, 31.7, 41.0, 0.9, 2);
        // corners (10, 20) (31, 41)
        assert_eq!(d.centroid(), Point::new(20, 30));
    }

    #[test]
    fn test_iou() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = Detection::new(5.0, 0.0, 15.0, 10.0, 0.8, 0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        let far = Detection::new(100.0, 100.0, 110.0, 110.0, 0.8, 0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_per_class() {
        let dets = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0, 0.6, 2),
            Detection::new(1.0, 1.0, 11.0, 11.0, 0.9, 2),
            Detection::new(1.0, 1.0, 11.0, 11.0, 0.7, 3),
            Detection::new(50.0, 50.0, 60.0, 60.0, 0.5, 2),
        ];
        let kept = non_max_suppression(dets, 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class_id == 3));
        assert!(!kept.iter().any(|d| d.confidence == 0.6));
    }

    #[test]
    fn test_class_list_and_vehicle_predicate() {
        let classes = ClassList::parse("person\nbicycle\ncar \nmotorbike\n");
        assert_eq!(classes.len(), 4);
        assert_eq!(classes.name(2), Some("car"));
        assert_eq!(classes.name(9), None);

        let vehicles = VehicleClasses::default();
        assert!(vehicles.is_vehicle("car"));
        assert!(vehicles.is_vehicle("motorbike"));
        assert!(!vehicles.is_vehicle("bus"));

        let custom = VehicleClasses::parse("bus, truck,,");
        assert!(custom.is_vehicle("truck"));
        assert!(!custom.is_vehicle("car"));
        assert!(!custom.is_vehicle(""));
    }
}

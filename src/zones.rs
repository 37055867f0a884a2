//! Zone geometry store.
//!
//! Zones are polygons authored on a frame of a given size. Before a run the
//! whole set is rescaled once to the operating frame size; containment is a
//! strict test, so a centroid sitting exactly on an edge belongs to no zone.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

pub type ZoneId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: ZoneId,
    pub points: Vec<Point>,
}

impl Zone {
    pub fn new(id: ZoneId, points: Vec<Point>) -> Self {
        Self { id, points }
    }

    /// Fewer than 3 points can be stored but never enclose anything.
    pub fn is_polygon(&self) -> bool {
        self.points.len() >= 3
    }

    /// Strict point-in-polygon test. Edges and vertices are outside.
    pub fn contains(&self, p: Point) -> bool {
        if !self.is_polygon() {
            return false;
        }

        let n = self.points.len();
        let mut inside = false;
        let (px, py) = (p.x as i64, p.y as i64);

        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let (ax, ay) = (a.x as i64, a.y as i64);
            let (bx, by) = (b.x as i64, b.y as i64);

            if on_segment(px, py, ax, ay, bx, by) {
                return false;
            }

            // Half-open rule on y so a vertex is counted once.
            if (ay > py) != (by > py) {
                // x of the edge at height py, compared without division:
                // px < ax + (py - ay) * (bx - ax) / (by - ay)
                let lhs = (px - ax) * (by - ay);
                let rhs = (py - ay) * (bx - ax);
                let crosses = if by > ay { lhs < rhs } else { lhs > rhs };
                if crosses {
                    inside = !inside;
                }
            }
        }

        inside
    }

    /// Integer mean of the vertices, used for labelling.
    pub fn label_anchor(&self) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as i64;
        let sx: i64 = self.points.iter().map(|p| p.x as i64).sum();
        let sy: i64 = self.points.iter().map(|p| p.y as i64).sum();
        Some(Point::new((sx / n) as i32, (sy / n) as i32))
    }
}

fn on_segment(px: i64, py: i64, ax: i64, ay: i64, bx: i64, by: i64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross == 0
        && px >= ax.min(bx)
        && px <= ax.max(bx)
        && py >= ay.min(by)
        && py <= ay.max(by)
}

/// All zones of a camera, keyed and iterated by ascending id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSet {
    zones: BTreeMap<ZoneId, Zone>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl ZoneSet {
    pub fn new(zones: impl IntoIterator<Item = Zone>, frame_width: u32, frame_height: u32) -> Self {
        Self {
            zones: zones.into_iter().map(|z| (z.id, z)).collect(),
            frame_width,
            frame_height,
        }
    }

    /// Build the set from the raw `id -> "(x, y), (x, y)"` text the zone
    /// file reader extracted.
    pub fn load(
        raw: &BTreeMap<ZoneId, String>,
        authoring_width: u32,
        authoring_height: u32,
    ) -> Result<Self> {
        let mut zones = BTreeMap::new();
        for (&id, text) in raw {
            let points = parse_point_list(text)
                .map_err(|message| Error::parse(format!("zone {}", id), message))?;
            zones.insert(id, Zone::new(id, points));
        }
        debug!("Loaded {} zones authored at {}x{}", zones.len(), authoring_width, authoring_height);
        Ok(Self {
            zones,
            frame_width: authoring_width,
            frame_height: authoring_height,
        })
    }

    /// Scale every point to a new frame size. Returns a new set; `self` is
    /// untouched.
    pub fn rescale(&self, new_width: u32, new_height: u32) -> Result<Self> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(Error::Config(format!(
                "zone set has no authoring frame size ({}x{}); check frame_width/frame_height in the zone file",
                self.frame_width, self.frame_height
            )));
        }
        if new_width == 0 || new_height == 0 {
            return Err(Error::Config(format!(
                "cannot rescale zones to a {}x{} frame",
                new_width, new_height
            )));
        }
        if self.frame_width == new_width && self.frame_height == new_height {
            return Ok(self.clone());
        }

        let (ow, oh) = (self.frame_width as f64, self.frame_height as f64);
        let (nw, nh) = (new_width as f64, new_height as f64);
        let zones = self
            .zones
            .iter()
            .map(|(&id, zone)| {
                let points = zone
                    .points
                    .iter()
                    .map(|p| Point::new((p.x as f64 * nw / ow) as i32, (p.y as f64 * nh / oh) as i32))
                    .collect();
                (id, Zone::new(id, points))
            })
            .collect();

        debug!(
            "Rescaled zones {}x{} -> {}x{}",
            self.frame_width, self.frame_height, new_width, new_height
        );
        Ok(Self {
            zones,
            frame_width: new_width,
            frame_height: new_height,
        })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.keys().copied()
    }

    /// Zones in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// First zone (by id) strictly containing `p`, with its slot index.
    pub fn locate(&self, p: Point) -> Option<(usize, &Zone)> {
        self.iter().enumerate().find(|(_, zone)| zone.contains(p))
    }
}

/// `(x, y), (x, y), ...` -> points. Whitespace around the separators is
/// optional. Decimal coordinates truncate toward zero.
fn parse_point_list(text: &str) -> std::result::Result<Vec<Point>, String> {
    let mut rest = text.trim();
    let mut points = Vec::new();
    while !rest.is_empty() {
        if !points.is_empty() {
            rest = rest
                .strip_prefix(',')
                .ok_or_else(|| format!("expected ',' between points, found '{}'", rest))?
                .trim_start();
        }
        let close = rest.find(')').ok_or_else(|| format!("unclosed point '{}'", rest))?;
        let chunk = &rest[..=close];
        rest = rest[close + 1..].trim_start();

        let inner = chunk
            .strip_prefix('(')
            .ok_or_else(|| format!("expected '(x, y)', found '{}'", chunk))?
            .trim_end_matches(')');
        let mut parts = inner.split(',');
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected '(x, y)', found '{}'", chunk));
        };
        points.push(Point::new(parse_coord(x)?, parse_coord(y)?));
    }
    Ok(points)
}

fn parse_coord(s: &str) -> std::result::Result<i32, String> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i32>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= i32::MAX as f64 => Ok(v as i32),
        _ => Err(format!("invalid coordinate '{}'", s)),
    }
}

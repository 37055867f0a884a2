//! Interactive zone authoring, independent of any window toolkit.
//!
//! The UI layer feeds clicks and key presses in and redraws when asked to.

use tracing::{info, warn};

use crate::error::Result;
use crate::zone_file::ZoneFileWriter;
use crate::zones::Point;

pub const INSTRUCTIONS: [&str; 2] = [
    "Left click to select points.",
    "Press 's' to save, 'c' to close the polygon, 'u' to undo last point, and 'q' to quit.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Nothing visible changed.
    Continue,
    Redraw,
    /// Points were cleared; grab a fresh frame.
    NextFrame,
    Finished,
}

#[derive(Debug)]
pub struct AuthoringSession {
    writer: ZoneFileWriter,
    quit_key: char,
    points: Vec<Point>,
    /// Polygons closed on the current frame, kept for drawing only.
    closed: Vec<Vec<Point>>,
    frame_index: u64,
    finished: bool,
}

impl AuthoringSession {
    pub fn new(writer: ZoneFileWriter, quit_key: char) -> Self {
        info!(
            "Writing points to '{}' (max {} zone(s)). Press 'n' for the next frame, '{}' to quit.",
            writer.path().display(),
            writer.max_zones(),
            quit_key
        );
        Self {
            writer,
            quit_key,
            points: Vec::new(),
            closed: Vec::new(),
            frame_index: 0,
            finished: false,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn closed_polygons(&self) -> &[Vec<Point>] {
        &self.closed
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn zones_saved(&self) -> u32 {
        self.writer.written()
    }

    pub fn max_zones(&self) -> u32 {
        self.writer.max_zones()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn click(&mut self, p: Point) -> SessionEvent {
        if self.finished {
            return SessionEvent::Finished;
        }
        self.points.push(p);
        SessionEvent::Redraw
    }

    pub fn key(&mut self, key: char) -> Result<SessionEvent> {
        if self.finished {
            return Ok(SessionEvent::Finished);
        }
        // the quit key wins even when it shadows a command key
        if key == self.quit_key {
            info!("Authoring stopped with {} zone(s) saved", self.writer.written());
            self.finished = true;
            return Ok(SessionEvent::Finished);
        }

        let event = match key {
            's' => self.save()?,
            'c' => self.close_polygon(),
            'u' => self.undo(),
            'n' => {
                self.points.clear();
                self.closed.clear();
                self.frame_index += 1;
                info!(
                    "Frame {}: zones created {}/{}",
                    self.frame_index,
                    self.writer.written(),
                    self.writer.max_zones()
                );
                SessionEvent::NextFrame
            }
            _ => SessionEvent::Continue,
        };
        Ok(event)
    }

    fn save(&mut self) -> Result<SessionEvent> {
        if self.points.len() < 3 {
            warn!("Saving a zone with only {} point(s); it will never contain anything", self.points.len());
        }
        if !self.writer.append_zone(&self.points)? {
            info!("Program will exit.");
            self.finished = true;
            return Ok(SessionEvent::Finished);
        }
        self.points.clear();
        Ok(SessionEvent::Redraw)
    }

    fn close_polygon(&mut self) -> SessionEvent {
        if self.points.len() > 2 {
            self.closed.push(self.points.clone());
            info!("Polygon closed.");
            SessionEvent::Redraw
        } else {
            warn!("A polygon must have at least 3 points.");
            SessionEvent::Continue
        }
    }

    fn undo(&mut self) -> SessionEvent {
        if self.points.pop().is_some() {
            info!("Undo last point. Remaining points: {}", self.points.len());
            SessionEvent::Redraw
        } else {
            info!("No points to undo.");
            SessionEvent::Continue
        }
    }
}

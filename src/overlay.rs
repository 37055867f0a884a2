use anyhow::Result;
use opencv::{
    core::{self, Mat, Point as CvPoint, Scalar, Vector},
    highgui, imgproc,
    prelude::*,
};
use tracing::debug;

use crate::monitor::{FrameSink, SinkControl};
use crate::processor::Overlay;
use crate::zones::{Point, ZoneSet};

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;

fn bgr(b: f64, g: f64, r: f64) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

pub(crate) fn cv_point(p: Point) -> CvPoint {
    CvPoint::new(p.x, p.y)
}

pub(crate) fn draw_polyline(img: &mut Mat, points: &[Point], closed: bool, color: Scalar) -> Result<()> {
    if points.len() < 2 {
        return Ok(());
    }
    let mut pts = Vector::<Vector<CvPoint>>::new();
    pts.push(points.iter().copied().map(cv_point).collect());
    imgproc::polylines(img, &pts, closed, color, 2, imgproc::LINE_8, 0)?;
    Ok(())
}

pub(crate) fn put_text(img: &mut Mat, text: &str, org: CvPoint, scale: f64, color: Scalar) -> Result<()> {
    imgproc::put_text(img, text, org, FONT, scale, color, 2, imgproc::LINE_AA, false)?;
    Ok(())
}

/// Zone outlines with their id at the vertex mean.
pub fn draw_zones(img: &mut Mat, zones: &ZoneSet) -> Result<()> {
    for zone in zones.iter() {
        draw_polyline(img, &zone.points, true, bgr(0.0, 255.0, 0.0))?;
        if let Some(anchor) = zone.label_anchor() {
            put_text(img, &zone.id.to_string(), cv_point(anchor), 0.65, bgr(0.0, 0.0, 255.0))?;
        }
    }
    Ok(())
}

fn blend(frame: &mut Mat, overlay: &Mat, alpha: f64) -> Result<()> {
    let mut out = Mat::default();
    core::add_weighted(overlay, alpha, &*frame, 1.0 - alpha, 0.0, &mut out, -1)?;
    *frame = out;
    Ok(())
}

fn draw_detections(frame: &mut Mat, overlay: &Overlay<'_>) -> Result<()> {
    let box_color = bgr(86.0, 179.0, 255.0);
    let in_zone = &overlay.outcome.placed;
    if in_zone.is_empty() {
        return Ok(());
    }

    let mut shaded = frame.try_clone()?;
    for placed in in_zone {
        let (a, b) = placed.detection.corners();
        imgproc::rectangle_points(&mut shaded, cv_point(a), cv_point(b), box_color, imgproc::FILLED, imgproc::LINE_8, 0)?;
    }
    blend(frame, &shaded, 0.2)?;

    for placed in in_zone {
        let (a, b) = placed.detection.corners();
        imgproc::rectangle_points(frame, cv_point(a), cv_point(b), box_color, 2, imgproc::LINE_8, 0)?;
        imgproc::circle(frame, cv_point(placed.centroid), 4, bgr(255.0, 89.0, 94.0), -1, imgproc::LINE_8, 0)?;
        let text = format!("{} {:.2}", placed.label, placed.detection.confidence);
        put_text(frame, &text, CvPoint::new(a.x, a.y - 5), 0.6, bgr(255.0, 255.0, 255.0))?;
    }
    Ok(())
}

fn draw_info(frame: &mut Mat, overlay: &Overlay<'_>) -> Result<()> {
    let white = bgr(255.0, 255.0, 255.0);
    let status = overlay.status_line();
    let timing = overlay.timing_line();
    let timing_pos = if frame.cols() > 1000 {
        CvPoint::new(frame.cols() - 550, 30)
    } else {
        CvPoint::new(25, 85)
    };
    let lines = [(status, CvPoint::new(25, 25)), (timing, timing_pos)];

    let mut shaded = frame.try_clone()?;
    for (text, pos) in &lines {
        let mut baseline = 0;
        let size = imgproc::get_text_size(text, FONT, 0.75, 2, &mut baseline)?;
        imgproc::rectangle_points(
            &mut shaded,
            CvPoint::new(pos.x - 5, pos.y - size.height - 5),
            CvPoint::new(pos.x + size.width + 5, pos.y + 5),
            bgr(0.0, 0.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    blend(frame, &shaded, 0.6)?;

    for (text, pos) in &lines {
        put_text(frame, text, *pos, 0.75, white)?;
    }
    for (i, text) in overlay.zone_lines().iter().enumerate() {
        put_text(frame, text, CvPoint::new(25, 115 + 30 * i as i32), 0.6, white)?;
    }
    Ok(())
}

/// Two-lamp indicator in the lower left: upper lamp lit while the primary
/// zone holds a vehicle, lower lamp lit otherwise.
fn draw_traffic_light(frame: &mut Mat, occupied: bool) -> Result<()> {
    let radius = 15;
    let top_left = CvPoint::new((0.05 * frame.cols() as f64) as i32, frame.rows() - 150);
    let bottom_right = CvPoint::new(top_left.x + 50, top_left.y + 100);
    let center_x = (top_left.x + bottom_right.x) / 2;

    put_text(frame, "Zone", CvPoint::new(top_left.x, top_left.y - 10), 0.75, bgr(255.0, 255.0, 255.0))?;
    imgproc::rectangle_points(frame, top_left, bottom_right, bgr(100.0, 100.0, 100.0), 4, imgproc::LINE_8, 0)?;
    imgproc::rectangle_points(frame, top_left, bottom_right, bgr(0.0, 0.0, 0.0), -1, imgproc::LINE_8, 0)?;

    let (upper, lower) = if occupied {
        (bgr(0.0, 255.0, 255.0), bgr(0.0, 100.0, 0.0))
    } else {
        (bgr(0.0, 100.0, 100.0), bgr(0.0, 255.0, 0.0))
    };
    imgproc::circle(frame, CvPoint::new(center_x, top_left.y + radius + 5), radius, upper, -1, imgproc::LINE_8, 0)?;
    imgproc::circle(frame, CvPoint::new(center_x, bottom_right.y - radius - 5), radius, lower, -1, imgproc::LINE_8, 0)?;
    Ok(())
}

/// Preview window with the monitoring overlay. Polls the keyboard after each
/// frame and reports the quit key.
///
/// The window is created on the first frame so that every HighGUI call
/// happens on the thread that renders.
pub struct OpenCvSink {
    window: String,
    wait_key: i32,
    quit_key: char,
    opened: bool,
}

impl OpenCvSink {
    pub fn new(window: &str, wait_key: i32, quit_key: char) -> Self {
        Self {
            window: window.to_string(),
            wait_key: wait_key.max(1),
            quit_key,
            opened: false,
        }
    }
}

impl FrameSink<Mat> for OpenCvSink {
    fn render(&mut self, frame: &mut Mat, overlay: &Overlay<'_>) -> Result<SinkControl> {
        draw_zones(frame, overlay.zones)?;
        draw_detections(frame, overlay)?;
        draw_info(frame, overlay)?;
        draw_traffic_light(frame, overlay.outcome.primary_occupied())?;

        if !self.opened {
            highgui::named_window(&self.window, highgui::WINDOW_AUTOSIZE)?;
            self.opened = true;
        }
        highgui::imshow(&self.window, frame)?;
        let key = highgui::wait_key(self.wait_key)?;
        if key >= 0 && (key & 0xFF) as u32 == self.quit_key as u32 {
            return Ok(SinkControl::Quit);
        }
        Ok(SinkControl::Continue)
    }
}

impl Drop for OpenCvSink {
    fn drop(&mut self) {
        if self.opened && highgui::destroy_window(&self.window).is_err() {
            debug!("Window {} already closed", self.window);
        }
    }
}

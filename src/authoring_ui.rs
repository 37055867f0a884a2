use std::sync::{Arc, Mutex};

use anyhow::Result;
use opencv::{
    core::{Mat, Point as CvPoint, Scalar},
    highgui, imgproc,
    prelude::*,
};
use tracing::info;

use crate::authoring::{AuthoringSession, SessionEvent, INSTRUCTIONS};
use crate::camera::CameraStream;
use crate::overlay::{cv_point, draw_polyline, put_text};
use crate::zones::Point;

pub const WINDOW: &str = "Writing Points Mode";

fn draw_instructions(img: &mut Mat) -> Result<()> {
    imgproc::rectangle_points(
        img,
        CvPoint::new(20, 10),
        CvPoint::new(730, 65),
        Scalar::new(255.0, 255.0, 255.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;
    let black = Scalar::new(0.0, 0.0, 0.0, 0.0);
    for (i, line) in INSTRUCTIONS.iter().enumerate() {
        put_text(img, line, CvPoint::new(25, 30 + 25 * i as i32), 0.75, black)?;
    }
    Ok(())
}

fn redraw(frame: &Mat, session: &AuthoringSession) -> Result<()> {
    let mut img = frame.try_clone()?;
    for polygon in session.closed_polygons() {
        draw_polyline(&mut img, polygon, true, Scalar::new(255.0, 0.0, 0.0, 0.0))?;
    }
    draw_polyline(&mut img, session.points(), false, Scalar::new(0.0, 255.0, 0.0, 0.0))?;
    for p in session.points() {
        imgproc::circle(&mut img, cv_point(*p), 5, Scalar::new(0.0, 0.0, 255.0, 0.0), -1, imgproc::LINE_8, 0)?;
    }
    draw_instructions(&mut img)?;
    highgui::imshow(WINDOW, &img)?;
    Ok(())
}

/// Drive an authoring session from live camera frames until it finishes or
/// the stream ends. Returns the number of zones saved.
pub fn run_authoring(camera: &mut CameraStream, mut session: AuthoringSession) -> Result<u32> {
    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;

    let clicks: Arc<Mutex<Vec<Point>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&clicks);
    highgui::set_mouse_callback(
        WINDOW,
        Some(Box::new(move |event, x, y, _flags| {
            if event == highgui::EVENT_LBUTTONDOWN {
                if let Ok(mut pending) = sink.lock() {
                    pending.push(Point::new(x, y));
                }
            }
        })),
    )?;

    'frames: while !session.is_finished() {
        let Some(frame) = camera.read()? else {
            info!("Camera stream ended");
            break;
        };
        info!(
            "Frame {}: zones created {}/{}",
            session.frame_index(),
            session.zones_saved(),
            session.max_zones()
        );
        redraw(&frame, &session)?;

        loop {
            let pending = clicks.lock().map(|mut c| std::mem::take(&mut *c)).unwrap_or_default();
            let mut dirty = false;
            for p in pending {
                dirty |= session.click(p) == SessionEvent::Redraw;
            }

            let key = highgui::wait_key(1)?;
            if key >= 0 {
                match session.key(char::from((key & 0xFF) as u8))? {
                    SessionEvent::Redraw => dirty = true,
                    SessionEvent::NextFrame => continue 'frames,
                    SessionEvent::Finished => break 'frames,
                    SessionEvent::Continue => {}
                }
            }
            if dirty {
                redraw(&frame, &session)?;
            }
        }
    }

    highgui::destroy_window(WINDOW).ok();
    Ok(session.zones_saved())
}

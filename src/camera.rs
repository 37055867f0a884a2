use anyhow::{bail, Context, Result};
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use tracing::info;

use crate::monitor::FrameSource;

/// Opened camera: a device index (`0`), a stream URL or a video file.
pub struct CameraStream {
    cap: VideoCapture,
    source: String,
    is_device: bool,
    width: i32,
    height: i32,
}

impl CameraStream {
    /// Frames are resized to `width`×`height` when the device ignores the
    /// requested resolution.
    pub fn open(source: &str, width: u32, height: u32) -> Result<Self> {
        info!("Opening camera {}", source);

        let (mut cap, is_device) = match source.trim().parse::<i32>() {
            Ok(index) => (VideoCapture::new(index, CAP_ANY)?, true),
            Err(_) => (VideoCapture::from_file(source, CAP_ANY)?, false),
        };
        if !cap.is_opened()? {
            bail!("Failed to open camera source: {}", source);
        }

        let (width, height) = (width as i32, height as i32);
        if is_device {
            cap.set(CAP_PROP_FRAME_WIDTH as i32, f64::from(width))?;
            cap.set(CAP_PROP_FRAME_HEIGHT as i32, f64::from(height))?;
        }
        // fresh frames, not queued ones
        cap.set(CAP_PROP_BUFFERSIZE as i32, 1.0).ok();

        let native_fps = cap.get(CAP_PROP_FPS as i32).unwrap_or(0.0);
        info!("Camera {} opened. Native FPS: {:.1}, frame size {}x{}", source, native_fps, width, height);

        Ok(Self {
            cap,
            source: source.to_string(),
            is_device,
            width,
            height,
        })
    }

    /// Read one frame at the configured size, `None` when a file or stream
    /// has ended.
    pub fn read(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let ok = self.cap.read(&mut frame).context("camera read failed")?;
        if !ok || frame.empty() {
            if self.is_device {
                bail!("Empty frame from camera {}", self.source);
            }
            return Ok(None);
        }

        if frame.cols() == self.width && frame.rows() == self.height {
            return Ok(Some(frame));
        }
        let mut resized = Mat::default();
        imgproc::resize(
            &frame,
            &mut resized,
            Size::new(self.width, self.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        Ok(Some(resized))
    }
}

impl FrameSource for CameraStream {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        self.read()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        let _ = self.cap.release();
        info!("Camera {} released", self.source);
    }
}

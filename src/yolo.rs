//! YOLO object detector via ONNX Runtime.
//!
//! Expects the usual export layout: input `images` `[1, 3, S, S]`, output
//! `[1, 4 + classes, boxes]` with centre/size boxes in input pixels.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, Scalar, Size},
    imgproc,
    prelude::*,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

use crate::detection::{non_max_suppression, Detection, ObjectDetector};
use crate::error::ensure_exists;

pub struct YoloDetector {
    session: Session,
    input_size: u32,
    nms_threshold: f32,
}

impl YoloDetector {
    pub fn new(model_path: impl AsRef<Path>, input_size: u32, nms_threshold: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        ensure_exists("weight", model_path)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model {}", model_path.display()))?;
        info!("Model {} loaded (input {}x{})", model_path.display(), input_size, input_size);

        Ok(Self {
            session,
            input_size,
            nms_threshold,
        })
    }

    /// All boxes above `confidence`, in frame pixels, after NMS.
    pub fn detect_frame(&self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
        let sz = self.input_size as i32;
        let (letterboxed, scale, pad_x, pad_y) = letterbox(frame, sz)?;
        let mut rgb = Mat::default();
        imgproc::cvt_color(&letterboxed, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let data = mat_to_chw_f32(&rgb, sz as usize)?;
        let array = Array4::from_shape_vec((1, 3, sz as usize, sz as usize), data)?;

        let outputs = self.session.run(ort::inputs!["images" => array.view()]?)?;
        let output = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract output tensor: {}", e))?;
        let shape = output.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("Unexpected model output shape {:?}", shape));
        }
        let num_boxes = shape[2];
        let num_classes = shape[1] - 4;

        let frame_w = frame.cols() as f32;
        let frame_h = frame.rows() as f32;
        let scale = scale as f32;
        let (pad_x, pad_y) = (pad_x as f32, pad_y as f32);

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let mut max_score = 0f32;
            let mut max_class = 0usize;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > max_score {
                    max_score = score;
                    max_class = c;
                }
            }
            if max_score < confidence {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let bw = output[[0, 2, i]];
            let bh = output[[0, 3, i]];
            // letterbox coords back to frame pixels
            let x1 = ((cx - bw / 2.0 - pad_x) / scale).clamp(0.0, frame_w);
            let y1 = ((cy - bh / 2.0 - pad_y) / scale).clamp(0.0, frame_h);
            let x2 = ((cx + bw / 2.0 - pad_x) / scale).clamp(0.0, frame_w);
            let y2 = ((cy + bh / 2.0 - pad_y) / scale).clamp(0.0, frame_h);
            candidates.push(Detection::new(x1, y1, x2, y2, max_score, max_class));
        }

        let before = candidates.len();
        let kept = non_max_suppression(candidates, self.nms_threshold);
        debug!("Detector: {} candidates, {} after NMS", before, kept.len());
        Ok(kept)
    }
}

impl ObjectDetector<Mat> for YoloDetector {
    fn detect(&mut self, frame: &Mat, confidence: f32) -> Result<Vec<Detection>> {
        self.detect_frame(frame, confidence)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Fit into `target×target` with grey padding. Returns the image, the scale
/// applied and the left/top padding.
fn letterbox(src: &Mat, target: i32) -> Result<(Mat, f64, i32, i32)> {
    let w = src.cols();
    let h = src.rows();
    let scale = target as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale) as i32).clamp(1, target);
    let new_h = ((h as f64 * scale) as i32).clamp(1, target);

    let mut resized = Mat::default();
    imgproc::resize(src, &mut resized, Size::new(new_w, new_h), 0.0, 0.0, imgproc::INTER_LINEAR)?;

    let pad_x = (target - new_w) / 2;
    let pad_y = (target - new_h) / 2;

    let mut padded = Mat::default();
    opencv::core::copy_make_border(
        &resized,
        &mut padded,
        pad_y,
        target - new_h - pad_y,
        pad_x,
        target - new_w - pad_x,
        opencv::core::BORDER_CONSTANT,
        Scalar::new(114.0, 114.0, 114.0, 0.0),
    )?;

    Ok((padded, scale, pad_x, pad_y))
}

/// HWC `u8` Mat to CHW `f32` in [0, 1].
fn mat_to_chw_f32(mat: &Mat, size: usize) -> Result<Vec<f32>> {
    let mut out = vec![0f32; 3 * size * size];
    let data = mat.data_bytes()?;

    for h in 0..size {
        for w in 0..size {
            let pixel_idx = (h * size + w) * 3;
            for c in 0..3usize {
                out[c * size * size + h * size + w] = data[pixel_idx + c] as f32 / 255.0;
            }
        }
    }
    Ok(out)
}

use std::cmp::Ordering;

use anyhow::{bail, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::{Array4, ArrayViewD, Axis, Ix2};

pub const DEFAULT_INPUT_SIZE: u32 = 640;
const PAD_VALUE: f32 = 114.0 / 255.0;
const MAX_DETECTIONS: usize = 300;

/// Axis-aligned box in pixel coordinates, corners inclusive of `x1,y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    /// `class_id x_center y_center width height confidence`
    pub fn label_line(&self) -> String {
        let w = self.bbox.x2 - self.bbox.x1;
        let h = self.bbox.y2 - self.bbox.y1;
        let x_center = self.bbox.x1 + w / 2.0;
        let y_center = self.bbox.y1 + h / 2.0;
        format!(
            "{} {:?} {:?} {:?} {:?} {:?}",
            self.class_id, x_center, y_center, w, h, self.confidence
        )
    }
}

/// Placement of a source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
        let scaled_width = ((width as f32 * gain).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * gain).round() as u32).clamp(1, size);
        Self {
            gain,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Maps a point of the model input back onto the source image.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.gain, (y - self.pad_y as f32) / self.gain)
    }
}

/// Resizes `image` into a `size`x`size` canvas padded with gray, as NCHW RGB in `[0, 1]`.
pub fn letterbox(image: &DynamicImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let placement = Letterbox::fit(width, height, size);
    let resized = image
        .resize_exact(
            placement.scaled_width,
            placement.scaled_height,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let side = size as usize;
    let mut array = Array4::from_elem((1, 3, side, side), PAD_VALUE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let row = (y + placement.pad_y) as usize;
        let col = (x + placement.pad_x) as usize;
        array[[0, 0, row, col]] = pixel[0] as f32 / 255.0;
        array[[0, 1, row, col]] = pixel[1] as f32 / 255.0;
        array[[0, 2, row, col]] = pixel[2] as f32 / 255.0;
    }

    (array, placement)
}

/// Decodes a `[1, 4 + classes, anchors]` prediction tensor into detections in
/// source coordinates, keeping anchors whose best class score beats `conf_thres`.
pub fn decode_output(
    output: ArrayViewD<f32>,
    placement: &Letterbox,
    width: u32,
    height: u32,
    conf_thres: f32,
) -> Result<Vec<Detection>> {
    if output.ndim() != 3 || output.shape()[0] != 1 || output.shape()[1] <= 4 {
        bail!("unexpected model output shape {:?}", output.shape());
    }
    let predictions = output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;
    let (channels, anchors) = predictions.dim();
    let (max_x, max_y) = (width as f32, height as f32);

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..channels)
            .map(|c| (c - 4, predictions[[c, anchor]]))
            .fold((0, f32::MIN), |best, candidate| if candidate.1 > best.1 { candidate } else { best });
        if confidence <= conf_thres {
            continue;
        }

        let cx = predictions[[0, anchor]];
        let cy = predictions[[1, anchor]];
        let w = predictions[[2, anchor]];
        let h = predictions[[3, anchor]];
        let (x1, y1) = placement.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = placement.unmap(cx + w / 2.0, cy + h / 2.0);

        detections.push(Detection {
            class_id,
            confidence,
            bbox: BoundingBox {
                x1: x1.clamp(0.0, max_x),
                y1: y1.clamp(0.0, max_y),
                x2: x2.clamp(0.0, max_x),
                y2: y2.clamp(0.0, max_y),
            },
        });
    }

    Ok(detections)
}

/// Class-aware non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_thres: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_thres);
        if !suppressed {
            kept.push(candidate);
            if kept.len() == MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

pub fn postprocess(
    output: ArrayViewD<f32>,
    placement: &Letterbox,
    width: u32,
    height: u32,
    conf_thres: f32,
    iou_thres: f32,
) -> Result<Vec<Detection>> {
    let candidates = decode_output(output, placement, width, height, conf_thres)?;
    Ok(non_max_suppression(candidates, iou_thres))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::Array3;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn test_label_line_uses_center_and_size() {
        let detection = Detection {
            class_id: 2,
            confidence: 0.5,
            bbox: bbox(10.0, 20.0, 30.0, 60.0),
        };
        assert_eq!(detection.label_line(), "2 20.0 40.0 20.0 40.0 0.5");
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&bbox(20.0, 20.0, 30.0, 30.0)), 0.0);
        let half = a.iou(&bbox(5.0, 0.0, 15.0, 10.0));
        assert!((half - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_fit_landscape() {
        let placement = Letterbox::fit(1280, 720, 640);
        assert_eq!(placement.gain, 0.5);
        assert_eq!((placement.scaled_width, placement.scaled_height), (640, 360));
        assert_eq!((placement.pad_x, placement.pad_y), (0, 140));
        assert_eq!(placement.unmap(320.0, 320.0), (640.0, 360.0));
    }

    #[test]
    fn test_letterbox_tensor_layout() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 0, 0])));
        let (array, placement) = letterbox(&image, 80);
        assert_eq!(array.shape(), &[1, 3, 80, 80]);
        assert_eq!((placement.pad_x, placement.pad_y), (0, 20));

        // padding rows
        assert_eq!(array[[0, 0, 0, 0]], PAD_VALUE);
        assert_eq!(array[[0, 2, 79, 79]], PAD_VALUE);
        // image rows
        assert_eq!(array[[0, 0, 40, 40]], 1.0);
        assert_eq!(array[[0, 1, 40, 40]], 0.0);
    }

    #[test]
    fn test_decode_output_maps_back_to_source() -> Result<()> {
        // 2 classes, 3 anchors, on a 1280x720 source letterboxed to 640.
        let placement = Letterbox::fit(1280, 720, 640);
        let mut raw = Array3::<f32>::zeros((1, 6, 3));
        // anchor 0: class 1 at 0.9, centered box 100x50 around (320, 320)
        for (c, v) in [320.0, 320.0, 100.0, 50.0, 0.1, 0.9].into_iter().enumerate() {
            raw[[0, c, 0]] = v;
        }
        // anchor 1: below threshold
        for (c, v) in [100.0, 200.0, 10.0, 10.0, 0.2, 0.1].into_iter().enumerate() {
            raw[[0, c, 1]] = v;
        }
        // anchor 2: spills over the left edge, gets clipped
        for (c, v) in [5.0, 200.0, 20.0, 20.0, 0.6, 0.0].into_iter().enumerate() {
            raw[[0, c, 2]] = v;
        }

        let detections = decode_output(raw.view().into_dyn(), &placement, 1280, 720, 0.25)?;
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].bbox, bbox(540.0, 310.0, 740.0, 410.0));

        assert_eq!(detections[1].class_id, 0);
        assert_eq!(detections[1].bbox.x1, 0.0);
        assert_eq!(detections[1].bbox.x2, 30.0);
        Ok(())
    }

    #[test]
    fn test_decode_output_rejects_bad_shape() {
        let raw = Array3::<f32>::zeros((1, 4, 10));
        let placement = Letterbox::fit(640, 640, 640);
        assert!(decode_output(raw.view().into_dyn(), &placement, 640, 640, 0.25).is_err());
    }

    #[test]
    fn test_nms_is_class_aware() {
        let detections = vec![
            Detection { class_id: 0, confidence: 0.6, bbox: bbox(1.0, 1.0, 11.0, 11.0) },
            Detection { class_id: 0, confidence: 0.9, bbox: bbox(0.0, 0.0, 10.0, 10.0) },
            Detection { class_id: 1, confidence: 0.7, bbox: bbox(0.0, 0.0, 10.0, 10.0) },
            Detection { class_id: 0, confidence: 0.5, bbox: bbox(50.0, 50.0, 60.0, 60.0) },
        ];
        let kept = non_max_suppression(detections, 0.45);
        let summary: Vec<(usize, f32)> = kept.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(summary, vec![(0, 0.9), (1, 0.7), (0, 0.5)]);
    }
}

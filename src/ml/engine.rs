use std::path::Path;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::ValueType;
use tracing::{debug, info};

use super::labels::{coco_names, parse_names_metadata};
use super::pipeline::{self, Detection, DEFAULT_INPUT_SIZE};
use crate::utils::config::Device;

/// A YOLO-style detection model loaded into ONNX Runtime.
pub struct DetectionEngine {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    class_names: Vec<String>,
}

impl DetectionEngine {
    pub fn new(weights: &Path, device: Device) -> Result<Self> {
        // Only the first call configures the global environment.
        let _ = ort::init()
            .with_name("davis-kit-detect")
            .commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(execution_providers(device))?
            .commit_from_file(weights)
            .with_context(|| format!("Failed to load model weights {:?}", weights))?;

        let input = session.inputs.first().context("Model has no inputs")?;
        let input_name = input.name.clone();
        let input_size = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => square_input_size(dimensions)
                .with_context(|| format!("Unsupported model input in {:?}", weights))?,
            _ => DEFAULT_INPUT_SIZE,
        };
        let output_name = session.outputs.first().context("Model has no outputs")?.name.clone();

        let class_names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .and_then(|raw| parse_names_metadata(&raw))
            .unwrap_or_else(|| {
                debug!("Model carries no class names, using COCO");
                coco_names()
            });

        info!(
            "Loaded {:?} on {:?}: input '{}' {}x{}, {} classes",
            weights,
            device,
            input_name,
            input_size,
            input_size,
            class_names.len()
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn detect(&self, image: &DynamicImage, conf_thres: f32, iou_thres: f32) -> Result<Vec<Detection>> {
        let (input, placement) = pipeline::letterbox(image, self.input_size);
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        pipeline::postprocess(output, &placement, image.width(), image.height(), conf_thres, iou_thres)
    }
}

/// Side of the model's NCHW input. Dynamic axes take the fixed one, or the
/// default when both are dynamic.
fn square_input_size(dimensions: &[i64]) -> Result<u32> {
    let fixed = |axis: usize| dimensions.get(axis).copied().filter(|d| *d > 0);
    match (fixed(2), fixed(3)) {
        (Some(height), Some(width)) if height != width => {
            bail!("input is {}x{}, only square inputs are supported", width, height)
        }
        (Some(side), _) | (_, Some(side)) => Ok(side as u32),
        (None, None) => Ok(DEFAULT_INPUT_SIZE),
    }
}

fn execution_providers(device: Device) -> Vec<ExecutionProviderDispatch> {
    match device {
        // Silently falls back to CPU when CUDA is unavailable.
        Device::Auto => vec![CUDAExecutionProvider::default().build()],
        Device::Cpu => Vec::new(),
        Device::Cuda(id) => vec![CUDAExecutionProvider::default()
            .with_device_id(id)
            .build()
            .error_on_failure()],
        Device::CoreMl => vec![CoreMLExecutionProvider::default().build().error_on_failure()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_providers_per_device() {
        assert!(execution_providers(Device::Cpu).is_empty());
        assert_eq!(execution_providers(Device::Auto).len(), 1);
        assert_eq!(execution_providers(Device::Cuda(1)).len(), 1);
        assert_eq!(execution_providers(Device::CoreMl).len(), 1);
    }

    #[test]
    fn test_square_input_size() -> Result<()> {
        assert_eq!(square_input_size(&[1, 3, 640, 640])?, 640);
        assert_eq!(square_input_size(&[1, 3, -1, 320])?, 320);
        assert_eq!(square_input_size(&[-1, 3, -1, -1])?, DEFAULT_INPUT_SIZE);
        assert_eq!(square_input_size(&[1, 3])?, DEFAULT_INPUT_SIZE);
        Ok(())
    }

    #[test]
    fn test_rectangular_input_is_rejected() {
        let err = square_input_size(&[1, 3, 384, 640]).unwrap_err();
        assert!(err.to_string().contains("640x384"));
    }
}

use std::sync::{Arc, Mutex};

use image::RgbImage;
use ndarray::ArrayView2;
use tch::{CModule, Device, Kind, Tensor};

use super::postprocess::{self, Letterbox};
use super::{Detection, DetectionError, Detector};
use crate::config::DetectorConfig;

#[derive(Debug, Clone, Copy)]
pub struct YoloParams {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&DetectorConfig> for YoloParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// TorchScript export of a YOLO detection head.
///
/// The module is not safe to run concurrently, so the forward pass holds the
/// lock; pre and post-processing run outside it.
#[derive(Clone)]
pub struct YoloDetector {
    model: Arc<Mutex<CModule>>,
    device: Device,
    params: YoloParams,
}

impl YoloDetector {
    pub fn load(model_path: &str, params: YoloParams) -> Result<Self, DetectionError> {
        let device = Device::cuda_if_available();
        let mut model = CModule::load_on_device(model_path, device).map_err(|e| {
            DetectionError::ModelLoad {
                path: model_path.to_string(),
                reason: e.to_string(),
            }
        })?;
        model.set_eval();
        log::info!("Loaded detector {} on {:?}", model_path, device);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
            params,
        })
    }

    fn forward(&self, input: Tensor) -> Result<(Vec<f32>, Vec<i64>), DetectionError> {
        let output = {
            let model = self.model.lock().map_err(|_| DetectionError::Poisoned)?;
            tch::no_grad(|| model.forward_ts(&[input]))
                .map_err(|e| DetectionError::Model(e.to_string()))?
        };

        let shape = output.size();
        let flat = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .view([-1]);
        let values: Vec<f32> = Vec::<f32>::try_from(&flat)
            .map_err(|e| DetectionError::Model(e.to_string()))?;
        Ok((values, shape))
    }

    fn postprocess(
        &self,
        values: &[f32],
        shape: &[i64],
        letterbox: &Letterbox,
    ) -> Result<Vec<Detection>, DetectionError> {
        let (rows, anchors) = match shape {
            [1, rows, anchors] if *rows > 4 => (*rows as usize, *anchors as usize),
            _ => return Err(DetectionError::OutputShape(shape.to_vec())),
        };
        let view = ArrayView2::from_shape((rows, anchors), values)
            .map_err(|_| DetectionError::OutputShape(shape.to_vec()))?;

        let candidates = postprocess::decode(view, self.params.confidence_threshold);
        let kept = postprocess::non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );

        Ok(kept
            .into_iter()
            .map(|det| Detection {
                bbox: letterbox.restore(det.bbox),
                ..det
            })
            .collect())
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectionError::Preprocessing("image has no pixels".into()));
        }

        let size = self.params.input_size as i64;
        let (data, letterbox) = postprocess::preprocess(image, self.params.input_size);
        let input = Tensor::from_slice(&data)
            .view([1, 3, size, size])
            .to_device(self.device);

        let (values, shape) = self.forward(input)?;
        let detections = self.postprocess(&values, &shape, &letterbox)?;
        log::debug!("Detector returned {} regions", detections.len());
        Ok(detections)
    }
}

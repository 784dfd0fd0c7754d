//! Hand landmark detection using ONNX Runtime
//!
//! Runs the MediaPipe hand landmark model (PINTO Model Zoo export) on the
//! whole frame. Expects `hand_landmark.onnx` in a `models` directory next to
//! the executable or in the working directory.

use std::path::PathBuf;

use image::RgbImage;
use ndarray::Array4;

use super::{HandLandmarkSet, Landmark, LandmarkProvider, LANDMARK_COUNT};
use crate::error::LandmarkError;

const MODEL_FILE: &str = "hand_landmark.onnx";
const INPUT_SIZE: u32 = 224;
const PRESENCE_THRESHOLD: f32 = 0.5;

/// ONNX Runtime backed landmark provider
pub struct OnnxHandLandmarker {
    session: ort::session::Session,
    max_hands: usize,
}

impl OnnxHandLandmarker {
    /// Load the landmark model. Fails when the model asset is missing.
    pub fn new(max_hands: usize) -> Result<Self, LandmarkError> {
        let model_dir = Self::find_model_dir()?;
        tracing::info!("Model directory: {:?}", model_dir);

        let model_path = model_dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path));
        }

        ort::init()
            .with_name("GestureControl")
            .commit()
            .map_err(|e| LandmarkError::Init(format!("Failed to initialize ORT: {}", e)))?;

        let session = ort::session::Session::builder()
            .map_err(|e| LandmarkError::Init(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(2)
            .map_err(|e| LandmarkError::Init(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| LandmarkError::Init(format!("Failed to load landmark model: {}", e)))?;

        tracing::info!("Loaded hand landmark model from {:?}", model_path);

        Ok(Self {
            session,
            max_hands: max_hands.max(1),
        })
    }

    /// Find the models directory
    fn find_model_dir() -> Result<PathBuf, LandmarkError> {
        if let Ok(exe_path) = std::env::current_exe() {
            // Next to the binary, then ../.. for target/{debug,release}
            let candidates = exe_path.ancestors().skip(1).take(3);
            for dir in candidates {
                let model_dir = dir.join("models");
                if model_dir.exists() {
                    return Ok(model_dir);
                }
            }
        }

        let cwd = std::env::current_dir().map_err(|e| LandmarkError::Init(e.to_string()))?;
        let model_dir = cwd.join("models");
        if model_dir.exists() {
            return Ok(model_dir);
        }

        Err(LandmarkError::ModelDirNotFound)
    }
}

impl LandmarkProvider for OnnxHandLandmarker {
    fn name(&self) -> &str {
        "onnx-hand-landmark"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarkSet>, LandmarkError> {
        let input = preprocess_nhwc(image, INPUT_SIZE, INPUT_SIZE);

        let input_array = Array4::from_shape_vec(
            (1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3),
            input,
        )
        .map_err(|e| LandmarkError::Detection(format!("Failed to create input array: {}", e)))?;

        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| LandmarkError::Detection(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| LandmarkError::Detection(format!("Inference failed: {}", e)))?;

        let mut iter = outputs.iter();
        let coords = iter
            .next()
            .ok_or_else(|| LandmarkError::Detection("No landmark output".to_string()))?;
        let (_shape, coords) = coords
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::Detection(format!("Failed to extract landmarks: {}", e)))?;

        // Second output is the hand presence score
        if let Some(presence) = iter.next() {
            let (_shape, score) = presence
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| LandmarkError::Detection(format!("Failed to extract presence: {}", e)))?;
            if score.first().copied().unwrap_or(0.0) < PRESENCE_THRESHOLD {
                return Ok(Vec::new());
            }
        }

        let mut hands = Vec::new();
        if let Some(hand) = decode_landmarks(coords, INPUT_SIZE as f32) {
            hands.push(hand);
        }
        hands.truncate(self.max_hands);
        Ok(hands)
    }
}

/// Resize to the model input and convert to NHWC float [0, 1]
fn preprocess_nhwc(image: &RgbImage, target_width: u32, target_height: u32) -> Vec<f32> {
    let mut output = vec![0.0f32; (target_width * target_height * 3) as usize];
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return output;
    }

    let x_ratio = width as f32 / target_width as f32;
    let y_ratio = height as f32 / target_height as f32;

    for y in 0..target_height {
        for x in 0..target_width {
            let src_x = ((x as f32 * x_ratio) as u32).min(width - 1);
            let src_y = ((y as f32 * y_ratio) as u32).min(height - 1);
            let pixel = image.get_pixel(src_x, src_y);

            let out_idx = ((y * target_width + x) * 3) as usize;
            output[out_idx] = pixel[0] as f32 / 255.0;
            output[out_idx + 1] = pixel[1] as f32 / 255.0;
            output[out_idx + 2] = pixel[2] as f32 / 255.0;
        }
    }

    output
}

/// Model output is 21 (x, y, z) triples in input pixels
fn decode_landmarks(coords: &[f32], input_size: f32) -> Option<HandLandmarkSet> {
    if coords.len() < LANDMARK_COUNT * 3 {
        return None;
    }

    let points: Vec<Landmark> = coords
        .chunks_exact(3)
        .take(LANDMARK_COUNT)
        .map(|xyz| {
            Landmark::new(
                (xyz[0] / input_size).clamp(0.0, 1.0),
                (xyz[1] / input_size).clamp(0.0, 1.0),
            )
        })
        .collect();

    HandLandmarkSet::from_slice(&points)
}

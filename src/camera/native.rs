//! Native capture devices via nokhwa

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::{CameraBackend, CameraDevice};
use crate::error::CameraError;

/// Opens cameras by index, letting nokhwa negotiate the platform API
pub struct NokhwaBackend;

impl NokhwaBackend {
    pub fn new() -> Self {
        Self
    }

    /// Human readable names of the cameras currently attached
    pub fn list_cameras() -> Vec<String> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras.iter().map(|info| info.human_name().to_string()).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }
}

impl Default for NokhwaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for NokhwaBackend {
    fn name(&self) -> &str {
        "nokhwa"
    }

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<Box<dyn CameraDevice>, CameraError> {
        let camera_index = CameraIndex::Index(index);

        // Closest to the requested size first, then whatever the device offers
        let attempts = [
            RequestedFormatType::HighestResolution(Resolution::new(width, height)),
            RequestedFormatType::AbsoluteHighestResolution,
            RequestedFormatType::None,
        ];

        let mut last_error = String::new();
        let mut opened = None;
        for attempt in attempts {
            let requested = RequestedFormat::new::<RgbFormat>(attempt);
            match Camera::new(camera_index.clone(), requested) {
                Ok(camera) => {
                    opened = Some(camera);
                    break;
                }
                Err(e) => {
                    tracing::debug!(device_index = index, "Camera format attempt failed: {:?}", e);
                    last_error = e.to_string();
                }
            }
        }

        let mut camera = opened.ok_or_else(|| CameraError::OpenFailed {
            index,
            reason: last_error,
        })?;

        camera.open_stream().map_err(|e| CameraError::OpenFailed {
            index,
            reason: format!("failed to open stream: {}", e),
        })?;

        tracing::info!(
            device_index = index,
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Box::new(NokhwaDevice {
            camera: Some(CameraWrapper(camera)),
        }))
    }
}

/// Wrapper for nokhwa::Camera that implements Send
/// Safety: the camera is opened, read and released by the pipeline worker thread only
struct CameraWrapper(Camera);

unsafe impl Send for CameraWrapper {}

struct NokhwaDevice {
    camera: Option<CameraWrapper>,
}

impl CameraDevice for NokhwaDevice {
    fn is_opened(&self) -> bool {
        self.camera
            .as_ref()
            .map(|c| c.0.is_stream_open())
            .unwrap_or(false)
    }

    fn read(&mut self) -> Result<RgbImage, CameraError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| CameraError::ReadFailed("camera released".to_string()))?;

        let buffer = camera
            .0
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(format!("decode: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::ReadFailed("frame buffer size mismatch".to_string()))
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.0.stop_stream() {
                tracing::warn!("Failed to stop camera stream: {:?}", e);
            }
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.release();
    }
}

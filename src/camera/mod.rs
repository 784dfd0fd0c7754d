//! Camera source
//!
//! Owns device acquisition and keeps the frame stream alive no matter what
//! the hardware does: a device that fails to open is replaced by a synthetic
//! test pattern, and a device that streams sustained black frames is dropped
//! in favour of the next index (cycling modulo the device count forever).

#[cfg(feature = "native-camera")]
mod native;
mod test_pattern;

#[cfg(feature = "native-camera")]
pub use native::NokhwaBackend;
pub use test_pattern::TestPattern;

use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::CameraError;

/// Camera source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index opened at startup
    #[serde(rename = "initialIndex")]
    pub initial_index: u32,
    /// Number of indices to cycle through (index wraps modulo this)
    #[serde(rename = "deviceCount")]
    pub device_count: u32,
    /// Frames ignored after each open while auto-exposure settles
    #[serde(rename = "settleFrames")]
    pub settle_frames: u32,
    /// Mean brightness below which a frame counts as black
    #[serde(rename = "blackThreshold")]
    pub black_threshold: f32,
    /// Consecutive black frames tolerated before switching device
    #[serde(rename = "blackFrameLimit")]
    pub black_frame_limit: u32,
    /// Mirror device frames horizontally (selfie view)
    #[serde(rename = "mirror")]
    pub mirror: bool,
    /// Requested capture / synthetic frame width
    #[serde(rename = "width")]
    pub width: u32,
    /// Requested capture / synthetic frame height
    #[serde(rename = "height")]
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            initial_index: 0,
            device_count: 4,
            settle_frames: 10,
            black_threshold: 2.0,
            black_frame_limit: 15,
            mirror: true,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Clamp values into usable ranges
    pub fn sanitize(&mut self) {
        self.device_count = self.device_count.max(1);
        self.initial_index %= self.device_count;
        self.black_threshold = self.black_threshold.clamp(0.0, 255.0);
        self.width = self.width.clamp(16, 4096);
        self.height = self.height.clamp(16, 4096);
    }
}

/// One captured or synthesized frame
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Mean over all channel bytes (0.0 - 255.0)
    pub mean_brightness: f32,
    /// Device index the frame was produced for
    pub device_index: u32,
    /// Whether this frame came from the test pattern
    pub synthetic: bool,
    /// Frame number since the source was created
    pub frame_number: u64,
    /// Capture timestamp
    pub timestamp: Instant,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Mean brightness over every channel byte of an image
pub fn mean_brightness(image: &RgbImage) -> f32 {
    let raw = image.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    let sum: u64 = raw.iter().map(|&v| v as u64).sum();
    sum as f32 / raw.len() as f32
}

/// Lifecycle of the camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraState {
    /// Device will be (re)opened on the next read
    Opening,
    /// Frames come from the device
    Streaming,
    /// Frames are synthesized
    TestPattern,
    /// Device judged failed; the next read switches index
    Recovering,
}

/// Mutable session bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSession {
    pub index: u32,
    pub state: CameraState,
    pub black_frames: u32,
    pub manual_test_pattern: bool,
}

/// Diagnostics snapshot published to consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub device_index: u32,
    pub state: CameraState,
    pub brightness: f32,
}

impl CameraStatus {
    pub fn is_test_pattern(&self) -> bool {
        self.state == CameraState::TestPattern
    }

    /// Index and state; brightness changes every frame and is not a status change
    pub fn same_mode(&self, other: &CameraStatus) -> bool {
        self.device_index == other.device_index && self.state == other.state
    }
}

/// An opened capture device
pub trait CameraDevice: Send {
    fn is_opened(&self) -> bool;

    /// Read one frame (blocking for at most one device frame period)
    fn read(&mut self) -> Result<RgbImage, CameraError>;

    /// Release the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// Opens capture devices by integer index
pub trait CameraBackend: Send {
    fn name(&self) -> &str;

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// Backend used when no capture support is compiled in; every open fails
pub struct UnavailableBackend;

impl CameraBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn open(&mut self, index: u32, _width: u32, _height: u32) -> Result<Box<dyn CameraDevice>, CameraError> {
        Err(CameraError::OpenFailed {
            index,
            reason: "built without the `native-camera` feature".to_string(),
        })
    }
}

/// Capture backend compiled into this build
pub fn create_default_backend() -> Box<dyn CameraBackend> {
    #[cfg(feature = "native-camera")]
    {
        Box::new(NokhwaBackend::new())
    }

    #[cfg(not(feature = "native-camera"))]
    {
        Box::new(UnavailableBackend)
    }
}

/// Owned device that is released when dropped
struct DeviceHandle {
    index: u32,
    device: Box<dyn CameraDevice>,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.device.release();
        tracing::debug!(device_index = self.index, "Camera released");
    }
}

/// Camera source state machine
pub struct CameraSource {
    backend: Box<dyn CameraBackend>,
    config: CameraConfig,
    session: CameraSession,
    device: Option<DeviceHandle>,
    pattern: TestPattern,
    /// Reads (successful or not) since the current device was opened
    frames_since_open: u64,
    frame_number: u64,
    device_switches: u64,
    last_brightness: f32,
}

impl CameraSource {
    pub fn new(backend: Box<dyn CameraBackend>, mut config: CameraConfig) -> Self {
        config.sanitize();
        let pattern = TestPattern::new(config.width, config.height);
        let session = CameraSession {
            index: config.initial_index,
            state: CameraState::Opening,
            black_frames: 0,
            manual_test_pattern: false,
        };

        Self {
            backend,
            config,
            session,
            device: None,
            pattern,
            frames_since_open: 0,
            frame_number: 0,
            device_switches: 0,
            last_brightness: 0.0,
        }
    }

    /// Open the given device index, falling back to the test pattern on failure
    pub fn open(&mut self, index: u32) {
        self.release();
        self.session.index = index % self.config.device_count;
        self.session.black_frames = 0;
        self.frames_since_open = 0;

        if self.session.manual_test_pattern {
            self.session.state = CameraState::TestPattern;
            return;
        }

        let index = self.session.index;
        tracing::info!(
            device_index = index,
            backend = self.backend.name(),
            "Attempting to open camera"
        );

        match self.backend.open(index, self.config.width, self.config.height) {
            Ok(device) if device.is_opened() => {
                tracing::info!(device_index = index, "Camera opened successfully");
                self.device = Some(DeviceHandle { index, device });
                self.session.state = CameraState::Streaming;
            }
            Ok(mut device) => {
                device.release();
                tracing::warn!(device_index = index, "Camera reported not opened, switching to test pattern");
                self.session.state = CameraState::TestPattern;
            }
            Err(e) => {
                tracing::warn!(device_index = index, "Could not open camera: {}. Switching to test pattern", e);
                self.session.state = CameraState::TestPattern;
            }
        }
    }

    /// Produce the next frame.
    ///
    /// Only a transient device read failure returns an error; every other
    /// condition yields a frame (real or synthetic).
    pub fn read(&mut self) -> Result<Frame, CameraError> {
        if self.session.state == CameraState::Recovering {
            self.cycle_index();
        }
        if self.session.state == CameraState::Opening {
            self.open(self.session.index);
        }

        match self.session.state {
            CameraState::Streaming => self.read_device(),
            _ => Ok(self.synthesize()),
        }
    }

    /// Advance to the next device index and reopen on the next read
    pub fn cycle_index(&mut self) {
        let previous = self.session.index;
        self.release();
        self.session.index = (self.session.index + 1) % self.config.device_count;
        self.session.black_frames = 0;
        self.session.state = CameraState::Opening;
        self.device_switches += 1;
        tracing::info!(from = previous, to = self.session.index, "Cycling camera index");
    }

    /// Force (or stop forcing) synthetic frames
    pub fn set_test_pattern_override(&mut self, enabled: bool) {
        if self.session.manual_test_pattern == enabled {
            return;
        }
        self.session.manual_test_pattern = enabled;
        self.release();
        self.session.black_frames = 0;
        self.session.state = if enabled {
            CameraState::TestPattern
        } else {
            CameraState::Opening
        };
        tracing::info!(enabled, "Manual test pattern override changed");
    }

    /// Release the device; the next read reopens it
    pub fn close(&mut self) {
        self.release();
        if !self.session.manual_test_pattern {
            self.session.state = CameraState::Opening;
        }
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn status(&self) -> CameraStatus {
        CameraStatus {
            device_index: self.session.index,
            state: self.session.state,
            brightness: self.last_brightness,
        }
    }

    /// Number of index switches (manual or automatic) so far
    pub fn device_switches(&self) -> u64 {
        self.device_switches
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    fn release(&mut self) {
        // DeviceHandle releases on drop
        self.device = None;
    }

    fn synthesize(&mut self) -> Frame {
        let image = self.pattern.next_image();
        let frame = self.make_frame(image, true);
        self.last_brightness = frame.mean_brightness;
        frame
    }

    fn read_device(&mut self) -> Result<Frame, CameraError> {
        let Some(handle) = self.device.as_mut() else {
            self.session.state = CameraState::Opening;
            return Err(CameraError::NotOpened(self.session.index));
        };

        let read_index = self.frames_since_open;
        self.frames_since_open += 1;

        let mut image = handle.device.read()?;
        if self.config.mirror {
            image::imageops::flip_horizontal_in_place(&mut image);
        }

        let frame = self.make_frame(image, false);
        self.last_brightness = frame.mean_brightness;

        if read_index >= self.config.settle_frames as u64 {
            self.track_black_frames(frame.mean_brightness);
        }

        Ok(frame)
    }

    fn track_black_frames(&mut self, brightness: f32) {
        if brightness >= self.config.black_threshold {
            self.session.black_frames = 0;
            return;
        }

        self.session.black_frames += 1;
        if self.session.black_frames > self.config.black_frame_limit {
            tracing::warn!(
                device_index = self.session.index,
                brightness,
                "Camera is black, auto-switching"
            );
            self.session.black_frames = 0;
            self.release();
            self.session.state = CameraState::Recovering;
        }
    }

    fn make_frame(&mut self, image: RgbImage, synthetic: bool) -> Frame {
        let frame_number = self.frame_number;
        self.frame_number += 1;
        Frame {
            mean_brightness: mean_brightness(&image),
            image,
            device_index: self.session.index,
            synthetic,
            frame_number,
            timestamp: Instant::now(),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn small_config() -> CameraConfig {
        CameraConfig {
            width: 32,
            height: 24,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn test_mean_brightness() {
        let black = RgbImage::new(4, 4);
        assert_eq!(mean_brightness(&black), 0.0);

        let grey = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        assert!((mean_brightness(&grey) - 20.0).abs() < 1e-6);

        assert_eq!(mean_brightness(&RgbImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_unopenable_device_yields_synthetic_frames() {
        let mut source = CameraSource::new(Box::new(ClosedBackend), small_config());

        for expected in 0..200u64 {
            let frame = source.read().unwrap();
            assert!(frame.synthetic);
            assert_eq!(frame.frame_number, expected);
            assert_eq!(frame.width(), 32);
        }
        assert_eq!(source.session().state, CameraState::TestPattern);
        assert_eq!(source.device_switches(), 0);
    }

    #[test]
    fn test_unavailable_backend_falls_back() {
        let mut source = CameraSource::new(Box::new(UnavailableBackend), small_config());
        let frame = source.read().unwrap();
        assert!(frame.synthetic);
        assert!(source.status().is_test_pattern());
    }

    #[test]
    fn test_sustained_black_switches_exactly_once() {
        let (backend, counters) = SolidBackend::new(0);
        let mut source = CameraSource::new(Box::new(backend), small_config());

        // Settle window: 10 ignored frames
        for _ in 0..10 {
            source.read().unwrap();
        }
        assert_eq!(source.session().black_frames, 0);

        // 15 black frames are tolerated
        for _ in 0..15 {
            source.read().unwrap();
        }
        assert_eq!(source.session().state, CameraState::Streaming);
        assert_eq!(source.session().black_frames, 15);

        // The 16th triggers recovery
        source.read().unwrap();
        assert_eq!(source.session().state, CameraState::Recovering);
        assert_eq!(source.session().black_frames, 0);
        assert!(!source.has_device());
        assert_eq!(counters.releases(), 1);

        // Next read switches to index 1 and reopens; the new settle window
        // keeps the switch count at one for a while
        for _ in 0..20 {
            let frame = source.read().unwrap();
            assert_eq!(frame.device_index, 1);
        }
        assert_eq!(source.device_switches(), 1);
        assert_eq!(source.session().index, 1);
        assert_eq!(counters.opens(), 2);
    }

    #[test]
    fn test_all_black_devices_cycle_forever() {
        let (backend, _counters) = SolidBackend::new(0);
        let mut source = CameraSource::new(Box::new(backend), small_config());

        // 10 settle + 16 black frames per device, then one switching read
        for _ in 0..(4 * 26) {
            source.read().unwrap();
        }
        assert_eq!(source.device_switches(), 3);
        source.read().unwrap();
        for _ in 0..25 {
            source.read().unwrap();
        }
        assert_eq!(source.device_switches(), 4);
        assert_eq!(source.session().index, 0);
    }

    #[test]
    fn test_bright_frame_resets_black_counter() {
        let (backend, _counters) = SolidBackend::new(100);
        let mut source = CameraSource::new(Box::new(backend), small_config());
        for _ in 0..100 {
            let frame = source.read().unwrap();
            assert!(!frame.synthetic);
        }
        assert_eq!(source.session().black_frames, 0);
        assert_eq!(source.device_switches(), 0);
        assert!((source.status().brightness - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_cycle_index_wraps_and_resets() {
        let (backend, counters) = SolidBackend::new(100);
        let mut source = CameraSource::new(Box::new(backend), small_config());
        source.read().unwrap();
        assert!(source.has_device());

        for expected in [1, 2, 3, 0] {
            source.cycle_index();
            assert_eq!(source.session().index, expected);
            assert_eq!(source.session().state, CameraState::Opening);
            assert_eq!(source.session().black_frames, 0);
            assert!(!source.has_device());
        }
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    fn test_override_releases_and_restores() {
        let (backend, counters) = SolidBackend::new(100);
        let mut source = CameraSource::new(Box::new(backend), small_config());
        assert!(!source.read().unwrap().synthetic);

        source.set_test_pattern_override(true);
        assert_eq!(counters.releases(), 1);
        assert!(source.read().unwrap().synthetic);
        assert_eq!(source.session().state, CameraState::TestPattern);

        // Cycling while overridden stays synthetic
        source.cycle_index();
        assert!(source.read().unwrap().synthetic);

        source.set_test_pattern_override(false);
        assert!(!source.read().unwrap().synthetic);
        assert_eq!(source.session().state, CameraState::Streaming);
        assert_eq!(counters.opens(), 2);
    }

    #[test]
    fn test_drop_releases_device() {
        let (backend, counters) = SolidBackend::new(100);
        {
            let mut source = CameraSource::new(Box::new(backend), small_config());
            source.read().unwrap();
            assert_eq!(counters.releases(), 0);
        }
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    fn test_close_then_read_reopens() {
        let (backend, counters) = SolidBackend::new(100);
        let mut source = CameraSource::new(Box::new(backend), small_config());
        source.read().unwrap();
        source.close();
        assert!(!source.has_device());
        assert_eq!(counters.releases(), 1);
        source.read().unwrap();
        assert_eq!(counters.opens(), 2);
    }
}

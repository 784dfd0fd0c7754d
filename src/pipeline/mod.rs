//! Gesture pipeline worker
//!
//! Camera source, landmark provider and classifier run together on one named
//! thread. The worker paces itself by waiting on its command channel between
//! frames, so commands are handled without waiting for a full frame interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::camera::{CameraBackend, CameraSource, CameraStatus, Frame};
use crate::context::AppContext;
use crate::control::SharedControl;
use crate::error::{LandmarkError, PipelineError};
use crate::fanout::{route_gesture, EventBus, OutboundEvent, PipelineCommand};
use crate::gesture::{GestureClassifier, GestureEvent};
use crate::landmarks::LandmarkProvider;
use crate::telemetry::{FailureCounter, RateLimitedLog};

/// Worker pacing and queue sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause between frames (default 50 ms, about 20 Hz)
    #[serde(rename = "frameIntervalMs")]
    pub frame_interval_ms: u64,
    /// Back-off after a failed device read
    #[serde(rename = "readRetryMs")]
    pub read_retry_ms: u64,
    #[serde(rename = "commandCapacity")]
    pub command_capacity: usize,
    /// Per-subscriber outbound queue size
    #[serde(rename = "eventCapacity")]
    pub event_capacity: usize,
    /// Hands requested from the landmark provider; only the first is classified
    #[serde(rename = "maxHands")]
    pub max_hands: usize,
    /// Minimum spacing of detection failure warnings
    #[serde(rename = "detectionLogIntervalMs")]
    pub detection_log_interval_ms: u64,
    /// Log every n-th consecutive read failure
    #[serde(rename = "readFailureLogEvery")]
    pub read_failure_log_every: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            read_retry_ms: 100,
            command_capacity: 64,
            event_capacity: 256,
            max_hands: 1,
            detection_log_interval_ms: 5000,
            read_failure_log_every: 100,
        }
    }
}

impl PipelineConfig {
    pub fn sanitize(&mut self) {
        self.frame_interval_ms = self.frame_interval_ms.clamp(1, 1000);
        self.read_retry_ms = self.read_retry_ms.clamp(1, 10_000);
        self.command_capacity = self.command_capacity.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self.max_hands = self.max_hands.max(1);
        self.read_failure_log_every = self.read_failure_log_every.max(1);
    }
}

/// State the worker publishes for readers on other threads
#[derive(Default)]
struct SharedState {
    running: AtomicBool,
    landmarks_enabled: AtomicBool,
    frames_processed: AtomicU64,
    latest_frame: Mutex<Option<Frame>>,
    current_gesture: Mutex<Option<GestureEvent>>,
    camera_status: Mutex<Option<CameraStatus>>,
}

/// Handle to the running pipeline; dropping it stops and joins the worker
pub struct GesturePipeline {
    shared: Arc<SharedState>,
    commands: Sender<PipelineCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl GesturePipeline {
    /// Start the worker.
    ///
    /// A failed landmark provider is not an error: the pipeline runs in
    /// camera-only mode (frames and camera status, no gestures).
    pub fn spawn(
        ctx: &AppContext,
        backend: Box<dyn CameraBackend>,
        provider: Result<Box<dyn LandmarkProvider>, LandmarkError>,
    ) -> Result<Self, PipelineError> {
        let mut config = ctx.settings.pipeline.clone();
        config.sanitize();

        let provider = match provider {
            Ok(provider) => {
                tracing::info!(provider = provider.name(), "Landmark provider ready");
                Some(provider)
            }
            Err(e) => {
                tracing::warn!("Failed to initialize landmark provider: {}. Running camera only", e);
                None
            }
        };

        let shared = Arc::new(SharedState::default());
        shared.running.store(true, Ordering::Release);
        shared.landmarks_enabled.store(provider.is_some(), Ordering::Release);

        let (commands, command_receiver) = crossbeam_channel::bounded(config.command_capacity);

        let worker = Worker {
            camera: CameraSource::new(backend, ctx.settings.camera.clone()),
            classifier: GestureClassifier::new(ctx.settings.gesture.clone()),
            provider,
            control: ctx.control.clone(),
            bus: ctx.bus.clone(),
            shared: shared.clone(),
            detection_log: RateLimitedLog::new(Duration::from_millis(config.detection_log_interval_ms)),
            read_failures: FailureCounter::new(config.read_failure_log_every),
            published_status: None,
            config,
        };

        let thread_handle = std::thread::Builder::new()
            .name("gesture-pipeline".to_string())
            .spawn(move || worker.run(command_receiver));

        let thread_handle = match thread_handle {
            Ok(handle) => handle,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                return Err(PipelineError::SpawnFailed(e));
            }
        };

        Ok(Self {
            shared,
            commands,
            thread_handle: Some(thread_handle),
        })
    }

    /// Queue a command without blocking, even while the worker is stuck opening a device
    pub fn send(&self, command: PipelineCommand) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::CommandQueueFull,
            TrySendError::Disconnected(_) => PipelineError::NotRunning,
        })
    }

    /// Sender for front ends that feed commands from their own thread
    pub fn command_sender(&self) -> Sender<PipelineCommand> {
        self.commands.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// False in camera-only mode
    pub fn landmarks_enabled(&self) -> bool {
        self.shared.landmarks_enabled.load(Ordering::Acquire)
    }

    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Acquire)
    }

    /// Most recent frame, for preview consumers
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.latest_frame.lock().clone()
    }

    /// Last gesture recognised or simulated
    pub fn current_gesture(&self) -> Option<GestureEvent> {
        *self.shared.current_gesture.lock()
    }

    pub fn camera_status(&self) -> Option<CameraStatus> {
        *self.shared.camera_status.lock()
    }

    /// Stop the worker and wait for it; the camera is released before this returns
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Gesture pipeline worker panicked");
            }
        }
    }
}

impl Drop for GesturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Step {
    Frame,
    ReadFailed,
}

struct Worker {
    camera: CameraSource,
    provider: Option<Box<dyn LandmarkProvider>>,
    classifier: GestureClassifier,
    control: SharedControl,
    bus: Arc<EventBus>,
    shared: Arc<SharedState>,
    config: PipelineConfig,
    detection_log: RateLimitedLog,
    read_failures: FailureCounter,
    published_status: Option<CameraStatus>,
}

impl Worker {
    fn run(mut self, commands: Receiver<PipelineCommand>) {
        tracing::info!(
            landmarks = self.provider.is_some(),
            interval_ms = self.config.frame_interval_ms,
            "Gesture pipeline started"
        );

        while self.shared.running.load(Ordering::Acquire) {
            let wait = match self.step() {
                Step::Frame => Duration::from_millis(self.config.frame_interval_ms),
                Step::ReadFailed => Duration::from_millis(self.config.read_retry_ms),
            };

            match commands.recv_timeout(wait) {
                Ok(command) => {
                    self.handle_command(command);
                    while let Ok(command) = commands.try_recv() {
                        self.handle_command(command);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.camera.close();
        self.shared.running.store(false, Ordering::Release);
        tracing::info!(
            frames = self.shared.frames_processed.load(Ordering::Acquire),
            "Gesture pipeline stopped"
        );
    }

    fn step(&mut self) -> Step {
        let outcome = match self.camera.read() {
            Ok(frame) => {
                self.read_failures.reset();
                self.process_frame(frame);
                Step::Frame
            }
            Err(e) => {
                if let Some(failures) = self.read_failures.record() {
                    tracing::warn!(
                        device_index = self.camera.session().index,
                        failures,
                        "Failed to read frame: {}",
                        e
                    );
                }
                Step::ReadFailed
            }
        };

        self.publish_camera_status();
        outcome
    }

    fn process_frame(&mut self, frame: Frame) {
        if let Some(provider) = self.provider.as_mut() {
            let hand = match provider.detect(&frame.image) {
                Ok(hands) => hands.into_iter().next(),
                Err(e) => {
                    if let Some(suppressed) = self.detection_log.admit(Instant::now()) {
                        tracing::warn!(suppressed, "Landmark detection failed: {}", e);
                    }
                    None
                }
            };

            let output = self.classifier.classify(hand.as_ref(), frame.timestamp);
            if let Some(cursor) = output.cursor {
                self.bus.publish(OutboundEvent::CursorMoved {
                    x: cursor.x,
                    y: cursor.y,
                });
            }
            for gesture in output.events {
                self.dispatch_gesture(gesture);
            }
        }

        *self.shared.latest_frame.lock() = Some(frame);
        self.shared.frames_processed.fetch_add(1, Ordering::AcqRel);
    }

    fn dispatch_gesture(&mut self, gesture: GestureEvent) {
        *self.shared.current_gesture.lock() = Some(gesture);
        route_gesture(&self.control, &self.bus, gesture);
    }

    fn handle_command(&mut self, command: PipelineCommand) {
        tracing::debug!(?command, "Pipeline command");

        match command {
            PipelineCommand::CycleCamera => self.camera.cycle_index(),
            PipelineCommand::SetTestPattern(enabled) => self.camera.set_test_pattern_override(enabled),
            PipelineCommand::ToggleTestPattern => {
                let enabled = !self.camera.session().manual_test_pattern;
                self.camera.set_test_pattern_override(enabled);
            }
            PipelineCommand::SetActiveControl(control) => {
                if let Some(change) = self.control.set_active_control(control) {
                    self.bus.publish(OutboundEvent::ControlChanged {
                        change,
                        state: self.control.snapshot(),
                    });
                }
            }
            PipelineCommand::SimulateGesture(gesture) => self.dispatch_gesture(gesture),
        }

        self.publish_camera_status();
    }

    /// Keep the shared status current; publish only when index or state changed
    fn publish_camera_status(&mut self) {
        let status = self.camera.status();
        *self.shared.camera_status.lock() = Some(status);

        let changed = self
            .published_status
            .map(|previous| !previous.same_mode(&status))
            .unwrap_or(true);
        if changed {
            tracing::info!(
                device_index = status.device_index,
                state = ?status.state,
                brightness = status.brightness,
                "Camera status"
            );
            self.published_status = Some(status);
            self.bus.publish(OutboundEvent::CameraStatus(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_support::{ClosedBackend, SolidBackend};
    use crate::camera::CameraState;
    use crate::control::{ActiveControl, ControlChange};
    use crate::landmarks::test_support::{hand, CLOSED};
    use crate::landmarks::HandLandmarkSet;
    use image::RgbImage;

    /// Returns the same hands for every frame
    struct FixedProvider {
        hands: Vec<HandLandmarkSet>,
    }

    impl LandmarkProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<HandLandmarkSet>, LandmarkError> {
            Ok(self.hands.clone())
        }
    }

    struct FailingProvider;

    impl LandmarkProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<HandLandmarkSet>, LandmarkError> {
            Err(LandmarkError::Detection("scripted failure".to_string()))
        }
    }

    fn fast_context() -> AppContext {
        let mut ctx = AppContext::default();
        ctx.settings.pipeline.frame_interval_ms = 1;
        ctx.settings.pipeline.read_retry_ms = 1;
        ctx.settings.camera.width = 32;
        ctx.settings.camera.height = 24;
        ctx
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn no_hands() -> Result<Box<dyn LandmarkProvider>, LandmarkError> {
        Ok(Box::new(FixedProvider { hands: Vec::new() }))
    }

    #[test]
    fn test_camera_only_mode() {
        let ctx = fast_context();
        let events = ctx.bus.subscribe("test");
        let pipeline = GesturePipeline::spawn(
            &ctx,
            Box::new(ClosedBackend),
            Err(LandmarkError::Unavailable("no model".to_string())),
        )
        .unwrap();

        assert!(!pipeline.landmarks_enabled());
        assert!(wait_for(|| pipeline.frames_processed() >= 10));

        let frame = pipeline.latest_frame().unwrap();
        assert!(frame.synthetic);
        assert_eq!(pipeline.camera_status().map(|s| s.state), Some(CameraState::TestPattern));
        assert!(pipeline.current_gesture().is_none());

        let received: Vec<OutboundEvent> = events.try_iter().collect();
        assert!(!received.is_empty());
        assert!(received
            .iter()
            .all(|event| matches!(event, OutboundEvent::CameraStatus(_))));
    }

    #[test]
    fn test_fist_mutes_once() {
        let ctx = fast_context();
        let events = ctx.bus.subscribe("test");
        let (backend, _counters) = SolidBackend::new(128);
        let provider = FixedProvider {
            hands: vec![hand(0.5, 0.5, 1.0, CLOSED)],
        };
        let pipeline = GesturePipeline::spawn(&ctx, Box::new(backend), Ok(Box::new(provider))).unwrap();

        assert!(wait_for(|| pipeline.frames_processed() >= 20));
        assert_eq!(pipeline.current_gesture(), Some(GestureEvent::Fist));
        assert_eq!(ctx.control.snapshot().volume, 0);

        let received: Vec<OutboundEvent> = events.try_iter().collect();
        let fists = received
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Gesture { gesture: GestureEvent::Fist }))
            .count();
        let cursor_moves = received
            .iter()
            .filter(|e| matches!(e, OutboundEvent::CursorMoved { .. }))
            .count();
        assert_eq!(fists, 1);
        assert_eq!(cursor_moves, 1);
        assert!(received.contains(&OutboundEvent::ControlChanged {
            change: ControlChange::Volume(0),
            state: ctx.control.snapshot(),
        }));
    }

    #[test]
    fn test_detection_failures_are_not_fatal() {
        let ctx = fast_context();
        let events = ctx.bus.subscribe("test");
        let (backend, _counters) = SolidBackend::new(128);
        let pipeline = GesturePipeline::spawn(&ctx, Box::new(backend), Ok(Box::new(FailingProvider))).unwrap();

        assert!(wait_for(|| pipeline.frames_processed() >= 20));
        assert!(pipeline.is_running());
        assert!(pipeline.landmarks_enabled());
        assert!(events
            .try_iter()
            .all(|event| matches!(event, OutboundEvent::CameraStatus(_))));
    }

    #[test]
    fn test_commands() {
        let ctx = fast_context();
        let events = ctx.bus.subscribe("test");
        let (backend, counters) = SolidBackend::new(128);
        let pipeline = GesturePipeline::spawn(&ctx, Box::new(backend), no_hands()).unwrap();

        assert!(wait_for(|| {
            pipeline.camera_status().map(|s| s.state) == Some(CameraState::Streaming)
        }));

        pipeline
            .send(PipelineCommand::SimulateGesture(GestureEvent::RotateCw))
            .unwrap();
        assert!(wait_for(|| ctx.control.snapshot().volume == 55));
        assert_eq!(pipeline.current_gesture(), Some(GestureEvent::RotateCw));

        pipeline
            .send(PipelineCommand::SetActiveControl(ActiveControl::Temperature))
            .unwrap();
        assert!(wait_for(|| ctx.control.snapshot().active_control == ActiveControl::Temperature));

        pipeline.send(PipelineCommand::SetTestPattern(true)).unwrap();
        assert!(wait_for(|| {
            pipeline.camera_status().map(|s| s.state) == Some(CameraState::TestPattern)
        }));
        assert_eq!(counters.releases(), counters.opens());

        let received: Vec<OutboundEvent> = events.try_iter().collect();
        assert!(received.contains(&OutboundEvent::Gesture {
            gesture: GestureEvent::RotateCw
        }));
        assert!(received.iter().any(|e| matches!(
            e,
            OutboundEvent::ControlChanged {
                change: ControlChange::ActiveControl(ActiveControl::Temperature),
                ..
            }
        )));
    }

    #[test]
    fn test_cycle_camera_command() {
        let ctx = fast_context();
        let (backend, _counters) = SolidBackend::new(128);
        let pipeline = GesturePipeline::spawn(&ctx, Box::new(backend), no_hands()).unwrap();

        assert!(wait_for(|| pipeline.camera_status().is_some()));
        pipeline.send(PipelineCommand::CycleCamera).unwrap();
        assert!(wait_for(|| {
            pipeline.camera_status()
                == Some(CameraStatus {
                    device_index: 1,
                    state: CameraState::Streaming,
                    brightness: 128.0,
                })
        }));
    }

    #[test]
    fn test_send_does_not_block_on_full_queue() {
        // A worker that never drains its queue
        let (commands, _receiver) = crossbeam_channel::bounded(2);
        let shared = Arc::new(SharedState::default());
        shared.running.store(true, Ordering::Release);
        let pipeline = GesturePipeline {
            shared,
            commands,
            thread_handle: None,
        };

        pipeline.send(PipelineCommand::CycleCamera).unwrap();
        pipeline.send(PipelineCommand::ToggleTestPattern).unwrap();
        assert!(matches!(
            pipeline.send(PipelineCommand::CycleCamera),
            Err(PipelineError::CommandQueueFull)
        ));
    }

    #[test]
    fn test_stop_releases_camera() {
        let ctx = fast_context();
        let (backend, counters) = SolidBackend::new(128);
        let mut pipeline = GesturePipeline::spawn(&ctx, Box::new(backend), no_hands()).unwrap();

        assert!(wait_for(|| pipeline.frames_processed() >= 5));
        pipeline.stop();

        assert!(!pipeline.is_running());
        assert!(counters.opens() >= 1);
        assert_eq!(counters.opens(), counters.releases());
        assert!(matches!(
            pipeline.send(PipelineCommand::CycleCamera),
            Err(PipelineError::NotRunning)
        ));
    }
}

//! Gesture Control - camera driven hand gestures for a volume / temperature panel
//!
//! A capture worker turns a live camera feed into hand landmarks, classifies
//! them into discrete gestures (fist, pinch click, rotate) plus a cursor, and
//! drives a small control state machine. Results fan out to any number of
//! consumers through bounded channels.
//!
//! The camera side never gives up: a device that cannot be opened is replaced
//! by an animated test pattern and a device that goes black is swapped for the
//! next index.

pub mod camera;
pub mod context;
pub mod control;
pub mod error;
pub mod fanout;
pub mod gesture;
pub mod landmarks;
pub mod pipeline;
pub mod settings;
pub mod telemetry;

pub use camera::{CameraSource, CameraStatus, Frame};
pub use context::AppContext;
pub use control::{ActiveControl, ControlChange, ControlState, SharedControl};
pub use fanout::{EventBus, OutboundEvent, PipelineCommand};
pub use gesture::{GestureClassifier, GestureEvent};
pub use pipeline::GesturePipeline;
pub use settings::GestureSettings;

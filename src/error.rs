//! Error types for the gesture pipeline
//!
//! None of these are fatal inside the worker loop: camera and landmark errors
//! degrade the pipeline (test pattern, camera-only mode) instead of stopping it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by camera backends and devices.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera {index}: {reason}")]
    OpenFailed { index: u32, reason: String },
    #[error("Camera {0} is not opened")]
    NotOpened(u32),
    #[error("Failed to read frame: {0}")]
    ReadFailed(String),
    #[error("Camera backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by landmark providers.
#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("Models directory not found. Create a 'models' directory with ONNX models.")]
    ModelDirNotFound,
    #[error("Landmark model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Failed to initialize landmark provider: {0}")]
    Init(String),
    #[error("Landmark detection failed: {0}")]
    Detection(String),
    #[error("Landmark provider unavailable: {0}")]
    Unavailable(String),
}

/// Settings load/save errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}

/// Errors from parsing a text command or gesture name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Unknown gesture: {0}")]
    UnknownGesture(String),
    #[error("Unknown control target: {0}")]
    UnknownControl(String),
    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),
    #[error("Invalid argument for '{command}': {value}")]
    InvalidArgument { command: &'static str, value: String },
}

/// Pipeline lifecycle errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to spawn pipeline worker: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("Pipeline worker is not running")]
    NotRunning,
    #[error("Pipeline command queue is full")]
    CommandQueueFull,
}

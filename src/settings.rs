//! Persistent settings
//!
//! One XML document with a section per subsystem. Every field has a default,
//! so a partial or older file still loads.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};

use crate::camera::CameraConfig;
use crate::control::ControlConfig;
use crate::error::SettingsError;
use crate::gesture::GestureConfig;
use crate::pipeline::PipelineConfig;
use crate::telemetry::LogConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename = "GestureSettings", default)]
pub struct GestureSettings {
    #[serde(rename = "camera")]
    pub camera: CameraConfig,
    #[serde(rename = "gesture")]
    pub gesture: GestureConfig,
    #[serde(rename = "control")]
    pub control: ControlConfig,
    #[serde(rename = "pipeline")]
    pub pipeline: PipelineConfig,
    #[serde(rename = "logging")]
    pub logging: LogConfig,
}

impl GestureSettings {
    /// `<config dir>/GestureControl/settings.xml`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|mut p| {
                p.push("GestureControl");
                p.push("settings.xml");
                p
            })
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn from_xml(xml: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = from_str(xml)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn to_xml(&self) -> Result<String, SettingsError> {
        let xml = to_string(self)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_xml(&contents)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_xml()?)?;
        Ok(())
    }

    /// Load from `path` (or the default location); any failure yields defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Ok(path) => path,
                Err(e) => {
                    tracing::debug!("No settings location: {}", e);
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => {
                tracing::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                tracing::warn!("Failed to load settings from {}: {}. Using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Clamp every section into usable ranges
    pub fn sanitize(&mut self) {
        self.camera.sanitize();
        self.gesture.sanitize();
        self.control.sanitize();
        self.pipeline.sanitize();
    }
}

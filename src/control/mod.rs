//! Control state machine
//!
//! Applies discrete gestures to the volume / temperature controls. Every
//! mutation reports an explicit list of changed fields so consumers never
//! have to diff snapshots themselves.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CommandParseError;
use crate::gesture::GestureEvent;

/// Which control rotate gestures adjust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveControl {
    Temperature,
    #[default]
    Volume,
}

impl fmt::Display for ActiveControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveControl::Temperature => f.write_str("temperature"),
            ActiveControl::Volume => f.write_str("volume"),
        }
    }
}

impl FromStr for ActiveControl {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(ActiveControl::Temperature),
            "volume" | "vol" => Ok(ActiveControl::Volume),
            other => Err(CommandParseError::UnknownControl(other.to_string())),
        }
    }
}

/// Step sizes, ranges and initial values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    #[serde(rename = "volumeStep")]
    pub volume_step: i32,
    #[serde(rename = "volumeMax")]
    pub volume_max: i32,
    #[serde(rename = "temperatureStep")]
    pub temperature_step: i32,
    #[serde(rename = "temperatureMin")]
    pub temperature_min: i32,
    #[serde(rename = "temperatureMax")]
    pub temperature_max: i32,
    #[serde(rename = "initialVolume")]
    pub initial_volume: i32,
    #[serde(rename = "initialTemperature")]
    pub initial_temperature: i32,
    #[serde(rename = "initialControl")]
    pub initial_control: ActiveControl,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            volume_step: 5,
            volume_max: 100,
            temperature_step: 1,
            temperature_min: 16,
            temperature_max: 30,
            initial_volume: 50,
            initial_temperature: 22,
            initial_control: ActiveControl::Volume,
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.volume_max = self.volume_max.max(1);
        self.volume_step = self.volume_step.clamp(1, self.volume_max);
        if self.temperature_min > self.temperature_max {
            std::mem::swap(&mut self.temperature_min, &mut self.temperature_max);
        }
        self.temperature_step = self.temperature_step.max(1);
        self.initial_volume = self.initial_volume.clamp(0, self.volume_max);
        self.initial_temperature = self
            .initial_temperature
            .clamp(self.temperature_min, self.temperature_max);
    }
}

/// Snapshot of the controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    #[serde(rename = "activeControl")]
    pub active_control: ActiveControl,
    pub volume: i32,
    pub temperature: i32,
    /// Volume restored by unmute
    #[serde(rename = "lastNonZeroVolume")]
    pub last_nonzero_volume: i32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::from_config(&ControlConfig::default())
    }
}

impl ControlState {
    pub fn from_config(config: &ControlConfig) -> Self {
        Self {
            active_control: config.initial_control,
            volume: config.initial_volume,
            temperature: config.initial_temperature,
            last_nonzero_volume: config.initial_volume,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.volume == 0
    }
}

/// One user-visible field that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ControlChange {
    Volume(i32),
    Temperature(i32),
    ActiveControl(ActiveControl),
}

/// Result of applying one gesture
#[derive(Debug, Clone, PartialEq)]
pub struct ControlUpdate {
    pub state: ControlState,
    pub changes: Vec<ControlChange>,
    /// Pinch click forwarded as an activation signal
    pub activated: bool,
}

pub struct ControlStateMachine {
    config: ControlConfig,
    state: ControlState,
}

impl ControlStateMachine {
    pub fn new(mut config: ControlConfig) -> Self {
        config.sanitize();
        Self {
            state: ControlState::from_config(&config),
            config,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn apply(&mut self, event: GestureEvent) -> ControlUpdate {
        let before = self.state.clone();
        let volume = self.state.volume;
        let last = self.state.last_nonzero_volume;

        match (event, self.state.active_control) {
            (GestureEvent::Fist, _) => {
                if volume > 0 {
                    self.state.last_nonzero_volume = volume;
                    self.state.volume = 0;
                }
            }
            (GestureEvent::RotateCw, ActiveControl::Volume) => {
                if volume == 0 && last > 0 {
                    self.set_volume(last);
                } else {
                    self.set_volume(volume + self.config.volume_step);
                }
            }
            (GestureEvent::RotateCcw, ActiveControl::Volume) => {
                self.set_volume(volume - self.config.volume_step);
            }
            (GestureEvent::RotateCw, ActiveControl::Temperature) => {
                self.set_temperature(self.state.temperature + self.config.temperature_step);
            }
            (GestureEvent::RotateCcw, ActiveControl::Temperature) => {
                self.set_temperature(self.state.temperature - self.config.temperature_step);
            }
            (GestureEvent::OpenPalm, _) => {
                if volume == 0 && last > 0 {
                    self.set_volume(last);
                }
            }
            (GestureEvent::PinchClick, _) => {}
        }

        let changes = diff(&before, &self.state);
        if !changes.is_empty() {
            tracing::info!(
                gesture = %event,
                volume = self.state.volume,
                temperature = self.state.temperature,
                "Control state changed"
            );
        }

        ControlUpdate {
            state: self.state.clone(),
            changes,
            activated: event == GestureEvent::PinchClick,
        }
    }

    /// Select the control rotate gestures adjust; `None` when already selected
    pub fn set_active_control(&mut self, control: ActiveControl) -> Option<ControlChange> {
        if self.state.active_control == control {
            return None;
        }
        self.state.active_control = control;
        tracing::info!(control = %control, "Active control changed");
        Some(ControlChange::ActiveControl(control))
    }

    /// Clamped volume write; the restore point is only taken by mute
    fn set_volume(&mut self, volume: i32) {
        self.state.volume = volume.clamp(0, self.config.volume_max);
    }

    fn set_temperature(&mut self, temperature: i32) {
        self.state.temperature =
            temperature.clamp(self.config.temperature_min, self.config.temperature_max);
    }
}

fn diff(before: &ControlState, after: &ControlState) -> Vec<ControlChange> {
    let mut changes = Vec::new();
    if before.volume != after.volume {
        changes.push(ControlChange::Volume(after.volume));
    }
    if before.temperature != after.temperature {
        changes.push(ControlChange::Temperature(after.temperature));
    }
    if before.active_control != after.active_control {
        changes.push(ControlChange::ActiveControl(after.active_control));
    }
    changes
}

/// Control state machine shared between the pipeline worker and front ends
#[derive(Clone)]
pub struct SharedControl {
    inner: Arc<Mutex<ControlStateMachine>>,
}

impl SharedControl {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControlStateMachine::new(config))),
        }
    }

    pub fn apply(&self, event: GestureEvent) -> ControlUpdate {
        self.inner.lock().apply(event)
    }

    pub fn set_active_control(&self, control: ActiveControl) -> Option<ControlChange> {
        self.inner.lock().set_active_control(control)
    }

    pub fn snapshot(&self) -> ControlState {
        self.inner.lock().state().clone()
    }
}

impl Default for SharedControl {
    fn default() -> Self {
        Self::new(ControlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ControlStateMachine {
        ControlStateMachine::new(ControlConfig::default())
    }

    #[test]
    fn test_defaults() {
        let state = ControlState::default();
        assert_eq!(state.volume, 50);
        assert_eq!(state.temperature, 22);
        assert_eq!(state.last_nonzero_volume, 50);
        assert_eq!(state.active_control, ActiveControl::Volume);
    }

    #[test]
    fn test_volume_clamping_and_unmute() {
        let mut control = machine();

        for _ in 0..20 {
            control.apply(GestureEvent::RotateCw);
        }
        assert_eq!(control.state().volume, 100);
        let update = control.apply(GestureEvent::RotateCw);
        assert!(update.changes.is_empty());

        let update = control.apply(GestureEvent::Fist);
        assert_eq!(update.changes, vec![ControlChange::Volume(0)]);
        assert_eq!(update.state.last_nonzero_volume, 100);

        // Unmute restores without adding a step
        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.changes, vec![ControlChange::Volume(100)]);

        for _ in 0..30 {
            control.apply(GestureEvent::RotateCcw);
        }
        assert_eq!(control.state().volume, 0);
        assert_eq!(control.state().last_nonzero_volume, 100);

        // Turned down to zero, not muted: unmute goes back to the pre-mute volume
        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.state.volume, 100);
    }

    #[test]
    fn test_rotate_down_to_zero_restores_default_volume() {
        let mut control = machine();
        for _ in 0..10 {
            control.apply(GestureEvent::RotateCcw);
        }
        assert_eq!(control.state().volume, 0);
        assert_eq!(control.state().last_nonzero_volume, 50);

        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.state.volume, 50);
    }

    #[test]
    fn test_unmute_then_step() {
        let mut control = machine();
        control.state.volume = 0;
        control.state.last_nonzero_volume = 40;

        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.changes, vec![ControlChange::Volume(40)]);
        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.changes, vec![ControlChange::Volume(45)]);
        assert_eq!(update.state.last_nonzero_volume, 40);
    }

    #[test]
    fn test_temperature_range() {
        let mut control = machine();
        assert_eq!(
            control.set_active_control(ActiveControl::Temperature),
            Some(ControlChange::ActiveControl(ActiveControl::Temperature))
        );
        assert_eq!(control.set_active_control(ActiveControl::Temperature), None);

        for _ in 0..20 {
            control.apply(GestureEvent::RotateCw);
        }
        assert_eq!(control.state().temperature, 30);

        for _ in 0..20 {
            let update = control.apply(GestureEvent::RotateCcw);
            assert!(update.state.temperature >= 16);
        }
        assert_eq!(control.state().temperature, 16);
        assert_eq!(control.state().volume, 50);
    }

    #[test]
    fn test_mute_is_idempotent() {
        let mut control = machine();
        control.apply(GestureEvent::RotateCcw);
        control.apply(GestureEvent::Fist);
        assert_eq!(control.state().volume, 0);
        assert_eq!(control.state().last_nonzero_volume, 45);

        let update = control.apply(GestureEvent::Fist);
        assert!(update.changes.is_empty());
        assert_eq!(update.state.last_nonzero_volume, 45);
    }

    #[test]
    fn test_open_palm_unmutes() {
        let mut control = machine();
        assert!(control.apply(GestureEvent::OpenPalm).changes.is_empty());

        control.apply(GestureEvent::Fist);
        let update = control.apply(GestureEvent::OpenPalm);
        assert_eq!(update.changes, vec![ControlChange::Volume(50)]);
    }

    #[test]
    fn test_pinch_click_is_forwarded_only() {
        let mut control = machine();
        let update = control.apply(GestureEvent::PinchClick);
        assert!(update.activated);
        assert!(update.changes.is_empty());
        assert_eq!(update.state, ControlState::default());
    }

    #[test]
    fn test_rotation_while_muted_on_temperature() {
        let mut control = machine();
        control.apply(GestureEvent::Fist);
        control.set_active_control(ActiveControl::Temperature);
        let update = control.apply(GestureEvent::RotateCw);
        assert_eq!(update.changes, vec![ControlChange::Temperature(23)]);
        assert_eq!(update.state.volume, 0);
    }

    #[test]
    fn test_change_serialization() {
        let json = serde_json::to_string(&ControlChange::Volume(35)).unwrap();
        assert_eq!(json, r#"{"field":"volume","value":35}"#);
        let json = serde_json::to_string(&ControlChange::ActiveControl(ActiveControl::Temperature)).unwrap();
        assert_eq!(json, r#"{"field":"activeControl","value":"temperature"}"#);
    }

    #[test]
    fn test_control_names() {
        assert_eq!("Temp".parse::<ActiveControl>(), Ok(ActiveControl::Temperature));
        assert_eq!("volume".parse::<ActiveControl>(), Ok(ActiveControl::Volume));
        assert!("bass".parse::<ActiveControl>().is_err());
    }

    #[test]
    fn test_shared_snapshot() {
        let shared = SharedControl::default();
        let other = shared.clone();
        other.apply(GestureEvent::RotateCw);
        assert_eq!(shared.snapshot().volume, 55);
    }

    #[test]
    fn test_config_sanitize() {
        let mut config = ControlConfig {
            temperature_min: 30,
            temperature_max: 16,
            initial_volume: 400,
            volume_step: 0,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!((config.temperature_min, config.temperature_max), (16, 30));
        assert_eq!(config.initial_volume, 100);
        assert_eq!(config.volume_step, 1);
    }
}

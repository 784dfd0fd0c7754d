//! Event fan-out
//!
//! Outbound events go to every subscriber through its own bounded channel.
//! A slow consumer only loses its own events; the pipeline never blocks on it.
//! Inbound commands arrive as typed [`PipelineCommand`] values, optionally
//! parsed from text lines.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;

use crate::camera::CameraStatus;
use crate::control::{ActiveControl, ControlChange, ControlState, ControlUpdate, SharedControl};
use crate::error::CommandParseError;
use crate::gesture::GestureEvent;
use crate::telemetry::RateLimitedLog;

/// Events published to UI and network consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundEvent {
    Gesture { gesture: GestureEvent },
    CursorMoved { x: f32, y: f32 },
    ControlChanged { change: ControlChange, state: ControlState },
    CameraStatus(CameraStatus),
}

impl OutboundEvent {
    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Commands accepted by the pipeline worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    CycleCamera,
    SetTestPattern(bool),
    ToggleTestPattern,
    SetActiveControl(ActiveControl),
    /// Inject a gesture as if the classifier had produced it
    SimulateGesture(GestureEvent),
}

impl FromStr for PipelineCommand {
    type Err = CommandParseError;

    /// Parse a line such as `cycle`, `pattern on`, `control temp` or `gesture FIST`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or(CommandParseError::Empty)?.to_ascii_lowercase();
        let argument = parts.next();

        match command.as_str() {
            "cycle" | "next" | "cycle-camera" => Ok(PipelineCommand::CycleCamera),
            "pattern" | "test-pattern" => match argument {
                None | Some("toggle") => Ok(PipelineCommand::ToggleTestPattern),
                Some(value) => parse_switch(value)
                    .map(PipelineCommand::SetTestPattern)
                    .ok_or_else(|| CommandParseError::InvalidArgument {
                        command: "pattern",
                        value: value.to_string(),
                    }),
            },
            "control" | "select" => {
                let value = argument.ok_or(CommandParseError::MissingArgument("control"))?;
                Ok(PipelineCommand::SetActiveControl(value.parse()?))
            }
            "gesture" | "simulate" => {
                let value = argument.ok_or(CommandParseError::MissingArgument("gesture"))?;
                Ok(PipelineCommand::SimulateGesture(value.parse()?))
            }
            _ => Err(CommandParseError::UnknownCommand(command)),
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

struct Subscriber {
    name: String,
    sender: Sender<OutboundEvent>,
}

/// Fan-out of outbound events to bounded per-consumer queues
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Subscriber>>,
    dropped: AtomicU64,
    drop_log: Mutex<RateLimitedLog>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
            drop_log: Mutex::new(RateLimitedLog::new(Duration::from_secs(5))),
        }
    }

    /// Register a consumer; dropping the receiver unsubscribes it
    pub fn subscribe(&self, name: impl Into<String>) -> Receiver<OutboundEvent> {
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        let name = name.into();
        tracing::debug!(subscriber = %name, capacity = self.capacity, "Subscriber added");
        self.subscribers.lock().push(Subscriber { name, sender });
        receiver
    }

    /// Deliver to every live subscriber; returns how many received it
    pub fn publish(&self, event: OutboundEvent) -> usize {
        let mut delivered = 0;
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|subscriber| match subscriber.sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(suppressed) = self.drop_log.lock().admit(Instant::now()) {
                    tracing::warn!(
                        subscriber = %subscriber.name,
                        total_dropped = total,
                        suppressed,
                        "Subscriber queue full, dropping event"
                    );
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(subscriber = %subscriber.name, "Subscriber disconnected");
                false
            }
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Events lost to full queues since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Publish a gesture, apply it to the controls and publish the resulting changes
pub fn route_gesture(control: &SharedControl, bus: &EventBus, gesture: GestureEvent) -> ControlUpdate {
    bus.publish(OutboundEvent::Gesture { gesture });

    let update = control.apply(gesture);
    for change in &update.changes {
        bus.publish(OutboundEvent::ControlChanged {
            change: *change,
            state: update.state.clone(),
        });
    }
    update
}

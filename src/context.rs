//! Process-wide application context

use std::sync::Arc;

use crate::control::SharedControl;
use crate::fanout::EventBus;
use crate::settings::GestureSettings;

/// Constructed once at startup and passed by reference to whatever needs it
pub struct AppContext {
    pub settings: GestureSettings,
    pub control: SharedControl,
    pub bus: Arc<EventBus>,
}

impl AppContext {
    pub fn new(mut settings: GestureSettings) -> Self {
        settings.sanitize();
        let control = SharedControl::new(settings.control.clone());
        let bus = Arc::new(EventBus::new(settings.pipeline.event_capacity));
        Self {
            settings,
            control,
            bus,
        }
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(GestureSettings::default())
    }
}

//! Callback hooks for breaker phase transitions

use std::sync::Arc;

type KeyCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Hooks fired with the key whenever that key changes phase
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_trip: Option<KeyCallback>,
    pub on_probe: Option<KeyCallback>,
    pub on_recover: Option<KeyCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_trip(&self, key: &str) {
        if let Some(ref callback) = self.on_trip {
            callback(key);
        }
    }

    pub fn trigger_probe(&self, key: &str) {
        if let Some(ref callback) = self.on_probe {
            callback(key);
        }
    }

    pub fn trigger_recover(&self, key: &str) {
        if let Some(ref callback) = self.on_recover {
            callback(key);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_trip", &self.on_trip.is_some())
            .field("on_probe", &self.on_probe.is_some())
            .field("on_recover", &self.on_recover.is_some())
            .finish()
    }
}

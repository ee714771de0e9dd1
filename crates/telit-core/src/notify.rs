//! Notifications pushed to the host: property changes, SIM state and modem
//! lifecycle. Delivered on an unbounded crossbeam channel; emitting never
//! blocks and a dropped receiver is ignored.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Uint(u32),
    Int(i64),
    Float(f32),
    Str(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Uint(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::Uint(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

/// Name/value pairs as returned by the `get_properties` operations.
pub type Properties = Vec<(&'static str, PropertyValue)>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModemEvent {
    ModemAdded { model: String },
    ModemRemoved,
    Powered { powered: bool },
    SimInserted { inserted: bool },
    SimReady,
    PropertyChanged {
        facility: &'static str,
        property: &'static str,
        value: PropertyValue,
    },
}

/// Sending half handed to every facility and to the modem.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<Sender<ModemEvent>>,
}

impl EventBus {
    pub fn channel() -> (Self, Receiver<ModemEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// Bus that discards everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ModemEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = ModemEvent::PropertyChanged {
            facility: "power-management",
            property: "PwMgmState",
            value: "airplane".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"property_changed","facility":"power-management","property":"PwMgmState","value":"airplane"}"#
        );
    }

    #[test]
    fn disconnected_bus_drops_silently() {
        EventBus::disconnected().emit(ModemEvent::ModemRemoved);
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (bus, rx) = EventBus::channel();
        drop(rx);
        bus.emit(ModemEvent::SimReady);
    }
}

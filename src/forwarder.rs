//! One-way game event and log delivery.
//!
//! Delivery is best effort: while the link is not authenticated events are
//! dropped, never buffered for later.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::{json, Value};

use crate::{
    events::GameEvent,
    ws::{
        message::{GameEventPayload, OnlyPayload},
        Message, Outbound,
    },
};

/// Encodes game events and hands them to the link.
///
/// Clones share the debug flag.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    outbound: Arc<dyn Outbound>,
    debug: Arc<AtomicBool>,
}

impl EventForwarder {
    /// Forwarder sending through `outbound`.
    ///
    /// With `debug` set, drops are warned about and every sent event is logged.
    pub fn new(outbound: Arc<dyn Outbound>, debug: bool) -> Self {
        Self {
            outbound,
            debug: Arc::new(AtomicBool::new(debug)),
        }
    }

    /// Whether verbose diagnostics are on.
    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Toggle verbose diagnostics for this forwarder and all its clones.
    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    /// True when events would be delivered right now.
    pub fn is_ready(&self) -> bool {
        self.outbound.is_authenticated()
    }

    /// Send a raw game event, returns whether it went out.
    pub fn send_game_event(&self, event_type: &str, data: Value) -> bool {
        if !self.outbound.is_authenticated() {
            if self.debug() {
                log::warn!("Cannot send game event {}, not authenticated", event_type);
            } else {
                log::debug!("Cannot send game event {}, not authenticated", event_type);
            }
            return false;
        }

        let message = Message::GameEvent(OnlyPayload {
            payload: GameEventPayload {
                r#type: event_type.to_string(),
                data,
            },
        });

        match self.outbound.send(message) {
            Ok(()) => {
                if self.debug() {
                    log::info!("Sent game event: {}", event_type);
                }
                true
            }
            Err(err) => {
                log::debug!("Game event {} dropped: {}", event_type, err);
                false
            }
        }
    }

    /// Send a typed game event.
    pub fn send(&self, event: &GameEvent) -> bool {
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("Encode game event {} failed: {}", event.type_name(), err);
                return false;
            }
        };

        let data = value.get("data").cloned().unwrap_or(Value::Null);
        self.send_game_event(event.type_name(), data)
    }

    /// Send one formatted server log line.
    pub fn send_log_event(&self, line: &str) -> bool {
        // no logging on the success path, it would feed back into the log pipeline
        if !self.outbound.is_authenticated() {
            return false;
        }

        let message = Message::GameEvent(OnlyPayload {
            payload: GameEventPayload {
                r#type: "log".to_string(),
                data: json!({ "msg": line }),
            },
        });

        self.outbound.send(message).is_ok()
    }
}

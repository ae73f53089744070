//! Contracts between a compute proxy and the rest of the controller
//!
//! The proxy never owns the controller's notification fan-out or its
//! persistence; it is handed implementations of these traits at construction.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Controller-wide notification bus
pub trait NotificationBus: Send + Sync {
    /// Publish a controller-level event such as `compute.updated`
    fn emit(&self, event: &str, payload: Value);

    /// Relay an event pushed by a compute, tagged with its identity
    fn dispatch(&self, action: &str, payload: Value, compute_id: &str);
}

/// Asks the controller to persist its state after a compute changed
pub trait PersistenceTrigger: Send + Sync {
    fn save(&self);
}

/// One message sent through a [`ChannelNotificationBus`]
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Emit {
        event: String,
        payload: Value,
    },
    Dispatch {
        action: String,
        payload: Value,
        compute_id: String,
    },
}

/// Bus that hands every notification to a single consumer task
#[derive(Clone)]
pub struct ChannelNotificationBus {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            debug!("Notification dropped, consumer is gone");
        }
    }
}

impl NotificationBus for ChannelNotificationBus {
    fn emit(&self, event: &str, payload: Value) {
        self.send(Notification::Emit {
            event: event.to_string(),
            payload,
        });
    }

    fn dispatch(&self, action: &str, payload: Value, compute_id: &str) {
        self.send(Notification::Dispatch {
            action: action.to_string(),
            payload,
            compute_id: compute_id.to_string(),
        });
    }
}

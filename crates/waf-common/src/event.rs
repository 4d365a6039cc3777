//! Typed event stream (spec §9, "Event emission").
//!
//! Implemented as a `tokio::sync::broadcast` channel: emission is a
//! non-blocking `send` that is dropped on the floor when there are no
//! subscribers, so a slow or absent listener can never stall the
//! request path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Threat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WafEvent {
    ThreatDetected {
        request_id: String,
        kind: ThreatEventKind,
        ip: String,
        path: String,
        score: f64,
        threats: Vec<Threat>,
        timestamp: DateTime<Utc>,
    },
    RequestBlocked {
        request_id: String,
        ip: String,
        path: String,
        score: f64,
        threats: Vec<Threat>,
        timestamp: DateTime<Utc>,
    },
    Error {
        request_id: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// The sub-kind carried by `threat-detected` events (spec §4.9): a
/// learning-phase observation, or a dry-run would-have-blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreatEventKind {
    Learning,
    DryRun,
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A cheap-to-clone handle around a broadcast channel. Every
/// `EventBus::emit` is fire-and-forget: if nobody is subscribed, the
/// send's `Err(SendError)` is discarded.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WafEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WafEvent> {
        self.sender.subscribe()
    }

    /// Non-blocking emit; never errors the caller.
    pub fn emit(&self, event: WafEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(WafEvent::Error {
            request_id: None,
            message: "boom".into(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(WafEvent::RequestBlocked {
            request_id: "r1".into(),
            ip: "1.2.3.4".into(),
            path: "/".into(),
            score: 42.0,
            threats: Vec::new(),
            timestamp: Utc::now(),
        });
        let received = rx.recv().await.unwrap();
        match received {
            WafEvent::RequestBlocked { request_id, .. } => assert_eq!(request_id, "r1"),
            _ => panic!("unexpected event variant"),
        }
    }
}

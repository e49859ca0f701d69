use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub const SESSION_UPDATE: &str = "session:update";
pub const MISSION_UNLOCKED: &str = "mission:unlocked";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

/// Per-session fan-out of state-change events. Delivery is best-effort:
/// emitting never blocks and a session without subscribers drops the
/// event on the floor.
#[derive(Default)]
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<EventEnvelope>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<EventEnvelope> {
        self.channels
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(200).0)
            .subscribe()
    }

    pub fn emit(&self, code: &str, event: &str, payload: Value) {
        if let Some(sender) = self.channels.get(code) {
            let _ = sender.send(EventEnvelope {
                event: event.to_string(),
                payload,
                ts: Some(Utc::now().to_rfc3339()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serialization_roundtrip() {
        let env = EventEnvelope {
            event: SESSION_UPDATE.into(),
            payload: json!({ "code": "ABC234" }),
            ts: Some("2026-01-01T00:00:00Z".into()),
        };
        let raw = serde_json::to_string(&env).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.event, SESSION_UPDATE);
        assert_eq!(parsed.payload["code"], "ABC234");
    }

    #[tokio::test]
    async fn emit_reaches_subscribers_and_never_blocks_without_any() {
        let bus = EventBus::new();
        // No subscriber yet: emit is a no-op.
        bus.emit("XXXX22", SESSION_UPDATE, json!({}));

        let mut rx = bus.subscribe("XXXX22");
        bus.emit("XXXX22", MISSION_UNLOCKED, json!({ "mission": "m2" }));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.event, MISSION_UNLOCKED);
        assert_eq!(got.payload["mission"], "m2");
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best-effort record of a state transition or quote event. Sinks must never
/// raise to the caller; a lost event is acceptable, a broken flow is not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub user_id: String,
    pub payload: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(event_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            user_id: user_id.into(),
            payload: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAnalyticsSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl InMemoryAnalyticsSink {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AnalyticsSink for InMemoryAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sink that only emits a structured log line. Used when no analytics
/// backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn record(&self, event: AnalyticsEvent) {
        tracing::info!(
            event_name = "analytics.event_recorded",
            event_type = %event.event_type,
            user_id = %event.user_id,
            payload = ?event.payload,
            "analytics event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalyticsEvent, AnalyticsSink, InMemoryAnalyticsSink};

    #[test]
    fn in_memory_sink_keeps_events_in_order() {
        let sink = InMemoryAnalyticsSink::default();
        sink.record(AnalyticsEvent::new("flow_started", "447000000001"));
        sink.record(
            AnalyticsEvent::new("quote_rendered", "447000000001").with("tier", "first_offer"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow_started");
        assert_eq!(events[1].payload.get("tier").map(String::as_str), Some("first_offer"));
    }
}

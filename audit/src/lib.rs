//! Structured lifecycle event emission for Console audit. The reconciler
//! treats sink failures as non-fatal to reconciliation correctness: it
//! logs and swallows them rather than blocking the state machine on an
//! external system being reachable.

pub mod http;
pub mod logging;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "audit.theatre.io/v1alpha1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to publish lifecycle event: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatusSummary {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    pub namespace: String,
    pub console_name: String,
    pub user: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorisePayload {
    pub namespace: String,
    pub console_name: String,
    pub authorised_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPayload {
    pub namespace: String,
    pub console_name: String,
    pub pod_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPayload {
    pub namespace: String,
    pub console_name: String,
    pub pod_name: String,
    pub attached_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminatePayload {
    pub namespace: String,
    pub console_name: String,
    pub timed_out: bool,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatusSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LifecycleEvent {
    Request(RequestPayload),
    Authorise(AuthorisePayload),
    Start(StartPayload),
    Attach(AttachPayload),
    Terminate(TerminatePayload),
}

impl LifecycleEvent {
    fn console_name(&self) -> &str {
        match self {
            LifecycleEvent::Request(p) => &p.console_name,
            LifecycleEvent::Authorise(p) => &p.console_name,
            LifecycleEvent::Start(p) => &p.console_name,
            LifecycleEvent::Attach(p) => &p.console_name,
            LifecycleEvent::Terminate(p) => &p.console_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub api_version: String,
    pub id: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl EventEnvelope {
    pub fn new(id: String, event: LifecycleEvent) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            id,
            observed_at: Utc::now(),
            annotations: BTreeMap::new(),
            event,
        }
    }
}

/// `UTC(YYYYMMDDhhmmss) + "/" + clusterContext + "/" + namespace + "/" +
/// consoleName`, computed once at Console creation and reused across all
/// events for that Console (stashed in an annotation by the reconciler).
pub fn derive_event_id(
    created_at: DateTime<Utc>,
    cluster_context: &str,
    namespace: &str,
    console_name: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        created_at.format("%Y%m%d%H%M%S"),
        cluster_context,
        namespace,
        console_name
    )
}

#[async_trait]
pub trait LifecycleEventSink: Send + Sync {
    async fn publish(&self, event: EventEnvelope) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_id_has_expected_shape() {
        let at = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let id = derive_event_id(at, "prod", "ops", "my-console");
        assert_eq!(id, "20260728120000/prod/ops/my-console");
    }

    #[test]
    fn console_name_extracted_from_every_variant() {
        let payload = RequestPayload {
            namespace: "ops".to_string(),
            console_name: "c1".to_string(),
            user: "alice".to_string(),
            reason: None,
        };
        let event = LifecycleEvent::Request(payload);
        assert_eq!(event.console_name(), "c1");
    }
}

use async_trait::async_trait;

use crate::{Error, EventEnvelope, LifecycleEventSink};

/// Posts each event as JSON to a configured collector endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LifecycleEventSink for HttpSink {
    async fn publish(&self, event: EventEnvelope) -> Result<(), Error> {
        let url = format!("{}/events", self.endpoint);
        self.client
            .post(&url)
            .json(&event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

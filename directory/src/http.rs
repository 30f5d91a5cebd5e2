//! Reference provider for [`crate::Directory`]: a minimal JSON/HTTP client
//! against a corporate directory group-membership endpoint. Modelled on
//! this codebase's other thin `reqwest`-backed API clients.

use async_trait::async_trait;
use serde::Deserialize;

use crate::{Directory, Error};

#[derive(Deserialize)]
struct MembersResponse {
    members: Vec<String>,
}

/// Calls `GET {endpoint}/groups/{group}/members` and expects a JSON body
/// of shape `{"members": ["user1", "user2"]}`.
pub struct HttpDirectory {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDirectory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn members_of(&self, group: &str) -> Result<Vec<String>, Error> {
        let url = format!("{}/groups/{}/members", self.endpoint, group);
        let resp = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Provider(format!("directory provider returned an error: {e}")))?;
        let body: MembersResponse = resp.json().await?;
        Ok(body.members)
    }
}

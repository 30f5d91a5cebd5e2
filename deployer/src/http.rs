//! Reference [`Deployer`] implementation: a thin JSON/HTTP client against
//! a generic CI/CD provider's deployment API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    DeployerError, Deployer, DeploymentHandle, DeploymentStatus, DeploymentStatusReport,
    TriggerRequest,
};

pub struct HttpDeployer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDeployer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Network and 5xx failures are treated as retryable; a 4xx response
    /// indicates the request itself was rejected and is not retried.
    fn classify(e: reqwest::Error) -> DeployerError {
        match e.status() {
            Some(status) if status.is_client_error() => {
                DeployerError::fatal(format!("deployer rejected request: {e}"))
            }
            _ => DeployerError::retryable(format!("deployer request failed: {e}")),
        }
    }
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    rollback_name: &'a str,
    target_release: &'a str,
    environment: &'a str,
    source_repository: Option<&'a str>,
}

#[derive(Deserialize)]
struct TriggerResponse {
    id: String,
    status: DeploymentStatus,
    url: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: DeploymentStatus,
    message: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl Deployer for HttpDeployer {
    async fn trigger_deployment(
        &self,
        request: TriggerRequest,
    ) -> Result<DeploymentHandle, DeployerError> {
        let url = format!("{}/deployments", self.endpoint);
        let body = TriggerBody {
            rollback_name: &request.rollback_name,
            target_release: &request.target_release,
            environment: &request.options.environment,
            source_repository: request.options.source_repository.as_deref(),
        };
        let resp: TriggerResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?
            .error_for_status()
            .map_err(Self::classify)?
            .json()
            .await
            .map_err(|e| DeployerError::retryable(format!("bad trigger response: {e}")))?;
        Ok(DeploymentHandle {
            id: resp.id,
            status: resp.status,
            url: resp.url,
        })
    }

    async fn get_deployment_status(
        &self,
        id: &str,
    ) -> Result<DeploymentStatusReport, DeployerError> {
        let url = format!("{}/deployments/{}", self.endpoint, id);
        let resp: StatusResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::classify)?
            .error_for_status()
            .map_err(Self::classify)?
            .json()
            .await
            .map_err(|e| DeployerError::retryable(format!("bad status response: {e}")))?;
        Ok(DeploymentStatusReport {
            status: resp.status,
            message: resp.message,
            url: resp.url,
        })
    }
}

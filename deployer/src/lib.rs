//! A narrow, pluggable interface to an external CI/CD provider that
//! performs the actual rollback deployments. The Rollback reconciler
//! depends only on [`Deployer`], never on a specific provider.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Unknown,
}

/// Deployer errors always carry a `retryable` flag so the Rollback
/// reconciler can decide, without provider-specific knowledge, whether to
/// increment `status.attemptCount` and retry or to fail terminally.
#[derive(Debug, thiserror::Error)]
#[error("deployer error: {message}")]
pub struct DeployerError {
    pub message: String,
    pub retryable: bool,
}

impl DeployerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    pub environment: String,
    /// Source repository identifiers a provider may use to scope the
    /// deployment (e.g. `org/repo`); opaque beyond that to this trait.
    pub source_repository: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub rollback_name: String,
    pub target_release: String,
    pub options: TriggerOptions,
}

#[derive(Debug, Clone)]
pub struct DeploymentHandle {
    pub id: String,
    pub status: DeploymentStatus,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeploymentStatusReport {
    pub status: DeploymentStatus,
    pub message: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn trigger_deployment(
        &self,
        request: TriggerRequest,
    ) -> Result<DeploymentHandle, DeployerError>;

    async fn get_deployment_status(
        &self,
        id: &str,
    ) -> Result<DeploymentStatusReport, DeployerError>;
}

use theatre_deployer::DeploymentStatus;
use theatre_types::RollbackPhase;

/// Maps a polled [`DeploymentStatus`] onto the Rollback's own phase.
/// `Pending`/`Unknown` are treated as still `InProgress` — a deployer that
/// hasn't reported a concrete status yet shouldn't be surfaced as stuck.
pub fn phase_from_deployment_status(status: DeploymentStatus) -> RollbackPhase {
    match status {
        DeploymentStatus::Succeeded => RollbackPhase::Succeeded,
        DeploymentStatus::Failed => RollbackPhase::Failed,
        DeploymentStatus::Pending | DeploymentStatus::InProgress | DeploymentStatus::Unknown => {
            RollbackPhase::InProgress
        }
    }
}

/// Whether the reconciler should retry after a retryable deployer error:
/// true as long as `attempt_count` (post-increment) has not yet reached
/// `max_attempts`.
pub fn should_retry(attempt_count: u32, max_attempts: u32) -> bool {
    attempt_count < max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_terminal_statuses() {
        assert_eq!(phase_from_deployment_status(DeploymentStatus::Succeeded), RollbackPhase::Succeeded);
        assert_eq!(phase_from_deployment_status(DeploymentStatus::Failed), RollbackPhase::Failed);
    }

    #[test]
    fn non_terminal_statuses_stay_in_progress() {
        assert_eq!(phase_from_deployment_status(DeploymentStatus::Pending), RollbackPhase::InProgress);
        assert_eq!(phase_from_deployment_status(DeploymentStatus::Unknown), RollbackPhase::InProgress);
    }

    #[test]
    fn retry_allowed_under_cap() {
        assert!(should_retry(4, 5));
        assert!(!should_retry(5, 5));
        assert!(!should_retry(6, 5));
    }
}

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use theatre_deployer::DeploymentStatus;

/// Inserts or updates a named condition in place, following the standard
/// Kubernetes condition shape (`lastTransitionTime` only bumped when the
/// status actually flips).
pub fn set_condition(conditions: &mut Vec<Condition>, type_: &str, status: bool, reason: &str, message: &str, now: DateTime<Utc>) {
    let want_status = if status { "True" } else { "False" };
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != want_status {
            existing.last_transition_time = Time(now);
        }
        existing.status = want_status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.observed_generation = None;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: want_status.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: Time(now),
            observed_generation: None,
        });
    }
}

/// Maps a polled deployment status onto the `Healthy` condition. Returns
/// `None` for statuses that don't yet tell us anything conclusive
/// (`Pending`/`InProgress`/`Unknown`), leaving the existing condition
/// untouched rather than flapping it.
pub fn healthy_from_deployment_status(status: DeploymentStatus) -> Option<bool> {
    match status {
        DeploymentStatus::Succeeded => Some(true),
        DeploymentStatus::Failed => Some(false),
        DeploymentStatus::Pending | DeploymentStatus::InProgress | DeploymentStatus::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn set_condition_inserts_when_absent() {
        let mut conditions = vec![];
        set_condition(&mut conditions, "Active", true, "New", "first release", t(0));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
    }

    #[test]
    fn set_condition_bumps_transition_time_only_on_flip() {
        let mut conditions = vec![];
        set_condition(&mut conditions, "Active", true, "New", "m", t(0));
        set_condition(&mut conditions, "Active", true, "Still", "m2", t(100));
        assert_eq!(conditions[0].last_transition_time.0, t(0));
        set_condition(&mut conditions, "Active", false, "Superseded", "m3", t(200));
        assert_eq!(conditions[0].last_transition_time.0, t(200));
    }

    #[test]
    fn healthy_only_resolves_on_terminal_statuses() {
        assert_eq!(healthy_from_deployment_status(DeploymentStatus::Succeeded), Some(true));
        assert_eq!(healthy_from_deployment_status(DeploymentStatus::Failed), Some(false));
        assert_eq!(healthy_from_deployment_status(DeploymentStatus::InProgress), None);
    }
}

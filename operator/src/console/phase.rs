use chrono::{DateTime, Utc};
use theatre_types::ConsolePhase;

/// What's currently observed about the Pod(s) belonging to a Console's Job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodObservation {
    /// No Pod has been scheduled by the Job yet.
    None,
    /// Exactly one Pod exists.
    Single { name: String, running: bool },
    /// More than one Pod was observed for the same Job — an invariant
    /// violation that triggers abort.
    Multiple(Vec<String>),
}

/// What's currently observed about a Console's Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobObservation {
    NotFound,
    Exists { terminal: bool },
}

pub fn initial_phase(required: u32) -> ConsolePhase {
    if required > 0 {
        ConsolePhase::PendingAuthorisation
    } else {
        ConsolePhase::Pending
    }
}

pub fn is_authorised(granted: usize, required: u32) -> bool {
    granted as u32 >= required
}

/// Resolves the command to run: an explicit `spec.command` wins over the
/// template's default.
pub fn resolve_command(spec_command: &[String], default_command: &[String]) -> Vec<String> {
    if spec_command.is_empty() {
        default_command.to_vec()
    } else {
        spec_command.to_vec()
    }
}

/// `truncate(consoleName, 55) + "-console"`.
pub fn job_name(console_name: &str) -> String {
    let truncated: String = console_name.chars().take(55).collect();
    format!("{truncated}-console")
}

/// Fixed once at Job creation and never recomputed.
pub fn expiry_time(job_creation_time: DateTime<Utc>, timeout_seconds: i64) -> DateTime<Utc> {
    job_creation_time + chrono::Duration::seconds(timeout_seconds)
}

pub fn gc_deadline_pending_authorisation(
    creation_time: DateTime<Utc>,
    ttl_before_running: i64,
) -> DateTime<Utc> {
    creation_time + chrono::Duration::seconds(ttl_before_running)
}

pub fn gc_deadline_finished(
    completion_time: Option<DateTime<Utc>>,
    expiry_time: DateTime<Utc>,
    ttl_after_finished: i64,
) -> DateTime<Utc> {
    completion_time.unwrap_or(expiry_time) + chrono::Duration::seconds(ttl_after_finished)
}

pub fn is_past(now: DateTime<Utc>, deadline: DateTime<Utc>) -> bool {
    now >= deadline
}

/// Detects an abort condition: more than one Pod observed, or the observed
/// single Pod's name differs from a previously recorded non-empty
/// `status.podName`.
pub fn detect_abort(observation: &PodObservation, recorded_pod_name: &str) -> bool {
    match observation {
        PodObservation::Multiple(_) => true,
        PodObservation::Single { name, .. } => {
            !recorded_pod_name.is_empty() && name != recorded_pod_name
        }
        PodObservation::None => false,
    }
}

/// Derives the Console's phase fresh from external observations, following
/// the transition table exactly: this function is pure and does not
/// consult or mutate `status` itself.
#[allow(clippy::too_many_arguments)]
pub fn determine_phase(
    current_phase: ConsolePhase,
    authorised: bool,
    job: JobObservation,
    pod: &PodObservation,
    now: DateTime<Utc>,
    expiry: Option<DateTime<Utc>>,
) -> ConsolePhase {
    if let JobObservation::Exists { .. } = job {
        // fallthrough below
    } else if current_phase != ConsolePhase::PendingAuthorisation
        && current_phase != ConsolePhase::Pending
    {
        return ConsolePhase::Destroyed;
    }

    match current_phase {
        ConsolePhase::PendingAuthorisation => {
            if authorised {
                ConsolePhase::Pending
            } else {
                ConsolePhase::PendingAuthorisation
            }
        }
        ConsolePhase::Pending => match job {
            JobObservation::NotFound => ConsolePhase::Pending,
            JobObservation::Exists { terminal } => {
                if terminal {
                    ConsolePhase::Stopped
                } else {
                    match pod {
                        PodObservation::Single { running: true, .. } => ConsolePhase::Running,
                        _ => ConsolePhase::Pending,
                    }
                }
            }
        },
        ConsolePhase::Running => {
            let terminal = matches!(job, JobObservation::Exists { terminal: true });
            let expired = expiry.is_some_and(|e| is_past(now, e));
            if terminal || expired {
                ConsolePhase::Stopped
            } else {
                ConsolePhase::Running
            }
        }
        ConsolePhase::Stopped => ConsolePhase::Stopped,
        ConsolePhase::Destroyed => ConsolePhase::Destroyed,
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
    fn initial_phase_requires_authorisation_when_rule_requires_approvals() {
        assert_eq!(initial_phase(1), ConsolePhase::PendingAuthorisation);
        assert_eq!(initial_phase(0), ConsolePhase::Pending);
    }

    #[test]
    fn resolve_command_prefers_spec_override() {
        assert_eq!(
            resolve_command(&["psql".to_string()], &["bash".to_string()]),
            vec!["psql".to_string()]
        );
        assert_eq!(
            resolve_command(&[], &["bash".to_string()]),
            vec!["bash".to_string()]
        );
    }

    #[test]
    fn job_name_truncates_and_suffixes() {
        assert_eq!(job_name("my-console"), "my-console-console");
        let long = "a".repeat(100);
        let name = job_name(&long);
        assert_eq!(name, format!("{}-console", "a".repeat(55)));
    }

    #[test]
    fn abort_detected_on_multiple_pods() {
        assert!(detect_abort(
            &PodObservation::Multiple(vec!["a".into(), "b".into()]),
            ""
        ));
    }

    #[test]
    fn abort_detected_on_pod_name_drift() {
        assert!(detect_abort(
            &PodObservation::Single {
                name: "new-pod".into(),
                running: true
            },
            "old-pod"
        ));
        assert!(!detect_abort(
            &PodObservation::Single {
                name: "same".into(),
                running: true
            },
            "same"
        ));
    }

    #[test]
    fn no_abort_when_no_pod_recorded_yet() {
        assert!(!detect_abort(
            &PodObservation::Single {
                name: "first-pod".into(),
                running: false
            },
            ""
        ));
    }

    #[test]
    fn pending_authorisation_transitions_to_pending_once_authorised() {
        let phase = determine_phase(
            ConsolePhase::PendingAuthorisation,
            true,
            JobObservation::NotFound,
            &PodObservation::None,
            t(0),
            None,
        );
        assert_eq!(phase, ConsolePhase::Pending);
    }

    #[test]
    fn pending_transitions_to_running_once_pod_observed_running() {
        let phase = determine_phase(
            ConsolePhase::Pending,
            true,
            JobObservation::Exists { terminal: false },
            &PodObservation::Single {
                name: "p".into(),
                running: true,
            },
            t(0),
            None,
        );
        assert_eq!(phase, ConsolePhase::Running);
    }

    #[test]
    fn running_transitions_to_stopped_on_terminal_job() {
        let phase = determine_phase(
            ConsolePhase::Running,
            true,
            JobObservation::Exists { terminal: true },
            &PodObservation::Single {
                name: "p".into(),
                running: true,
            },
            t(0),
            Some(t(100)),
        );
        assert_eq!(phase, ConsolePhase::Stopped);
    }

    #[test]
    fn running_transitions_to_stopped_on_expiry() {
        let phase = determine_phase(
            ConsolePhase::Running,
            true,
            JobObservation::Exists { terminal: false },
            &PodObservation::Single {
                name: "p".into(),
                running: true,
            },
            t(200),
            Some(t(100)),
        );
        assert_eq!(phase, ConsolePhase::Stopped);
    }

    #[test]
    fn job_not_found_destroys_pending_or_running_console() {
        let phase = determine_phase(
            ConsolePhase::Running,
            true,
            JobObservation::NotFound,
            &PodObservation::None,
            t(0),
            Some(t(100)),
        );
        assert_eq!(phase, ConsolePhase::Destroyed);
    }

    #[test]
    fn gc_deadline_uses_expiry_when_completion_time_absent() {
        let deadline = gc_deadline_finished(None, t(100), 60);
        assert_eq!(deadline, t(160));
    }
}

pub mod colors;
pub mod error;
pub mod patch;
#[cfg(feature = "metrics")]
pub mod metrics;

use std::time::Duration;

pub use error::Error;

/// Interval at which reconcilers requeue in the absence of any other
/// trigger, so that time-based transitions (timeouts, TTLs, expiry) are
/// still observed even when the cluster is otherwise quiet.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Field manager name used on every server-side apply / status patch, so
/// that ownership conflicts are attributed to this controller rather than
/// `kubectl` or other actors.
pub const MANAGER_NAME: &str = "theatre-operator";

/// Hashes a serializable spec into a short hex digest, used to detect
/// whether a dependent object (Job, RoleBinding) needs to be recreated
/// because its owning spec changed.
pub fn hash_spec<T: serde::Serialize>(spec: &T) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(spec).expect("spec always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_spec_is_stable() {
        let a = hash_spec(&serde_json::json!({"x": 1, "y": 2}));
        let b = hash_spec(&serde_json::json!({"x": 1, "y": 2}));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_spec_changes_with_content() {
        let a = hash_spec(&serde_json::json!({"x": 1}));
        let b = hash_spec(&serde_json::json!({"x": 2}));
        assert_ne!(a, b);
    }
}

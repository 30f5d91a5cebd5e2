use sha2::{Digest, Sha256};

use crate::release::Revision;

/// Length, in hex characters, of the hash suffix appended to a release name.
const HASH_PREFIX_LEN: usize = 7;

/// Derives the deterministic release name `{targetName}-{hash}` where hash
/// is a 7-char prefix of SHA-256 over the canonical serialisation of
/// `targetName` plus each revision's `(name, id)` tuple, sorted by
/// revision name. Stable under revision reordering and idempotent when
/// called again on an already-named release.
pub fn release_name(target_name: &str, revisions: &[Revision]) -> String {
    let mut sorted: Vec<&Revision> = revisions.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    hasher.update(target_name.as_bytes());
    for revision in &sorted {
        hasher.update(b"\0");
        hasher.update(revision.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(revision.id.as_bytes());
    }
    let digest = hasher.finalize();
    let hash = hex::encode(digest);
    format!("{target_name}-{}", &hash[..HASH_PREFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revision(name: &str, id: &str) -> Revision {
        Revision {
            name: name.to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn stable_under_revision_reordering() {
        let a = release_name("web", &[revision("api", "1"), revision("ui", "2")]);
        let b = release_name("web", &[revision("ui", "2"), revision("api", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn equal_configs_produce_equal_names() {
        let a = release_name("web", &[revision("api", "1")]);
        let b = release_name("web", &[revision("api", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_revisions_produce_different_names() {
        let a = release_name("web", &[revision("api", "1")]);
        let b = release_name("web", &[revision("api", "2")]);
        assert_ne!(a, b);
    }

    #[test]
    fn name_has_expected_shape() {
        let name = release_name("web", &[revision("api", "1")]);
        let (target, hash) = name.rsplit_once('-').unwrap();
        assert_eq!(target, "web");
        assert_eq!(hash.len(), HASH_PREFIX_LEN);
    }
}

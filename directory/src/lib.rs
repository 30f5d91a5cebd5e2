//! Resolves abstract "group" subjects into concrete user subjects, with a
//! TTL-caching decorator bounding pressure on the underlying provider.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::Subject;
use theatre_types::GROUP_SUBJECT_KIND;

pub mod http;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("directory provider request failed: {0}")]
    Provider(String),

    #[error("http error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

/// Resolves group membership. Implementations may require scoped
/// credentials and impersonation of a subject principal; those concerns
/// are opaque to callers of this trait.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn members_of(&self, group: &str) -> Result<Vec<String>, Error>;
}

/// Default time a resolved group's membership is considered fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    members: Vec<String>,
    expires_at: Instant,
}

/// Wraps an underlying [`Directory`], caching each group's members with a
/// TTL. Failures are not cached: a provider error is simply propagated,
/// leaving any still-valid cache entry (or the miss) untouched so the next
/// call retries against the provider.
pub struct CachedDirectory<D> {
    inner: D,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<D: Directory> CachedDirectory<D> {
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(inner: D) -> Self {
        Self::new(inner, DEFAULT_CACHE_TTL)
    }

    fn cached(&self, group: &str) -> Option<Vec<String>> {
        let cache = self.cache.lock().expect("directory cache lock poisoned");
        cache
            .get(group)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.members.clone())
    }

    fn store(&self, group: &str, members: Vec<String>) {
        let mut cache = self.cache.lock().expect("directory cache lock poisoned");
        cache.insert(
            group.to_string(),
            CacheEntry {
                members,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[async_trait]
impl<D: Directory> Directory for CachedDirectory<D> {
    async fn members_of(&self, group: &str) -> Result<Vec<String>, Error> {
        if let Some(members) = self.cached(group) {
            return Ok(members);
        }
        let members = self.inner.members_of(group).await?;
        self.store(group, members.clone());
        Ok(members)
    }
}

/// Substitutes any subject of kind `"Group"` with the users returned by
/// `directory.members_of`; non-group subjects pass through unchanged.
/// De-duplicates by the `(kind, name, namespace)` triple, preserving the
/// order subjects were first seen in.
pub async fn resolve_subjects(
    directory: &dyn Directory,
    subjects: &[Subject],
) -> Result<Vec<Subject>, Error> {
    let mut resolved = Vec::new();
    let mut seen: HashSet<(String, String, Option<String>)> = HashSet::new();

    let mut push = |resolved: &mut Vec<Subject>, seen: &mut HashSet<_>, subject: Subject| {
        let key = (
            subject.kind.clone(),
            subject.name.clone(),
            subject.namespace.clone(),
        );
        if seen.insert(key) {
            resolved.push(subject);
        }
    };

    for subject in subjects {
        if subject.kind == GROUP_SUBJECT_KIND {
            for member in directory.members_of(&subject.name).await? {
                push(
                    &mut resolved,
                    &mut seen,
                    Subject {
                        kind: "User".to_string(),
                        name: member,
                        namespace: None,
                        ..Default::default()
                    },
                );
            }
        } else {
            push(&mut resolved, &mut seen, subject.clone());
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
        members: Vec<String>,
    }

    #[async_trait]
    impl Directory for CountingDirectory {
        async fn members_of(&self, _group: &str) -> Result<Vec<String>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.members.clone())
        }
    }

    fn subject(kind: &str, name: &str) -> Subject {
        Subject {
            kind: kind.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let inner = CountingDirectory {
            calls: AtomicUsize::new(0),
            members: vec!["alice".to_string()],
        };
        let cached = CachedDirectory::new(inner, Duration::from_secs(60));
        cached.members_of("team-a").await.unwrap();
        cached.members_of("team-a").await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_expiry() {
        let inner = CountingDirectory {
            calls: AtomicUsize::new(0),
            members: vec!["alice".to_string()],
        };
        let cached = CachedDirectory::new(inner, Duration::from_millis(1));
        cached.members_of("team-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cached.members_of("team-a").await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn substitutes_group_subjects_and_dedupes() {
        let inner = CountingDirectory {
            calls: AtomicUsize::new(0),
            members: vec!["alice".to_string(), "bob".to_string()],
        };
        let cached = CachedDirectory::new(inner, Duration::from_secs(60));
        let subjects = vec![
            subject("Group", "team-a"),
            subject("User", "alice"),
            subject("User", "carol"),
        ];
        let resolved = resolve_subjects(&cached, &subjects).await.unwrap();
        let names: Vec<_> = resolved.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}

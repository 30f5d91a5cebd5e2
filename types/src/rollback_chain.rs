use std::collections::HashSet;

/// The subset of a Release's state the chain walk needs, decoupled from
/// `kube::Api` so the walk is unit-testable without a cluster.
#[derive(Debug, Clone)]
pub struct ReleaseNode {
    pub healthy: bool,
    pub previous_release_ref: Option<String>,
}

/// Walks the chain of previous releases starting at `start_previous_ref`,
/// returning the name of the first release whose `Healthy` condition is
/// `True`. Guards against cycles with a visited set; a cycle or a dangling
/// reference resolves to `None`, in which case the caller (the
/// `/mutate-rollbacks` webhook) denies the request.
pub fn select_rollback_target<F>(
    start_previous_ref: Option<String>,
    mut lookup: F,
) -> Option<String>
where
    F: FnMut(&str) -> Option<ReleaseNode>,
{
    let mut visited = HashSet::new();
    let mut current = start_previous_ref?;
    loop {
        if !visited.insert(current.clone()) {
            return None;
        }
        let node = lookup(&current)?;
        if node.healthy {
            return Some(current);
        }
        current = node.previous_release_ref?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chain(entries: &[(&str, bool, Option<&str>)]) -> HashMap<String, ReleaseNode> {
        entries
            .iter()
            .map(|(name, healthy, prev)| {
                (
                    name.to_string(),
                    ReleaseNode {
                        healthy: *healthy,
                        previous_release_ref: prev.map(|s| s.to_string()),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn walks_past_unhealthy_to_nearest_healthy() {
        // v1 (Healthy=True, no previous) <- v2 (Healthy=False) <- v3 (active)
        let graph = chain(&[("v1", true, None), ("v2", false, Some("v1"))]);
        let target =
            select_rollback_target(Some("v2".to_string()), |name| graph.get(name).cloned());
        assert_eq!(target, Some("v1".to_string()));
    }

    #[test]
    fn stops_at_nearest_healthy_release() {
        let graph = chain(&[("v1", true, None), ("v2", true, Some("v1"))]);
        let target =
            select_rollback_target(Some("v2".to_string()), |name| graph.get(name).cloned());
        assert_eq!(target, Some("v2".to_string()));
    }

    #[test]
    fn cycle_is_detected_and_denied() {
        let graph = chain(&[("v1", false, Some("v2")), ("v2", false, Some("v1"))]);
        let target =
            select_rollback_target(Some("v1".to_string()), |name| graph.get(name).cloned());
        assert_eq!(target, None);
    }

    #[test]
    fn no_healthy_release_is_denied() {
        let graph = chain(&[("v1", false, None)]);
        let target =
            select_rollback_target(Some("v1".to_string()), |name| graph.get(name).cloned());
        assert_eq!(target, None);
    }

    #[test]
    fn no_previous_release_is_denied() {
        let target = select_rollback_target(None, |_: &str| None);
        assert_eq!(target, None);
    }
}

//! `/mutate-rollbacks` — auto-selects `spec.toReleaseRef` by walking the
//! active release's previous-release chain when left empty, per §4.4.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use kube::Api;
use kube::api::ListParams;
use kube::core::admission::AdmissionReview;
use theatre_types::release::{CONDITION_HEALTHY, condition_true};
use theatre_types::rollback_chain::{ReleaseNode, select_rollback_target};
use theatre_types::{Release, Rollback};

use crate::AppState;
use crate::admission::{allow, allow_with_patch, decode, deny};

pub async fn mutate(State(state): State<AppState>, Json(review): Json<AdmissionReview<Rollback>>) -> Json<AdmissionReview<Rollback>> {
    let req = match decode(review) {
        Ok(req) => req,
        Err(rejected) => return Json(rejected),
    };

    let Some(rollback) = &req.object else {
        return Json(deny(&req, "no object in request"));
    };

    if !rollback.spec.to_release_ref.is_empty() {
        return Json(allow(&req));
    }

    let namespace = req.namespace.clone().unwrap_or_default();
    let releases: Api<Release> = Api::namespaced(state.client.clone(), &namespace);

    let active = match releases.get(&rollback.spec.release_ref).await {
        Ok(release) => release,
        Err(err) => return Json(deny(&req, format!("failed to fetch releaseRef {}: {err}", rollback.spec.release_ref))),
    };

    let all = match releases.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(err) => return Json(deny(&req, format!("failed to list releases in {namespace}: {err}"))),
    };

    let graph: HashMap<String, ReleaseNode> = all
        .items
        .into_iter()
        .filter_map(|release| {
            let name = release.metadata.name?;
            let status = release.status.unwrap_or_default();
            Some((
                name,
                ReleaseNode {
                    healthy: condition_true(&status.conditions, CONDITION_HEALTHY),
                    previous_release_ref: status.previous_release.release_ref,
                },
            ))
        })
        .collect();

    let target = select_rollback_target(active.status.and_then(|s| s.previous_release.release_ref), |name| graph.get(name).cloned());

    match target {
        Some(target) => Json(allow_with_patch(&req, "/spec/toReleaseRef", serde_json::Value::String(target))),
        None => Json(deny(&req, "no healthy release found in the previous-release chain")),
    }
}

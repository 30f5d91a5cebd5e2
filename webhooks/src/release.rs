//! `/mutate-releases` and `/validate-releases` — deterministic release
//! naming and post-creation immutability of the fields that feed it.

use axum::Json;
use axum::extract::State;
use kube::core::admission::{AdmissionReview, Operation};
use theatre_types::Release;
use theatre_types::naming::release_name;

use crate::AppState;
use crate::admission::{allow, allow_with_patch, decode, deny};

pub async fn mutate(State(_state): State<AppState>, Json(review): Json<AdmissionReview<Release>>) -> Json<AdmissionReview<Release>> {
    let req = match decode(review) {
        Ok(req) => req,
        Err(rejected) => return Json(rejected),
    };

    let Some(release) = &req.object else {
        return Json(deny(&req, "no object in request"));
    };

    let name = release_name(&release.spec.target_name, &release.spec.revisions);
    Json(allow_with_patch(&req, "/metadata/name", serde_json::Value::String(name)))
}

pub async fn validate(State(_state): State<AppState>, Json(review): Json<AdmissionReview<Release>>) -> Json<AdmissionReview<Release>> {
    let req = match decode(review) {
        Ok(req) => req,
        Err(rejected) => return Json(rejected),
    };

    if req.operation != Operation::Update {
        return Json(allow(&req));
    }

    let (Some(old), Some(new)) = (&req.old_object, &req.object) else {
        return Json(deny(&req, "update request missing old or new object"));
    };

    if old.spec.target_name != new.spec.target_name {
        return Json(deny(&req, "targetName is immutable"));
    }

    if old.spec.revisions.len() != new.spec.revisions.len()
        || old
            .spec
            .revisions
            .iter()
            .zip(new.spec.revisions.iter())
            .any(|(a, b)| a.name != b.name || a.id != b.id)
    {
        return Json(deny(&req, "revision name/id are immutable after creation"));
    }

    Json(allow(&req))
}

//! `/validate-consoletemplates` — rejects pod templates with zero
//! containers and authorisation rule lists with duplicate matchers.

use axum::Json;
use axum::extract::State;
use kube::core::admission::AdmissionReview;
use theatre_types::ConsoleTemplate;

use crate::AppState;
use crate::admission::{allow, decode, deny};

pub async fn validate(
    State(_state): State<AppState>,
    Json(review): Json<AdmissionReview<ConsoleTemplate>>,
) -> Json<AdmissionReview<ConsoleTemplate>> {
    let req = match decode(review) {
        Ok(req) => req,
        Err(rejected) => return Json(rejected),
    };

    let Some(template) = &req.object else {
        return Json(deny(&req, "no object in request"));
    };

    let has_containers = template
        .spec
        .template
        .spec
        .as_ref()
        .is_some_and(|pod_spec| !pod_spec.containers.is_empty());
    if !has_containers {
        return Json(deny(&req, "template pod spec must declare at least one container"));
    }

    if template.spec.has_duplicate_matchers() {
        return Json(deny(&req, "authorisationRules contains two rules with identical matchers"));
    }

    Json(allow(&req))
}

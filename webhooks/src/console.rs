//! `/mutate-consoles` — stamps the requesting identity into `spec.user`,
//! overwriting any client-supplied value, per §4.2's authenticator rule.
//! Also clamps `spec.timeoutSeconds` against the referenced template's
//! `defaultTimeoutSeconds`/`maxTimeoutSeconds` bounds.

use axum::Json;
use axum::extract::State;
use kube::Api;
use kube::core::admission::AdmissionReview;
use theatre_types::{Console, ConsoleTemplate};

use crate::AppState;
use crate::admission::{allow_with_patches, decode, deny, requester};

pub async fn mutate(State(state): State<AppState>, Json(review): Json<AdmissionReview<Console>>) -> Json<AdmissionReview<Console>> {
    let req = match decode(review) {
        Ok(req) => req,
        Err(rejected) => return Json(rejected),
    };

    let username = requester(&req);
    if username.is_empty() {
        return Json(deny(&req, "admission request carries no userInfo.username"));
    }

    let Some(console) = req.object.as_ref() else {
        return Json(deny(&req, "admission request carries no object"));
    };

    let namespace = req.namespace.clone().unwrap_or_default();
    let templates: Api<ConsoleTemplate> = Api::namespaced(state.client.clone(), &namespace);
    let template = match templates.get(&console.spec.template_ref).await {
        Ok(template) => template,
        Err(err) => return Json(deny(&req, format!("failed to fetch templateRef {}: {err}", console.spec.template_ref))),
    };

    let timeout_seconds = template.spec.effective_timeout_seconds(console.spec.timeout_seconds);

    Json(allow_with_patches(
        &req,
        vec![
            ("/spec/user".to_string(), serde_json::Value::String(username)),
            ("/spec/timeoutSeconds".to_string(), serde_json::Value::from(timeout_seconds)),
        ],
    ))
}

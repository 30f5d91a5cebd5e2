//! `/validate-consoleauthorisations` — enforces the append-only update
//! policy from §4.2: a single appended subject, named after the
//! requester, who must not be the Console's own owner.

use axum::Json;
use axum::extract::State;
use kube::Api;
use kube::core::admission::{AdmissionReview, Operation};
use theatre_types::{Console, ConsoleAuthorisation};

use crate::AppState;
use crate::admission::{allow, decode, deny, requester};

pub async fn validate(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview<ConsoleAuthorisation>>,
) -> Json<AdmissionReview<ConsoleAuthorisation>> {
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

    if old.spec.console_ref != new.spec.console_ref {
        return Json(deny(&req, "consoleRef is immutable"));
    }

    let appended = match theatre_types::console_authorisation::is_single_append(&old.spec.authorisations, &new.spec.authorisations) {
        Ok(subject) => subject,
        Err(message) => return Json(deny(&req, message)),
    };

    let username = requester(&req);
    if appended.name != username {
        return Json(deny(
            &req,
            format!("appended authorisation name {:?} does not match requesting identity {username:?}", appended.name),
        ));
    }

    let namespace = req.namespace.clone().unwrap_or_default();
    let consoles: Api<Console> = Api::namespaced(state.client.clone(), &namespace);
    let console = match consoles.get(&new.spec.console_ref).await {
        Ok(console) => console,
        Err(err) => return Json(deny(&req, format!("failed to fetch consoleRef {}: {err}", new.spec.console_ref))),
    };

    if console.spec.user == username {
        return Json(deny(&req, "a user may not approve their own console"));
    }

    Json(allow(&req))
}

//! Shared plumbing for the six admission handlers: decode the envelope,
//! build allow/deny/patch responses. Mirrors the
//! `AdmissionReview`/`AdmissionRequest`/`AdmissionResponse` dance shown in
//! this pack's reference webhook handler, adapted from `warp` to `axum`.

use json_patch::{AddOperation, Patch, PatchOperation};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use owo_colors::OwoColorize;
use serde::de::DeserializeOwned;

/// Decodes the incoming review into a typed request, or short-circuits
/// with an `invalid` response when the envelope itself is malformed.
pub fn decode<T>(review: AdmissionReview<T>) -> Result<AdmissionRequest<T>, AdmissionReview<T>>
where
    T: Clone + DeserializeOwned,
{
    review.try_into().map_err(|err| {
        eprintln!("{}", format!("rejected malformed admission request: {err}").red());
        AdmissionResponse::invalid(format!("invalid admission request: {err}")).into_review()
    })
}

/// Denies the request with `message`, logging it the way the reconcilers
/// log non-NoOp actions.
pub fn deny<T>(req: &AdmissionRequest<T>, message: impl Into<String>) -> AdmissionReview<T> {
    let message = message.into();
    eprintln!(
        "{}",
        format!("DENY {}/{}: {message}", req.namespace.as_deref().unwrap_or(""), req.name).yellow()
    );
    AdmissionResponse::from(req).deny(message).into_review()
}

/// Allows the request unchanged.
pub fn allow<T>(req: &AdmissionRequest<T>) -> AdmissionReview<T> {
    AdmissionResponse::from(req).into_review()
}

/// Allows the request with a single `add` patch applied at `path` (a JSON
/// pointer, already `~1`-escaped by the caller). Patching an
/// already-correct value is harmless since the result is identical
/// either way, which is what makes the release-naming mutation
/// idempotent.
pub fn allow_with_patch<T>(req: &AdmissionRequest<T>, path: &str, value: serde_json::Value) -> AdmissionReview<T> {
    allow_with_patches(req, vec![(path.to_string(), value)])
}

/// Allows the request with an `add` patch at each `(path, value)` pair,
/// for handlers that need to stamp more than one field in a single
/// response (e.g. the Console authenticator also clamping `timeoutSeconds`).
pub fn allow_with_patches<T>(req: &AdmissionRequest<T>, ops: Vec<(String, serde_json::Value)>) -> AdmissionReview<T> {
    let patch = Patch(
        ops.into_iter()
            .map(|(path, value)| {
                PatchOperation::Add(AddOperation {
                    path: path.parse().expect("webhook patch paths are static and well-formed"),
                    value,
                })
            })
            .collect(),
    );
    match AdmissionResponse::from(req).with_patch(patch) {
        Ok(resp) => resp.into_review(),
        Err(err) => {
            eprintln!("{}", format!("failed to build admission patch: {err}").red());
            AdmissionResponse::invalid(format!("failed to build patch: {err}")).into_review()
        }
    }
}

/// The requesting identity, or an empty string when absent — callers
/// that care (the authenticator) reject an empty username explicitly
/// rather than treating it as a valid anonymous user.
pub fn requester<T>(req: &AdmissionRequest<T>) -> String {
    req.user_info.username.clone().unwrap_or_default()
}

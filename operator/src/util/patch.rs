use std::fmt::Debug;

use kube::{
    Api, Client, Error,
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};

use super::MANAGER_NAME;

/// Returns a mutable reference to the resource's status, initialising it
/// with the default value if absent.
pub trait HasStatus<S> {
    fn mut_status(&mut self) -> &mut S;
}

/// Patches the resource's status object with the provided function. The
/// function receives a mutable reference to the status, to be mutated
/// in-place; the diff is computed and sent as a JSON merge patch via
/// `patch_status`, matching this codebase's existing controllers.
pub async fn patch_status<S, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + HasStatus<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}

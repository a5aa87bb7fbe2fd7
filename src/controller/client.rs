//! Kubernetes access used by the Fufu controller
//!
//! Everything the reconciler reads or writes goes through [`FufuKubeClient`]
//! so tests can swap in a mock or the in-memory cluster. Dependents travel as
//! [`DynamicObject`]s addressed by an [`ApiResource`]; that keeps the trait
//! object-safe while the converger stays generic over the concrete kinds.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Fufu, FufuStatus};
use crate::Error;

/// Trait abstracting Kubernetes client operations for the Fufu controller
///
/// Not-found is never an error: reads return `None` instead.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FufuKubeClient: Send + Sync {
    /// Read a Fufu by name
    async fn get_fufu(&self, name: &str, namespace: &str) -> Result<Option<Fufu>, Error>;

    /// Merge-patch the status subresource of a Fufu
    ///
    /// The patch carries the Fufu's `resourceVersion`; a stale copy is
    /// rejected with [`Error::Conflict`]. Returns the updated Fufu.
    async fn patch_fufu_status(&self, fufu: &Fufu, status: &FufuStatus) -> Result<Fufu, Error>;

    /// Read a dependent by kind, namespace and name
    async fn get_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create a dependent
    ///
    /// Losing a creation race yields [`Error::AlreadyExists`].
    async fn create_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Replace a dependent, guarded by the `resourceVersion` in `object`
    ///
    /// A stale `resourceVersion` yields [`Error::Conflict`].
    async fn replace_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}

/// Real Kubernetes client implementation
pub struct FufuKubeClientImpl {
    client: Client,
    field_manager: String,
}

impl FufuKubeClientImpl {
    /// Create a new client recording writes under `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

/// Translate 409 responses into the controller's own error kinds
fn map_write_error(err: kube::Error, kind: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            Error::already_exists(kind, name)
        }
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(kind, name, ae.message),
        other => Error::Kube(other),
    }
}

fn object_name(object: &DynamicObject) -> Result<String, Error> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::validation("dependent has no metadata.name"))
}

#[async_trait]
impl FufuKubeClient for FufuKubeClientImpl {
    async fn get_fufu(&self, name: &str, namespace: &str) -> Result<Option<Fufu>, Error> {
        let api: Api<Fufu> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_fufu_status(&self, fufu: &Fufu, status: &FufuStatus) -> Result<Fufu, Error> {
        let name = fufu.name_any();
        let namespace = fufu
            .namespace()
            .ok_or_else(|| Error::validation(format!("Fufu '{name}' has no namespace")))?;
        let api: Api<Fufu> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({
            "metadata": { "resourceVersion": fufu.resource_version() },
            "status": status,
        });
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };

        api.patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, "Fufu", &name))
    }

    async fn get_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self.dynamic_api(resource, namespace).get_opt(name).await?)
    }

    async fn create_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = object_name(object)?;
        self.dynamic_api(resource, namespace)
            .create(&self.post_params(), object)
            .await
            .map_err(|e| map_write_error(e, &resource.kind, &name))
    }

    async fn replace_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = object_name(object)?;
        self.dynamic_api(resource, namespace)
            .replace(&name, &self.post_params(), object)
            .await
            .map_err(|e| map_write_error(e, &resource.kind, &name))
    }
}

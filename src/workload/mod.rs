//! Desired-state builders for the resources a Fufu owns
//!
//! Every Fufu is backed by three dependents, all living in the Fufu's
//! namespace and named after it:
//! - Deployment `<name>-deploy`: nginx serving a page rendered from the spec
//! - Service `<name>-svc`: LoadBalancer in front of the Deployment
//! - HorizontalPodAutoscaler `<name>-hpa`: scales the Deployment on CPU
//!
//! The builders are pure functions of the Fufu. The [`Dependent`] trait adds
//! the per-kind knowledge the converger needs on top of them: which fields the
//! platform owns and what status, if any, flows back onto the Fufu.

mod autoscaler;
mod deployment;
mod service;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{Fufu, FufuStatus};
use crate::Error;

pub use autoscaler::{CPU_TARGET_PERCENT, MAX_REPLICAS, MIN_REPLICAS};
pub use deployment::{CONTENT_TEMPLATE_URL, CONTENT_VOLUME, INIT_CONTAINER, WEB_CONTAINER};
pub use service::SERVICE_PORT;

/// Label key selecting the pods of a Fufu's Deployment
pub const APP_LABEL_KEY: &str = "app";

/// Name of the Deployment owned by a Fufu
pub fn deployment_name(fufu_name: &str) -> String {
    format!("{fufu_name}-deploy")
}

/// Name of the Service owned by a Fufu
pub fn service_name(fufu_name: &str) -> String {
    format!("{fufu_name}-svc")
}

/// Name of the HorizontalPodAutoscaler owned by a Fufu
pub fn autoscaler_name(fufu_name: &str) -> String {
    format!("{fufu_name}-hpa")
}

/// Value of the `app` label shared by the Deployment's pods and the Service selector
///
/// The Service finds the pods through this label only; there is no stored
/// reference between the two objects.
pub fn app_label(fufu_name: &str) -> String {
    deployment_name(fufu_name)
}

/// Metadata for a dependent: name and namespace, nothing else
///
/// Owner references are attached by the converger, not the builders.
fn dependent_meta(fufu: &Fufu, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: fufu.namespace(),
        ..Default::default()
    }
}

/// A change to the Fufu's status observed on one of its dependents
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reflection {
    /// The Deployment reports a different replica count
    Replicas(i32),
    /// The Service was assigned an external address
    ExternalIp(String),
}

impl Reflection {
    /// Apply this change to a status
    pub fn apply(&self, status: &mut FufuStatus) {
        match self {
            Reflection::Replicas(replicas) => status.replicas = *replicas,
            Reflection::ExternalIp(ip) => status.external_ip = Some(ip.clone()),
        }
    }

    /// Event reason published when this change is written
    pub fn reason(&self) -> &'static str {
        match self {
            Reflection::Replicas(_) => crate::events::reasons::REPLICAS_UPDATED,
            Reflection::ExternalIp(_) => crate::events::reasons::EXTERNAL_IP_UPDATED,
        }
    }

    /// Human-readable description of the change
    pub fn note(&self) -> String {
        match self {
            Reflection::Replicas(replicas) => format!("Replicas updated to {replicas}"),
            Reflection::ExternalIp(ip) => format!("External IP updated to {ip}"),
        }
    }
}

/// A resource kind owned by a Fufu
///
/// Implemented for the three k8s-openapi types the operator manages. The
/// converger is written once against this trait.
pub trait Dependent:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Name of the dependent owned by the given Fufu
    fn dependent_name(fufu_name: &str) -> String;

    /// Build the desired object for a Fufu
    fn build(fufu: &Fufu) -> Self;

    /// Copy platform-owned fields from the observed object into an update
    ///
    /// The update replaces the whole spec, so anything the builder leaves
    /// unset but the platform (or another controller) fills in must be
    /// carried over here or the write would clear it.
    fn carry_over(_update: &mut Self, _observed: &Self) {}

    /// Status change implied by the observed object, if it differs from `status`
    fn reflect_status(_observed: &Self, _status: &FufuStatus) -> Option<Reflection> {
        None
    }

    /// The object's `spec` as JSON, `Null` when it has none
    fn spec_value(&self) -> Result<serde_json::Value, Error> {
        let mut value = serde_json::to_value(self).map_err(|e| {
            Error::serialization(format!(
                "failed to serialize {} '{}': {e}",
                Self::kind(&()),
                self.name_any()
            ))
        })?;
        Ok(value
            .get_mut("spec")
            .map(serde_json::Value::take)
            .unwrap_or_default())
    }
}

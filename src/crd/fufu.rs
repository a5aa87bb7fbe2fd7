//! Fufu Custom Resource Definition
//!
//! A Fufu describes a cat: its fur color, weight, age and an optional block
//! of additional information. The operator turns each Fufu into a web
//! Deployment that serves a page about the cat, a LoadBalancer Service in
//! front of it, and a HorizontalPodAutoscaler for the Deployment.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Fufu resource
pub const FUFU_GROUP: &str = "cat.huozj.io";

/// API version of the Fufu resource
pub const FUFU_VERSION: &str = "v1alpha2";

/// Specification for a Fufu
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cat.huozj.io",
    version = "v1alpha2",
    kind = "Fufu",
    plural = "fufus",
    shortname = "fufu",
    status = "FufuStatus",
    namespaced,
    printcolumn = r#"{"name":"Color","type":"string","jsonPath":".spec.color"}"#,
    printcolumn = r#"{"name":"Replicas","type":"string","jsonPath":".status.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FufuSpec {
    /// Fur color
    pub color: String,

    /// Weight, free-form (e.g. "5kg")
    pub weight: String,

    /// Age in years
    pub age: i64,

    /// Additional information about the cat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<AdditionalInfo>,
}

impl FufuSpec {
    /// Breed from the info block, empty when the block is absent
    pub fn breed(&self) -> &str {
        self.info.as_ref().map(|i| i.breed.as_str()).unwrap_or_default()
    }
}

/// Optional details about a Fufu
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInfo {
    /// Breed of the cat
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub breed: String,

    /// Whether the cat is vaccinated
    #[serde(default)]
    pub vaccinated: bool,
}

/// Observed state of a Fufu, reflected from its dependents
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct FufuStatus {
    /// Externally reachable address assigned to the Service
    #[serde(
        rename = "externalIP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_ip: Option<String>,

    /// Replica count last observed on the Deployment
    #[serde(default)]
    pub replicas: i32,
}

impl FufuStatus {
    /// Set the replica count and return self for chaining
    pub fn replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the external IP and return self for chaining
    pub fn external_ip(mut self, ip: impl Into<String>) -> Self {
        self.external_ip = Some(ip.into());
        self
    }
}

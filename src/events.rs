//! Kubernetes Events published on Fufus
//!
//! Creates, rewrites, failed creates and status changes of a Fufu's
//! dependents show up under `kubectl describe fufu`. Publishing never fails a
//! reconcile; a rejected Event is only logged.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for Events about a Fufu
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `reason`/`note` on the object behind `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the kube-runtime [`Recorder`]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `controller_name`, with the pod name as instance when
    /// `POD_NAME` is set by the Deployment
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, error = %e, "dropping fufu event");
        }
    }
}

/// Publisher that drops everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons (the REASON column of `kubectl get events`)
pub mod reasons {
    /// A dependent was created
    pub const CREATED: &str = "Created";
    /// A drifted dependent was rewritten
    pub const UPDATED: &str = "Updated";
    /// Creating a dependent failed; it is retried on the next pass
    pub const CREATE_FAILED: &str = "CreateFailed";
    /// `status.replicas` now follows the Deployment
    pub const REPLICAS_UPDATED: &str = "ReplicasUpdated";
    /// `status.externalIP` now follows the Service
    pub const EXTERNAL_IP_UPDATED: &str = "ExternalIPUpdated";
}

/// Event actions
pub mod actions {
    /// A reconcile pass
    pub const RECONCILE: &str = "Reconcile";
}

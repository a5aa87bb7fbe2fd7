//! Fufu controller implementation
//!
//! This module implements the reconciliation logic for Fufu resources. Each
//! pass re-reads the Fufu, then converges its Deployment, Service and
//! HorizontalPodAutoscaler in that order. Nothing is persisted between passes:
//! every decision is made from what the API server reports right now.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{FufuKubeClient, FufuKubeClientImpl};
use super::converge::{converge, Convergence};
use crate::config::ReconcileSettings;
use crate::crd::Fufu;
use crate::events::{EventPublisher, KubeEventPublisher};
#[cfg(test)]
use crate::events::NoopEventPublisher;
use crate::{Error, Result};

/// Controller context containing shared state and clients
///
/// The context is shared across all reconciliation calls and holds
/// resources that are expensive to create (like Kubernetes clients).
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .field_manager("fufu-controller")
///     .settings(config.reconcile_settings())
///     .build();
/// ```
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn FufuKubeClient>,
    /// Publisher for Kubernetes Events on the Fufu
    pub events: Arc<dyn EventPublisher>,
    /// Requeue timing
    pub settings: ReconcileSettings,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with a custom client
    ///
    /// Events are dropped and default timing is used.
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn FufuKubeClient>) -> Self {
        Self {
            kube,
            events: Arc::new(NoopEventPublisher),
            settings: ReconcileSettings::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    field_manager: String,
    settings: ReconcileSettings,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: crate::config::DEFAULT_FIELD_MANAGER.to_string(),
            settings: ReconcileSettings::default(),
        }
    }

    /// Set the field manager used for writes and as the event reporter
    pub fn field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// Set requeue timing
    pub fn settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: Arc::new(FufuKubeClientImpl::new(
                self.client.clone(),
                self.field_manager.clone(),
            )),
            events: Arc::new(KubeEventPublisher::new(self.client, &self.field_manager)),
            settings: self.settings,
        }
    }
}

/// What the convergences of one pass left to do
#[derive(Default)]
struct PassOutcome {
    /// First create failure, returned once every dependent had its turn
    deferred: Option<Error>,
    /// A create lost a race; the winner still has to be diffed and adopted
    raced: bool,
}

impl PassOutcome {
    fn record(&mut self, outcome: Convergence) {
        match outcome {
            Convergence::CreateDeferred(err) => {
                if self.deferred.is_none() {
                    self.deferred = Some(err);
                }
            }
            Convergence::CreateRaced => self.raced = true,
            Convergence::Created | Convergence::Updated | Convergence::Unchanged => {}
        }
    }
}

/// Reconcile a Fufu resource
///
/// Converges the Deployment, Service and HorizontalPodAutoscaler owned by
/// the Fufu and reflects the Deployment's replicas and the Service's
/// external address onto its status.
///
/// # Returns
///
/// `Action::await_change()` once everything converged (or a requeue after
/// the resync interval when one is configured), or the first error. A failed
/// create does not stop the remaining dependents; it is reported after them.
/// A create that lost a race requeues after the conflict delay.
#[instrument(
    skip(fufu, ctx),
    fields(fufu = %fufu.name_any(), namespace = %fufu.namespace().unwrap_or_default())
)]
pub async fn reconcile(fufu: Arc<Fufu>, ctx: Arc<Context>) -> Result<Action> {
    let name = fufu.name_any();
    let namespace = fufu
        .namespace()
        .ok_or_else(|| Error::validation(format!("Fufu '{name}' has no namespace")))?;

    // the watch cache may lag behind the API server
    let Some(mut current) = ctx.kube.get_fufu(&name, &namespace).await? else {
        debug!("fufu is gone, dependents are garbage collected");
        return Ok(Action::await_change());
    };
    if current.uid().is_none() {
        return Err(Error::validation(format!("Fufu '{name}' has no uid")));
    }

    info!("reconciling fufu");

    let mut pass = PassOutcome::default();
    pass.record(converge::<Deployment>(&mut current, &ctx).await?);
    pass.record(converge::<Service>(&mut current, &ctx).await?);
    pass.record(converge::<HorizontalPodAutoscaler>(&mut current, &ctx).await?);

    if let Some(err) = pass.deferred {
        return Err(err);
    }
    // the winner may not be owned by this Fufu, so no watch event brings us back
    if pass.raced {
        debug!("create raced, requeueing to diff against the winner");
        return Ok(Action::requeue(ctx.settings.conflict_requeue));
    }

    Ok(match ctx.settings.resync {
        Some(interval) => Action::requeue(interval),
        None => Action::await_change(),
    })
}

/// Decide when to retry a failed reconciliation
///
/// Conflicts come back quickly since re-reading is all they need. Other
/// retryable errors wait for the configured backoff; permanent ones wait for
/// the Fufu to change.
pub fn error_policy(fufu: Arc<Fufu>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        warn!(fufu = %fufu.name_any(), %error, "write conflict, requeueing");
        return Action::requeue(ctx.settings.conflict_requeue);
    }

    if error.is_retryable() {
        error!(fufu = %fufu.name_any(), ?error, "reconciliation failed");
        Action::requeue(ctx.settings.error_requeue)
    } else {
        error!(
            fufu = %fufu.name_any(),
            ?error,
            "reconciliation failed permanently, waiting for a change"
        );
        Action::await_change()
    }
}

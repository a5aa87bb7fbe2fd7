//! Converging one dependent toward its desired state
//!
//! [`converge`] is written once and instantiated for each [`Dependent`] kind:
//! fetch the observed object, create it if missing, otherwise check
//! ownership, reflect status onto the Fufu, and rewrite the object only when
//! it drifted from what the builder wants.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::diff::is_derivative;
use super::fufu::Context;
use crate::crd::Fufu;
use crate::events::{actions, reasons};
use crate::workload::{Dependent, Reflection};
use crate::{Error, Result};

/// Outcome of converging one dependent
#[derive(Debug)]
pub enum Convergence {
    /// The dependent did not exist and was created
    Created,
    /// Another writer created the dependent first; the next pass diffs against it
    CreateRaced,
    /// The dependent drifted and was replaced
    Updated,
    /// The dependent already matched; nothing was written
    Unchanged,
    /// Creating the dependent failed; siblings still converge and the error
    /// is returned at the end of the pass
    CreateDeferred(Error),
}

/// Drive the `K` owned by `fufu` toward its desired state
///
/// `fufu` is replaced by the server's copy whenever its status is written so
/// later writes in the same pass carry the fresh `resourceVersion`.
pub async fn converge<K: Dependent>(fufu: &mut Fufu, ctx: &Context) -> Result<Convergence> {
    let kind = K::kind(&()).to_string();
    let name = K::dependent_name(&fufu.name_any());
    let desired = K::build(fufu);
    let namespace = fufu
        .namespace()
        .ok_or_else(|| Error::validation(format!("Fufu '{}' has no namespace", fufu.name_any())))?;
    let owner = owner_reference(fufu)?;
    let resource = ApiResource::erase::<K>(&());

    let Some(observed) = ctx.kube.get_dependent(&resource, &namespace, &name).await? else {
        return create(fufu, desired, owner, &resource, &namespace, ctx).await;
    };
    let observed: K = from_dynamic(observed, &kind, &name)?;

    if let Some(foreign) = foreign_controller(observed.meta(), &owner) {
        return Err(Error::ownership_conflict(kind, name, foreign));
    }

    let current_status = fufu.status.clone().unwrap_or_default();
    if let Some(reflection) = K::reflect_status(&observed, &current_status) {
        reflect(fufu, current_status, reflection, ctx).await?;
    }

    let controlled = is_controlled_by(observed.meta(), &owner);
    if controlled && is_derivative(&desired.spec_value()?, &observed.spec_value()?) {
        debug!(kind = %kind, name = %name, "dependent in sync");
        return Ok(Convergence::Unchanged);
    }

    let mut update = desired;
    K::carry_over(&mut update, &observed);
    merge_metadata(update.meta_mut(), observed.meta(), owner);

    info!(kind = %kind, name = %name, controlled, "dependent drifted, updating");
    ctx.kube
        .replace_dependent(&resource, &namespace, &to_dynamic(&update, &kind, &name)?)
        .await?;

    publish(
        fufu,
        ctx,
        EventType::Normal,
        reasons::UPDATED,
        format!("{kind} {name} updated"),
    )
    .await;
    Ok(Convergence::Updated)
}

async fn create<K: Dependent>(
    fufu: &Fufu,
    mut desired: K,
    owner: OwnerReference,
    resource: &ApiResource,
    namespace: &str,
    ctx: &Context,
) -> Result<Convergence> {
    let kind = resource.kind.clone();
    let name = desired.name_any();
    desired.meta_mut().owner_references = Some(vec![owner]);

    info!(kind = %kind, name = %name, "creating dependent");
    let object = to_dynamic(&desired, &kind, &name)?;
    match ctx.kube.create_dependent(resource, namespace, &object).await {
        Ok(_) => {
            publish(
                fufu,
                ctx,
                EventType::Normal,
                reasons::CREATED,
                format!("{kind} {name} created"),
            )
            .await;
            Ok(Convergence::Created)
        }
        Err(Error::AlreadyExists { .. }) => {
            debug!(kind = %kind, name = %name, "dependent created concurrently");
            Ok(Convergence::CreateRaced)
        }
        Err(e) => {
            warn!(kind = %kind, name = %name, error = %e, "failed to create dependent");
            publish(
                fufu,
                ctx,
                EventType::Warning,
                reasons::CREATE_FAILED,
                format!("failed to create {kind} {name}: {e}"),
            )
            .await;
            Ok(Convergence::CreateDeferred(Error::create_failed(kind, name, e)))
        }
    }
}

/// Persist a status change and adopt the returned Fufu
async fn reflect(
    fufu: &mut Fufu,
    mut status: crate::crd::FufuStatus,
    reflection: Reflection,
    ctx: &Context,
) -> Result<()> {
    reflection.apply(&mut status);
    let updated = ctx.kube.patch_fufu_status(fufu, &status).await?;
    *fufu = updated;

    info!(change = ?reflection, "status updated");
    publish(
        fufu,
        ctx,
        EventType::Normal,
        reflection.reason(),
        reflection.note(),
    )
    .await;
    Ok(())
}

async fn publish(fufu: &Fufu, ctx: &Context, type_: EventType, reason: &str, note: String) {
    ctx.events
        .publish(
            &fufu.object_ref(&()),
            type_,
            reason,
            actions::RECONCILE,
            Some(note),
        )
        .await;
}

/// Controller reference every dependent carries back to its Fufu
///
/// Deleting the Fufu in the foreground waits for the dependent to go first.
fn owner_reference(fufu: &Fufu) -> Result<OwnerReference> {
    let owner = fufu
        .controller_owner_ref(&())
        .ok_or_else(|| Error::validation(format!("Fufu '{}' has no uid", fufu.name_any())))?;
    Ok(OwnerReference {
        block_owner_deletion: Some(true),
        ..owner
    })
}

/// Describe the controller of `meta` if it is someone other than `owner`
fn foreign_controller(meta: &ObjectMeta, owner: &OwnerReference) -> Option<String> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
        .map(|r| format!("{}/{}", r.kind, r.name))
}

/// Whether `meta` carries exactly our controller reference
fn is_controlled_by(meta: &ObjectMeta, owner: &OwnerReference) -> bool {
    meta.owner_references.iter().flatten().any(|r| {
        r.controller == Some(true)
            && r.uid == owner.uid
            && r.block_owner_deletion == owner.block_owner_deletion
    })
}

/// Fold the observed metadata into an update
///
/// Labels, annotations and non-controller owner references set by others
/// survive; our controller reference is (re)asserted.
fn merge_metadata(update: &mut ObjectMeta, observed: &ObjectMeta, owner: OwnerReference) {
    update.resource_version = observed.resource_version.clone();

    if let Some(observed_labels) = &observed.labels {
        let mut labels = observed_labels.clone();
        labels.extend(update.labels.take().unwrap_or_default());
        update.labels = Some(labels);
    }
    if let Some(observed_annotations) = &observed.annotations {
        let mut annotations = observed_annotations.clone();
        annotations.extend(update.annotations.take().unwrap_or_default());
        update.annotations = Some(annotations);
    }

    let mut refs: Vec<OwnerReference> = observed
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.uid != owner.uid)
        .cloned()
        .collect();
    refs.push(owner);
    update.owner_references = Some(refs);
}

pub(super) fn to_dynamic<K: Serialize>(
    object: &K,
    kind: &str,
    name: &str,
) -> Result<DynamicObject> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| Error::serialization(format!("failed to encode {kind} '{name}': {e}")))
}

pub(super) fn from_dynamic<K: DeserializeOwned>(
    object: DynamicObject,
    kind: &str,
    name: &str,
) -> Result<K> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| Error::serialization(format!("failed to decode {kind} '{name}': {e}")))
}

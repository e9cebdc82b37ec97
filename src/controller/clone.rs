//! Clone hand-off controller
//!
//! Reconciles PersistentVolumeClaims that take part in a volume clone. A
//! CSI driver provisions the cloned volume for a transient *source* claim;
//! this controller creates the *target* claim the user asked for, moves the
//! volume's `claimRef` over to it, deletes the source claim, and reports the
//! outcome on the owning CloneRequest.
//!
//! Every reconcile re-reads state from the API server. Steps that already
//! happened are detected and skipped, so re-delivering a key converges
//! instead of repeating side effects.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::clone::intent::is_clone_requested;
use crate::clone::{
    claim_ref_matches, decode, rebind_volume, report, ClaimPhase, CloneRole, OwnerRef,
    ANN_CLONE_DV_NAMESPACE, ANN_CLONE_REQUESTED, ANN_CLONE_TARGET,
};
use crate::config::ControllerConfig;
use crate::crd::{CloneRequest, ClonePhase};
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::kube_client::{KubeClient, KubeClientImpl};
use crate::metrics::{self, HandoffOutcome, ReconcileTimer};
use crate::Error;

const STORAGE: &str = "storage";

/// Controller context for clone reconciliation
pub struct Context {
    /// Store access (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event sink for CloneRequest transitions
    pub events: Arc<dyn EventPublisher>,
    /// Delay before retrying a transient failure
    pub error_requeue: Duration,
}

impl Context {
    /// Create a context talking to the API server behind `client`
    pub fn new(client: Client, config: &ControllerConfig) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(
                client.clone(),
                config.controller_name.clone(),
            )),
            events: Arc::new(KubeEventPublisher::new(client, &config.controller_name)),
            error_requeue: config.error_requeue(),
        }
    }

    /// Create a context for testing with custom collaborators
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            kube,
            events,
            error_requeue: Duration::from_secs(5),
        }
    }
}

/// Namespace and name of a claim
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClaimKey {
    /// Namespace of the claim
    pub namespace: String,
    /// Name of the claim
    pub name: String,
}

impl ClaimKey {
    /// Key of an observed claim
    pub fn of(claim: &PersistentVolumeClaim) -> Self {
        Self {
            namespace: claim.namespace().unwrap_or_default(),
            name: claim.name_any(),
        }
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reconcile a PersistentVolumeClaim delivered by the watch
#[instrument(skip(claim, ctx), fields(claim = %ClaimKey::of(&claim)))]
pub async fn reconcile(
    claim: Arc<PersistentVolumeClaim>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let timer = ReconcileTimer::start(decode(&claim).role);
    match reconcile_claim(&ClaimKey::of(&claim), &ctx).await {
        Ok(action) => {
            timer.success();
            Ok(action)
        }
        Err(e) => {
            timer.error(e.error_type());
            Err(e)
        }
    }
}

/// Reconcile the claim stored under `key`
///
/// Success never requeues: the next change to the claim triggers the next
/// pass.
pub async fn reconcile_claim(key: &ClaimKey, ctx: &Context) -> Result<Action, Error> {
    let Some(claim) = ctx.kube.get_claim(&key.namespace, &key.name).await? else {
        debug!("claim no longer exists");
        return Ok(Action::await_change());
    };

    if !is_clone_requested(&claim) {
        debug!("claim is not part of a clone");
        return Ok(Action::await_change());
    }

    let intent = decode(&claim);
    let phase = ClaimPhase::of(&claim);
    let owner = intent.owner.as_ref();

    match (intent.role, phase) {
        (CloneRole::Source, ClaimPhase::Bound) => reconcile_source_bound(&claim, owner, ctx).await?,
        (CloneRole::Source, ClaimPhase::Lost) => reconcile_source_lost(&claim, owner, ctx).await?,
        (CloneRole::Target, ClaimPhase::Bound) => reconcile_target_bound(owner, ctx).await?,
        (role, phase) => debug!(?role, ?phase, "nothing to do"),
    }

    Ok(Action::await_change())
}

/// Hand the source claim's volume to the target claim
async fn reconcile_source_bound(
    source: &PersistentVolumeClaim,
    owner: Option<&OwnerRef>,
    ctx: &Context,
) -> Result<(), Error> {
    let request = owning_request(source, owner, ctx).await?;

    let Some(volume_name) = source
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|n| !n.is_empty())
    else {
        debug!("source claim is bound but names no volume yet");
        return Ok(());
    };

    let Some(volume) = ctx.kube.get_volume(volume_name).await? else {
        debug!(volume = %volume_name, "bound volume not found");
        return Ok(());
    };

    let desired = build_target_claim(&request, source, &volume);
    let outcome = match ctx.kube.create_claim(&desired).await {
        Ok(target) => {
            info!(
                target = %target.name_any(),
                namespace = ?target.namespace(),
                volume = %volume_name,
                "created target claim"
            );
            rebind_volume(ctx.kube.as_ref(), &volume, &target).await?;
            HandoffOutcome::Created
        }
        Err(e) if e.is_already_exists() => {
            let Some(target) = ctx
                .kube
                .get_claim(
                    &request.target_claim_namespace(),
                    &request.target_claim_name(),
                )
                .await?
            else {
                // Deleted between create and get; retry from scratch
                return Err(e);
            };

            // Reported as CloneTargetPVCLost whether the target is Lost or
            // held by another controller; the log carries the actual reason
            if let Err(reason) = validate_target(&target) {
                warn!(
                    target = %ClaimKey::of(&target),
                    error = %reason,
                    "existing target claim cannot take over the volume"
                );
                return report(
                    ctx.kube.as_ref(),
                    ctx.events.as_ref(),
                    ClonePhase::CloneTargetPVCLost,
                    &request,
                )
                .await;
            }

            if let Some(other) = target
                .spec
                .as_ref()
                .and_then(|s| s.volume_name.as_deref())
                .filter(|n| !n.is_empty() && *n != volume_name)
            {
                return Err(Error::invalid_state(
                    ClaimKey::of(&target).to_string(),
                    format!("target claim names volume {other}, not {volume_name}"),
                ));
            }

            if !claim_ref_matches(&volume, &target) {
                rebind_volume(ctx.kube.as_ref(), &volume, &target).await?;
            }
            HandoffOutcome::Adopted
        }
        Err(e) => return Err(e),
    };

    delete_source(source, ctx).await?;
    metrics::record_handoff(outcome);
    Ok(())
}

/// The source claim lost its volume
///
/// Only a failure if no valid target claim took the volume over.
async fn reconcile_source_lost(
    source: &PersistentVolumeClaim,
    owner: Option<&OwnerRef>,
    ctx: &Context,
) -> Result<(), Error> {
    let request = owning_request(source, owner, ctx).await?;

    let target = ctx
        .kube
        .get_claim(
            &request.target_claim_namespace(),
            &request.target_claim_name(),
        )
        .await?;

    match target.as_ref().map(validate_target) {
        Some(Ok(())) => {
            debug!("volume already handed off, removing stale source claim");
            delete_source(source, ctx).await
        }
        Some(Err(reason)) => {
            warn!(error = %reason, "source claim lost its volume and target claim is unusable");
            report(
                ctx.kube.as_ref(),
                ctx.events.as_ref(),
                ClonePhase::CloneSourcePVLost,
                &request,
            )
            .await
        }
        None => {
            warn!("source claim lost its volume before the target claim existed");
            report(
                ctx.kube.as_ref(),
                ctx.events.as_ref(),
                ClonePhase::CloneSourcePVLost,
                &request,
            )
            .await
        }
    }
}

/// The target claim is bound; mark the CloneRequest done
async fn reconcile_target_bound(owner: Option<&OwnerRef>, ctx: &Context) -> Result<(), Error> {
    let Some(owner) = owner.filter(|o| o.is_clone_request()) else {
        debug!("target claim is not controlled by a CloneRequest");
        return Ok(());
    };

    let Some(request) = ctx
        .kube
        .get_clone_request(&owner.namespace, &owner.name)
        .await?
    else {
        debug!(request = %owner.name, "owning CloneRequest no longer exists");
        return Ok(());
    };

    report(
        ctx.kube.as_ref(),
        ctx.events.as_ref(),
        ClonePhase::PVCBound,
        &request,
    )
    .await
}

/// Load the CloneRequest controlling a source claim
async fn owning_request(
    source: &PersistentVolumeClaim,
    owner: Option<&OwnerRef>,
    ctx: &Context,
) -> Result<CloneRequest, Error> {
    let owner = owner.filter(|o| o.is_clone_request()).ok_or_else(|| {
        Error::invalid_state(
            ClaimKey::of(source).to_string(),
            "source claim is not controlled by a CloneRequest",
        )
    })?;

    ctx.kube
        .get_clone_request(&owner.namespace, &owner.name)
        .await?
        .ok_or_else(|| Error::MissingCloneRequest {
            namespace: owner.namespace.clone(),
            name: owner.name.clone(),
        })
}

async fn delete_source(source: &PersistentVolumeClaim, ctx: &Context) -> Result<(), Error> {
    let key = ClaimKey::of(source);
    match ctx.kube.delete_claim(&key.namespace, &key.name).await {
        Ok(()) => {
            info!(source = %key, "deleted source claim");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(source = %key, "source claim already deleted");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Check that an existing target claim may own the cloned volume
///
/// A Lost claim never qualifies. A Pending claim qualifies only if it is
/// not controlled by something other than a CloneRequest.
pub fn validate_target(target: &PersistentVolumeClaim) -> Result<(), Error> {
    let key = ClaimKey::of(target).to_string();
    match ClaimPhase::of(target) {
        ClaimPhase::Lost => Err(Error::invalid_state(key, "target claim is Lost")),
        ClaimPhase::Pending => match decode(target).owner {
            Some(owner) if !owner.is_clone_request() => Err(Error::invalid_state(
                key,
                format!("target claim is controlled by {} {}", owner.kind, owner.name),
            )),
            _ => Ok(()),
        },
        ClaimPhase::Bound => Ok(()),
    }
}

/// Target claim a CloneRequest asks for, pre-bound to `volume`
///
/// Storage class and access modes follow the source claim so the volume
/// stays compatible; the request's desired spec fills in what the source
/// leaves unset. The requested size comes from the request's capacity when
/// given.
pub fn build_target_claim(
    request: &CloneRequest,
    source: &PersistentVolumeClaim,
    volume: &PersistentVolume,
) -> PersistentVolumeClaim {
    let namespace = request.target_claim_namespace();
    let desired = &request.spec.claim;
    let source_spec = source.spec.clone().unwrap_or_default();

    let storage_class_name = source_spec
        .storage_class_name
        .clone()
        .or_else(|| desired.storage_class_name.clone());

    let access_modes = source_spec
        .access_modes
        .clone()
        .filter(|modes| !modes.is_empty())
        .or_else(|| Some(desired.access_modes.clone()).filter(|modes| !modes.is_empty()));

    let storage = desired.capacity.clone().map(Quantity).or_else(|| {
        source_spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|requests| requests.get(STORAGE).cloned())
    });

    let annotations = BTreeMap::from([
        (ANN_CLONE_REQUESTED.to_string(), "true".to_string()),
        (ANN_CLONE_TARGET.to_string(), "true".to_string()),
        (ANN_CLONE_DV_NAMESPACE.to_string(), namespace.clone()),
    ]);

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(request.target_claim_name()),
            namespace: Some(namespace),
            annotations: Some(annotations),
            owner_references: owner_reference(request).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name,
            access_modes,
            resources: storage.map(|quantity| VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(STORAGE.to_string(), quantity)])),
                ..Default::default()
            }),
            volume_mode: source_spec.volume_mode.clone(),
            volume_name: volume.metadata.name.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Controller owner reference to `request`, `None` until it has a uid
fn owner_reference(request: &CloneRequest) -> Option<OwnerReference> {
    request
        .controller_owner_ref(&())
        .map(|reference| OwnerReference {
            block_owner_deletion: Some(true),
            ..reference
        })
}

/// Error policy for the clone controller
///
/// Retryable errors requeue after the configured delay. Anything else
/// waits for the claim to change.
pub fn error_policy(
    claim: Arc<PersistentVolumeClaim>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let key = ClaimKey::of(&claim);
    if error.is_retryable() {
        warn!(claim = %key, %error, "reconciliation failed, retrying");
        Action::requeue(ctx.error_requeue)
    } else {
        error!(claim = %key, %error, "reconciliation failed permanently");
        Action::await_change()
    }
}

//! Volume hand-off from the source claim to the target claim
//!
//! Rewriting a PersistentVolume's `claimRef` is the one irreversible step of
//! a clone. [`rebind`] computes the new volume without touching the input;
//! [`rebind_volume`] persists it under optimistic concurrency.

use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use tracing::info;

use crate::kube_client::KubeClient;
use crate::Error;

/// Build an ObjectReference to a claim, suitable for a volume's `claimRef`
pub fn claim_reference(claim: &PersistentVolumeClaim) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("PersistentVolumeClaim".to_string()),
        name: claim.metadata.name.clone(),
        namespace: claim.metadata.namespace.clone(),
        uid: claim.metadata.uid.clone(),
        resource_version: claim.metadata.resource_version.clone(),
        ..Default::default()
    }
}

/// Returns a copy of `volume` whose `claimRef` points at `claim`
pub fn rebind(volume: &PersistentVolume, claim: &PersistentVolumeClaim) -> PersistentVolume {
    let mut rebound = volume.clone();
    rebound
        .spec
        .get_or_insert_with(Default::default)
        .claim_ref = Some(claim_reference(claim));
    rebound
}

/// Returns true if the volume's `claimRef` already names `claim`
///
/// Compares namespace and name; the uid is compared only when both sides
/// carry one.
pub fn claim_ref_matches(volume: &PersistentVolume, claim: &PersistentVolumeClaim) -> bool {
    let Some(claim_ref) = volume.spec.as_ref().and_then(|s| s.claim_ref.as_ref()) else {
        return false;
    };
    let same_key = claim_ref.name == claim.metadata.name
        && claim_ref.namespace == claim.metadata.namespace;
    let same_uid = match (&claim_ref.uid, &claim.metadata.uid) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    same_key && same_uid
}

/// Point `volume` at `claim` and persist the change
///
/// Fails with [`Error::Conflict`] if the stored volume changed since
/// `volume` was read.
pub async fn rebind_volume(
    kube: &dyn KubeClient,
    volume: &PersistentVolume,
    claim: &PersistentVolumeClaim,
) -> Result<PersistentVolume, Error> {
    let rebound = rebind(volume, claim);
    let updated = kube.update_volume(&rebound).await?;
    info!(
        volume = %volume.name_any(),
        claim = %claim.name_any(),
        namespace = ?claim.namespace(),
        "volume handed to target claim"
    );
    Ok(updated)
}

//! Clone intent decoding
//!
//! Reads the clone annotations and the controller owner reference of a
//! PersistentVolumeClaim. Pure functions only; used both as the watch
//! admission predicate and as the first step of every reconciliation.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;

use crate::crd::CLONE_REQUEST_KIND;

/// Marks a claim as participating in a clone
pub const ANN_CLONE_REQUESTED: &str = "volclone.dev/clone-requested";
/// Marks a claim as the transient source of a clone
pub const ANN_CLONE_SOURCE: &str = "volclone.dev/clone-source";
/// Marks a claim as the target of a clone
pub const ANN_CLONE_TARGET: &str = "volclone.dev/clone-target";
/// Namespace of the owning CloneRequest when it differs from the claim's
pub const ANN_CLONE_DV_NAMESPACE: &str = "volclone.dev/clone-dv-namespace";

/// Lifecycle phase of a PersistentVolumeClaim
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimPhase {
    /// Not yet bound (also used when the phase is missing or unknown)
    Pending,
    /// Bound to a PersistentVolume
    Bound,
    /// The bound volume disappeared
    Lost,
}

impl ClaimPhase {
    /// Read the phase from a claim's status
    pub fn of(claim: &PersistentVolumeClaim) -> Self {
        match claim.status.as_ref().and_then(|s| s.phase.as_deref()) {
            Some("Bound") => Self::Bound,
            Some("Lost") => Self::Lost,
            _ => Self::Pending,
        }
    }
}

/// Role a claim plays in a clone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloneRole {
    /// Transient claim currently holding the cloned volume
    Source,
    /// Permanent claim the volume is handed to
    Target,
    /// Not part of a clone
    None,
}

/// Kind of a controller owner reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    /// Owned by a CloneRequest
    CloneRequest,
    /// Owned by some other controller
    Other(String),
}

impl OwnerKind {
    fn from_kind(kind: &str) -> Self {
        if kind == CLONE_REQUEST_KIND {
            Self::CloneRequest
        } else {
            Self::Other(kind.to_string())
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CloneRequest => f.write_str(CLONE_REQUEST_KIND),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// Typed reference to the controller owning a claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerRef {
    /// Kind of the owner
    pub kind: OwnerKind,
    /// Name of the owner
    pub name: String,
    /// Namespace the owner lives in
    pub namespace: String,
}

impl OwnerRef {
    /// Returns true if the owner is a CloneRequest
    pub fn is_clone_request(&self) -> bool {
        self.kind == OwnerKind::CloneRequest
    }
}

/// Clone intent derived from a claim's metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloneIntent {
    /// Role of the claim
    pub role: CloneRole,
    /// Controller owner, if any
    pub owner: Option<OwnerRef>,
}

/// Parse a marker value the way Kubernetes tooling parses booleans
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

fn annotation_is_true(claim: &PersistentVolumeClaim, key: &str) -> bool {
    claim
        .annotations()
        .get(key)
        .map(|v| parse_bool(v))
        .unwrap_or(false)
}

/// Returns true if the claim carries the clone-requested marker
pub fn is_clone_requested(claim: &PersistentVolumeClaim) -> bool {
    annotation_is_true(claim, ANN_CLONE_REQUESTED)
}

/// Watch admission predicate
///
/// A claim is admitted iff it is not Lost and carries the clone-requested
/// marker.
pub fn is_eligible(claim: &PersistentVolumeClaim) -> bool {
    ClaimPhase::of(claim) != ClaimPhase::Lost && is_clone_requested(claim)
}

/// Controller owner of a claim
///
/// The namespace comes from [`ANN_CLONE_DV_NAMESPACE`] when set, since a
/// source claim can live outside its CloneRequest's namespace.
pub fn controller_owner(claim: &PersistentVolumeClaim) -> Option<OwnerRef> {
    let owner = claim
        .owner_references()
        .iter()
        .find(|o| o.controller == Some(true))?;
    let namespace = claim
        .annotations()
        .get(ANN_CLONE_DV_NAMESPACE)
        .cloned()
        .or_else(|| claim.namespace())
        .unwrap_or_default();
    Some(OwnerRef {
        kind: OwnerKind::from_kind(&owner.kind),
        name: owner.name.clone(),
        namespace,
    })
}

/// Decode the clone intent of a claim
///
/// The source marker wins when both markers are set; a claim carrying
/// neither has role [`CloneRole::None`].
pub fn decode(claim: &PersistentVolumeClaim) -> CloneIntent {
    let role = if annotation_is_true(claim, ANN_CLONE_SOURCE) {
        CloneRole::Source
    } else if annotation_is_true(claim, ANN_CLONE_TARGET) {
        CloneRole::Target
    } else {
        CloneRole::None
    };
    CloneIntent {
        role,
        owner: controller_owner(claim),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PersistentVolumeClaimStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn claim(annotations: &[(&str, &str)], phase: &str, controller_kind: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("claim".to_string()),
                namespace: Some("ns1".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                owner_references: Some(vec![OwnerReference {
                    api_version: "volclone.dev/v1alpha1".to_string(),
                    kind: controller_kind.to_string(),
                    name: "req".to_string(),
                    uid: "uid-1".to_string(),
                    controller: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            status: Some(PersistentVolumeClaimStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(&[(ANN_CLONE_REQUESTED, "true")], "Bound", "CloneRequest", true)]
    #[case(&[], "Bound", "CloneRequest", false)]
    #[case(&[(ANN_CLONE_REQUESTED, "true")], "Lost", "CloneRequest", false)]
    #[case(&[(ANN_CLONE_REQUESTED, "true")], "Lost", "NotACloneRequest", false)]
    #[case(&[(ANN_CLONE_REQUESTED, "false")], "Pending", "CloneRequest", false)]
    #[case(&[(ANN_CLONE_REQUESTED, "True")], "Pending", "CloneRequest", true)]
    #[case(&[(ANN_CLONE_REQUESTED, "yes")], "Bound", "CloneRequest", false)]
    fn admission_predicate(
        #[case] annotations: &[(&str, &str)],
        #[case] phase: &str,
        #[case] controller_kind: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(is_eligible(&claim(annotations, phase, controller_kind)), expected);
    }

    #[test]
    fn missing_status_reads_as_pending() {
        let mut c = claim(&[(ANN_CLONE_REQUESTED, "true")], "Bound", "CloneRequest");
        c.status = None;
        assert_eq!(ClaimPhase::of(&c), ClaimPhase::Pending);
        assert!(is_eligible(&c));
    }

    #[rstest]
    #[case(&[(ANN_CLONE_SOURCE, "true")], CloneRole::Source)]
    #[case(&[(ANN_CLONE_TARGET, "1")], CloneRole::Target)]
    #[case(&[(ANN_CLONE_SOURCE, "true"), (ANN_CLONE_TARGET, "true")], CloneRole::Source)]
    #[case(&[(ANN_CLONE_SOURCE, "false"), (ANN_CLONE_TARGET, "true")], CloneRole::Target)]
    #[case(&[(ANN_CLONE_REQUESTED, "true")], CloneRole::None)]
    #[case(&[], CloneRole::None)]
    fn role_from_markers(#[case] annotations: &[(&str, &str)], #[case] expected: CloneRole) {
        assert_eq!(decode(&claim(annotations, "Bound", "CloneRequest")).role, expected);
    }

    /// Story: a source claim in a scratch namespace still points at its
    /// CloneRequest through the namespace annotation
    #[test]
    fn story_owner_namespace_comes_from_annotation() {
        let c = claim(
            &[(ANN_CLONE_SOURCE, "true"), (ANN_CLONE_DV_NAMESPACE, "requests")],
            "Bound",
            "CloneRequest",
        );
        let owner = decode(&c).owner.expect("owner");
        assert_eq!(owner.name, "req");
        assert_eq!(owner.namespace, "requests");
        assert!(owner.is_clone_request());
    }

    #[test]
    fn owner_namespace_defaults_to_claim_namespace() {
        let c = claim(&[(ANN_CLONE_TARGET, "true")], "Bound", "CloneRequest");
        assert_eq!(decode(&c).owner.expect("owner").namespace, "ns1");
    }

    #[test]
    fn foreign_owner_kind_is_preserved() {
        let c = claim(&[(ANN_CLONE_TARGET, "true")], "Pending", "StatefulSet");
        let owner = controller_owner(&c).expect("owner");
        assert_eq!(owner.kind, OwnerKind::Other("StatefulSet".to_string()));
        assert!(!owner.is_clone_request());
    }

    #[test]
    fn non_controller_owners_are_ignored() {
        let mut c = claim(&[(ANN_CLONE_TARGET, "true")], "Pending", "CloneRequest");
        if let Some(refs) = c.metadata.owner_references.as_mut() {
            refs[0].controller = None;
        }
        assert!(controller_owner(&c).is_none());
    }
}

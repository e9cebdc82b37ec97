//! Shared types for the CloneRequest CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the claim whose volume is being cloned
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ClaimSource {
    /// Name of the source PersistentVolumeClaim
    pub name: String,

    /// Namespace of the source claim (defaults to the CloneRequest's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Desired shape of the claim produced by the clone
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DesiredClaimSpec {
    /// Storage class for the target claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Access modes (e.g. "ReadWriteOnce")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// Requested capacity as a Kubernetes quantity (e.g. "10Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// Clone lifecycle phase
///
/// Phases only move forward for a given clone attempt: `Pending` is left
/// for exactly one of the terminal phases and is never re-entered.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClonePhase {
    /// Clone requested, hand-off not finished
    #[default]
    Pending,
    /// Target claim is bound to the cloned volume
    PVCBound,
    /// Source claim lost its volume before a valid target took it over
    CloneSourcePVLost,
    /// Target claim was lost or taken over by another controller
    CloneTargetPVCLost,
}

impl ClonePhase {
    /// Returns true for phases that end a clone attempt
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a status currently in `self` may be moved to `next`
    ///
    /// Only `Pending` may change phase; a terminal phase accepts only
    /// itself.
    pub fn can_transition_to(&self, next: ClonePhase) -> bool {
        *self == ClonePhase::Pending || *self == next
    }
}

impl std::fmt::Display for ClonePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::PVCBound => write!(f, "PVCBound"),
            Self::CloneSourcePVLost => write!(f, "CloneSourcePVLost"),
            Self::CloneTargetPVCLost => write!(f, "CloneTargetPVCLost"),
        }
    }
}

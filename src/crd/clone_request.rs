//! CloneRequest Custom Resource Definition
//!
//! A CloneRequest asks for a new PersistentVolumeClaim whose volume is a
//! driver-native clone of an existing claim's volume. The controller hands
//! the cloned volume from a transient source claim to the target claim and
//! reports the outcome on the CloneRequest's status.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ClaimSource, ClonePhase, DesiredClaimSpec};

/// Kind name of the CloneRequest resource, as it appears in owner references
pub const CLONE_REQUEST_KIND: &str = "CloneRequest";

/// Specification for a CloneRequest
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "volclone.dev",
    version = "v1alpha1",
    kind = "CloneRequest",
    plural = "clonerequests",
    shortname = "clreq",
    status = "CloneRequestStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.source.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequestSpec {
    /// Claim whose volume is cloned
    pub source: ClaimSource,

    /// Desired spec of the resulting claim
    #[serde(default)]
    pub claim: DesiredClaimSpec,
}

/// Status for a CloneRequest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequestStatus {
    /// Current phase of the clone
    #[serde(default)]
    pub phase: ClonePhase,

    /// Human-readable message about the current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CloneRequestStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: ClonePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl CloneRequest {
    /// Current phase, treating a missing status as Pending
    pub fn phase(&self) -> ClonePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Name of the claim this request produces
    ///
    /// The target claim shares the CloneRequest's name and namespace.
    pub fn target_claim_name(&self) -> String {
        self.name_any()
    }

    /// Namespace of the claim this request produces
    pub fn target_claim_namespace(&self) -> String {
        self.namespace().unwrap_or_default()
    }
}

//! CloneRequest status reporting
//!
//! Status is written only when it actually changes, and the matching Event
//! is published only after that write succeeds, so re-reconciling an
//! already-terminal CloneRequest produces neither writes nor Events.

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::crd::{CloneRequest, CloneRequestStatus, ClonePhase};
use crate::events::{actions, reasons, EventPublisher};
use crate::kube_client::KubeClient;
use crate::{metrics, Error};

/// Event emitted alongside a status transition
#[derive(Clone, Debug)]
pub struct StatusEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// Machine-readable reason
    pub reason: &'static str,
    /// Human-readable message
    pub message: String,
}

/// Event accompanying a transition of `request` into `phase`, if any
pub fn transition_event(phase: ClonePhase, request: &CloneRequest) -> Option<StatusEvent> {
    match phase {
        ClonePhase::CloneSourcePVLost => Some(StatusEvent {
            type_: EventType::Warning,
            reason: reasons::CLONE_SOURCE_PV_LOST,
            message: "Source claim lost its volume binding during the cloning process.".to_string(),
        }),
        ClonePhase::CloneTargetPVCLost => Some(StatusEvent {
            type_: EventType::Warning,
            reason: reasons::CLONE_TARGET_PVC_LOST,
            message: format!(
                "Target claim {} lost during the cloning process.",
                request.target_claim_name()
            ),
        }),
        ClonePhase::PVCBound | ClonePhase::Pending => None,
    }
}

/// Status `request` would have after moving to `phase`
pub fn next_status(phase: ClonePhase, request: &CloneRequest) -> CloneRequestStatus {
    let status = CloneRequestStatus::with_phase(phase);
    match transition_event(phase, request) {
        Some(event) => status.message(event.message),
        None => status,
    }
}

/// Move `request` to `phase`
///
/// No-op when the status would not change or when `request` already has a
/// different terminal phase. Otherwise the status is written and then the
/// phase's Event, if it has one, is published.
pub async fn report(
    kube: &dyn KubeClient,
    events: &dyn EventPublisher,
    phase: ClonePhase,
    request: &CloneRequest,
) -> Result<(), Error> {
    let name = request.name_any();
    let current = request.status.clone().unwrap_or_default();

    if !current.phase.can_transition_to(phase) {
        debug!(request = %name, from = %current.phase, to = %phase, "ignoring transition out of a terminal phase");
        return Ok(());
    }

    let status = next_status(phase, request);
    if status == current {
        debug!(request = %name, %phase, "status unchanged");
        return Ok(());
    }

    let mut updated = request.clone();
    updated.status = Some(status);
    kube.update_clone_request_status(&updated).await?;

    info!(request = %name, from = %current.phase, to = %phase, "CloneRequest status updated");
    metrics::record_status_transition(phase);

    if let Some(event) = transition_event(phase, request) {
        events
            .publish(
                &request.object_ref(&()),
                event.type_,
                event.reason,
                actions::RECONCILE,
                Some(event.message),
            )
            .await;
    }

    Ok(())
}

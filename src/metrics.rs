//! Metrics registry for volclone observability
//!
//! Provides OpenTelemetry metrics for:
//! - Claim reconciliation (duration, errors)
//! - Volume hand-offs (created vs adopted target claims)
//! - CloneRequest phase transitions
//!
//! Instruments are no-ops until a meter provider is installed by
//! [`crate::telemetry::init_telemetry`].

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

use crate::clone::CloneRole;
use crate::crd::ClonePhase;

/// Global meter for volclone metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("volclone"));

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Histogram of claim reconciliation duration
///
/// Labels:
/// - `role`: source, target, none
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("volclone_reconcile_duration_seconds")
        .with_description("Duration of claim reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of claim reconciliation errors
///
/// Labels:
/// - `error_type`: transient, permanent
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("volclone_reconcile_errors_total")
        .with_description("Total number of claim reconciliation errors")
        .with_unit("{errors}")
        .build()
});

// ============================================================================
// Clone Outcome Metrics
// ============================================================================

/// Counter of completed volume hand-offs
///
/// Labels:
/// - `outcome`: created, adopted
pub static HANDOFFS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("volclone_handoffs_total")
        .with_description("Total number of volumes handed to a target claim")
        .with_unit("{handoffs}")
        .build()
});

/// Counter of CloneRequest status transitions
///
/// Labels:
/// - `phase`: PVCBound, CloneSourcePVLost, CloneTargetPVCLost
pub static STATUS_TRANSITIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("volclone_status_transitions_total")
        .with_description("Total number of CloneRequest phase transitions")
        .with_unit("{transitions}")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// How the target claim of a hand-off came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The controller created the target claim
    Created,
    /// A valid target claim already existed
    Adopted,
}

impl HandoffOutcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Adopted => "adopted",
        }
    }
}

fn role_label(role: CloneRole) -> &'static str {
    match role {
        CloneRole::Source => "source",
        CloneRole::Target => "target",
        CloneRole::None => "none",
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a claim reconciliation with timing
pub struct ReconcileTimer {
    role: CloneRole,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(role: CloneRole) -> Self {
        Self {
            role,
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        let duration = self.start.elapsed().as_secs_f64();
        RECONCILE_DURATION.record(
            duration,
            &[
                KeyValue::new("role", role_label(self.role)),
                KeyValue::new("result", "success"),
            ],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &'static str) {
        let duration = self.start.elapsed().as_secs_f64();
        RECONCILE_DURATION.record(
            duration,
            &[
                KeyValue::new("role", role_label(self.role)),
                KeyValue::new("result", "error"),
            ],
        );
        RECONCILE_ERRORS.add(1, &[KeyValue::new("error_type", error_type)]);
    }
}

/// Record a finished volume hand-off
pub fn record_handoff(outcome: HandoffOutcome) {
    HANDOFFS.add(1, &[KeyValue::new("outcome", outcome.as_str())]);
}

/// Record a CloneRequest phase transition
pub fn record_status_transition(phase: ClonePhase) {
    STATUS_TRANSITIONS.add(1, &[KeyValue::new("phase", phase.to_string())]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_outcome_labels() {
        assert_eq!(HandoffOutcome::Created.as_str(), "created");
        assert_eq!(HandoffOutcome::Adopted.as_str(), "adopted");
    }

    #[test]
    fn role_labels() {
        assert_eq!(role_label(CloneRole::Source), "source");
        assert_eq!(role_label(CloneRole::Target), "target");
        assert_eq!(role_label(CloneRole::None), "none");
    }

    #[test]
    fn recording_without_provider_is_noop() {
        ReconcileTimer::start(CloneRole::Source).success();
        ReconcileTimer::start(CloneRole::Target).error("transient");
        record_handoff(HandoffOutcome::Created);
        record_status_transition(ClonePhase::PVCBound);
    }
}

//! Controller implementations for volclone
//!
//! Controllers follow the Kubernetes observe-diff-act pattern: every pass
//! re-reads the world and moves it one step closer to the desired state.

mod clone;

pub use clone::{
    build_target_claim, error_policy, reconcile, reconcile_claim, validate_target, ClaimKey,
    Context,
};

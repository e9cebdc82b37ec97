//! Building blocks of the clone hand-off
//!
//! - [`intent`] - decode clone role and owner from claim metadata
//! - [`rebind`] - move a volume's `claimRef` to the target claim
//! - [`status`] - write CloneRequest status and emit Events on change

pub mod intent;
pub mod rebind;
pub mod status;

pub use intent::{
    decode, is_eligible, ClaimPhase, CloneIntent, CloneRole, OwnerKind, OwnerRef,
    ANN_CLONE_DV_NAMESPACE, ANN_CLONE_REQUESTED, ANN_CLONE_SOURCE, ANN_CLONE_TARGET,
};
pub use rebind::{claim_ref_matches, rebind, rebind_volume};
pub use status::report;

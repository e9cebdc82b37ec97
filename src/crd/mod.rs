//! Custom Resource Definitions for volclone
//!
//! This module contains the CloneRequest CRD owned by the controller.

mod clone_request;
mod types;

pub use clone_request::{CloneRequest, CloneRequestSpec, CloneRequestStatus, CLONE_REQUEST_KIND};
pub use types::{ClaimSource, ClonePhase, DesiredClaimSpec};

//! volclone - CSI volume clone hand-off controller
//!
//! A CSI driver clones a volume for a transient *source* claim. volclone
//! hands the cloned volume to the *target* claim a CloneRequest asks for,
//! removes the source claim, and reports the outcome on the CloneRequest's
//! status and as Kubernetes Events.
//!
//! # Modules
//!
//! - [`crd`] - CloneRequest Custom Resource Definition
//! - [`clone`] - Intent decoding, volume rebinding and status reporting
//! - [`controller`] - PersistentVolumeClaim reconciliation
//! - [`kube_client`] - Mockable Kubernetes store access
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Controller configuration
//! - [`telemetry`] - Logging, tracing and metrics export setup
//! - [`metrics`] - OpenTelemetry instruments
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod clone;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_client;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

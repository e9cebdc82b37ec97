//! Controller configuration
//!
//! Parsed from command-line flags with environment fallbacks.

use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::kube_client::client_read_timeout;

/// Upper bound for the watch timeout accepted by the API server
pub const MAX_WATCH_TIMEOUT_SECS: u32 = 290;

/// Errors found while validating a [`ControllerConfig`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Watch timeout outside the accepted range
    #[error("watch timeout must be between 1 and {max} seconds, got {got}")]
    WatchTimeout {
        /// Configured value
        got: u32,
        /// Largest accepted value
        max: u32,
    },

    /// Watch timeout not below the client's read timeout
    #[error("watch timeout ({watch}s) must be shorter than the client read timeout ({read}s)")]
    WatchOutlivesClient {
        /// Configured watch timeout
        watch: u32,
        /// Client read timeout
        read: u64,
    },

    /// Error requeue delay of zero
    #[error("error requeue delay must be greater than zero")]
    ErrorRequeue,

    /// Empty controller name
    #[error("controller name must not be empty")]
    ControllerName,
}

/// Settings for the clone controller
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Name reported on Events and used as the field manager for writes
    #[arg(
        long,
        env = "VOLCLONE_CONTROLLER_NAME",
        default_value = "csiclone-controller"
    )]
    pub controller_name: String,

    /// Only watch claims in this namespace (all namespaces when unset)
    #[arg(long, env = "VOLCLONE_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Server-side timeout of each watch request, in seconds
    #[arg(long, default_value_t = 25)]
    pub watch_timeout_secs: u32,

    /// Delay before retrying a claim whose reconcile failed transiently
    #[arg(long, default_value_t = 5)]
    pub error_requeue_secs: u64,

    /// Maximum number of claims reconciled at once (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    pub max_concurrent_reconciles: u16,

    /// Do not install the CloneRequest CRD on startup
    #[arg(long)]
    pub skip_crd_install: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: "csiclone-controller".to_string(),
            watch_namespace: None,
            watch_timeout_secs: 25,
            error_requeue_secs: 5,
            max_concurrent_reconciles: 0,
            skip_crd_install: false,
        }
    }
}

impl ControllerConfig {
    /// Check the settings for values the controller cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller_name.trim().is_empty() {
            return Err(ConfigError::ControllerName);
        }
        if self.watch_timeout_secs == 0 || self.watch_timeout_secs > MAX_WATCH_TIMEOUT_SECS {
            return Err(ConfigError::WatchTimeout {
                got: self.watch_timeout_secs,
                max: MAX_WATCH_TIMEOUT_SECS,
            });
        }
        let read = client_read_timeout().as_secs();
        if u64::from(self.watch_timeout_secs) >= read {
            return Err(ConfigError::WatchOutlivesClient {
                watch: self.watch_timeout_secs,
                read,
            });
        }
        if self.error_requeue_secs == 0 {
            return Err(ConfigError::ErrorRequeue);
        }
        Ok(())
    }

    /// Requeue delay applied to retryable reconcile errors
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

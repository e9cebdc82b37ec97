//! Error types for the volclone controller
//!
//! Store errors are classified at the `KubeClient` boundary so the
//! reconciliation engine can branch on "already exists", "not found" and
//! optimistic-concurrency conflicts without inspecting HTTP status codes.

use thiserror::Error;

/// Main error type for volclone operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that does not fall into one of the classified variants
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// The addressed object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind (e.g. "PersistentVolumeClaim")
        kind: String,
        /// Namespace of the object ("" for cluster-scoped objects)
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// Create failed because an object with the same name already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Object kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// The stored object changed since it was read (resourceVersion mismatch)
    #[error("conflict updating {kind} {name}: {message}")]
    Conflict {
        /// Object kind
        kind: String,
        /// Name of the object
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// Objects are in a state that contradicts the clone protocol
    #[error("invalid clone state for {claim}: {message}")]
    InvalidState {
        /// Claim the contradiction was observed on
        claim: String,
        /// Description of the contradiction
        message: String,
    },

    /// The CloneRequest owning a source claim could not be loaded
    #[error("CloneRequest {namespace}/{name} not found")]
    MissingCloneRequest {
        /// Namespace of the CloneRequest
        namespace: String,
        /// Name of the CloneRequest
        name: String,
    },
}

impl Error {
    /// Create a not-found error for the given object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an invalid-state error for the given claim
    pub fn invalid_state(claim: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidState {
            claim: claim.into(),
            message: msg.into(),
        }
    }

    /// Classify a kube-rs error returned by an operation on `kind namespace/name`.
    ///
    /// 404 becomes [`Error::NotFound`], 409 with reason `AlreadyExists`
    /// becomes [`Error::AlreadyExists`], any other 409 becomes
    /// [`Error::Conflict`]. Everything else stays a [`Error::Kube`].
    pub fn from_kube(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, namespace, name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: ae.message,
            },
            other => Self::Kube { source: other },
        }
    }

    /// Returns true for [`Error::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`Error::AlreadyExists`]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if this error is retryable
    ///
    /// Conflicts and transient API failures are retried by requeueing the
    /// claim. Contradictory state and malformed objects are not: retrying
    /// without an external change would fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => false,
            Error::AlreadyExists { .. } => true,
            Error::Conflict { .. } => true,
            Error::InvalidState { .. } => false,
            Error::MissingCloneRequest { .. } => true,
        }
    }

    /// Short label used for metrics and logs
    pub fn error_type(&self) -> &'static str {
        if self.is_retryable() {
            "transient"
        } else {
            "permanent"
        }
    }
}

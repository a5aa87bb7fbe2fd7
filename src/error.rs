//! Error types for the Fufu operator

use thiserror::Error;

/// Main error type for Fufu reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (transport failures, unavailable API server, rejected requests)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A write was rejected because it was based on a stale resourceVersion
    #[error("conflict writing {kind} '{name}': {message}")]
    Conflict {
        /// Kind of the object being written
        kind: String,
        /// Name of the object being written
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// A create lost the race against another creator
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the object being created
        kind: String,
        /// Name of the object being created
        name: String,
    },

    /// Creating a dependent failed for a reason other than a lost race
    #[error("failed to create {kind} '{name}': {source}")]
    CreateFailed {
        /// Kind of the dependent
        kind: String,
        /// Name of the dependent
        name: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The dependent exists but is controlled by another object
    #[error("{kind} '{name}' is controlled by {owner}, refusing to take it over")]
    OwnershipConflict {
        /// Kind of the dependent
        kind: String,
        /// Name of the dependent
        name: String,
        /// Description of the existing controller (kind/name)
        owner: String,
    },

    /// The Fufu resource is not usable as an owner (missing namespace, uid, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Converting between typed and dynamic objects failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a conflict error for the given object
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an already-exists error for the given object
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap a failed create of the given dependent
    pub fn create_failed(kind: impl Into<String>, name: impl Into<String>, source: Error) -> Self {
        Self::CreateFailed {
            kind: kind.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create an ownership conflict error
    pub fn ownership_conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self::OwnershipConflict {
            kind: kind.into(),
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether the scheduler should retry this reconciliation
    ///
    /// Permanent errors need a change to the Fufu (or manual cleanup of a
    /// foreign object) before another attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::Conflict { .. } => true,
            Error::AlreadyExists { .. } => true,
            Error::CreateFailed { .. } => true,
            Error::OwnershipConflict { .. } => false,
            Error::Validation(_) => false,
            Error::Serialization(_) => false,
        }
    }

    /// Whether this error was caused by optimistic-concurrency rejection
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }
}

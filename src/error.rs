//! Error types for the automation engine
//!
//! Cluster and locator errors travel through every layer unchanged so the
//! workflow runner can surface the first failure verbatim. Secrets are never
//! interpolated into any variant.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No API resource serves the requested kind/version
    #[error("no resource mapping for kind {kind} (version hint: {version})")]
    MappingNotFound { kind: String, version: String },

    /// The locator knows no cache instance with the requested name
    #[error("cache instance not found: {0}")]
    CacheNotFound(String),

    /// The named cache instance exists but is not serving
    #[error("cache instance {name} is not running (status: {status})")]
    CacheNotRunning { name: String, status: String },

    /// A manifest lacks a required field or has one of the wrong shape
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// An outbound cluster call did not complete within its deadline
    #[error("{operation} timed out after {}s", after.as_secs())]
    TransportTimeout {
        operation: String,
        after: Duration,
    },

    /// The API server refused the request
    #[error("server rejected request ({code} {reason}): {message}")]
    ServerRejected {
        code: u16,
        reason: String,
        message: String,
    },

    /// Delete targeted an object that does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFoundOnDelete {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Kubernetes client error that carries no server status
    #[error("Kubernetes error: {0}")]
    KubeError(#[from] kube::Error),

    /// Cache locator transport or status failure
    #[error("cache locator error: {0}")]
    LocatorError(String),

    /// A credential envelope could not be decoded
    #[error("invalid credential field {0}")]
    InvalidCredential(&'static str),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse classification used by the HTTP boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    NotFound,
    BadRequest,
    Internal,
}

impl Error {
    /// Wrap a kube error, lifting API status responses into `ServerRejected`.
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Error::ServerRejected {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            other => Error::KubeError(other),
        }
    }

    /// True for server 404 responses, whatever operation produced them.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ServerRejected { code: 404, .. })
            || matches!(self, Error::NotFoundOnDelete { .. })
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Error::MappingNotFound { .. } | Error::NotFoundOnDelete { .. } => StatusClass::NotFound,
            Error::InvalidCredential(_) => StatusClass::BadRequest,
            _ => StatusClass::Internal,
        }
    }

    /// Short machine-readable label for logs, metrics and error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MappingNotFound { .. } => "mapping_not_found",
            Error::CacheNotFound(_) => "cache_not_found",
            Error::CacheNotRunning { .. } => "cache_not_running",
            Error::MalformedManifest(_) => "malformed_manifest",
            Error::TransportTimeout { .. } => "transport_timeout",
            Error::ServerRejected { .. } => "server_rejected",
            Error::NotFoundOnDelete { .. } => "not_found",
            Error::KubeError(_) => "kube",
            Error::LocatorError(_) => "locator",
            Error::InvalidCredential(_) => "invalid_credential",
            Error::SerializationError(_) => "serialization",
            Error::ConfigError(_) => "config",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for the unified storage layer

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by providers, the router and the coordinators built on it
#[derive(Error, Debug)]
pub enum StorageError {
    /// No candidate backend passed availability probing for a namespace
    #[error("No storage provider available for namespace '{namespace}'")]
    ProviderUnavailable {
        /// Namespace the call was routed for
        namespace: String,
    },

    /// The effective policy filtered out every candidate backend
    #[error("Storage policy leaves no candidate provider for namespace '{namespace}': {reason}")]
    PolicyConflict {
        /// Namespace the call was routed for
        namespace: String,
        /// Which constraint emptied the candidate list
        reason: String,
    },

    /// The selected backend's own operation failed
    #[error("Backend '{provider}' failed: {message}")]
    Backend {
        /// Backend type or id that failed
        provider: String,
        /// Backend-reported message
        message: String,
    },

    /// Namespace warm-up failed
    #[error("Hydration of namespace '{namespace}' failed: {message}")]
    Hydration {
        /// Namespace being hydrated
        namespace: String,
        /// Underlying failure
        message: String,
    },

    /// The backend never issued this subscription id
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// No provider registered under this id
    #[error("Unknown storage provider: {0}")]
    UnknownProvider(String),

    /// The provider does not implement an optional capability
    #[error("Provider '{provider}' does not support {capability}")]
    Unsupported {
        /// Provider id
        provider: String,
        /// Missing capability
        capability: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// IO error during storage operation
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection error (for remote backends)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Create a backend operation error
    pub fn backend<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Backend {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a provider-unavailable error
    pub fn unavailable<S: Into<String>>(namespace: S) -> Self {
        Self::ProviderUnavailable {
            namespace: namespace.into(),
        }
    }

    /// Create a hydration error
    pub fn hydration<N: Into<String>, M: Into<String>>(namespace: N, message: M) -> Self {
        Self::Hydration {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-capability error
    pub fn unsupported<P: Into<String>, C: Into<String>>(provider: P, capability: C) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            capability: capability.into(),
        }
    }

    /// Whether retrying the same call later can succeed without changing
    /// configuration or caller input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::ProviderUnavailable { .. }
                | StorageError::Backend { .. }
                | StorageError::Hydration { .. }
                | StorageError::Io(_)
                | StorageError::Connection(_)
        )
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            StorageError::Deserialization(err.to_string())
        } else {
            StorageError::Serialization(err.to_string())
        }
    }
}

use thiserror::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, Error)]
pub(crate) enum KubernetesError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Failed to watch {kind}: {message}")]
    WatchFailed { kind: &'static str, message: String },
    #[error("Store {operation} failed for {kind} {namespace}/{name}")]
    StoreFailed {
        operation: &'static str,
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("Failed to parse resource quantity: {message}")]
    QuantityParseError { message: String },
}

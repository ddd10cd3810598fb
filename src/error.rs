//! Error types for the capture pipeline

/// Registry construction errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Protocol '{0}' is registered more than once")]
    DuplicateProtocol(String),
}

/// Keystore attachment errors (never fatal to the environment)
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("Keystore '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Pulse worker lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Pulse worker is already running")]
    AlreadyRunning,

    #[error("Pulse worker is not running")]
    NotRunning,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Radio hardware failures reported by a [`crate::radio::RadioHal`]
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Radio is busy: {0}")]
    Busy(String),

    #[error("Radio fault: {0}")]
    Fault(String),
}

/// Session startup and lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session is already running")]
    AlreadyRunning,

    #[error("Hardware error: {0}")]
    Hardware(#[from] HalError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Operation-level error surface shared by the router, the emulator and the
/// backend adapters. Construction-time configuration problems live in
/// [`crate::config::ConfigError`] instead and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("adapter '{0}' is not known to the factory")]
    AdapterNotFound(String),

    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Any backend-reported failure that is not a distinct semantic case
    /// below (I/O mid-operation, protocol errors, task join failures).
    #[error("backend {endpoint} error: {reason}")]
    Backend { endpoint: String, reason: String },

    #[error("key '{key}' does not exist")]
    KeyNotFound { key: String },

    #[error("key '{key}' is not in the allowed key list")]
    KeyNotAllowed { key: String },

    #[error("index {index} does not exist in the value of key '{key}'")]
    IndexNotFound { key: String, index: u64 },

    #[error("value of key '{key}' is not a container")]
    TypeMismatch { key: String },

    #[error("{verb} requires the '{name}' argument")]
    MissingArgument {
        verb: &'static str,
        name: &'static str,
    },

    #[error("no operation verb matches method '{0}'")]
    UnknownOperation(String),

    #[error("cannot replace key '{key}': it has not been read by this adapter instance")]
    ReplaceWithoutRead { key: String },

    #[error("failed to write value back to key '{key}'")]
    SetFailed { key: String },

    #[error("{operation} is not supported by the {adapter} adapter")]
    Unsupported {
        operation: &'static str,
        adapter: &'static str,
    },

    #[error("could not obtain an append index for key '{key}'")]
    AppendKeyFailed { key: String },
}

impl KvError {
    /// Stable machine-checkable code for each failure class.
    pub fn code(&self) -> &'static str {
        match self {
            KvError::AdapterNotFound(_) => "adapter-not-found",
            KvError::ConnectionFailed { .. } => "connection-failed",
            KvError::Backend { .. } => "backend",
            KvError::KeyNotFound { .. } => "key-not-found",
            KvError::KeyNotAllowed { .. } => "key-not-allowed",
            KvError::IndexNotFound { .. } => "index-not-found",
            KvError::TypeMismatch { .. } => "type-mismatch",
            KvError::MissingArgument { .. } => "missing-argument",
            KvError::UnknownOperation(_) => "unknown-operation",
            KvError::ReplaceWithoutRead { .. } => "replace-without-read",
            KvError::SetFailed { .. } => "set-failed",
            KvError::Unsupported { .. } => "unsupported",
            KvError::AppendKeyFailed { .. } => "append-key-failed",
        }
    }
}

/// All domain errors for keyfort.
///
/// These surface at the provider boundary. The store facade flattens them
/// into boolean/`Option` returns plus diagnostic log lines; no error in
/// this layer escalates past the calling operation.
#[derive(Debug, thiserror::Error)]
pub enum KeyfortError {
    #[error("Provider '{provider}' failed: {detail}")]
    ProviderFailure { provider: String, detail: String },

    #[error("Unknown backend id '{backend_id}'")]
    BackendUnknown { backend_id: String },

    #[error("Backend '{backend_id}' is locked and needs a passphrase")]
    PassphraseRequired { backend_id: String },

    #[error("Entry '{entry_id}' already exists")]
    DuplicateEntry { entry_id: String },

    #[error("Store '{id}' is read-only")]
    ReadOnlyStore { id: String },

    #[error("Payload rejected: {detail}")]
    InvalidPayload { detail: String },

    #[error("gpg invocation failed: {reason}")]
    KeyringCommand { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KeyfortError>;

use serde::{Deserialize, Serialize};

use crate::core::models::entry::{Entry, EntryPayload};

/// The kind of key store a backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreType {
    /// OS-wide objects such as root certificates.
    System,
    /// Per-user stores such as a desktop keychain or wallet.
    User,
    /// Application-level caches, e.g. accepted self-signed certificates.
    Application,
    /// Hardware tokens.
    SmartCard,
    /// A PGP keyring.
    PgpKeyring,
}

/// What kinds of objects a backend holds.
///
/// Callers use these flags to pick stores without inspecting every entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapabilities {
    /// Certificates and CRLs forming a trust list.
    pub trusted_certificates: bool,
    /// Identities: key bundles or PGP secret keys.
    pub identities: bool,
    pub pgp_public_keys: bool,
}

impl StoreCapabilities {
    /// The conventional capabilities for a store type, for backends that
    /// do not refine them.
    pub fn for_store_type(store_type: StoreType) -> Self {
        match store_type {
            StoreType::System | StoreType::Application => Self {
                trusted_certificates: true,
                ..Self::default()
            },
            StoreType::User | StoreType::SmartCard => Self {
                identities: true,
                ..Self::default()
            },
            StoreType::PgpKeyring => Self {
                identities: true,
                pgp_public_keys: true,
                ..Self::default()
            },
        }
    }
}

/// Descriptor for one live backend, as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Stable within a session; volatile backends may come back under a
    /// new id after a restart.
    pub id: String,
    pub name: String,
    pub store_type: StoreType,
    pub read_only: bool,
    pub capabilities: StoreCapabilities,
}

impl BackendInfo {
    /// A writable backend with the conventional capabilities for its type.
    pub fn new(id: impl Into<String>, name: impl Into<String>, store_type: StoreType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            store_type,
            read_only: false,
            capabilities: StoreCapabilities::for_store_type(store_type),
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// One entry as enumerated by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Unique within the backend; usable to remove the entry later.
    pub id: String,
    pub name: String,
    pub payload: EntryPayload,
}

impl EntryRecord {
    pub fn from_payload(payload: EntryPayload) -> Self {
        Self {
            id: payload.content_id(),
            name: payload.display_name(),
            payload,
        }
    }

    /// Snapshot this record into a caller-facing entry.
    pub(crate) fn into_entry(self) -> Entry {
        Entry::new(self.id, self.name, self.payload)
    }
}

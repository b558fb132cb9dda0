use secrecy::SecretString;

use crate::core::errors::Result;
use crate::core::models::backend::{BackendInfo, EntryRecord};
use crate::core::models::entry::EntryPayload;
use crate::core::models::event::BackendEvent;

/// Port for credential store backends.
///
/// Implementations live in `adapters::providers` (e.g. MemoryProvider,
/// GpgKeyringProvider). The coordination layer only depends on this trait,
/// never on a concrete backend.
///
/// Calls may block (a smartcard PIN prompt, a gpg subprocess); callers must
/// not assume non-blocking behavior. There is no cancellation primitive, so
/// implementations are responsible for bounding their own latency.
pub trait StoreProvider: Send + Sync {
    /// Human-readable name of this provider (e.g. "memory", "gnupg").
    fn name(&self) -> &str;

    /// Enumerate the backends currently reachable through this provider.
    fn list_backends(&self) -> Result<Vec<BackendInfo>>;

    /// Enumerate the entries in one backend. A fresh snapshot every call.
    fn list_entries(&self, backend_id: &str) -> Result<Vec<EntryRecord>>;

    /// Write a payload into a backend, returning the resulting record.
    ///
    /// The record may differ from the input: a PGP import can merge with
    /// an existing key and come back with backend-assigned metadata.
    fn write_entry(&self, backend_id: &str, payload: &EntryPayload) -> Result<EntryRecord>;

    /// Remove the entry with the given id. `Ok(false)` when the id is
    /// unknown to the backend.
    fn remove_entry(&self, backend_id: &str, entry_id: &str) -> Result<bool>;

    /// Hand a passphrase to a backend that asked for one. Fire-and-forget:
    /// the outcome shows up as later change events, not as a return value.
    fn submit_passphrase(&self, backend_id: &str, passphrase: &SecretString);

    /// Drain the change events accumulated since the last call.
    fn drain_events(&self) -> Vec<BackendEvent>;
}

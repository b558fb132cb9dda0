/// Change notification emitted by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// The entry set changed.
    Updated,
    /// The backend disappeared. Terminal: nothing follows this event for
    /// the same store instance.
    Unavailable,
    /// The backend needs a passphrase before entries can be enumerated or
    /// used. Answer with `KeyStore::submit_passphrase`.
    NeedPassphrase,
}

/// A change event reported by a provider, addressed by backend id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub backend_id: String,
    pub kind: StoreEvent,
}

/// Notification emitted by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A new store was created and inserted into the known set;
    /// `key_store(id)` succeeds by the time a subscriber sees this.
    StoreAvailable { id: String },
}

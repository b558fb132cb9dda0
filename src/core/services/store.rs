use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;

use crate::core::models::backend::{BackendInfo, EntryRecord, StoreType};
use crate::core::models::entry::{Entry, EntryPayload};
use crate::core::models::event::StoreEvent;
use crate::core::models::payload::{Certificate, Crl, KeyBundle, PgpKey};
use crate::core::services::diagnostics::DiagnosticLog;
use crate::core::traits::provider::StoreProvider;

/// General purpose key storage object.
///
/// One facade per live backend: a system trust list (`System`), a desktop
/// keychain (`User`), an application's accepted self-signed certificates
/// (`Application`), a smartcard (`SmartCard`) or a gnupg keyring
/// (`PgpKeyring`).
///
/// Instances are created by the manager when a backend appears and sealed
/// when it disappears; a sealed store is never resurrected — a returning
/// backend gets a fresh instance on a later scan. Mutating operations are
/// best-effort: they report failure through their return value and a
/// diagnostic line, never through a raised fault.
pub struct KeyStore {
    info: BackendInfo,
    provider: Arc<dyn StoreProvider>,
    diagnostics: DiagnosticLog,
    /// Serializes provider calls and event emission for this store.
    state: Mutex<StoreState>,
}

struct StoreState {
    available: bool,
    subscribers: Vec<Sender<StoreEvent>>,
}

impl KeyStore {
    /// Only the manager constructs stores.
    pub(crate) fn new(
        info: BackendInfo,
        provider: Arc<dyn StoreProvider>,
        diagnostics: DiagnosticLog,
    ) -> Self {
        Self {
            info,
            provider,
            diagnostics,
            state: Mutex::new(StoreState {
                available: true,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable for the lifetime of this instance.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn store_type(&self) -> StoreType {
        self.info.store_type
    }

    pub fn is_read_only(&self) -> bool {
        self.info.read_only
    }

    /// Whether the store holds trusted certificates (and CRLs).
    pub fn holds_trusted_certificates(&self) -> bool {
        self.info.capabilities.trusted_certificates
    }

    /// Whether the store holds identities (key bundles, PGP secret keys).
    pub fn holds_identities(&self) -> bool {
        self.info.capabilities.identities
    }

    pub fn holds_pgp_public_keys(&self) -> bool {
        self.info.capabilities.pgp_public_keys
    }

    /// False once the backend has disappeared. Terminal.
    pub fn is_available(&self) -> bool {
        self.lock_state().available
    }

    /// A point-in-time snapshot of the entries in this store.
    ///
    /// Re-fetched from the provider on every call; nothing is cached
    /// across calls. On provider failure, or on a sealed store, this
    /// returns an empty list and records a diagnostic line.
    pub fn entry_list(&self) -> Vec<Entry> {
        let state = self.lock_state();
        if !state.available {
            return Vec::new();
        }
        match self.provider.list_entries(&self.info.id) {
            Ok(records) => records.into_iter().map(EntryRecord::into_entry).collect(),
            Err(e) => {
                self.diagnostics
                    .report(&format!("store '{}': entry listing failed: {e}", self.info.id));
                Vec::new()
            }
        }
    }

    /// Add a key bundle. False when the store is read-only, sealed, does
    /// not hold identities, or the backend rejects the bundle.
    pub fn write_key_bundle(&self, bundle: &KeyBundle) -> bool {
        self.write_checked(
            EntryPayload::KeyBundle(bundle.clone()),
            self.info.capabilities.identities,
        )
        .is_some()
    }

    /// Add a certificate. Same failure rules as `write_key_bundle`, gated
    /// on the trusted-certificates capability.
    pub fn write_certificate(&self, cert: &Certificate) -> bool {
        self.write_checked(
            EntryPayload::Certificate(cert.clone()),
            self.info.capabilities.trusted_certificates,
        )
        .is_some()
    }

    pub fn write_crl(&self, crl: &Crl) -> bool {
        self.write_checked(
            EntryPayload::Crl(crl.clone()),
            self.info.capabilities.trusted_certificates,
        )
        .is_some()
    }

    /// Import a PGP key, returning the in-keyring key on success.
    ///
    /// Unlike the boolean writers this hands back the resulting key: the
    /// backend may merge the import with an existing key and attach its own
    /// metadata. `None` on failure.
    pub fn write_pgp_key(&self, key: &PgpKey) -> Option<PgpKey> {
        let permitted = if key.is_secret {
            self.info.capabilities.identities
        } else {
            self.info.capabilities.pgp_public_keys
        };
        let record = self.write_checked(EntryPayload::from_pgp(key.clone()), permitted)?;
        match record.payload {
            EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key) => Some(key),
            _ => None,
        }
    }

    /// Shared write path: availability, read-only and capability gating,
    /// then the provider call. Holds the store lock throughout.
    fn write_checked(&self, payload: EntryPayload, permitted: bool) -> Option<EntryRecord> {
        let state = self.lock_state();
        if !state.available {
            self.diagnostics.report(&format!(
                "store '{}': write rejected, store is unavailable",
                self.info.id
            ));
            return None;
        }
        if self.info.read_only {
            self.diagnostics.report(&format!(
                "store '{}': write rejected, store is read-only",
                self.info.id
            ));
            return None;
        }
        if !permitted {
            self.diagnostics.report(&format!(
                "store '{}': write rejected, this store does not hold {} entries",
                self.info.id,
                payload.entry_type()
            ));
            return None;
        }
        match self.provider.write_entry(&self.info.id, &payload) {
            Ok(record) => Some(record),
            Err(e) => {
                self.diagnostics
                    .report(&format!("store '{}': write failed: {e}", self.info.id));
                None
            }
        }
    }

    /// Remove the entry with the given id. False when the id is unknown,
    /// the store is read-only, or the store is sealed.
    pub fn remove_entry(&self, entry_id: &str) -> bool {
        let state = self.lock_state();
        if !state.available {
            self.diagnostics.report(&format!(
                "store '{}': remove rejected, store is unavailable",
                self.info.id
            ));
            return false;
        }
        if self.info.read_only {
            self.diagnostics.report(&format!(
                "store '{}': remove rejected, store is read-only",
                self.info.id
            ));
            return false;
        }
        match self.provider.remove_entry(&self.info.id, entry_id) {
            Ok(removed) => {
                if !removed {
                    self.diagnostics.report(&format!(
                        "store '{}': no entry '{entry_id}' to remove",
                        self.info.id
                    ));
                }
                removed
            }
            Err(e) => {
                self.diagnostics
                    .report(&format!("store '{}': remove failed: {e}", self.info.id));
                false
            }
        }
    }

    /// Supply the passphrase a `NeedPassphrase` event asked for.
    ///
    /// No return value: a wrong passphrase shows up as another
    /// `NeedPassphrase` event, acceptance as an `Updated` one.
    pub fn submit_passphrase(&self, passphrase: SecretString) {
        let state = self.lock_state();
        if !state.available {
            return;
        }
        self.provider.submit_passphrase(&self.info.id, &passphrase);
    }

    /// Register for this store's change events.
    ///
    /// Each subscriber gets its own single-consumer queue; events arrive in
    /// causal order and `Unavailable` is always the last one delivered.
    /// Subscribing to an already sealed store yields `Unavailable`
    /// immediately.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let mut state = self.lock_state();
        let (tx, rx) = mpsc::channel();
        if state.available {
            state.subscribers.push(tx);
        } else {
            let _ = tx.send(StoreEvent::Unavailable);
        }
        rx
    }

    /// Deliver an event to subscribers. Sealing via `Unavailable` drops
    /// every sender, so no later event can follow it.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let mut state = self.lock_state();
        if !state.available {
            return;
        }
        state.subscribers.retain(|tx| tx.send(event).is_ok());
        if event == StoreEvent::Unavailable {
            state.available = false;
            state.subscribers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::memory_provider::MemoryProvider;
    use crate::core::models::backend::StoreCapabilities;

    fn cert(subject: &str) -> Certificate {
        Certificate {
            subject: subject.into(),
            der: subject.as_bytes().to_vec(),
        }
    }

    fn app_store(read_only: bool) -> KeyStore {
        let info = BackendInfo::new("app-cache", "Accepted certificates", StoreType::Application)
            .with_read_only(read_only);
        let provider = MemoryProvider::new();
        provider.attach_backend(info.clone());
        KeyStore::new(info, Arc::new(provider), DiagnosticLog::new())
    }

    #[test]
    fn write_then_list_shows_the_certificate() {
        let store = app_store(false);
        assert!(store.write_certificate(&cert("CN=selfsigned")));

        let entries = store.entry_list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].certificate().unwrap().subject, "CN=selfsigned");
    }

    #[test]
    fn remove_then_list_never_shows_the_id() {
        let store = app_store(false);
        store.write_certificate(&cert("CN=gone"));
        let id = store.entry_list()[0].id().to_string();

        assert!(store.remove_entry(&id));
        assert!(store.entry_list().iter().all(|e| e.id() != id));
    }

    #[test]
    fn read_only_store_rejects_writes_and_removes() {
        let store = app_store(true);
        assert!(!store.write_certificate(&cert("CN=nope")));
        assert!(!store.remove_entry("anything"));
        assert!(store.entry_list().is_empty());
    }

    #[test]
    fn wrong_capability_write_is_rejected() {
        // Application stores hold trusted certificates, not identities.
        let store = app_store(false);
        let bundle = KeyBundle {
            name: "identity".into(),
            blob: vec![1],
        };
        assert!(!store.write_key_bundle(&bundle));
        assert!(store.entry_list().is_empty());
    }

    #[test]
    fn sealed_store_rejects_everything_and_lists_empty() {
        let store = app_store(false);
        store.write_certificate(&cert("CN=cached"));
        store.emit(StoreEvent::Unavailable);

        assert!(!store.is_available());
        assert!(store.entry_list().is_empty());
        assert!(!store.write_certificate(&cert("CN=late")));
        assert!(!store.remove_entry("any"));
    }

    #[test]
    fn no_event_follows_unavailable() {
        let store = app_store(false);
        let events = store.subscribe();

        store.emit(StoreEvent::Updated);
        store.emit(StoreEvent::Unavailable);
        store.emit(StoreEvent::Updated);

        assert_eq!(events.try_recv(), Ok(StoreEvent::Updated));
        assert_eq!(events.try_recv(), Ok(StoreEvent::Unavailable));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn subscribing_to_a_sealed_store_yields_unavailable() {
        let store = app_store(false);
        store.emit(StoreEvent::Unavailable);

        let events = store.subscribe();
        assert_eq!(events.try_recv(), Ok(StoreEvent::Unavailable));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn capability_flags_mirror_backend_info() {
        let info = BackendInfo::new("keyring", "GnuPG", StoreType::PgpKeyring);
        let provider = MemoryProvider::new();
        provider.attach_backend(info.clone());
        let store = KeyStore::new(info, Arc::new(provider), DiagnosticLog::new());

        assert!(store.holds_identities());
        assert!(store.holds_pgp_public_keys());
        assert!(!store.holds_trusted_certificates());
    }

    #[test]
    fn rejected_write_leaves_a_diagnostic() {
        let diagnostics = DiagnosticLog::new();
        let info = BackendInfo::new("ro", "Read-only", StoreType::Application)
            .with_read_only(true)
            .with_capabilities(StoreCapabilities {
                trusted_certificates: true,
                ..StoreCapabilities::default()
            });
        let provider = MemoryProvider::new();
        provider.attach_backend(info.clone());
        let store = KeyStore::new(info, Arc::new(provider), diagnostics.clone());

        store.write_certificate(&cert("CN=denied"));
        assert!(diagnostics.text().contains("read-only"));
    }
}

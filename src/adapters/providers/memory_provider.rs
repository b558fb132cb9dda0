use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};

use crate::core::errors::{KeyfortError, Result};
use crate::core::models::backend::{BackendInfo, EntryRecord};
use crate::core::models::entry::EntryPayload;
use crate::core::models::event::{BackendEvent, StoreEvent};
use crate::core::traits::provider::StoreProvider;

/// In-process provider, typically backing an Application store that caches
/// accepted self-signed certificates for the lifetime of the process.
///
/// The hosting application controls which backends exist:
/// [`attach_backend`](Self::attach_backend) and
/// [`detach_backend`](Self::detach_backend) simulate tokens coming and
/// going, [`lock_backend`](Self::lock_backend) puts a backend behind a
/// passphrase. That also makes this the reference implementation of the
/// provider port for tests.
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    backends: BTreeMap<String, MemoryBackend>,
    events: VecDeque<BackendEvent>,
}

struct MemoryBackend {
    info: BackendInfo,
    entries: Vec<EntryRecord>,
    /// Some(expected) while locked; entries are unreadable until the right
    /// passphrase arrives.
    passphrase: Option<String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a backend visible to the next `list_backends` call. Replaces
    /// any previous backend under the same id, entries included.
    pub fn attach_backend(&self, info: BackendInfo) {
        let mut inner = self.lock_inner();
        inner.backends.insert(
            info.id.clone(),
            MemoryBackend {
                info,
                entries: Vec::new(),
                passphrase: None,
            },
        );
    }

    /// Drop a backend and queue the `Unavailable` event for it.
    pub fn detach_backend(&self, backend_id: &str) {
        let mut inner = self.lock_inner();
        if inner.backends.remove(backend_id).is_some() {
            inner.events.push_back(BackendEvent {
                backend_id: backend_id.into(),
                kind: StoreEvent::Unavailable,
            });
        }
    }

    /// Lock a backend behind a passphrase and announce `NeedPassphrase`.
    pub fn lock_backend(&self, backend_id: &str, passphrase: &str) {
        let inner = &mut *self.lock_inner();
        if let Some(backend) = inner.backends.get_mut(backend_id) {
            backend.passphrase = Some(passphrase.to_string());
            inner.events.push_back(BackendEvent {
                backend_id: backend_id.into(),
                kind: StoreEvent::NeedPassphrase,
            });
        }
    }

    fn push_event(inner: &mut Inner, backend_id: &str, kind: StoreEvent) {
        inner.events.push_back(BackendEvent {
            backend_id: backend_id.into(),
            kind,
        });
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_backends(&self) -> Result<Vec<BackendInfo>> {
        Ok(self
            .lock_inner()
            .backends
            .values()
            .map(|b| b.info.clone())
            .collect())
    }

    fn list_entries(&self, backend_id: &str) -> Result<Vec<EntryRecord>> {
        let inner = &mut *self.lock_inner();
        let Some(backend) = inner.backends.get(backend_id) else {
            return Err(KeyfortError::BackendUnknown {
                backend_id: backend_id.into(),
            });
        };
        if backend.passphrase.is_some() {
            // Remind the caller until the right passphrase arrives.
            Self::push_event(inner, backend_id, StoreEvent::NeedPassphrase);
            return Err(KeyfortError::PassphraseRequired {
                backend_id: backend_id.into(),
            });
        }
        Ok(backend.entries.clone())
    }

    fn write_entry(&self, backend_id: &str, payload: &EntryPayload) -> Result<EntryRecord> {
        let inner = &mut *self.lock_inner();
        let Some(backend) = inner.backends.get_mut(backend_id) else {
            return Err(KeyfortError::BackendUnknown {
                backend_id: backend_id.into(),
            });
        };
        if backend.passphrase.is_some() {
            return Err(KeyfortError::PassphraseRequired {
                backend_id: backend_id.into(),
            });
        }

        // A PGP import merges with an existing key instead of duplicating it.
        if let EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key) = payload {
            if let Some(existing) = backend.entries.iter_mut().find(|e| e.id == key.key_id) {
                if let EntryPayload::PgpSecretKey(stored) | EntryPayload::PgpPublicKey(stored) =
                    &existing.payload
                {
                    let merged = stored.merged_with(key);
                    existing.payload = EntryPayload::from_pgp(merged);
                    existing.name = existing.payload.display_name();
                }
                let merged = existing.clone();
                Self::push_event(inner, backend_id, StoreEvent::Updated);
                return Ok(merged);
            }
        }

        let record = EntryRecord::from_payload(payload.clone());
        if backend.entries.iter().any(|e| e.id == record.id) {
            return Err(KeyfortError::DuplicateEntry {
                entry_id: record.id,
            });
        }
        backend.entries.push(record.clone());
        Self::push_event(inner, backend_id, StoreEvent::Updated);
        Ok(record)
    }

    fn remove_entry(&self, backend_id: &str, entry_id: &str) -> Result<bool> {
        let inner = &mut *self.lock_inner();
        let Some(backend) = inner.backends.get_mut(backend_id) else {
            return Err(KeyfortError::BackendUnknown {
                backend_id: backend_id.into(),
            });
        };
        if backend.passphrase.is_some() {
            return Err(KeyfortError::PassphraseRequired {
                backend_id: backend_id.into(),
            });
        }
        let before = backend.entries.len();
        backend.entries.retain(|e| e.id != entry_id);
        let removed = backend.entries.len() != before;
        if removed {
            Self::push_event(inner, backend_id, StoreEvent::Updated);
        }
        Ok(removed)
    }

    fn submit_passphrase(&self, backend_id: &str, passphrase: &SecretString) {
        let inner = &mut *self.lock_inner();
        let Some(backend) = inner.backends.get_mut(backend_id) else {
            return;
        };
        let Some(expected) = backend.passphrase.clone() else {
            return;
        };
        if expected == passphrase.expose_secret() {
            backend.passphrase = None;
            Self::push_event(inner, backend_id, StoreEvent::Updated);
        } else {
            // Wrong secret: ask again. That repeat is the only
            // caller-visible failure signal.
            Self::push_event(inner, backend_id, StoreEvent::NeedPassphrase);
        }
    }

    fn drain_events(&self) -> Vec<BackendEvent> {
        self.lock_inner().events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::backend::StoreType;
    use crate::core::models::payload::{Certificate, PgpKey};

    fn provider() -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.attach_backend(BackendInfo::new("cache", "App cache", StoreType::Application));
        provider
    }

    fn cert_payload(subject: &str) -> EntryPayload {
        EntryPayload::Certificate(Certificate {
            subject: subject.into(),
            der: subject.as_bytes().to_vec(),
        })
    }

    fn pgp_payload(key_id: &str, uid: &str) -> EntryPayload {
        EntryPayload::from_pgp(PgpKey {
            key_id: key_id.into(),
            user_ids: vec![uid.into()],
            is_secret: false,
            material: vec![0xC6],
        })
    }

    #[test]
    fn write_queues_an_updated_event() {
        let provider = provider();
        provider.write_entry("cache", &cert_payload("CN=a")).unwrap();

        let events = provider.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StoreEvent::Updated);
        assert_eq!(events[0].backend_id, "cache");
        // Drained means drained.
        assert!(provider.drain_events().is_empty());
    }

    #[test]
    fn duplicate_write_is_rejected() {
        let provider = provider();
        provider.write_entry("cache", &cert_payload("CN=a")).unwrap();
        let result = provider.write_entry("cache", &cert_payload("CN=a"));
        assert!(matches!(result, Err(KeyfortError::DuplicateEntry { .. })));
        assert_eq!(provider.list_entries("cache").unwrap().len(), 1);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let provider = provider();
        assert!(matches!(
            provider.list_entries("nope"),
            Err(KeyfortError::BackendUnknown { .. })
        ));
    }

    #[test]
    fn pgp_reimport_merges_instead_of_duplicating() {
        let provider = MemoryProvider::new();
        provider.attach_backend(BackendInfo::new("ring", "Keyring", StoreType::PgpKeyring));

        provider
            .write_entry("ring", &pgp_payload("A1B2", "alice@example.org"))
            .unwrap();
        let merged = provider
            .write_entry("ring", &pgp_payload("A1B2", "alice@work.example"))
            .unwrap();

        assert_eq!(merged.id, "A1B2");
        let EntryPayload::PgpPublicKey(key) = &merged.payload else {
            panic!("expected a public key payload");
        };
        assert_eq!(key.user_ids.len(), 2);
        assert_eq!(provider.list_entries("ring").unwrap().len(), 1);
    }

    #[test]
    fn secret_import_upgrades_a_public_key() {
        let provider = MemoryProvider::new();
        provider.attach_backend(BackendInfo::new("ring", "Keyring", StoreType::PgpKeyring));
        provider
            .write_entry("ring", &pgp_payload("A1B2", "alice@example.org"))
            .unwrap();

        let secret = EntryPayload::from_pgp(PgpKey {
            key_id: "A1B2".into(),
            user_ids: vec!["alice@example.org".into()],
            is_secret: true,
            material: vec![0xC5],
        });
        let merged = provider.write_entry("ring", &secret).unwrap();
        assert!(matches!(merged.payload, EntryPayload::PgpSecretKey(_)));
    }

    #[test]
    fn locked_backend_demands_a_passphrase() {
        let provider = provider();
        provider.lock_backend("cache", "hunter2");
        provider.drain_events();

        let result = provider.list_entries("cache");
        assert!(matches!(result, Err(KeyfortError::PassphraseRequired { .. })));
        let events = provider.drain_events();
        assert_eq!(events[0].kind, StoreEvent::NeedPassphrase);
    }

    #[test]
    fn wrong_passphrase_asks_again_right_one_unlocks() {
        let provider = provider();
        provider.lock_backend("cache", "hunter2");
        provider.drain_events();

        provider.submit_passphrase("cache", &SecretString::from("wrong".to_string()));
        assert_eq!(provider.drain_events()[0].kind, StoreEvent::NeedPassphrase);

        provider.submit_passphrase("cache", &SecretString::from("hunter2".to_string()));
        assert_eq!(provider.drain_events()[0].kind, StoreEvent::Updated);
        assert!(provider.list_entries("cache").is_ok());
    }

    #[test]
    fn detach_queues_unavailable() {
        let provider = provider();
        provider.detach_backend("cache");
        assert_eq!(provider.drain_events()[0].kind, StoreEvent::Unavailable);
        assert!(provider.list_backends().unwrap().is_empty());
    }

    #[test]
    fn remove_missing_entry_reports_false() {
        let provider = provider();
        assert!(!provider.remove_entry("cache", "no-such-id").unwrap());
        assert!(provider.drain_events().is_empty());
    }
}

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::models::backend::BackendInfo;
use crate::core::models::event::{ManagerEvent, StoreEvent};
use crate::core::services::diagnostics::DiagnosticLog;
use crate::core::services::store::KeyStore;
use crate::core::traits::provider::StoreProvider;

/// Access key stores and monitor them for changes.
///
/// The manager is the sole writer of the known-store set: [`scan`] runs
/// under an exclusive lock, discovers backends through the registered
/// providers, creates one [`KeyStore`] facade per backend and retires
/// facades whose backend disappeared. There is no ambient global instance;
/// construct one at startup and pass it to whatever needs it.
///
/// [`scan`]: KeyStoreManager::scan
pub struct KeyStoreManager {
    providers: Vec<Arc<dyn StoreProvider>>,
    diagnostics: DiagnosticLog,
    state: Mutex<ManagerState>,
}

struct StoreSlot {
    store: Arc<KeyStore>,
    /// Index into `providers` of the provider that reported this backend.
    provider: usize,
}

#[derive(Default)]
struct ManagerState {
    stores: BTreeMap<String, StoreSlot>,
    subscribers: Vec<Sender<ManagerEvent>>,
}

impl KeyStoreManager {
    /// Create a manager over the given providers. The known-store set
    /// starts empty; call [`scan`](Self::scan) to populate it.
    pub fn new(providers: Vec<Arc<dyn StoreProvider>>) -> Self {
        Self {
            providers,
            diagnostics: DiagnosticLog::new(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live store for `id`, if currently known.
    pub fn key_store(&self, id: &str) -> Option<Arc<KeyStore>> {
        self.lock_state()
            .stores
            .get(id)
            .map(|slot| Arc::clone(&slot.store))
    }

    /// Snapshot of all currently known stores.
    pub fn key_stores(&self) -> Vec<Arc<KeyStore>> {
        self.lock_state()
            .stores
            .values()
            .map(|slot| Arc::clone(&slot.store))
            .collect()
    }

    /// Number of currently known stores. Always equals
    /// `key_stores().len()` observed at the same instant.
    pub fn count(&self) -> usize {
        self.lock_state().stores.len()
    }

    /// Cumulative, human-readable log of backend warnings and errors.
    /// Append-only, never cleared implicitly.
    pub fn diagnostic_text(&self) -> String {
        self.diagnostics.text()
    }

    /// Register for manager events.
    pub fn subscribe(&self) -> Receiver<ManagerEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock_state().subscribers.push(tx);
        rx
    }

    /// Reconcile the known-store set against what the providers see now.
    ///
    /// Serialized by the manager lock: a scan in progress is never
    /// re-entered. Backends seen for the first time get a fresh store and a
    /// [`ManagerEvent::StoreAvailable`] notification, emitted only after
    /// insertion so `key_store(id)` succeeds from the handler. Backends
    /// that vanished have their store sealed and dropped. Unchanged
    /// backends keep their store instance and its subscriptions. Pending
    /// provider change events are routed at the end of the pass.
    pub fn scan(&self) {
        let mut state = self.lock_state();

        // One slot per provider; None when the provider failed to answer.
        let mut reported: Vec<Option<Vec<BackendInfo>>> = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.list_backends() {
                Ok(backends) => reported.push(Some(backends)),
                Err(e) => {
                    self.diagnostics.report(&format!(
                        "provider '{}': backend enumeration failed: {e}",
                        provider.name()
                    ));
                    reported.push(None);
                }
            }
        }

        // Retire stores whose backend vanished. A provider that failed to
        // answer keeps its stores: absence is only honored from a live list.
        let gone: Vec<String> = state
            .stores
            .iter()
            .filter(|(id, slot)| match reported.get(slot.provider) {
                Some(Some(backends)) => !backends.iter().any(|b| b.id == **id),
                _ => false,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in gone {
            self.retire(&mut state, &id);
        }

        // Create facades for newly seen backends.
        let mut created: Vec<String> = Vec::new();
        for (index, backends) in reported.iter().enumerate() {
            let Some(backends) = backends else { continue };
            for info in backends {
                if let Some(slot) = state.stores.get(&info.id) {
                    if slot.provider != index {
                        self.diagnostics.report(&format!(
                            "provider '{}': backend id '{}' already registered, skipping",
                            self.providers[index].name(),
                            info.id
                        ));
                    }
                    continue;
                }
                let store = Arc::new(KeyStore::new(
                    info.clone(),
                    Arc::clone(&self.providers[index]),
                    self.diagnostics.clone(),
                ));
                state.stores.insert(
                    info.id.clone(),
                    StoreSlot {
                        store,
                        provider: index,
                    },
                );
                created.push(info.id.clone());
            }
        }
        for id in created {
            state
                .subscribers
                .retain(|tx| tx.send(ManagerEvent::StoreAvailable { id: id.clone() }).is_ok());
        }

        // Route change events the providers queued since the last pass.
        for provider in &self.providers {
            for event in provider.drain_events() {
                match event.kind {
                    StoreEvent::Unavailable => self.retire(&mut state, &event.backend_id),
                    kind => {
                        if let Some(slot) = state.stores.get(&event.backend_id) {
                            slot.store.emit(kind);
                        }
                    }
                }
            }
        }
    }

    /// Seal a store and forget it. The sealed instance is never reused; a
    /// returning backend gets a fresh one on a later scan.
    fn retire(&self, state: &mut ManagerState, id: &str) {
        if let Some(slot) = state.stores.remove(id) {
            slot.store.emit(StoreEvent::Unavailable);
            self.diagnostics
                .report(&format!("store '{id}' became unavailable"));
        }
    }

    /// Seal every store and clear the registry. Also runs on drop.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        for (_, slot) in std::mem::take(&mut state.stores) {
            slot.store.emit(StoreEvent::Unavailable);
        }
        state.subscribers.clear();
    }
}

impl Drop for KeyStoreManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;

use crate::core::errors::{KeyfortError, Result};
use crate::core::models::backend::{BackendInfo, EntryRecord, StoreType};
use crate::core::models::entry::EntryPayload;
use crate::core::models::event::{BackendEvent, StoreEvent};
use crate::core::traits::provider::StoreProvider;

/// Directory-backed provider exposing a single Application store.
///
/// Each entry is one JSON document named `<entry-id>.json` under the store
/// directory, the id being a content digest of the payload. Suited to an
/// application cache of accepted self-signed certificates that must
/// survive restarts. Writes are staged through a temp file and persisted
/// into place, so a listing never sees a half-written entry.
pub struct DirStoreProvider {
    backend_id: String,
    backend_name: String,
    dir: PathBuf,
    read_only: bool,
    events: Mutex<VecDeque<BackendEvent>>,
}

impl DirStoreProvider {
    /// Create a provider storing entries under `dir` (created on first
    /// write).
    pub fn new(backend_id: impl Into<String>, backend_name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: backend_name.into(),
            dir,
            read_only: false,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Same store, but rejecting all writes.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// The directory this store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_events(&self) -> MutexGuard<'_, VecDeque<BackendEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_event(&self, kind: StoreEvent) {
        self.lock_events().push_back(BackendEvent {
            backend_id: self.backend_id.clone(),
            kind,
        });
    }

    fn check_backend(&self, backend_id: &str) -> Result<()> {
        if backend_id == self.backend_id {
            Ok(())
        } else {
            Err(KeyfortError::BackendUnknown {
                backend_id: backend_id.into(),
            })
        }
    }

    fn entry_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{entry_id}.json"))
    }

    fn read_record(path: &Path) -> Result<EntryRecord> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_record(&self, record: &EntryRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(staged.as_file(), record)?;
        staged
            .persist(self.entry_path(&record.id))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

impl StoreProvider for DirStoreProvider {
    fn name(&self) -> &str {
        "directory"
    }

    fn list_backends(&self) -> Result<Vec<BackendInfo>> {
        Ok(vec![
            BackendInfo::new(&self.backend_id, &self.backend_name, StoreType::Application)
                .with_read_only(self.read_only),
        ])
    }

    fn list_entries(&self, backend_id: &str) -> Result<Vec<EntryRecord>> {
        self.check_backend(backend_id)?;
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(Self::read_record(&path)?);
            }
        }
        // Directory iteration order is platform-dependent.
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn write_entry(&self, backend_id: &str, payload: &EntryPayload) -> Result<EntryRecord> {
        self.check_backend(backend_id)?;
        if self.read_only {
            return Err(KeyfortError::ReadOnlyStore {
                id: self.backend_id.clone(),
            });
        }

        let mut record = EntryRecord::from_payload(payload.clone());
        let path = self.entry_path(&record.id);
        if path.exists() {
            // Re-importing a PGP key merges with the stored copy; anything
            // else is a duplicate.
            let stored = Self::read_record(&path)?;
            match (&stored.payload, payload) {
                (
                    EntryPayload::PgpSecretKey(old) | EntryPayload::PgpPublicKey(old),
                    EntryPayload::PgpSecretKey(new) | EntryPayload::PgpPublicKey(new),
                ) => {
                    let merged = EntryPayload::from_pgp(old.merged_with(new));
                    record = EntryRecord {
                        id: stored.id,
                        name: merged.display_name(),
                        payload: merged,
                    };
                }
                _ => {
                    return Err(KeyfortError::DuplicateEntry {
                        entry_id: record.id,
                    });
                }
            }
        }
        self.write_record(&record)?;
        self.push_event(StoreEvent::Updated);
        Ok(record)
    }

    fn remove_entry(&self, backend_id: &str, entry_id: &str) -> Result<bool> {
        self.check_backend(backend_id)?;
        if self.read_only {
            return Err(KeyfortError::ReadOnlyStore {
                id: self.backend_id.clone(),
            });
        }
        let path = self.entry_path(entry_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        self.push_event(StoreEvent::Updated);
        Ok(true)
    }

    fn submit_passphrase(&self, _backend_id: &str, _passphrase: &SecretString) {
        // Directory stores are never locked.
    }

    fn drain_events(&self) -> Vec<BackendEvent> {
        self.lock_events().drain(..).collect()
    }
}

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;

use crate::core::errors::{KeyfortError, Result};
use crate::core::models::backend::{BackendInfo, EntryRecord, StoreType};
use crate::core::models::entry::EntryPayload;
use crate::core::models::event::{BackendEvent, StoreEvent};
use crate::core::models::payload::PgpKey;
use crate::core::traits::provider::StoreProvider;

/// PGP keyring provider that shells out to the system `gpg` binary.
///
/// Requires GnuPG to be installed; when it is not, `list_backends` reports
/// no backends instead of failing. Passphrase collection is handled by
/// gpg-agent, so `submit_passphrase` is a no-op here.
pub struct GpgKeyringProvider {
    /// Path to the gpg binary (defaults to "gpg").
    gpg_path: PathBuf,
    /// Optional GNUPGHOME override, mainly for tests.
    homedir: Option<PathBuf>,
    events: Mutex<VecDeque<BackendEvent>>,
}

const BACKEND_ID: &str = "gnupg-keyring";

impl GpgKeyringProvider {
    /// Create a provider using the default `gpg` binary.
    pub fn new() -> Self {
        Self {
            gpg_path: PathBuf::from("gpg"),
            homedir: None,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a provider with a custom gpg binary path.
    pub fn with_path(gpg_path: PathBuf) -> Self {
        Self {
            gpg_path,
            ..Self::new()
        }
    }

    /// Point gpg at a non-default home directory.
    pub fn with_homedir(mut self, homedir: PathBuf) -> Self {
        self.homedir = Some(homedir);
        self
    }

    /// Check if GPG is available on the system.
    pub fn is_available(&self) -> bool {
        Command::new(&self.gpg_path)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn lock_events(&self) -> MutexGuard<'_, VecDeque<BackendEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_updated(&self) {
        self.lock_events().push_back(BackendEvent {
            backend_id: BACKEND_ID.into(),
            kind: StoreEvent::Updated,
        });
    }

    fn check_backend(backend_id: &str) -> Result<()> {
        if backend_id == BACKEND_ID {
            Ok(())
        } else {
            Err(KeyfortError::BackendUnknown {
                backend_id: backend_id.into(),
            })
        }
    }

    /// Run a gpg command and return stdout on success.
    fn run_gpg(&self, args: &[&str], stdin_data: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.gpg_path);
        if let Some(home) = &self.homedir {
            cmd.arg("--homedir").arg(home);
        }
        cmd.arg("--batch").args(args);

        if let Some(data) = stdin_data {
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = cmd.spawn().map_err(|e| KeyfortError::KeyringCommand {
                reason: format!("Failed to run gpg: {e}"),
            })?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(data)
                    .map_err(|e| KeyfortError::KeyringCommand {
                        reason: format!("Failed to write to gpg stdin: {e}"),
                    })?;
            }

            let output = child
                .wait_with_output()
                .map_err(|e| KeyfortError::KeyringCommand {
                    reason: format!("gpg process failed: {e}"),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(KeyfortError::KeyringCommand {
                    reason: format!("gpg exited with error: {stderr}"),
                });
            }

            Ok(output.stdout)
        } else {
            let output = cmd.output().map_err(|e| KeyfortError::KeyringCommand {
                reason: format!("Failed to run gpg: {e}"),
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(KeyfortError::KeyringCommand {
                    reason: format!("gpg exited with error: {stderr}"),
                });
            }

            Ok(output.stdout)
        }
    }

    /// Parse `--with-colons` listing output into keys.
    ///
    /// Only `pub`/`sec` and `uid` records matter here; everything else
    /// (sub, fpr, trust database lines) is skipped.
    fn parse_colons(output: &str, secret: bool) -> Vec<PgpKey> {
        let mut keys: Vec<PgpKey> = Vec::new();
        let mut current: Option<PgpKey> = None;
        for line in output.lines() {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.first().copied() {
                Some("pub") | Some("sec") => {
                    if let Some(key) = current.take() {
                        keys.push(key);
                    }
                    current = Some(PgpKey {
                        key_id: fields.get(4).copied().unwrap_or_default().to_string(),
                        user_ids: Vec::new(),
                        is_secret: secret,
                        material: Vec::new(),
                    });
                }
                Some("uid") => {
                    if let Some(key) = current.as_mut() {
                        if let Some(uid) = fields.get(9).copied().filter(|u| !u.is_empty()) {
                            key.user_ids.push(uid.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(key) = current.take() {
            keys.push(key);
        }
        keys
    }

    fn list_keys(&self) -> Result<Vec<EntryRecord>> {
        let public = self.run_gpg(&["--list-keys", "--with-colons"], None)?;
        let secret = self.run_gpg(&["--list-secret-keys", "--with-colons"], None)?;

        let secret_keys = Self::parse_colons(&String::from_utf8_lossy(&secret), true);
        let mut records = Vec::new();
        for key in Self::parse_colons(&String::from_utf8_lossy(&public), false) {
            // A key with a secret half shows up in both listings; merge so
            // it is reported once, as an identity.
            let key = match secret_keys.iter().find(|s| s.key_id == key.key_id) {
                Some(secret) => key.merged_with(secret),
                None => key,
            };
            records.push(EntryRecord {
                id: key.key_id.clone(),
                name: key
                    .user_ids
                    .first()
                    .cloned()
                    .unwrap_or_else(|| key.key_id.clone()),
                payload: EntryPayload::from_pgp(key),
            });
        }
        Ok(records)
    }
}

impl Default for GpgKeyringProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreProvider for GpgKeyringProvider {
    fn name(&self) -> &str {
        "gnupg"
    }

    fn list_backends(&self) -> Result<Vec<BackendInfo>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        Ok(vec![BackendInfo::new(
            BACKEND_ID,
            "GnuPG keyring",
            StoreType::PgpKeyring,
        )])
    }

    fn list_entries(&self, backend_id: &str) -> Result<Vec<EntryRecord>> {
        Self::check_backend(backend_id)?;
        self.list_keys()
    }

    fn write_entry(&self, backend_id: &str, payload: &EntryPayload) -> Result<EntryRecord> {
        Self::check_backend(backend_id)?;
        let (EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key)) = payload else {
            return Err(KeyfortError::InvalidPayload {
                detail: "the gnupg keyring only stores PGP keys".into(),
            });
        };
        if key.material.is_empty() {
            return Err(KeyfortError::InvalidPayload {
                detail: "no key material to import".into(),
            });
        }

        self.run_gpg(&["--import"], Some(&key.material))?;
        self.push_updated();

        // Re-list and hand back the in-keyring key: the import may have
        // merged with an existing copy.
        self.list_keys()?
            .into_iter()
            .find(|r| r.id == key.key_id)
            .ok_or_else(|| KeyfortError::KeyringCommand {
                reason: format!("imported key '{}' not found in keyring", key.key_id),
            })
    }

    fn remove_entry(&self, backend_id: &str, entry_id: &str) -> Result<bool> {
        Self::check_backend(backend_id)?;
        let Some(record) = self.list_keys()?.into_iter().find(|r| r.id == entry_id) else {
            return Ok(false);
        };

        // The secret half must go first or gpg refuses the deletion.
        if matches!(record.payload, EntryPayload::PgpSecretKey(_)) {
            self.run_gpg(&["--yes", "--delete-secret-keys", entry_id], None)?;
        }
        self.run_gpg(&["--yes", "--delete-keys", entry_id], None)?;
        self.push_updated();
        Ok(true)
    }

    fn submit_passphrase(&self, _backend_id: &str, _passphrase: &SecretString) {
        // gpg-agent owns passphrase collection; nothing to forward.
    }

    fn drain_events(&self) -> Vec<BackendEvent> {
        self.lock_events().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_LISTING: &str = "\
tru::1:1700000000:0:3:1:5
pub:u:255:22:A1B2C3D4E5F60718:1700000000:::u:::scESC::::::23::0:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF01234567:
uid:u::::1700000000::HASH::Alice Example <alice@example.org>::::::::::0:
sub:u:255:18:1122334455667788:1700000000::::::e::::::23:
pub:u:255:22:FFEEDDCCBBAA9988:1700000001:::u:::scESC::::::23::0:
uid:u::::1700000001::HASH::Bob Example <bob@example.org>::::::::::0:
";

    const SECRET_LISTING: &str = "\
sec:u:255:22:A1B2C3D4E5F60718:1700000000:::u:::scESC:::+:::23::0:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF01234567:
uid:u::::1700000000::HASH::Alice Example <alice@example.org>::::::::::0:
";

    #[test]
    fn parse_colons_reads_key_ids_and_uids() {
        let keys = GpgKeyringProvider::parse_colons(PUBLIC_LISTING, false);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].key_id, "A1B2C3D4E5F60718");
        assert_eq!(
            keys[0].user_ids,
            vec!["Alice Example <alice@example.org>".to_string()]
        );
        assert!(!keys[0].is_secret);
        assert_eq!(keys[1].key_id, "FFEEDDCCBBAA9988");
    }

    #[test]
    fn parse_colons_marks_secret_listings() {
        let keys = GpgKeyringProvider::parse_colons(SECRET_LISTING, true);
        assert_eq!(keys.len(), 1);
        assert!(keys[0].is_secret);
    }

    #[test]
    fn parse_colons_ignores_unrelated_records() {
        let keys = GpgKeyringProvider::parse_colons("tru::1:1700000000:0:3:1:5\n", false);
        assert!(keys.is_empty());
    }

    #[test]
    fn non_pgp_payload_is_rejected() {
        let provider = GpgKeyringProvider::new();
        let payload = EntryPayload::Certificate(crate::core::models::payload::Certificate {
            subject: "CN=not-a-key".into(),
            der: vec![0x30],
        });
        let result = provider.write_entry(BACKEND_ID, &payload);
        assert!(matches!(result, Err(KeyfortError::InvalidPayload { .. })));
    }

    #[test]
    fn import_without_material_is_rejected() {
        let provider = GpgKeyringProvider::new();
        let payload = EntryPayload::from_pgp(PgpKey {
            key_id: "A1B2".into(),
            user_ids: vec![],
            is_secret: false,
            material: vec![],
        });
        let result = provider.write_entry(BACKEND_ID, &payload);
        assert!(matches!(result, Err(KeyfortError::InvalidPayload { .. })));
    }

    #[test]
    fn wrong_backend_id_is_rejected() {
        let provider = GpgKeyringProvider::new();
        assert!(matches!(
            provider.list_entries("not-the-keyring"),
            Err(KeyfortError::BackendUnknown { .. })
        ));
    }

    // Tests that exercise a real keyring need gpg installed; the manager
    // integration suite covers the provider port against MemoryProvider.
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::models::payload::{Certificate, Crl, KeyBundle, PgpKey};

/// The kind of credential an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    KeyBundle,
    Certificate,
    Crl,
    PgpSecretKey,
    PgpPublicKey,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntryType::KeyBundle => "key bundle",
            EntryType::Certificate => "certificate",
            EntryType::Crl => "CRL",
            EntryType::PgpSecretKey => "PGP secret key",
            EntryType::PgpPublicKey => "PGP public key",
        };
        write!(f, "{label}")
    }
}

/// A credential payload, tagged by kind.
///
/// Exactly one payload is active per entry; callers can pattern-match on
/// this directly or go through the [`Entry`] accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    KeyBundle(KeyBundle),
    Certificate(Certificate),
    Crl(Crl),
    PgpSecretKey(PgpKey),
    PgpPublicKey(PgpKey),
}

impl EntryPayload {
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryPayload::KeyBundle(_) => EntryType::KeyBundle,
            EntryPayload::Certificate(_) => EntryType::Certificate,
            EntryPayload::Crl(_) => EntryType::Crl,
            EntryPayload::PgpSecretKey(_) => EntryType::PgpSecretKey,
            EntryPayload::PgpPublicKey(_) => EntryType::PgpPublicKey,
        }
    }

    /// Wrap a PGP key in the variant matching its secret flag.
    pub fn from_pgp(key: PgpKey) -> Self {
        if key.is_secret {
            EntryPayload::PgpSecretKey(key)
        } else {
            EntryPayload::PgpPublicKey(key)
        }
    }

    /// Display name carried by the payload itself.
    pub fn display_name(&self) -> String {
        match self {
            EntryPayload::KeyBundle(kb) => kb.name.clone(),
            EntryPayload::Certificate(cert) => cert.subject.clone(),
            EntryPayload::Crl(crl) => crl.issuer.clone(),
            EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key) => key
                .user_ids
                .first()
                .cloned()
                .unwrap_or_else(|| key.key_id.clone()),
        }
    }

    /// Stable id for this payload within a store.
    ///
    /// PGP keys keep their key id so that re-imports land on the same
    /// entry; other payloads get a digest of their serialized form.
    pub fn content_id(&self) -> String {
        match self {
            EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key) => {
                key.key_id.clone()
            }
            other => {
                let mut hasher = Sha256::new();
                hasher.update(serde_json::to_vec(other).unwrap_or_default());
                format!("{:x}", hasher.finalize())
            }
        }
    }
}

/// Single entry in a key store.
///
/// A snapshot of one credential object, detached from the store that
/// produced it: mutating the store later does not change an entry already
/// in hand. Accessors for payload kinds other than the active one return
/// `None`; a mismatch is a normal, silent case, never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    id: String,
    name: String,
    payload: Option<EntryPayload>,
}

impl Entry {
    /// Only stores construct live entries; `Entry::default()` is the one
    /// null entry.
    pub(crate) fn new(id: String, name: String, payload: EntryPayload) -> Self {
        Self {
            id,
            name,
            payload: Some(payload),
        }
    }

    /// True only for a default-constructed entry with no backing data.
    /// Never true for an entry returned by a store.
    pub fn is_null(&self) -> bool {
        self.payload.is_none()
    }

    /// The active payload kind; `None` for the null entry. Constant for
    /// the entry's lifetime.
    pub fn entry_type(&self) -> Option<EntryType> {
        self.payload.as_ref().map(EntryPayload::entry_type)
    }

    /// Unique within the originating store; usable with
    /// `KeyStore::remove_entry` to re-locate the same logical credential.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tagged payload, for pattern-matched access.
    pub fn payload(&self) -> Option<&EntryPayload> {
        self.payload.as_ref()
    }

    pub fn key_bundle(&self) -> Option<&KeyBundle> {
        match &self.payload {
            Some(EntryPayload::KeyBundle(kb)) => Some(kb),
            _ => None,
        }
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        match &self.payload {
            Some(EntryPayload::Certificate(cert)) => Some(cert),
            _ => None,
        }
    }

    pub fn crl(&self) -> Option<&Crl> {
        match &self.payload {
            Some(EntryPayload::Crl(crl)) => Some(crl),
            _ => None,
        }
    }

    pub fn pgp_secret_key(&self) -> Option<&PgpKey> {
        match &self.payload {
            Some(EntryPayload::PgpSecretKey(key)) => Some(key),
            _ => None,
        }
    }

    /// The public part of the stored PGP key, answering for both the
    /// public and the secret variant.
    pub fn pgp_public_key(&self) -> Option<PgpKey> {
        match &self.payload {
            Some(EntryPayload::PgpSecretKey(key) | EntryPayload::PgpPublicKey(key)) => {
                Some(key.public_part())
            }
            _ => None,
        }
    }
}

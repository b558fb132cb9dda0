use serde::{Deserialize, Serialize};

/// An identity: an end-entity certificate packaged together with its
/// private key material (typically PKCS#12).
///
/// The blob is opaque to keyfort; only the identity-bearing subset
/// (the name) is read by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub name: String,
    /// Opaque packaged key material (e.g. PKCS#12 DER).
    pub blob: Vec<u8>,
}

/// An X.509 certificate as an opaque value blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    /// DER encoding of the certificate.
    pub der: Vec<u8>,
}

impl std::fmt::Display for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.subject)
    }
}

/// A certificate revocation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crl {
    pub issuer: String,
    /// DER encoding of the revocation list.
    pub der: Vec<u8>,
}

/// An OpenPGP key as stored in a keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpKey {
    /// Long key id (or fingerprint) as reported by the keyring.
    pub key_id: String,
    pub user_ids: Vec<String>,
    /// True when the secret part of this key is present.
    pub is_secret: bool,
    /// Transferable key material. May be empty for keys enumerated from a
    /// keyring that does not export material on listing.
    pub material: Vec<u8>,
}

impl PgpKey {
    /// The public half of this key.
    ///
    /// For a secret key the opaque material is not carried over, since the
    /// secret parts cannot be split out of an opaque blob at this layer.
    pub fn public_part(&self) -> PgpKey {
        PgpKey {
            key_id: self.key_id.clone(),
            user_ids: self.user_ids.clone(),
            is_secret: false,
            material: if self.is_secret {
                Vec::new()
            } else {
                self.material.clone()
            },
        }
    }

    /// Merge an imported copy of the same key into this one, the way a
    /// keyring import does: user ids are unioned, non-empty incoming
    /// material replaces the stored material, and a secret half upgrades a
    /// public-only key.
    pub fn merged_with(&self, incoming: &PgpKey) -> PgpKey {
        let mut merged = self.clone();
        for uid in &incoming.user_ids {
            if !merged.user_ids.contains(uid) {
                merged.user_ids.push(uid.clone());
            }
        }
        if !incoming.material.is_empty() {
            merged.material = incoming.material.clone();
        }
        merged.is_secret = merged.is_secret || incoming.is_secret;
        merged
    }
}

impl std::fmt::Display for PgpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user_ids.first() {
            Some(uid) => write!(f, "{} ({uid})", self.key_id),
            None => write!(f, "{}", self.key_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key(secret: bool) -> PgpKey {
        PgpKey {
            key_id: "A1B2C3D4E5F60718".into(),
            user_ids: vec!["alice@example.org".into()],
            is_secret: secret,
            material: vec![1, 2, 3],
        }
    }

    #[test]
    fn merge_unions_user_ids() {
        let stored = sample_key(false);
        let mut incoming = sample_key(false);
        incoming.user_ids = vec!["alice@example.org".into(), "alice@work.example".into()];

        let merged = stored.merged_with(&incoming);
        assert_eq!(merged.user_ids.len(), 2);
        assert_eq!(merged.key_id, stored.key_id);
    }

    #[test]
    fn merge_secret_upgrades_public() {
        let stored = sample_key(false);
        let incoming = sample_key(true);
        assert!(stored.merged_with(&incoming).is_secret);
    }

    #[test]
    fn merge_keeps_material_when_incoming_is_empty() {
        let stored = sample_key(false);
        let mut incoming = sample_key(false);
        incoming.material = Vec::new();
        assert_eq!(stored.merged_with(&incoming).material, vec![1, 2, 3]);
    }

    #[test]
    fn public_part_strips_secret_material() {
        let key = sample_key(true);
        let public = key.public_part();
        assert!(!public.is_secret);
        assert!(public.material.is_empty());
        assert_eq!(public.user_ids, key.user_ids);
    }

    #[test]
    fn display_shows_first_user_id() {
        let key = sample_key(false);
        assert_eq!(key.to_string(), "A1B2C3D4E5F60718 (alice@example.org)");
    }
}

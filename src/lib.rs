//! Uniform facade over heterogeneous credential stores.
//!
//! keyfort gives an application one API across system trust lists, user
//! keychains, smartcards, app-level certificate caches and PGP keyrings.
//! A [`KeyStoreManager`] discovers backends through pluggable
//! [`StoreProvider`]s, hands out a [`KeyStore`] facade per backend, and
//! routes change notifications (updated / unavailable / need-passphrase)
//! to subscribers in causal order.
//!
//! Certificate validation, PKCS#11 drivers and PGP cryptography are out of
//! scope: providers talk to those worlds, this crate coordinates them.

pub mod adapters;
pub mod core;

pub use crate::core::errors::{KeyfortError, Result};
pub use crate::core::models::backend::{BackendInfo, EntryRecord, StoreCapabilities, StoreType};
pub use crate::core::models::entry::{Entry, EntryPayload, EntryType};
pub use crate::core::models::event::{BackendEvent, ManagerEvent, StoreEvent};
pub use crate::core::models::payload::{Certificate, Crl, KeyBundle, PgpKey};
pub use crate::core::services::manager::KeyStoreManager;
pub use crate::core::services::store::KeyStore;
pub use crate::core::traits::provider::StoreProvider;

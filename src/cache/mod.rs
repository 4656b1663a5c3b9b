//! In-process snapshot of a device's certificate and key stores.
//!
//! The device lists certificates and keys separately and never says which key
//! a certificate belongs to. [`CredentialCache`] joins the two listings on
//! public-key equality and keeps the result coherent with the uploads and
//! deletions performed through it, so a reconciliation run lists the device
//! at most once.

use crate::cert::{Certificate, PublicKey};
use crate::prelude::debug;
use crate::store::{CredentialStore, Handle, StoreError};
use std::collections::{BTreeMap, HashMap};

/// Population state of a [`CredentialCache`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum CacheState {
    /// Never listed; any lookup triggers a refresh.
    #[default]
    Unpopulated,
    /// Holds the last listing plus the mutations recorded since.
    Populated,
    /// Explicitly invalidated; the contents are kept but the next lookup
    /// triggers a refresh.
    Stale,
}

/// Snapshot of the device stores and the derived certificate to key association.
///
/// Invariants:
/// - `associations` has an entry for a certificate handle iff the certificate's
///   public key equals the public key of some cached key,
/// - a certificate handle is associated with exactly one key handle; when the
///   device holds several key handles with the same public key, the smallest
///   handle is used.
///
/// The cache is not meant to be shared between concurrent reconciliation runs.
#[derive(Debug, Default)]
pub struct CredentialCache {
    state: CacheState,
    certificates: BTreeMap<Handle, Certificate>,
    keys: BTreeMap<Handle, PublicKey>,
    key_index: HashMap<PublicKey, Handle>,
    associations: BTreeMap<Handle, Handle>,
}

impl CredentialCache {
    /// Creates an unpopulated cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the population state.
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Marks the cache stale so the next lookup lists the device again.
    pub fn invalidate(&mut self) {
        if self.state == CacheState::Populated {
            self.state = CacheState::Stale;
        }
    }

    /// Replaces the contents with a fresh listing of the device stores.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the failing listing. The cache is left
    /// exactly as it was.
    pub fn refresh<S>(&mut self, store: &mut S) -> Result<(), StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        let certificates = store.list_certificates()?;
        let keys = store.list_keys()?;

        self.certificates = certificates;
        self.keys = keys;
        self.reindex();
        self.state = CacheState::Populated;

        debug!(
            "Listed {} certificates and {} keys, {} certificates have a key",
            self.certificates.len(),
            self.keys.len(),
            self.associations.len()
        );
        Ok(())
    }

    /// Refreshes the cache unless it is populated. Returns whether a refresh happened.
    pub(crate) fn ensure_populated<S>(&mut self, store: &mut S) -> Result<bool, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        if self.state == CacheState::Populated {
            return Ok(false);
        }
        self.refresh(store)?;
        Ok(true)
    }

    /// Returns the handle of a stored certificate with the same DER encoding.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the cache had to be refreshed and the
    /// refresh failed.
    pub fn find_certificate_handle<S>(
        &mut self,
        store: &mut S,
        certificate: &Certificate,
    ) -> Result<Option<Handle>, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        self.ensure_populated(store)?;
        Ok(self
            .certificates
            .iter()
            .find(|(_, cached)| *cached == certificate)
            .map(|(handle, _)| handle.clone()))
    }

    /// Returns the handle of a stored key with the same public key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the cache had to be refreshed and the
    /// refresh failed.
    pub fn find_key_handle<S>(
        &mut self,
        store: &mut S,
        public_key: &PublicKey,
    ) -> Result<Option<Handle>, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        self.ensure_populated(store)?;
        Ok(self.key_index.get(public_key).cloned())
    }

    /// Returns whether any cached certificate is associated with `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the cache had to be refreshed and the
    /// refresh failed.
    pub fn is_key_referenced<S>(&mut self, store: &mut S, key: &Handle) -> Result<bool, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        self.ensure_populated(store)?;
        Ok(self.associations.values().any(|k| k == key))
    }

    /// Records a certificate the device accepted under `handle`.
    pub fn record_certificate_upload(&mut self, handle: Handle, certificate: Certificate) {
        match self.key_index.get(certificate.public_key()) {
            Some(key) => {
                self.associations.insert(handle.clone(), key.clone());
            }
            None => {
                self.associations.remove(&handle);
            }
        }
        self.certificates.insert(handle, certificate);
    }

    /// Records a key the device accepted under `handle`.
    pub fn record_key_upload(&mut self, handle: Handle, public_key: PublicKey) {
        self.keys.insert(handle, public_key);
        self.reindex();
    }

    /// Records the deletion of a certificate.
    pub fn record_certificate_deletion(&mut self, handle: &Handle) {
        self.certificates.remove(handle);
        self.associations.remove(handle);
    }

    /// Records the deletion of a key.
    pub fn record_key_deletion(&mut self, handle: &Handle) {
        if self.keys.remove(handle).is_some() {
            self.reindex();
        }
    }

    /// Returns the cached certificate stored under `handle`.
    pub fn certificate(&self, handle: &Handle) -> Option<&Certificate> {
        self.certificates.get(handle)
    }

    /// Returns the cached public key stored under `handle`.
    pub fn public_key(&self, handle: &Handle) -> Option<&PublicKey> {
        self.keys.get(handle)
    }

    /// Returns the key handle associated with a certificate handle.
    pub fn key_for_certificate(&self, certificate: &Handle) -> Option<&Handle> {
        self.associations.get(certificate)
    }

    /// Returns the cached certificates, ordered by handle.
    pub fn certificates(&self) -> &BTreeMap<Handle, Certificate> {
        &self.certificates
    }

    /// Returns the cached public keys, ordered by handle.
    pub fn keys(&self) -> &BTreeMap<Handle, PublicKey> {
        &self.keys
    }

    /// Returns the certificate to key associations, ordered by certificate handle.
    pub fn associations(&self) -> &BTreeMap<Handle, Handle> {
        &self.associations
    }

    // Rebuilds the key index and the associations from scratch in O(C + K).
    fn reindex(&mut self) {
        self.key_index.clear();
        for (handle, public_key) in &self.keys {
            // BTreeMap order: the smallest handle wins for duplicate keys.
            self.key_index
                .entry(public_key.clone())
                .or_insert_with(|| handle.clone());
        }

        self.associations = self
            .certificates
            .iter()
            .filter_map(|(cert, certificate)| {
                self.key_index
                    .get(certificate.public_key())
                    .map(|key| (cert.clone(), key.clone()))
            })
            .collect();
    }
}

//! Reconciliation of a local bundle with the device's active TLS identity.
//!
//! A run goes through these steps, stopping at the first failure:
//!
//! 1. resolve the currently active [`HandlePair`],
//! 2. find or upload the local key, then the local certificate,
//! 3. stop if the certificate is already the active one,
//! 4. activate the new certificate,
//! 5. delete the old certificate, then its key unless another certificate
//!    still uses it.
//!
//! Activation always precedes deletion so the device never lacks a TLS
//! identity. A failure after step 4 leaves the old credential behind, which
//! is harmless.

use crate::bundle::CredentialBundle;
use crate::cache::CredentialCache;
use crate::cert::{Certificate, PrivateKey};
use crate::error::{Error, NotFound};
use crate::prelude::{debug, info, warn};
use crate::store::{CredentialStore, Handle, HandlePair};

/// What happened to the key of a retired bundle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyDisposition {
    /// No remaining certificate used the key, so it was deleted.
    Deleted,
    /// Another certificate still uses the key, so it was kept.
    Retained,
}

/// Result of a successful [`CertManager::reconcile`] run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// The local bundle already was the active identity, paired with this
    /// key. Nothing was changed.
    Unchanged(HandlePair),

    /// The local bundle was activated and the previous one retired.
    Replaced {
        /// The bundle that was active before the run.
        previous: HandlePair,
        /// The bundle that is active now.
        current: HandlePair,
        /// What happened to the previous key.
        retired_key: KeyDisposition,
    },
}

impl Outcome {
    /// Returns the bundle that is active after the run.
    pub fn active(&self) -> &HandlePair {
        match self {
            Outcome::Unchanged(pair) => pair,
            Outcome::Replaced { current, .. } => current,
        }
    }

    /// Returns `true` if the run changed the device.
    pub fn is_changed(&self) -> bool {
        matches!(self, Outcome::Replaced { .. })
    }
}

/// Keeps a device's TLS identity in sync with a local bundle.
///
/// Owns the [`CredentialStore`] and the [`CredentialCache`] built from it.
/// Every handle passed to the store comes from the store itself or from the
/// cache; content equality decides whether a local credential already exists
/// on the device.
#[derive(Debug)]
pub struct CertManager<S> {
    store: S,
    cache: CredentialCache,
}

impl<S: CredentialStore> CertManager<S> {
    /// Creates a manager with an unpopulated cache.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: CredentialCache::new(),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the cache.
    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Consumes the manager and returns the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Lists the device stores again, replacing the cache contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a listing fails; the cache is unchanged then.
    pub fn refresh(&mut self) -> Result<(), Error> {
        Ok(self.cache.refresh(&mut self.store)?)
    }

    /// Returns the handles of the bundle the device currently presents.
    ///
    /// # Errors
    ///
    /// - [`Error::Store`] if the device cannot be queried, including
    ///   [`crate::StoreError::NoActiveCertificate`].
    /// - [`NotFound::UnlistedCertificate`] if the active handle is absent from
    ///   a fresh listing.
    /// - [`NotFound::KeyForCertificate`] if no stored key matches the active
    ///   certificate.
    pub fn current_bundle(&mut self) -> Result<HandlePair, Error> {
        let certificate = self.store.active_certificate()?;
        let refreshed = self.cache.ensure_populated(&mut self.store)?;

        if self.cache.certificate(&certificate).is_none() && !refreshed {
            debug!("Active certificate {certificate} is not cached, listing the device again");
            self.cache.refresh(&mut self.store)?;
        }
        if self.cache.certificate(&certificate).is_none() {
            return Err(NotFound::UnlistedCertificate(certificate).into());
        }

        let Some(key) = self.cache.key_for_certificate(&certificate).cloned() else {
            return Err(NotFound::KeyForCertificate(certificate).into());
        };

        let current = HandlePair { certificate, key };
        info!("Current bundle: {current}");
        Ok(current)
    }

    /// Returns the handle of a stored key with the same public key as `key`,
    /// uploading `key` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the lookup or the upload fails.
    pub fn upload_or_get_key(&mut self, key: &PrivateKey) -> Result<Handle, Error> {
        let public_key = key.public_key();
        if let Some(handle) = self.cache.find_key_handle(&mut self.store, public_key)? {
            debug!("Found matching key on device: {handle}");
            return Ok(handle);
        }

        let handle = self.store.add_key(key)?;
        info!("Uploaded private key: {handle}");
        self.cache.record_key_upload(handle.clone(), public_key.clone());
        Ok(handle)
    }

    /// Returns the handle of a stored certificate with the same encoding as
    /// `certificate`, uploading `certificate` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the lookup or the upload fails.
    pub fn upload_or_get_certificate(&mut self, certificate: &Certificate) -> Result<Handle, Error> {
        if let Some(handle) = self
            .cache
            .find_certificate_handle(&mut self.store, certificate)?
        {
            debug!("Found matching certificate on device: {handle}");
            return Ok(handle);
        }

        let handle = self.store.add_certificate(certificate)?;
        info!("Uploaded certificate: {handle}");
        self.cache
            .record_certificate_upload(handle.clone(), certificate.clone());
        if self.cache.key_for_certificate(&handle).is_none() {
            warn!("No key on the device matches uploaded certificate {handle}");
        }
        Ok(handle)
    }

    /// Makes sure the bundle's key and certificate are on the device, key first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a lookup or an upload fails.
    pub fn upload_bundle(&mut self, bundle: &CredentialBundle) -> Result<HandlePair, Error> {
        let key = self.upload_or_get_key(bundle.private_key())?;
        let certificate = self.upload_or_get_certificate(bundle.certificate())?;
        Ok(HandlePair { certificate, key })
    }

    /// Makes the bundle's certificate the device's TLS identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the device refuses.
    pub fn activate(&mut self, bundle: &HandlePair) -> Result<(), Error> {
        self.store.activate_certificate(&bundle.certificate)?;
        info!("Set new TLS certificate to: {}", bundle.certificate);
        Ok(())
    }

    /// Deletes a retired bundle: always its certificate, and its key only if
    /// no remaining certificate uses it.
    ///
    /// The key check runs against the cache after the certificate deletion
    /// has been recorded, so the deleted certificate no longer counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a deletion fails. A failed key deletion
    /// leaves the certificate deleted.
    pub fn delete_bundle(&mut self, bundle: &HandlePair) -> Result<KeyDisposition, Error> {
        self.store.delete_certificate(&bundle.certificate)?;
        self.cache.record_certificate_deletion(&bundle.certificate);
        info!("Deleted old certificate: {}", bundle.certificate);

        if self.cache.is_key_referenced(&mut self.store, &bundle.key)? {
            info!("Key is still in use: {}", bundle.key);
            return Ok(KeyDisposition::Retained);
        }

        self.store.delete_key(&bundle.key)?;
        self.cache.record_key_deletion(&bundle.key);
        info!("Deleted old key: {}", bundle.key);
        Ok(KeyDisposition::Deleted)
    }

    /// Runs a full reconciliation of `bundle` against the device.
    ///
    /// Running it again with the same bundle is a no-op returning
    /// [`Outcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; see [`Self::current_bundle`],
    /// [`Self::upload_bundle`], [`Self::activate`] and [`Self::delete_bundle`].
    pub fn reconcile(&mut self, bundle: &CredentialBundle) -> Result<Outcome, Error> {
        let previous = self.current_bundle()?;
        let current = self.upload_bundle(bundle)?;

        if current.certificate == previous.certificate {
            info!("New certificate is the same as current certificate");
            return Ok(Outcome::Unchanged(previous));
        }

        self.activate(&current)?;
        let retired_key = self.delete_bundle(&previous)?;

        Ok(Outcome::Replaced {
            previous,
            current,
            retired_key,
        })
    }
}

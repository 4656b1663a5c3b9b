//! An in-memory [`CredentialStore`].
//!
//! `MemoryStore` mimics the rules an AMT device enforces on its stores and
//! records every call it receives, which makes it suitable for dry runs and
//! for asserting call ordering in tests.

use super::{CredentialStore, Handle, Operation, StoreError};
use crate::cert::{Certificate, PrivateKey, PublicKey};
use std::collections::BTreeMap;

const AMT_CERTIFICATE_PREFIX: &str = "Intel(r) AMT Certificate: Handle: ";
const AMT_KEY_PREFIX: &str = "Intel(r) AMT Key: Handle: ";

/// A call received by a [`MemoryStore`], with its input.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StoreCall {
    /// `list_certificates()`.
    ListCertificates,
    /// `list_keys()`.
    ListKeys,
    /// `active_certificate()`.
    ActiveCertificate,
    /// `add_certificate(certificate)`.
    AddCertificate(Certificate),
    /// `add_key(key)`, recorded by its public half.
    AddKey(PublicKey),
    /// `activate_certificate(handle)`.
    ActivateCertificate(Handle),
    /// `delete_certificate(handle)`.
    DeleteCertificate(Handle),
    /// `delete_key(handle)`.
    DeleteKey(Handle),
}

impl StoreCall {
    /// Returns the operation this call invoked.
    pub fn operation(&self) -> Operation {
        match self {
            StoreCall::ListCertificates => Operation::ListCertificates,
            StoreCall::ListKeys => Operation::ListKeys,
            StoreCall::ActiveCertificate => Operation::ActiveCertificate,
            StoreCall::AddCertificate(_) => Operation::AddCertificate,
            StoreCall::AddKey(_) => Operation::AddKey,
            StoreCall::ActivateCertificate(_) => Operation::ActivateCertificate,
            StoreCall::DeleteCertificate(_) => Operation::DeleteCertificate,
            StoreCall::DeleteKey(_) => Operation::DeleteKey,
        }
    }

    /// Returns `true` for calls that change the device state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            StoreCall::ListCertificates | StoreCall::ListKeys | StoreCall::ActiveCertificate
        )
    }
}

/// A [`CredentialStore`] kept entirely in memory.
///
/// Rules enforced, as on a device:
/// - adding a certificate or key that is already stored is rejected,
/// - activating a certificate requires a stored key matching its public key,
/// - the active certificate cannot be deleted,
/// - a key cannot be deleted while a stored certificate uses it,
/// - unknown handles are reported as [`StoreError::UnknownHandle`].
///
/// New handles are minted as `<prefix><n>`, where `n` continues after the
/// highest number already in use for that prefix.
#[derive(Debug)]
pub struct MemoryStore {
    certificates: BTreeMap<Handle, Certificate>,
    keys: BTreeMap<Handle, PublicKey>,
    active: Option<Handle>,

    certificate_prefix: String,
    key_prefix: String,
    next_certificate: u64,
    next_key: u64,

    calls: Vec<StoreCall>,
    failures: Vec<(Operation, StoreError)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store minting AMT-style handles.
    pub fn new() -> Self {
        Self::with_handle_prefixes(AMT_CERTIFICATE_PREFIX, AMT_KEY_PREFIX)
    }

    /// Creates an empty store minting handles with the given prefixes.
    pub fn with_handle_prefixes(
        certificate_prefix: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            certificates: BTreeMap::new(),
            keys: BTreeMap::new(),
            active: None,
            certificate_prefix: certificate_prefix.into(),
            key_prefix: key_prefix.into(),
            next_certificate: 0,
            next_key: 0,
            calls: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Stores a certificate under the given handle without recording a call.
    pub fn insert_certificate(&mut self, handle: impl Into<Handle>, certificate: Certificate) {
        let handle = handle.into();
        bump_counter(&mut self.next_certificate, &self.certificate_prefix, &handle);
        self.certificates.insert(handle, certificate);
    }

    /// Stores a public key under the given handle without recording a call.
    pub fn insert_key(&mut self, handle: impl Into<Handle>, public_key: PublicKey) {
        let handle = handle.into();
        bump_counter(&mut self.next_key, &self.key_prefix, &handle);
        self.keys.insert(handle, public_key);
    }

    /// Sets (or clears) the active certificate without recording a call.
    pub fn set_active(&mut self, handle: Option<Handle>) {
        self.active = handle;
    }

    /// Makes the next call to `operation` fail with `error`.
    ///
    /// Several failures may be queued; each is consumed by one call.
    pub fn fail_next(&mut self, operation: Operation, error: StoreError) {
        self.failures.push((operation, error));
    }

    /// Returns the stored certificates.
    pub fn certificates(&self) -> &BTreeMap<Handle, Certificate> {
        &self.certificates
    }

    /// Returns the stored public keys.
    pub fn keys(&self) -> &BTreeMap<Handle, PublicKey> {
        &self.keys
    }

    /// Returns the active certificate handle.
    pub fn active(&self) -> Option<&Handle> {
        self.active.as_ref()
    }

    /// Returns every call received so far, in order.
    pub fn calls(&self) -> &[StoreCall] {
        &self.calls
    }

    /// Returns the calls that changed the device state, in order.
    pub fn mutations(&self) -> Vec<StoreCall> {
        self.calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    /// Clears the recorded calls and returns them.
    pub fn take_calls(&mut self) -> Vec<StoreCall> {
        std::mem::take(&mut self.calls)
    }

    fn begin(&mut self, call: StoreCall) -> Result<(), StoreError> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.iter().position(|(op, _)| *op == operation) {
            Some(i) => Err(self.failures.remove(i).1),
            None => Ok(()),
        }
    }

    fn mint(prefix: &str, counter: &mut u64) -> Handle {
        let handle = Handle::new(format!("{prefix}{counter}"));
        *counter += 1;
        handle
    }
}

fn bump_counter(counter: &mut u64, prefix: &str, handle: &Handle) {
    let n = handle
        .as_str()
        .strip_prefix(prefix)
        .and_then(|suffix| suffix.parse::<u64>().ok());
    if let Some(n) = n {
        *counter = (*counter).max(n + 1);
    }
}

impl CredentialStore for MemoryStore {
    fn list_certificates(&mut self) -> Result<BTreeMap<Handle, Certificate>, StoreError> {
        self.begin(StoreCall::ListCertificates)?;
        Ok(self.certificates.clone())
    }

    fn list_keys(&mut self) -> Result<BTreeMap<Handle, PublicKey>, StoreError> {
        self.begin(StoreCall::ListKeys)?;
        Ok(self.keys.clone())
    }

    fn active_certificate(&mut self) -> Result<Handle, StoreError> {
        self.begin(StoreCall::ActiveCertificate)?;
        self.active.clone().ok_or(StoreError::NoActiveCertificate)
    }

    fn add_certificate(&mut self, certificate: &Certificate) -> Result<Handle, StoreError> {
        self.begin(StoreCall::AddCertificate(certificate.clone()))?;
        if self.certificates.values().any(|c| c == certificate) {
            return Err(StoreError::Rejected {
                operation: Operation::AddCertificate,
                reason: "duplicate certificate".to_string(),
            });
        }

        let handle = Self::mint(&self.certificate_prefix, &mut self.next_certificate);
        self.certificates.insert(handle.clone(), certificate.clone());
        Ok(handle)
    }

    fn add_key(&mut self, key: &PrivateKey) -> Result<Handle, StoreError> {
        let public_key = key.public_key();
        self.begin(StoreCall::AddKey(public_key.clone()))?;
        if self.keys.values().any(|k| k == public_key) {
            return Err(StoreError::Rejected {
                operation: Operation::AddKey,
                reason: "duplicate key".to_string(),
            });
        }

        let handle = Self::mint(&self.key_prefix, &mut self.next_key);
        self.keys.insert(handle.clone(), public_key.clone());
        Ok(handle)
    }

    fn activate_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        self.begin(StoreCall::ActivateCertificate(certificate.clone()))?;
        let Some(cert) = self.certificates.get(certificate) else {
            return Err(StoreError::UnknownHandle {
                operation: Operation::ActivateCertificate,
                handle: certificate.clone(),
            });
        };
        if !self.keys.values().any(|k| k == cert.public_key()) {
            return Err(StoreError::Rejected {
                operation: Operation::ActivateCertificate,
                reason: format!("no key pair stored for certificate '{certificate}'"),
            });
        }

        self.active = Some(certificate.clone());
        Ok(())
    }

    fn delete_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        self.begin(StoreCall::DeleteCertificate(certificate.clone()))?;
        if !self.certificates.contains_key(certificate) {
            return Err(StoreError::UnknownHandle {
                operation: Operation::DeleteCertificate,
                handle: certificate.clone(),
            });
        }
        if self.active.as_ref() == Some(certificate) {
            return Err(StoreError::InUse {
                operation: Operation::DeleteCertificate,
                handle: certificate.clone(),
            });
        }

        self.certificates.remove(certificate);
        Ok(())
    }

    fn delete_key(&mut self, key: &Handle) -> Result<(), StoreError> {
        self.begin(StoreCall::DeleteKey(key.clone()))?;
        let Some(public_key) = self.keys.get(key) else {
            return Err(StoreError::UnknownHandle {
                operation: Operation::DeleteKey,
                handle: key.clone(),
            });
        };
        if self
            .certificates
            .values()
            .any(|c| c.public_key() == public_key)
        {
            return Err(StoreError::InUse {
                operation: Operation::DeleteKey,
                handle: key.clone(),
            });
        }

        self.keys.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;
    use crate::CredentialBundle;

    fn bundle_a() -> CredentialBundle {
        CredentialBundle::from_pem(
            include_bytes!("../../tests/testdata/bundle/cert-a.pem"),
            include_bytes!("../../tests/testdata/bundle/key-a.pem"),
        )
        .unwrap()
    }

    #[test]
    fn test_mints_amt_style_handles() {
        let bundle = bundle_a();
        let mut store = MemoryStore::new();

        let key = store.add_key(bundle.private_key()).unwrap();
        let cert = store.add_certificate(bundle.certificate()).unwrap();

        assert_eq!(key.as_str(), "Intel(r) AMT Key: Handle: 0");
        assert_eq!(cert.as_str(), "Intel(r) AMT Certificate: Handle: 0");
    }

    #[test]
    fn test_minting_continues_after_inserted_handles() {
        let bundle = bundle_a();
        let mut store = MemoryStore::with_handle_prefixes("C", "K");
        store.insert_key("K7", bundle.private_key().public_key().clone());

        store.delete_key(&Handle::from("K7")).unwrap();
        let key = store.add_key(bundle.private_key()).unwrap();

        assert_eq!(key, Handle::from("K8"));
    }

    #[test]
    fn test_rejects_duplicate_certificate() {
        let bundle = bundle_a();
        let mut store = MemoryStore::new();
        store.add_certificate(bundle.certificate()).unwrap();

        let result = store.add_certificate(bundle.certificate());
        assert!(matches!(
            result.unwrap_err(),
            StoreError::Rejected {
                operation: Operation::AddCertificate,
                ..
            }
        ));
    }

    #[test]
    fn test_activate_requires_key_pair() {
        let bundle = bundle_a();
        let mut store = MemoryStore::new();
        let cert = store.add_certificate(bundle.certificate()).unwrap();

        assert!(store.activate_certificate(&cert).is_err());

        store.add_key(bundle.private_key()).unwrap();
        store.activate_certificate(&cert).unwrap();
        assert_eq!(store.active(), Some(&cert));
    }

    #[test]
    fn test_active_certificate_cannot_be_deleted() {
        let bundle = bundle_a();
        let mut store = MemoryStore::new();
        let key = store.add_key(bundle.private_key()).unwrap();
        let cert = store.add_certificate(bundle.certificate()).unwrap();
        store.activate_certificate(&cert).unwrap();

        assert!(matches!(
            store.delete_certificate(&cert).unwrap_err(),
            StoreError::InUse { .. }
        ));
        assert!(matches!(
            store.delete_key(&key).unwrap_err(),
            StoreError::InUse { .. }
        ));
    }

    #[test]
    fn test_unknown_handles() {
        let mut store = MemoryStore::new();
        let handle = Handle::from("missing");

        assert!(matches!(
            store.delete_certificate(&handle).unwrap_err(),
            StoreError::UnknownHandle { .. }
        ));
        assert!(matches!(
            store.delete_key(&handle).unwrap_err(),
            StoreError::UnknownHandle { .. }
        ));
        assert!(matches!(
            store.activate_certificate(&handle).unwrap_err(),
            StoreError::UnknownHandle { .. }
        ));
        assert!(matches!(
            store.active_certificate().unwrap_err(),
            StoreError::NoActiveCertificate
        ));
    }

    #[test]
    fn test_injected_failure_is_consumed_once() {
        let mut store = MemoryStore::new();
        store.fail_next(
            Operation::ListKeys,
            StoreError::MalformedResponse {
                operation: Operation::ListKeys,
                reason: "truncated".to_string(),
            },
        );

        assert!(store.list_keys().is_err());
        assert!(store.list_keys().is_ok());
        assert_eq!(store.calls(), &[StoreCall::ListKeys, StoreCall::ListKeys]);
    }
}

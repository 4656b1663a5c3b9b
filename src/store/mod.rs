//! The device-side credential store, as consumed by the reconciler.
//!
//! A [`CredentialStore`] exposes the certificate and key stores of a device
//! (on Intel AMT: `AMT_PublicKeyCertificate`, `AMT_PublicPrivateKeyPair` and
//! the TLS credential context) through opaque [`Handle`]s. How the calls reach
//! the device is up to the implementation.

pub mod memory;

use crate::cert::error::{CertificateError, PublicKeyError};
use crate::cert::{Certificate, PrivateKey, PublicKey};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

pub use memory::{MemoryStore, StoreCall};

/// An opaque identifier assigned by the device to a stored certificate or key.
///
/// Handles carry no meaning beyond lookup; two handles are only ever compared
/// for identity.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Handle(String);

impl Handle {
    /// Wraps a device-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Handle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Handle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The device-side handles of a certificate and its key.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct HandlePair {
    /// Handle of the certificate.
    pub certificate: Handle,
    /// Handle of the key pair the certificate was issued for.
    pub key: Handle,
}

impl HandlePair {
    /// Creates a pair from its two handles.
    pub fn new(certificate: impl Into<Handle>, key: impl Into<Handle>) -> Self {
        Self {
            certificate: certificate.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for HandlePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "certificate '{}', key '{}'", self.certificate, self.key)
    }
}

/// The operations of a [`CredentialStore`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Operation {
    /// [`CredentialStore::list_certificates`].
    ListCertificates,
    /// [`CredentialStore::list_keys`].
    ListKeys,
    /// [`CredentialStore::active_certificate`].
    ActiveCertificate,
    /// [`CredentialStore::add_certificate`].
    AddCertificate,
    /// [`CredentialStore::add_key`].
    AddKey,
    /// [`CredentialStore::activate_certificate`].
    ActivateCertificate,
    /// [`CredentialStore::delete_certificate`].
    DeleteCertificate,
    /// [`CredentialStore::delete_key`].
    DeleteKey,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ListCertificates => "list certificates",
            Operation::ListKeys => "list keys",
            Operation::ActiveCertificate => "get active certificate",
            Operation::AddCertificate => "add certificate",
            Operation::AddKey => "add key",
            Operation::ActivateCertificate => "activate certificate",
            Operation::DeleteCertificate => "delete certificate",
            Operation::DeleteKey => "delete key",
        };
        f.write_str(name)
    }
}

/// Errors reported by a [`CredentialStore`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The device has no certificate configured as its TLS identity.
    #[error("device reports no active TLS certificate")]
    NoActiveCertificate,

    /// The handle does not name an object in the store.
    #[error("{operation}: unknown handle '{handle}'")]
    UnknownHandle {
        /// The operation that was attempted.
        operation: Operation,
        /// The handle that was not found.
        handle: Handle,
    },

    /// The object is still in use by the device and cannot be removed.
    #[error("{operation}: handle '{handle}' is in use")]
    InUse {
        /// The operation that was attempted.
        operation: Operation,
        /// The handle that is in use.
        handle: Handle,
    },

    /// The device refused the operation.
    #[error("{operation} rejected by device: {reason}")]
    Rejected {
        /// The operation that was attempted.
        operation: Operation,
        /// Device-reported reason, e.g. a non-zero return value.
        reason: String,
    },

    /// The device listed a certificate that could not be decoded.
    #[error("certificate '{handle}' listed by device is malformed")]
    Certificate {
        /// Handle of the malformed certificate.
        handle: Handle,
        /// Decoding failure.
        #[source]
        source: CertificateError,
    },

    /// The device listed a public key that could not be decoded.
    #[error("key '{handle}' listed by device is malformed")]
    PublicKey {
        /// Handle of the malformed key.
        handle: Handle,
        /// Decoding failure.
        #[source]
        source: PublicKeyError,
    },

    /// The device answered with a response the client could not interpret.
    #[error("{operation}: malformed response: {reason}")]
    MalformedResponse {
        /// The operation that was attempted.
        operation: Operation,
        /// What was wrong with the response.
        reason: String,
    },

    /// The request did not reach the device or the response was lost.
    #[error("{operation}: transport error")]
    Transport {
        /// The operation that was attempted.
        operation: Operation,
        /// Transport-level failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Access to the certificate and key stores of a device.
///
/// All calls are blocking and issued one at a time. Implementations are
/// expected to be owned by a single [`crate::CertManager`]; callers wanting
/// timeouts must configure them in the implementation.
pub trait CredentialStore {
    /// Lists every certificate in the device's certificate store.
    fn list_certificates(&mut self) -> Result<BTreeMap<Handle, Certificate>, StoreError>;

    /// Lists the public half of every key pair in the device's key store.
    fn list_keys(&mut self) -> Result<BTreeMap<Handle, PublicKey>, StoreError>;

    /// Returns the handle of the certificate the device presents for TLS.
    ///
    /// Fails with [`StoreError::NoActiveCertificate`] when none is configured.
    fn active_certificate(&mut self) -> Result<Handle, StoreError>;

    /// Adds a certificate and returns its newly assigned handle.
    fn add_certificate(&mut self, certificate: &Certificate) -> Result<Handle, StoreError>;

    /// Adds a key pair and returns the newly assigned handle of its public key
    /// record. The private half is retained by the device and never read back.
    fn add_key(&mut self, key: &PrivateKey) -> Result<Handle, StoreError>;

    /// Makes the certificate the device's TLS identity.
    fn activate_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError>;

    /// Removes a certificate.
    fn delete_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError>;

    /// Removes a key pair.
    fn delete_key(&mut self, key: &Handle) -> Result<(), StoreError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for &mut S {
    fn list_certificates(&mut self) -> Result<BTreeMap<Handle, Certificate>, StoreError> {
        (**self).list_certificates()
    }

    fn list_keys(&mut self) -> Result<BTreeMap<Handle, PublicKey>, StoreError> {
        (**self).list_keys()
    }

    fn active_certificate(&mut self) -> Result<Handle, StoreError> {
        (**self).active_certificate()
    }

    fn add_certificate(&mut self, certificate: &Certificate) -> Result<Handle, StoreError> {
        (**self).add_certificate(certificate)
    }

    fn add_key(&mut self, key: &PrivateKey) -> Result<Handle, StoreError> {
        (**self).add_key(key)
    }

    fn activate_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        (**self).activate_certificate(certificate)
    }

    fn delete_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        (**self).delete_certificate(certificate)
    }

    fn delete_key(&mut self, key: &Handle) -> Result<(), StoreError> {
        (**self).delete_key(key)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn list_certificates(&mut self) -> Result<BTreeMap<Handle, Certificate>, StoreError> {
        (**self).list_certificates()
    }

    fn list_keys(&mut self) -> Result<BTreeMap<Handle, PublicKey>, StoreError> {
        (**self).list_keys()
    }

    fn active_certificate(&mut self) -> Result<Handle, StoreError> {
        (**self).active_certificate()
    }

    fn add_certificate(&mut self, certificate: &Certificate) -> Result<Handle, StoreError> {
        (**self).add_certificate(certificate)
    }

    fn add_key(&mut self, key: &PrivateKey) -> Result<Handle, StoreError> {
        (**self).add_key(key)
    }

    fn activate_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        (**self).activate_certificate(certificate)
    }

    fn delete_certificate(&mut self, certificate: &Handle) -> Result<(), StoreError> {
        (**self).delete_certificate(certificate)
    }

    fn delete_key(&mut self, key: &Handle) -> Result<(), StoreError> {
        (**self).delete_key(key)
    }
}

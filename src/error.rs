//! Top-level error type.

use crate::bundle::BundleError;
use crate::config::ConfigError;
use crate::store::{Handle, StoreError};

/// A lookup that found no match where the device state says there should be one.
///
/// These indicate an inconsistency in the device stores rather than a
/// communication failure.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum NotFound {
    /// The device reports an active certificate that none of its listings contain.
    #[error("active certificate '{0}' is not listed by the device")]
    UnlistedCertificate(Handle),

    /// No stored key matches the public key of the active certificate.
    #[error("no key on the device matches active certificate '{0}'")]
    KeyForCertificate(Handle),
}

/// Errors produced while keeping the device's TLS identity up to date.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The local certificate or key could not be loaded.
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// The device store failed or refused an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration is invalid or incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The device state is inconsistent.
    #[error(transparent)]
    NotFound(#[from] NotFound),
}

impl Error {
    /// Returns `true` when the error means something expected on the device is
    /// missing, including a device with no active TLS certificate at all.
    ///
    /// Callers may treat this as a bootstrap condition rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Store(StoreError::NoActiveCertificate)
        )
    }
}

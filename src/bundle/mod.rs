//! Loading of the local certificate/key bundle written by an ACME client.

use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::first_pem_block;
use crate::cert::{Certificate, PrivateKey};
use crate::prelude::{debug, info};
use std::path::{Path, PathBuf};
use x509_parser::error::PEMError;
use zeroize::Zeroize;

const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// A certificate paired with its private key, as loaded from local files.
///
/// Invariant: the certificate's public key is the public half of the private
/// key.
///
/// Bundles are transient: one is built per reconciliation run and never
/// persisted.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CredentialBundle {
    certificate: Certificate,
    private_key: PrivateKey,
}

/// An error that may arise decoding PEM-encoded bundle material.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The input does not contain a PEM block.
    #[error("failed reading PEM block")]
    Pem(#[source] PEMError),

    /// The certificate PEM block carries a label other than `CERTIFICATE`.
    #[error("unexpected PEM label '{0}', expected 'CERTIFICATE'")]
    UnexpectedLabel(String),

    /// The certificate DER payload is not a valid X.509 certificate.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The key DER payload is not a valid PKCS#1 RSA private key.
    #[error(transparent)]
    PrivateKey(#[from] PrivateKeyError),

    /// The private key is not the one the certificate was issued for.
    #[error("private key does not match the certificate's public key")]
    KeyMismatch,
}

/// An error that may arise loading a [`CredentialBundle`] from files.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BundleError {
    /// A bundle file could not be read.
    #[error("failed reading {}", path.display())]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A bundle file was read but its content could not be decoded.
    #[error("failed decoding {}", path.display())]
    Decode {
        /// The file holding the malformed content.
        path: PathBuf,
        /// What was wrong with the content.
        #[source]
        source: DecodeError,
    },
}

impl CredentialBundle {
    /// Creates a bundle from already decoded parts.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::KeyMismatch`] if `private_key` is not the key
    /// pair of `certificate`.
    pub fn new(certificate: Certificate, private_key: PrivateKey) -> Result<Self, DecodeError> {
        if certificate.public_key() != private_key.public_key() {
            return Err(DecodeError::KeyMismatch);
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// Loads a bundle from a PEM certificate file and a PEM PKCS#1 key file.
    ///
    /// Only the first PEM block of each file is used, so a certificate file
    /// that also carries the issuer chain is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Read`] if a file cannot be read and
    /// [`BundleError::Decode`] if its content is not the expected PEM/DER, or
    /// if the key does not belong to the certificate (reported against the
    /// key file).
    pub fn load(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, BundleError> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        debug!("Using certificate path: {}", cert_path.display());
        debug!("Using private key path: {}", key_path.display());

        let certificate =
            decode_certificate_pem(&read(cert_path)?).map_err(|source| BundleError::Decode {
                path: cert_path.to_path_buf(),
                source,
            })?;
        let mut key_pem = read(key_path)?;
        let private_key = decode_private_key_pem(&key_pem);
        key_pem.zeroize();
        let bundle = private_key
            .and_then(|private_key| Self::new(certificate, private_key))
            .map_err(|source| BundleError::Decode {
                path: key_path.to_path_buf(),
                source,
            })?;

        info!(
            "Loaded certificate for: {}",
            bundle
                .certificate
                .common_name()
                .unwrap_or(bundle.certificate.subject())
        );
        Ok(bundle)
    }

    /// Decodes a bundle from in-memory PEM data.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if either input is not the expected PEM/DER
    /// or if the key does not belong to the certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, DecodeError> {
        Self::new(
            decode_certificate_pem(cert_pem)?,
            decode_private_key_pem(key_pem)?,
        )
    }

    /// Returns the certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns the private key.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

fn read(path: &Path) -> Result<Vec<u8>, BundleError> {
    std::fs::read(path).map_err(|source| BundleError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_certificate_pem(pem: &[u8]) -> Result<Certificate, DecodeError> {
    let block = first_pem_block(pem).map_err(DecodeError::Pem)?;
    if block.label != CERTIFICATE_PEM_LABEL {
        return Err(DecodeError::UnexpectedLabel(block.label));
    }
    Ok(Certificate::try_from(block.contents)?)
}

// The label is not checked: the DER must be PKCS#1 whatever the header says.
fn decode_private_key_pem(pem: &[u8]) -> Result<PrivateKey, DecodeError> {
    let block = first_pem_block(pem).map_err(DecodeError::Pem)?;
    Ok(PrivateKey::try_from(block.contents)?)
}

//! `Certificate`, `PublicKey` and `PrivateKey` types.
//!
//! These types wrap DER-encoded bytes, validate them at construction time and
//! compare by content: certificates by their exact DER encoding, keys by their
//! canonical `SubjectPublicKeyInfo`. Handles assigned by a device never take
//! part in equality.

use crate::cert::error::{CertificateError, PrivateKeyError, PublicKeyError};
use crate::cert::parsing::{
    canonical_spki_der, parse_der_encoded_bytes_as_x509_certificate, rsa_spki_der,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::hash::{Hash, Hasher};
use zeroize::Zeroize;

pub mod error;
pub(crate) mod parsing;

/// A public key in canonical DER `SubjectPublicKeyInfo` form.
///
/// Two `PublicKey`s are equal iff their canonical encodings are equal, which
/// makes the type usable as a map key when joining certificates to keys.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Creates a `PublicKey` from a DER-encoded `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns [`PublicKeyError::DecodeSpki`] if the input is not a valid
    /// `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, PublicKeyError> {
        canonical_spki_der(der).map(Self)
    }

    /// Creates a `PublicKey` from a DER-encoded PKCS#1 `RSAPublicKey`, the form
    /// AMT uses when listing its key pairs.
    ///
    /// # Errors
    ///
    /// Returns [`PublicKeyError::DecodePkcs1`] if the input is not a valid
    /// PKCS#1 RSA public key.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, PublicKeyError> {
        let key = RsaPublicKey::from_pkcs1_der(der).map_err(PublicKeyError::DecodePkcs1)?;
        Self::from_rsa(&key)
    }

    fn from_rsa(key: &RsaPublicKey) -> Result<Self, PublicKeyError> {
        rsa_spki_der(key).map(Self)
    }

    /// Returns the canonical `SubjectPublicKeyInfo` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = PublicKeyError;

    fn try_from(spki_der: &[u8]) -> Result<Self, Self::Error> {
        Self::from_spki_der(spki_der)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("len", &self.0.len())
            .finish()
    }
}

/// A single DER-encoded X.509 certificate.
///
/// Invariant: instances are always validated as parseable DER-encoded X.509.
///
/// Equality and hashing only consider the DER bytes; the subject and public
/// key are derived from them.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    common_name: Option<String>,
    public_key: PublicKey,
}

impl Certificate {
    /// Returns the certificate bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    /// Returns the subject distinguished name, e.g. `CN=amt.example.org`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the first common name of the subject, if any.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Returns the subject public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn parse(der: Vec<u8>) -> Result<Self, CertificateError> {
        let (subject, common_name, public_key) = {
            let x509 = parse_der_encoded_bytes_as_x509_certificate(&der)?;
            let common_name = x509
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_owned);
            (
                x509.subject().to_string(),
                common_name,
                PublicKey::from_spki_der(x509.public_key().raw)?,
            )
        };

        Ok(Self {
            der,
            subject,
            common_name,
            public_key,
        })
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

impl AsRef<[u8]> for Certificate {
    fn as_ref(&self) -> &[u8] {
        &self.der
    }
}

impl TryFrom<&[u8]> for Certificate {
    type Error = CertificateError;

    fn try_from(der_bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::parse(Vec::from(der_bytes))
    }
}

impl TryFrom<Vec<u8>> for Certificate {
    type Error = CertificateError;

    fn try_from(der_bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::parse(der_bytes)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("len", &self.der.len())
            .finish()
    }
}

/// A DER-encoded RSA private key in PKCS#1 format.
///
/// Invariant: instances are always validated as a consistent PKCS#1 RSA key.
///
/// The key bytes are zeroized on drop and never shown by `Debug`. Two keys are
/// equal iff their public halves are; the private bytes are never compared.
#[derive(Clone)]
pub struct PrivateKey {
    der: Vec<u8>,
    public_key: PublicKey,
}

impl PrivateKey {
    /// Returns the PKCS#1 private key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    /// Returns the public half of the key pair.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn parse(mut der: Vec<u8>) -> Result<Self, PrivateKeyError> {
        match derive_public_key(&der) {
            Ok(public_key) => Ok(Self { der, public_key }),
            Err(e) => {
                der.zeroize();
                Err(e)
            }
        }
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for PrivateKey {}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.der
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = PrivateKeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::parse(Vec::from(bytes))
    }
}

impl TryFrom<Vec<u8>> for PrivateKey {
    type Error = PrivateKeyError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::parse(bytes)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.der.zeroize();
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.der.len())
            .finish()
    }
}

fn derive_public_key(pkcs1_der: &[u8]) -> Result<PublicKey, PrivateKeyError> {
    let key = RsaPrivateKey::from_pkcs1_der(pkcs1_der).map_err(PrivateKeyError::DecodePkcs1)?;
    Ok(PublicKey::from_rsa(&key.to_public_key())?)
}

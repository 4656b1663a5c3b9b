//! Error types for certificate, public key and private key decoding.

use x509_parser::error::X509Error;

/// An error that may arise parsing X.509 certificates.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// The certificate parsed, but its subject public key could not be decoded.
    #[error("failed decoding certificate public key")]
    PublicKey(#[from] PublicKeyError),
}

/// An error that may arise decoding public keys.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PublicKeyError {
    /// The bytes are not a DER-encoded `SubjectPublicKeyInfo`.
    #[error("failed decoding SubjectPublicKeyInfo")]
    DecodeSpki(pkcs8::spki::Error),

    /// The bytes are not a DER-encoded PKCS#1 `RSAPublicKey`.
    #[error("failed decoding PKCS#1 RSA public key")]
    DecodePkcs1(rsa::pkcs1::Error),

    /// The key could not be re-encoded into its canonical form.
    #[error("failed encoding SubjectPublicKeyInfo")]
    Encode(pkcs8::spki::Error),
}

/// An error that may arise decoding private keys.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PrivateKeyError {
    /// Error returned by the PKCS#1 private key decoding library.
    #[error("failed decoding PKCS#1 RSA private key")]
    DecodePkcs1(rsa::pkcs1::Error),

    /// The public half of the key could not be derived.
    #[error(transparent)]
    PublicKey(#[from] PublicKeyError),
}

//! Internal parsing helpers.

use crate::cert::error::{CertificateError, PublicKeyError};
use pkcs8::{DecodePublicKey, EncodePublicKey, SubjectPublicKeyInfoRef};
use rsa::pkcs1::ALGORITHM_OID as RSA_ENCRYPTION_OID;
use rsa::RsaPublicKey;
use x509_parser::certificate::X509Certificate;
use x509_parser::error::{PEMError, X509Error};
use x509_parser::nom::Err;
use x509_parser::pem::{parse_x509_pem, Pem};

/// Parses the given DER-encoded bytes as an X.509 certificate.
///
/// Returns a [`CertificateError`] if the input is not a parseable DER-encoded X.509 certificate.
pub(crate) fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, CertificateError> {
    match x509_parser::parse_x509_certificate(der_bytes) {
        Ok((_, cert)) => Ok(cert),
        Err(Err::Incomplete(_)) => Err(CertificateError::ParseX509Certificate(
            X509Error::InvalidCertificate,
        )),
        Err(Err::Error(e) | Err::Failure(e)) => Err(CertificateError::ParseX509Certificate(e)),
    }
}

/// Returns the first PEM block found in `input`.
///
/// Anything after the first block (e.g. the issuer certificates an ACME client
/// appends to the leaf) is ignored.
pub(crate) fn first_pem_block(input: &[u8]) -> Result<Pem, PEMError> {
    match parse_x509_pem(input) {
        Ok((_, pem)) => Ok(pem),
        Err(Err::Incomplete(_)) => Err(PEMError::IncompletePEM),
        Err(Err::Error(e) | Err::Failure(e)) => Err(e),
    }
}

/// Re-encodes an RSA public key as a DER `SubjectPublicKeyInfo`.
pub(crate) fn rsa_spki_der(key: &RsaPublicKey) -> Result<Vec<u8>, PublicKeyError> {
    let document = key.to_public_key_der().map_err(PublicKeyError::Encode)?;
    Ok(document.as_bytes().to_vec())
}

/// Validates `der` as a `SubjectPublicKeyInfo` and returns its canonical encoding.
///
/// RSA keys are decoded and re-encoded so that keys reported in different
/// shapes (certificate SPKI, PKCS#1 key listings) compare byte-for-byte. Keys
/// of any other algorithm, and RSA keys the RSA backend refuses (e.g. moduli
/// above its size limit), are kept verbatim.
pub(crate) fn canonical_spki_der(der: &[u8]) -> Result<Vec<u8>, PublicKeyError> {
    let spki = SubjectPublicKeyInfoRef::try_from(der).map_err(PublicKeyError::DecodeSpki)?;
    if spki.algorithm.oid != RSA_ENCRYPTION_OID {
        return Ok(der.to_vec());
    }

    match RsaPublicKey::from_public_key_der(der) {
        Ok(key) => rsa_spki_der(&key),
        Err(_) => Ok(der.to_vec()),
    }
}

#[cfg(test)]
mod parsing_tests {
    use super::*;

    const CERT_A: &[u8] = include_bytes!("../../tests/testdata/bundle/cert-a.pem");
    const CERT_EC: &[u8] = include_bytes!("../../tests/testdata/bundle/cert-ec.pem");

    #[test]
    fn test_first_pem_block_reads_certificate() {
        let pem = first_pem_block(CERT_A).unwrap();
        assert_eq!(pem.label, "CERTIFICATE");
        assert!(parse_der_encoded_bytes_as_x509_certificate(&pem.contents).is_ok());
    }

    #[test]
    fn test_first_pem_block_ignores_trailing_blocks() {
        let mut chain = CERT_A.to_vec();
        chain.extend_from_slice(CERT_EC);

        let pem = first_pem_block(&chain).unwrap();
        let single = first_pem_block(CERT_A).unwrap();
        assert_eq!(pem.contents, single.contents);
    }

    #[test]
    fn test_first_pem_block_rejects_garbage() {
        assert!(first_pem_block(b"not a pem file\n").is_err());
    }

    #[test]
    fn test_parse_corrupted_der() {
        let result = parse_der_encoded_bytes_as_x509_certificate(&[0x30, 0x03, 0x01]);
        assert!(matches!(
            result.unwrap_err(),
            CertificateError::ParseX509Certificate(..)
        ));
    }

    #[test]
    fn test_canonical_spki_keeps_non_rsa_keys() {
        let pem = first_pem_block(CERT_EC).unwrap();
        let x509 = parse_der_encoded_bytes_as_x509_certificate(&pem.contents).unwrap();
        let raw = x509.public_key().raw;

        assert_eq!(canonical_spki_der(raw).unwrap(), raw);
    }

    #[test]
    fn test_canonical_spki_rejects_garbage() {
        assert!(matches!(
            canonical_spki_der(&[0x01, 0x02]).unwrap_err(),
            PublicKeyError::DecodeSpki(..)
        ));
    }
}

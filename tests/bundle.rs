use amt_certupdater::cert::error::{CertificateError, PrivateKeyError};
use amt_certupdater::{BundleError, CredentialBundle, DecodeError};
use std::io::Write as _;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata/bundle")
        .join(name)
}

#[test]
fn test_load_bundle() {
    let bundle = CredentialBundle::load(fixture("cert-a.pem"), fixture("key-a.pem")).unwrap();

    assert_eq!(
        bundle.certificate().common_name(),
        Some("amt-a.example.org")
    );
    assert_eq!(
        bundle.certificate().public_key(),
        bundle.private_key().public_key()
    );
}

#[test]
fn test_load_mismatched_pair() {
    let result = CredentialBundle::load(fixture("cert-a.pem"), fixture("key-b.pem"));

    match result.unwrap_err() {
        BundleError::Decode {
            path,
            source: DecodeError::KeyMismatch,
        } => assert_eq!(path, fixture("key-b.pem")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_from_pem_mismatched_pair() {
    let result = CredentialBundle::from_pem(
        include_bytes!("testdata/bundle/cert-b.pem"),
        include_bytes!("testdata/bundle/key-a.pem"),
    );

    assert!(matches!(result.unwrap_err(), DecodeError::KeyMismatch));
}

#[test]
fn test_renewed_certificate_pairs_with_same_key() {
    let bundle = CredentialBundle::load(fixture("cert-a-renewed.pem"), fixture("key-a.pem")).unwrap();

    assert_eq!(
        bundle.certificate().common_name(),
        Some("amt-a-renewed.example.org")
    );
}

#[test]
fn test_load_chain_uses_leaf() {
    let chain = CredentialBundle::load(fixture("cert-a-chain.pem"), fixture("key-a.pem")).unwrap();
    let leaf = CredentialBundle::load(fixture("cert-a.pem"), fixture("key-a.pem")).unwrap();

    assert_eq!(chain.certificate(), leaf.certificate());
}

#[test]
fn test_load_missing_file() {
    let result = CredentialBundle::load(fixture("cert-a.pem"), fixture("missing.pem"));

    match result.unwrap_err() {
        BundleError::Read { path, source } => {
            assert_eq!(path, fixture("missing.pem"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_load_corrupted_certificate() {
    let result = CredentialBundle::load(fixture("corrupted"), fixture("key-a.pem"));

    assert!(matches!(
        result.unwrap_err(),
        BundleError::Decode {
            source: DecodeError::Pem(..),
            ..
        }
    ));
}

#[test]
fn test_load_certificate_with_bad_der() {
    let result = CredentialBundle::load(fixture("cert-bad-der.pem"), fixture("key-a.pem"));

    assert!(matches!(
        result.unwrap_err(),
        BundleError::Decode {
            source: DecodeError::Certificate(CertificateError::ParseX509Certificate(..)),
            ..
        }
    ));
}

#[test]
fn test_load_key_as_certificate() {
    let result = CredentialBundle::load(fixture("key-a.pem"), fixture("key-a.pem"));

    match result.unwrap_err() {
        BundleError::Decode {
            path,
            source: DecodeError::UnexpectedLabel(label),
        } => {
            assert_eq!(path, fixture("key-a.pem"));
            assert_eq!(label, "RSA PRIVATE KEY");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_load_pkcs8_key_is_rejected() {
    let result = CredentialBundle::load(fixture("cert-a.pem"), fixture("key-a-pkcs8.pem"));

    match result.unwrap_err() {
        BundleError::Decode {
            path,
            source: DecodeError::PrivateKey(PrivateKeyError::DecodePkcs1(..)),
        } => assert_eq!(path, fixture("key-a-pkcs8.pem")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_load_empty_key_file() {
    let key = tempfile::NamedTempFile::new().unwrap();

    let result = CredentialBundle::load(fixture("cert-a.pem"), key.path());

    assert!(matches!(
        result.unwrap_err(),
        BundleError::Decode {
            source: DecodeError::Pem(..),
            ..
        }
    ));
}

#[test]
fn test_load_from_written_files() {
    let mut cert = tempfile::NamedTempFile::new().unwrap();
    let mut key = tempfile::NamedTempFile::new().unwrap();
    cert.write_all(include_bytes!("testdata/bundle/cert-b.pem"))
        .unwrap();
    key.write_all(include_bytes!("testdata/bundle/key-b.pem"))
        .unwrap();

    let bundle = CredentialBundle::load(cert.path(), key.path()).unwrap();

    assert_eq!(
        bundle.certificate().common_name(),
        Some("amt-b.example.org")
    );
}

#[test]
fn test_from_pem_matches_load() {
    let decoded = CredentialBundle::from_pem(
        include_bytes!("testdata/bundle/cert-b.pem"),
        include_bytes!("testdata/bundle/key-b.pem"),
    )
    .unwrap();
    let loaded = CredentialBundle::load(fixture("cert-b.pem"), fixture("key-b.pem")).unwrap();

    assert_eq!(decoded, loaded);
}

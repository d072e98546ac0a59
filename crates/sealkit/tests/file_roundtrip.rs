use std::fs;
use std::path::Path;
use std::process::Command;

use sealkit::file::{FileEncryptor, FileStrategy, FILE_IV_LEN, FILE_MAC_LEN};
use sealkit::CryptoError;

fn write_pattern(path: &Path, len: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    fs::write(path, &data).unwrap();
    data
}

fn openssl_available() -> bool {
    Command::new("openssl")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn native_round_trip_spans_many_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let (p, c, d) = (dir.path().join("plain"), dir.path().join("enc"), dir.path().join("dec"));
    let plain = write_pattern(&p, 300_000);
    let key = FileEncryptor::generate_key().unwrap();
    let engine = FileEncryptor::new(FileStrategy::Native).unwrap();

    engine.encrypt_file(&p, &c, &key).unwrap();
    let padded = (plain.len() / 16 + 1) * 16;
    assert_eq!(fs::metadata(&c).unwrap().len() as usize, padded + FILE_IV_LEN + FILE_MAC_LEN);

    engine.decrypt_file(&c, &d, &key).unwrap();
    assert_eq!(fs::read(&d).unwrap(), plain);
}

#[test]
fn empty_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (p, c, d) = (dir.path().join("plain"), dir.path().join("enc"), dir.path().join("dec"));
    fs::write(&p, b"").unwrap();
    let key = FileEncryptor::generate_key().unwrap();
    let engine = FileEncryptor::new(FileStrategy::Native).unwrap();

    engine.encrypt_file(&p, &c, &key).unwrap();
    assert_eq!(fs::metadata(&c).unwrap().len(), 64);
    engine.decrypt_file(&c, &d, &key).unwrap();
    assert!(fs::read(&d).unwrap().is_empty());
}

#[test]
fn strategies_share_one_layout() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("plain");
    let plain = write_pattern(&p, 4_099);
    let key = FileEncryptor::generate_key().unwrap();
    let memory = FileEncryptor::new(FileStrategy::InMemory).unwrap();
    let native = FileEncryptor::new(FileStrategy::Native).unwrap();

    let (c1, d1) = (dir.path().join("c1"), dir.path().join("d1"));
    memory.encrypt_file(&p, &c1, &key).unwrap();
    native.decrypt_file(&c1, &d1, &key).unwrap();
    assert_eq!(fs::read(&d1).unwrap(), plain);

    let (c2, d2) = (dir.path().join("c2"), dir.path().join("d2"));
    native.encrypt_file(&p, &c2, &key).unwrap();
    memory.decrypt_file(&c2, &d2, &key).unwrap();
    assert_eq!(fs::read(&d2).unwrap(), plain);
}

#[test]
fn tampered_file_is_rejected_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let (p, c, d) = (dir.path().join("plain"), dir.path().join("enc"), dir.path().join("dec"));
    write_pattern(&p, 1_000);
    let key = FileEncryptor::generate_key().unwrap();

    for strategy in [FileStrategy::InMemory, FileStrategy::Native] {
        let engine = FileEncryptor::new(strategy).unwrap();
        engine.encrypt_file(&p, &c, &key).unwrap();
        let mut bytes = fs::read(&c).unwrap();
        bytes[10] ^= 0x01;
        fs::write(&c, &bytes).unwrap();

        let err = engine.decrypt_file(&c, &d, &key).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailure), "{strategy:?}: {err:?}");
        assert!(!d.exists(), "{strategy:?}");
    }
}

#[test]
fn truncated_file_is_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    let (p, c, d) = (dir.path().join("plain"), dir.path().join("enc"), dir.path().join("dec"));
    write_pattern(&p, 100);
    let key = FileEncryptor::generate_key().unwrap();
    let engine = FileEncryptor::new(FileStrategy::Native).unwrap();
    engine.encrypt_file(&p, &c, &key).unwrap();

    let bytes = fs::read(&c).unwrap();
    fs::write(&c, &bytes[..bytes.len() - 1]).unwrap();
    let err = engine.decrypt_file(&c, &d, &key).unwrap_err();
    assert!(matches!(err, CryptoError::MalformedEnvelope(_)), "{err:?}");
}

#[test]
fn wrong_key_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let (p, c, d) = (dir.path().join("plain"), dir.path().join("enc"), dir.path().join("dec"));
    write_pattern(&p, 100);
    let engine = FileEncryptor::new(FileStrategy::Native).unwrap();
    engine.encrypt_file(&p, &c, &FileEncryptor::generate_key().unwrap()).unwrap();

    let err = engine.decrypt_file(&c, &d, &FileEncryptor::generate_key().unwrap()).unwrap_err();
    assert!(matches!(err, CryptoError::AuthenticationFailure));
}

#[test]
fn openssl_and_native_interoperate() {
    if !openssl_available() {
        eprintln!("openssl not found; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("plain");
    let plain = write_pattern(&p, 70_000);
    let key = FileEncryptor::generate_key().unwrap();
    let openssl = FileEncryptor::new(FileStrategy::Openssl).unwrap();
    let native = FileEncryptor::new(FileStrategy::Native).unwrap();

    let (c1, d1) = (dir.path().join("c1"), dir.path().join("d1"));
    openssl.encrypt_file(&p, &c1, &key).unwrap();
    native.decrypt_file(&c1, &d1, &key).unwrap();
    assert_eq!(fs::read(&d1).unwrap(), plain);

    let (c2, d2) = (dir.path().join("c2"), dir.path().join("d2"));
    native.encrypt_file(&p, &c2, &key).unwrap();
    openssl.decrypt_file(&c2, &d2, &key).unwrap();
    assert_eq!(fs::read(&d2).unwrap(), plain);
}

use std::io::{Cursor, Read, Write};

use zip::write::FileOptions;

use vmsift_office_crypto::{
    decrypt_encrypted_package_ole, encrypt_package_to_ole, is_encrypted_ooxml_ole, EncryptOptions,
    HashAlgorithm, OfficeCryptoError,
};

fn build_tiny_zip() -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    writer
        .start_file("hello.txt", FileOptions::<()>::default())
        .expect("start zip file");
    writer.write_all(b"hello").expect("write zip contents");
    writer.finish().expect("finish zip").into_inner()
}

fn encrypt_tiny_zip_ole(password: &str) -> (Vec<u8>, Vec<u8>) {
    let zip = build_tiny_zip();
    let ole = encrypt_package_to_ole(
        &zip,
        password,
        EncryptOptions {
            spin_count: 10_000,
            ..Default::default()
        },
    )
    .expect("encrypt");
    (zip, ole)
}

fn extract_stream_bytes(cfb_bytes: &[u8], stream_name: &str) -> Vec<u8> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(cfb_bytes)).expect("open cfb");
    let mut stream = ole.open_stream(stream_name).expect("open stream");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).expect("read stream");
    buf
}

fn rebuild_ole(encryption_info: &[u8], encrypted_package: &[u8]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    ole.create_stream("EncryptionInfo")
        .expect("create EncryptionInfo stream")
        .write_all(encryption_info)
        .expect("write EncryptionInfo");
    ole.create_stream("EncryptedPackage")
        .expect("create EncryptedPackage stream")
        .write_all(encrypted_package)
        .expect("write EncryptedPackage");
    ole.into_inner().into_inner()
}

#[test]
fn agile_encrypt_decrypt_round_trip() {
    let password = "correct horse battery staple";
    let (zip, ole) = encrypt_tiny_zip_ole(password);

    assert!(is_encrypted_ooxml_ole(&ole));
    assert!(!is_encrypted_ooxml_ole(&zip));

    let decrypted = decrypt_encrypted_package_ole(&ole, password).expect("decrypt");
    assert_eq!(decrypted, zip);
}

#[test]
fn non_default_key_sizes_round_trip() {
    let zip = build_tiny_zip();
    for (key_bits, hash_algorithm) in [(128, HashAlgorithm::Sha256), (192, HashAlgorithm::Sha384)]
    {
        let ole = encrypt_package_to_ole(
            &zip,
            "swordfish",
            EncryptOptions {
                key_bits,
                hash_algorithm,
                spin_count: 1_000,
            },
        )
        .expect("encrypt");
        let decrypted = decrypt_encrypted_package_ole(&ole, "swordfish").expect("decrypt");
        assert_eq!(decrypted, zip, "round trip failed for {key_bits}-bit keys");
    }
}

#[test]
fn wrong_password_fails() {
    let (_zip, ole) = encrypt_tiny_zip_ole("password");

    let err =
        decrypt_encrypted_package_ole(&ole, "not-the-password").expect_err("expected failure");
    assert!(
        matches!(err, OfficeCryptoError::InvalidPassword),
        "expected InvalidPassword, got {err:?}"
    );
}

#[test]
fn unsupported_key_size_is_rejected() {
    let err = encrypt_package_to_ole(
        &build_tiny_zip(),
        "pw",
        EncryptOptions {
            key_bits: 512,
            ..Default::default()
        },
    )
    .expect_err("expected invalid options");
    assert!(
        matches!(err, OfficeCryptoError::InvalidOptions(_)),
        "expected InvalidOptions, got {err:?}"
    );
}

#[test]
fn tampered_ciphertext_fails_integrity() {
    let password = "correct horse battery staple";
    let (_zip, ole) = encrypt_tiny_zip_ole(password);
    let encryption_info = extract_stream_bytes(&ole, "EncryptionInfo");
    let mut encrypted_package = extract_stream_bytes(&ole, "EncryptedPackage");

    // Flip a byte in the ciphertext (after the 8-byte length header). Integrity verification
    // should fail before decryption is attempted.
    assert!(
        encrypted_package.len() > 8,
        "EncryptedPackage stream is unexpectedly small"
    );
    encrypted_package[8] ^= 0x55;

    let tampered = rebuild_ole(&encryption_info, &encrypted_package);
    let err = decrypt_encrypted_package_ole(&tampered, password)
        .expect_err("tampered EncryptedPackage should fail integrity");
    assert!(
        matches!(err, OfficeCryptoError::IntegrityCheckFailed),
        "expected IntegrityCheckFailed, got {err:?}"
    );
}

#[test]
fn tampered_size_header_fails_integrity() {
    let password = "correct horse battery staple";
    let (_zip, ole) = encrypt_tiny_zip_ole(password);
    let encryption_info = extract_stream_bytes(&ole, "EncryptionInfo");
    let mut encrypted_package = extract_stream_bytes(&ole, "EncryptedPackage");

    // Tamper the 8-byte plaintext size prefix. Integrity verification should cover these bytes as
    // part of the full `EncryptedPackage` stream.
    let original_size = u64::from_le_bytes(
        encrypted_package[..8]
            .try_into()
            .expect("EncryptedPackage header is 8 bytes"),
    );
    assert!(original_size > 0, "unexpected empty EncryptedPackage payload");
    let tampered_size = original_size - 1;
    encrypted_package[..8].copy_from_slice(&tampered_size.to_le_bytes());

    let tampered = rebuild_ole(&encryption_info, &encrypted_package);
    let err = decrypt_encrypted_package_ole(&tampered, password)
        .expect_err("tampered EncryptedPackage header should fail integrity");
    assert!(
        matches!(err, OfficeCryptoError::IntegrityCheckFailed),
        "expected IntegrityCheckFailed, got {err:?}"
    );
}

#[test]
fn appended_ciphertext_fails_integrity() {
    let password = "correct horse battery staple";
    let (_zip, ole) = encrypt_tiny_zip_ole(password);
    let encryption_info = extract_stream_bytes(&ole, "EncryptionInfo");
    let mut encrypted_package = extract_stream_bytes(&ole, "EncryptedPackage");

    // Append an extra AES block to simulate trailing bytes stored in the stream (e.g. sector slack
    // or producer quirks). `dataIntegrity` is an HMAC over the *entire* `EncryptedPackage` stream
    // bytes, so this should fail integrity verification.
    encrypted_package.extend_from_slice(&[0xA5u8; 16]);

    let tampered = rebuild_ole(&encryption_info, &encrypted_package);
    let err = decrypt_encrypted_package_ole(&tampered, password)
        .expect_err("tampered EncryptedPackage should fail integrity");
    assert!(
        matches!(err, OfficeCryptoError::IntegrityCheckFailed),
        "expected IntegrityCheckFailed, got {err:?}"
    );
}

#[test]
fn non_zip_plaintext_is_rejected_after_decrypt() {
    let ole = encrypt_package_to_ole(
        b"this is not a zip file",
        "pw",
        EncryptOptions {
            spin_count: 1_000,
            ..Default::default()
        },
    )
    .expect("encrypt");

    let err = decrypt_encrypted_package_ole(&ole, "pw")
        .expect_err("expected non-zip plaintext to be rejected");
    match err {
        OfficeCryptoError::InvalidFormat(msg) => {
            assert!(msg.contains("PK"), "got: {msg}");
        }
        other => panic!("expected InvalidFormat, got {other:?}"),
    }
}

//! Cross-implementation checks: containers produced by the `ms-offcrypto-writer` crate must
//! decrypt with this crate.

use std::io::{Cursor, Write};

use ms_offcrypto_writer::Ecma376AgileWriter;
use rand09::{rngs::StdRng, SeedableRng as _};
use zip::write::FileOptions;

use vmsift_office_crypto::{
    decrypt_encrypted_package_ole, is_encrypted_ooxml_ole, OfficeCryptoError,
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

fn encrypt_zip_with_password_agile(plain_zip: &[u8], password: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut rng = StdRng::from_seed([0u8; 32]);
    let mut agile =
        Ecma376AgileWriter::create(&mut rng, password, &mut cursor).expect("create agile");
    agile
        .write_all(plain_zip)
        .expect("write plaintext zip to agile writer");
    agile.finalize().expect("finalize agile writer");
    cursor.into_inner()
}

#[test]
fn decrypts_third_party_agile_writer_output() {
    let password = "correct horse battery staple";
    let plain_zip = build_tiny_zip();

    let encrypted_cfb = encrypt_zip_with_password_agile(&plain_zip, password);
    assert!(is_encrypted_ooxml_ole(&encrypted_cfb));

    let decrypted =
        decrypt_encrypted_package_ole(&encrypted_cfb, password).expect("decrypt agile package");
    assert_eq!(decrypted, plain_zip);
}

#[test]
fn third_party_agile_writer_wrong_password_is_invalid_password() {
    let plain_zip = build_tiny_zip();
    let encrypted_cfb = encrypt_zip_with_password_agile(&plain_zip, "password-1");

    let err = decrypt_encrypted_package_ole(&encrypted_cfb, "password-2")
        .expect_err("wrong password should fail");
    assert!(
        matches!(err, OfficeCryptoError::InvalidPassword),
        "expected InvalidPassword, got {err:?}"
    );
}

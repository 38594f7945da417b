//! Password-based encryption of OOXML packages into the Office wrapper format
//! (`EncryptionInfo` + `EncryptedPackage` streams inside an OLE/CFB container), plus the
//! matching decrypt path.
//!
//! Only MS-OFFCRYPTO "Agile Encryption" (XML descriptor, Office 2010+) is produced and
//! consumed. Legacy "Standard Encryption" descriptors are detected and rejected with a
//! descriptive error.
//!
//! The plaintext on both sides is the raw OOXML ZIP/OPC bytes (they start with `PK`).

mod agile;
mod crypto;
mod error;
mod util;


use std::io::{Cursor, Read};

pub use crate::crypto::HashAlgorithm;
pub use crate::error::OfficeCryptoError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
    pub spin_count: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            key_bits: 256,
            hash_algorithm: HashAlgorithm::Sha512,
            spin_count: 100_000,
        }
    }
}

/// Returns true if the provided bytes look like an OLE/CFB container holding an Office-encrypted
/// OOXML package (streams `EncryptionInfo` and `EncryptedPackage`).
pub fn is_encrypted_ooxml_ole(bytes: &[u8]) -> bool {
    if bytes.len() < OLE_MAGIC.len() || bytes[..OLE_MAGIC.len()] != OLE_MAGIC {
        return false;
    }

    let cursor = Cursor::new(bytes);
    let Ok(mut ole) = cfb::CompoundFile::open(cursor) else {
        return false;
    };

    stream_exists(&mut ole, "EncryptionInfo") && stream_exists(&mut ole, "EncryptedPackage")
}

/// Encrypt a raw OOXML ZIP package into an Office `EncryptedPackage` OLE/CFB wrapper.
///
/// The returned bytes are an OLE/CFB container containing:
/// - `EncryptionInfo` stream (Agile XML descriptor)
/// - `EncryptedPackage` stream (8-byte decrypted size prefix + encrypted payload)
pub fn encrypt_package_to_ole(
    zip_bytes: &[u8],
    password: &str,
    opts: EncryptOptions,
) -> Result<Vec<u8>, OfficeCryptoError> {
    use std::io::Write as _;

    if password.is_empty() {
        return Err(OfficeCryptoError::PasswordRequired);
    }

    let (encryption_info, encrypted_package) =
        agile::encrypt_agile_encrypted_package(zip_bytes, password, &opts)?;

    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor)?;

    ole.create_stream("EncryptionInfo")?
        .write_all(&encryption_info)?;
    ole.create_stream("EncryptedPackage")?
        .write_all(&encrypted_package)?;

    Ok(ole.into_inner().into_inner())
}

/// Decrypt an Office-encrypted OOXML OLE/CFB wrapper and return the decrypted raw ZIP bytes.
pub fn decrypt_encrypted_package_ole(
    bytes: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let cursor = Cursor::new(bytes);
    let mut ole = cfb::CompoundFile::open(cursor)?;

    let mut encryption_info = Vec::new();
    ole.open_stream("EncryptionInfo")?
        .read_to_end(&mut encryption_info)?;

    let mut encrypted_package = Vec::new();
    ole.open_stream("EncryptedPackage")?
        .read_to_end(&mut encrypted_package)?;

    decrypt_encrypted_package(&encryption_info, &encrypted_package, password)
}

fn decrypt_encrypted_package(
    encryption_info: &[u8],
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let header = util::parse_encryption_info_header(encryption_info)?;
    match (header.version_major, header.version_minor) {
        (4, 4) => {
            let info = agile::parse_agile_encryption_info(encryption_info, &header)?;
            let out = agile::decrypt_agile_encrypted_package(&info, encrypted_package, password)?;
            validate_decrypted_package(&out)?;
            Ok(out)
        }
        // Standard encryption is identified by `versionMinor == 2` with `versionMajor in {2,3,4}`.
        (2..=4, 2) => Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "Standard encryption (EncryptionInfo version {}.{})",
            header.version_major, header.version_minor
        ))),
        (_, 3) => Err(OfficeCryptoError::UnsupportedEncryption(
            "extensible encryption".to_string(),
        )),
        (major, minor) => Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "EncryptionInfo version {major}.{minor}"
        ))),
    }
}

fn stream_exists<R: Read + std::io::Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> bool {
    ole.open_stream(name).is_ok()
}

fn validate_decrypted_package(bytes: &[u8]) -> Result<(), OfficeCryptoError> {
    if bytes.len() < 2 || &bytes[..2] != b"PK" {
        return Err(OfficeCryptoError::InvalidFormat(
            "decrypted package does not look like a ZIP (missing PK signature)".to_string(),
        ));
    }
    Ok(())
}

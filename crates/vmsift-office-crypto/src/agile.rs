//! Agile (XML descriptor) encryption of OOXML packages and the matching decrypt path.
//!
//! Password verification decrypts the `encryptedVerifierHashInput` and
//! `encryptedVerifierHashValue` fields with keys derived from the candidate password and checks
//! `Hash(verifierHashInput) == verifierHashValue`. Decrypted digests may carry AES-CBC padding, so
//! comparisons cover only the digest prefix.
//!
//! The spun password hash (`spinCount` iterations, commonly 100,000) is computed once per
//! operation and reused for all three password-derived block keys:
//! - block 1: `encryptedVerifierHashInput`
//! - block 2: `encryptedVerifierHashValue`
//! - block 3: `encryptedKeyValue` (the package key)

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader as XmlReader;
use rand::RngCore as _;
use zeroize::Zeroizing;

use crate::crypto::{self, HashAlgorithm, AES_BLOCK_LEN};
use crate::error::OfficeCryptoError;
use crate::util::{self, EncryptionInfoHeader};
use crate::EncryptOptions;

/// MS-OFFCRYPTO Agile: block key used for deriving the "verifierHashInput" key.
const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
/// MS-OFFCRYPTO Agile: block key used for deriving the "verifierHashValue" key.
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
/// MS-OFFCRYPTO Agile: block key used for deriving the "keyValue" key.
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
/// MS-OFFCRYPTO Agile: block key used for deriving the `encryptedHmacKey` IV.
const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
/// MS-OFFCRYPTO Agile: block key used for deriving the `encryptedHmacValue` IV.
const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const PASSWORD_KEY_ENCRYPTOR_NS: &str =
    "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

const VERIFIER_HASH_INPUT_LEN: usize = 16;
const SALT_LEN: usize = 16;

/// `EncryptedPackage` payloads are encrypted in fixed 4096-byte segments.
const SEGMENT_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AgileKeyData {
    pub salt: Vec<u8>,
    pub block_size: usize,
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
    pub cipher_algorithm: String,
    pub cipher_chaining: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AgileDataIntegrity {
    pub encrypted_hmac_key: Vec<u8>,
    pub encrypted_hmac_value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AgilePasswordKeyEncryptor {
    pub salt: Vec<u8>,
    pub block_size: usize,
    pub key_bits: usize,
    pub spin_count: u32,
    pub hash_algorithm: HashAlgorithm,
    pub cipher_algorithm: String,
    pub cipher_chaining: String,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
    pub encrypted_key_value: Vec<u8>,
}

/// Parsed Agile `EncryptionInfo` descriptor (password key-encryptor subset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AgileEncryptionInfo {
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub key_data: AgileKeyData,
    pub data_integrity: AgileDataIntegrity,
    pub password_key_encryptor: AgilePasswordKeyEncryptor,
}

/// Encrypt a raw OOXML ZIP package into (`EncryptionInfo`, `EncryptedPackage`) stream bytes.
pub(crate) fn encrypt_agile_encrypted_package(
    zip_bytes: &[u8],
    password: &str,
    opts: &EncryptOptions,
) -> Result<(Vec<u8>, Vec<u8>), OfficeCryptoError> {
    let key_len = match opts.key_bits {
        128 | 192 | 256 => opts.key_bits / 8,
        other => {
            return Err(OfficeCryptoError::InvalidOptions(format!(
                "keyBits must be 128, 192, or 256, got {other}"
            )))
        }
    };
    let hash_alg = opts.hash_algorithm;

    let mut rng = rand::thread_rng();
    let mut password_salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut password_salt);
    let mut key_data_salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut key_data_salt);
    let mut verifier_hash_input = [0u8; VERIFIER_HASH_INPUT_LEN];
    rng.fill_bytes(&mut verifier_hash_input);

    let mut package_key = Zeroizing::new(vec![0u8; key_len]);
    rng.fill_bytes(&mut package_key);
    let mut hmac_key = Zeroizing::new(vec![0u8; hash_alg.output_len()]);
    rng.fill_bytes(&mut hmac_key);

    // Password key-encryptor fields are AES-CBC encrypted with IV = saltValue.
    let password_utf16le = Zeroizing::new(util::password_to_utf16le_bytes(password));
    let h = crypto::agile_iterated_hash(&password_utf16le, &password_salt, hash_alg, opts.spin_count);

    let key_vhi =
        crypto::derive_encryption_key(&h, &VERIFIER_HASH_INPUT_BLOCK, hash_alg, opts.key_bits)?;
    let encrypted_verifier_hash_input =
        crypto::aes_cbc_encrypt(&verifier_hash_input, &key_vhi, &password_salt)?;

    let key_vhv =
        crypto::derive_encryption_key(&h, &VERIFIER_HASH_VALUE_BLOCK, hash_alg, opts.key_bits)?;
    let verifier_hash_value = zero_pad_to_block(hash_alg.digest(&verifier_hash_input));
    let encrypted_verifier_hash_value =
        crypto::aes_cbc_encrypt(&verifier_hash_value, &key_vhv, &password_salt)?;

    let key_kv = crypto::derive_encryption_key(&h, &KEY_VALUE_BLOCK, hash_alg, opts.key_bits)?;
    let padded_package_key = Zeroizing::new(zero_pad_to_block(package_key.to_vec()));
    let encrypted_key_value =
        crypto::aes_cbc_encrypt(&padded_package_key, &key_kv, &password_salt)?;

    // EncryptedPackage: LE64 plaintext size, then 4096-byte segments encrypted under the package
    // key with per-segment IVs derived from the keyData salt + segment index.
    let mut encrypted_package = Vec::with_capacity(8 + zip_bytes.len() + AES_BLOCK_LEN);
    encrypted_package.extend_from_slice(&(zip_bytes.len() as u64).to_le_bytes());

    for (segment_index, segment) in zip_bytes.chunks(SEGMENT_LEN).enumerate() {
        let block = u32::try_from(segment_index).map_err(|_| {
            OfficeCryptoError::InvalidFormat(
                "package exceeds the maximum Agile segment count".to_string(),
            )
        })?;
        let iv = crypto::derive_iv(hash_alg, &key_data_salt, &block.to_le_bytes(), AES_BLOCK_LEN);
        let padded = zero_pad_to_block(segment.to_vec());
        let ciphertext = crypto::aes_cbc_encrypt(&padded, &package_key, &iv)?;
        encrypted_package.extend_from_slice(&ciphertext);
    }

    // Integrity: HMAC over the entire EncryptedPackage stream (size header included). Key and
    // value are AES-CBC encrypted under the package key with IVs derived from the fixed
    // integrity block keys.
    let hmac_value = crypto::hmac(hash_alg, &hmac_key, &encrypted_package)?;

    let iv_hmac_key = crypto::derive_iv(hash_alg, &key_data_salt, &HMAC_KEY_BLOCK, AES_BLOCK_LEN);
    let encrypted_hmac_key = crypto::aes_cbc_encrypt(
        &zero_pad_to_block(hmac_key.to_vec()),
        &package_key,
        &iv_hmac_key,
    )?;

    let iv_hmac_value =
        crypto::derive_iv(hash_alg, &key_data_salt, &HMAC_VALUE_BLOCK, AES_BLOCK_LEN);
    let encrypted_hmac_value = crypto::aes_cbc_encrypt(
        &zero_pad_to_block(hmac_value),
        &package_key,
        &iv_hmac_value,
    )?;

    let b64 = STANDARD;
    let key_bits = opts.key_bits;
    let spin_count = opts.spin_count;
    let hash_name = hash_alg.offcrypto_name();
    let hash_size = hash_alg.output_len();
    let key_data_salt_b64 = b64.encode(key_data_salt);
    let password_salt_b64 = b64.encode(password_salt);
    let encrypted_hmac_key_b64 = b64.encode(&encrypted_hmac_key);
    let encrypted_hmac_value_b64 = b64.encode(&encrypted_hmac_value);
    let enc_vhi_b64 = b64.encode(&encrypted_verifier_hash_input);
    let enc_vhv_b64 = b64.encode(&encrypted_verifier_hash_value);
    let enc_kv_b64 = b64.encode(&encrypted_key_value);

    // Verifier and key fields are written as attributes of `p:encryptedKey`, matching the
    // descriptor layout Excel itself emits.
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltSize="16" blockSize="16" keyBits="{key_bits}" hashSize="{hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash_name}" saltValue="{key_data_salt_b64}"/>
  <dataIntegrity encryptedHmacKey="{encrypted_hmac_key_b64}" encryptedHmacValue="{encrypted_hmac_value_b64}"/>
  <keyEncryptors>
    <keyEncryptor uri="{PASSWORD_KEY_ENCRYPTOR_NS}">
      <p:encryptedKey spinCount="{spin_count}" saltSize="16" blockSize="16" keyBits="{key_bits}" hashSize="{hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{hash_name}" saltValue="{password_salt_b64}" encryptedVerifierHashInput="{enc_vhi_b64}" encryptedVerifierHashValue="{enc_vhv_b64}" encryptedKeyValue="{enc_kv_b64}"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#
    );

    let mut encryption_info =
        Vec::with_capacity(util::ENCRYPTION_INFO_HEADER_LEN + xml.len());
    encryption_info.extend_from_slice(&4u16.to_le_bytes());
    encryption_info.extend_from_slice(&4u16.to_le_bytes());
    encryption_info.extend_from_slice(&0x0000_0040u32.to_le_bytes());
    encryption_info.extend_from_slice(xml.as_bytes());

    Ok((encryption_info, encrypted_package))
}

/// Decrypt an `EncryptedPackage` stream using a parsed Agile descriptor and a password.
pub(crate) fn decrypt_agile_encrypted_package(
    info: &AgileEncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let mut r = util::Reader::new(encrypted_package);
    let total_size = r.read_u64_le("EncryptedPackage.originalSize")?;
    let total_len = usize::try_from(total_size)
        .map_err(|_| OfficeCryptoError::EncryptedPackageSizeOverflow { total_size })?;
    let padded_len = total_len
        .checked_add(AES_BLOCK_LEN - 1)
        .map(|n| n - n % AES_BLOCK_LEN)
        .ok_or(OfficeCryptoError::EncryptedPackageSizeOverflow { total_size })?;

    let key_data = &info.key_data;
    validate_cipher("keyData", &key_data.cipher_algorithm, &key_data.cipher_chaining)?;
    if key_data.block_size != AES_BLOCK_LEN {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "keyData.blockSize {}",
            key_data.block_size
        )));
    }
    if key_data.salt.len() != SALT_LEN {
        return Err(OfficeCryptoError::InvalidFormat(
            "keyData.saltValue must be 16 bytes".to_string(),
        ));
    }

    let ciphertext = r.remaining();
    if ciphertext.len() < padded_len {
        return Err(OfficeCryptoError::InvalidFormat(
            "EncryptedPackage is shorter than its declared size".to_string(),
        ));
    }

    let secret_key = agile_secret_key_from_password(info, password)?;
    verify_data_integrity(info, &secret_key, encrypted_package)?;

    let mut out = Vec::with_capacity(padded_len);
    for (segment_index, segment) in ciphertext[..padded_len].chunks(SEGMENT_LEN).enumerate() {
        let block = u32::try_from(segment_index).map_err(|_| {
            OfficeCryptoError::InvalidFormat(
                "package exceeds the maximum Agile segment count".to_string(),
            )
        })?;
        let iv = crypto::derive_iv(
            key_data.hash_algorithm,
            &key_data.salt,
            &block.to_le_bytes(),
            key_data.block_size,
        );
        let plain = crypto::aes_cbc_decrypt(segment, &secret_key, &iv)?;
        out.extend_from_slice(&plain);
    }
    out.truncate(total_len);
    Ok(out)
}

/// Derive and decrypt the package key (`encryptedKeyValue`) *with password verification*.
pub(crate) fn agile_secret_key_from_password(
    info: &AgileEncryptionInfo,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, OfficeCryptoError> {
    let pke = &info.password_key_encryptor;
    validate_cipher("encryptedKey", &pke.cipher_algorithm, &pke.cipher_chaining)?;
    if pke.block_size != AES_BLOCK_LEN {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "encryptedKey.blockSize {}",
            pke.block_size
        )));
    }
    if pke.salt.len() != SALT_LEN {
        return Err(OfficeCryptoError::InvalidFormat(
            "encryptedKey.saltValue must be 16 bytes".to_string(),
        ));
    }
    if pke.key_bits == 0 || pke.key_bits % 8 != 0 {
        return Err(OfficeCryptoError::InvalidFormat(
            "encryptedKey.keyBits is not divisible by 8".to_string(),
        ));
    }
    let key_len = pke.key_bits / 8;

    if pke.encrypted_verifier_hash_input.is_empty() || pke.encrypted_verifier_hash_value.is_empty()
    {
        return Err(OfficeCryptoError::InvalidFormat(
            "missing encryptedVerifierHashInput/encryptedVerifierHashValue".to_string(),
        ));
    }

    let password_utf16le = Zeroizing::new(util::password_to_utf16le_bytes(password));
    let h = crypto::agile_iterated_hash(
        &password_utf16le,
        &pke.salt,
        pke.hash_algorithm,
        pke.spin_count,
    );

    // Block 1: decrypt verifierHashInput.
    let key1 = crypto::derive_encryption_key(
        &h,
        &VERIFIER_HASH_INPUT_BLOCK,
        pke.hash_algorithm,
        pke.key_bits,
    )?;
    let verifier_hash_input =
        crypto::aes_cbc_decrypt(&pke.encrypted_verifier_hash_input, &key1, &pke.salt)?;
    if verifier_hash_input.len() < VERIFIER_HASH_INPUT_LEN {
        return Err(OfficeCryptoError::InvalidFormat(
            "decrypted verifierHashInput is truncated".to_string(),
        ));
    }

    // Block 2: decrypt verifierHashValue and verify. The decrypted value may carry AES-CBC
    // padding, so only the digest prefix is compared.
    let key2 = crypto::derive_encryption_key(
        &h,
        &VERIFIER_HASH_VALUE_BLOCK,
        pke.hash_algorithm,
        pke.key_bits,
    )?;
    let verifier_hash_value =
        crypto::aes_cbc_decrypt(&pke.encrypted_verifier_hash_value, &key2, &pke.salt)?;

    let digest = pke
        .hash_algorithm
        .digest(&verifier_hash_input[..VERIFIER_HASH_INPUT_LEN]);
    let expected = verifier_hash_value
        .get(..digest.len())
        .ok_or(OfficeCryptoError::InvalidPassword)?;
    if !crypto::ct_eq(&digest, expected) {
        return Err(OfficeCryptoError::InvalidPassword);
    }

    // Block 3: decrypt encryptedKeyValue (the package key).
    let key3 =
        crypto::derive_encryption_key(&h, &KEY_VALUE_BLOCK, pke.hash_algorithm, pke.key_bits)?;
    let key_value = Zeroizing::new(crypto::aes_cbc_decrypt(
        &pke.encrypted_key_value,
        &key3,
        &pke.salt,
    )?);
    if key_value.len() < key_len {
        return Err(OfficeCryptoError::InvalidFormat(
            "decrypted keyValue is truncated".to_string(),
        ));
    }
    Ok(Zeroizing::new(key_value[..key_len].to_vec()))
}

fn verify_data_integrity(
    info: &AgileEncryptionInfo,
    secret_key: &[u8],
    encrypted_package: &[u8],
) -> Result<(), OfficeCryptoError> {
    let key_data = &info.key_data;
    let integrity = &info.data_integrity;
    if integrity.encrypted_hmac_key.is_empty() || integrity.encrypted_hmac_value.is_empty() {
        return Err(OfficeCryptoError::InvalidFormat(
            "missing dataIntegrity fields".to_string(),
        ));
    }

    let iv_key = crypto::derive_iv(
        key_data.hash_algorithm,
        &key_data.salt,
        &HMAC_KEY_BLOCK,
        key_data.block_size,
    );
    let hmac_key_full = Zeroizing::new(crypto::aes_cbc_decrypt(
        &integrity.encrypted_hmac_key,
        secret_key,
        &iv_key,
    )?);

    let iv_value = crypto::derive_iv(
        key_data.hash_algorithm,
        &key_data.salt,
        &HMAC_VALUE_BLOCK,
        key_data.block_size,
    );
    let hmac_value = crypto::aes_cbc_decrypt(
        &integrity.encrypted_hmac_value,
        secret_key,
        &iv_value,
    )?;

    let digest_len = key_data.hash_algorithm.output_len();
    let hmac_key = hmac_key_full.get(..digest_len).ok_or_else(|| {
        OfficeCryptoError::InvalidFormat("decrypted hmacKey is truncated".to_string())
    })?;
    let expected = hmac_value.get(..digest_len).ok_or_else(|| {
        OfficeCryptoError::InvalidFormat("decrypted hmacValue is truncated".to_string())
    })?;

    // MS-OFFCRYPTO defines the HMAC over the entire `EncryptedPackage` stream bytes (size header
    // included). Some producers HMAC only the ciphertext; accept that form too.
    let whole = crypto::hmac(key_data.hash_algorithm, hmac_key, encrypted_package)?;
    if crypto::ct_eq(&whole, expected) {
        return Ok(());
    }
    let tail = encrypted_package.get(8..).unwrap_or_default();
    let ciphertext_only = crypto::hmac(key_data.hash_algorithm, hmac_key, tail)?;
    if crypto::ct_eq(&ciphertext_only, expected) {
        return Ok(());
    }
    Err(OfficeCryptoError::IntegrityCheckFailed)
}

fn validate_cipher(
    element: &str,
    cipher_algorithm: &str,
    cipher_chaining: &str,
) -> Result<(), OfficeCryptoError> {
    if !cipher_algorithm.eq_ignore_ascii_case("AES") {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "{element}.cipherAlgorithm {cipher_algorithm}"
        )));
    }
    if cipher_chaining != "ChainingModeCBC" {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "{element}.cipherChaining {cipher_chaining}"
        )));
    }
    Ok(())
}

fn zero_pad_to_block(mut bytes: Vec<u8>) -> Vec<u8> {
    let rem = bytes.len() % AES_BLOCK_LEN;
    if rem != 0 {
        bytes.resize(bytes.len() + (AES_BLOCK_LEN - rem), 0);
    }
    bytes
}

/// Parse the Agile XML descriptor that follows the 8-byte `EncryptionInfo` header.
pub(crate) fn parse_agile_encryption_info(
    bytes: &[u8],
    header: &EncryptionInfoHeader,
) -> Result<AgileEncryptionInfo, OfficeCryptoError> {
    if (header.version_major, header.version_minor) != (4, 4) {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "EncryptionInfo version {}.{}",
            header.version_major, header.version_minor
        )));
    }

    let xml_bytes = bytes
        .get(util::ENCRYPTION_INFO_HEADER_LEN..)
        .ok_or_else(|| {
            OfficeCryptoError::InvalidFormat("EncryptionInfo stream is truncated".to_string())
        })?;
    let xml = std::str::from_utf8(xml_bytes).map_err(|_| {
        OfficeCryptoError::InvalidFormat("agile EncryptionInfo XML is not valid UTF-8".to_string())
    })?;

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut ns_stack: Vec<NamespaceFrame> = Vec::new();
    let mut fields = DescriptorFields::default();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|_| {
            OfficeCryptoError::InvalidFormat("agile EncryptionInfo XML parse error".to_string())
        })?;

        match event {
            XmlEvent::Start(e) => {
                push_namespace_frame(&mut ns_stack, &e)?;
                fields.apply_element(&ns_stack, &e)?;
            }
            XmlEvent::Empty(e) => {
                push_namespace_frame(&mut ns_stack, &e)?;
                fields.apply_element(&ns_stack, &e)?;
                ns_stack.pop();
            }
            XmlEvent::End(_) => {
                ns_stack.pop();
            }
            XmlEvent::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    fields.finish(header)
}

/// Descriptor elements collected while walking the XML event stream.
#[derive(Default)]
struct DescriptorFields {
    key_data: Option<AgileKeyData>,
    data_integrity: Option<AgileDataIntegrity>,
    password_key_encryptor: Option<AgilePasswordKeyEncryptor>,
}

impl DescriptorFields {
    fn apply_element(
        &mut self,
        ns_stack: &[NamespaceFrame],
        e: &BytesStart<'_>,
    ) -> Result<(), OfficeCryptoError> {
        match e.local_name().as_ref() {
            b"keyData" => self.key_data = Some(parse_key_data(e)?),
            b"dataIntegrity" => self.data_integrity = Some(parse_data_integrity(e)?),
            b"encryptedKey" => {
                // Only the password key encryptor is supported; `encryptedKey` elements in other
                // namespaces (e.g. certificate encryptors) are skipped.
                let name = e.name();
                let prefix = element_prefix(name.as_ref());
                if resolve_namespace_uri(ns_stack, prefix)
                    == Some(PASSWORD_KEY_ENCRYPTOR_NS.as_bytes())
                {
                    self.password_key_encryptor = Some(parse_password_encrypted_key(e)?);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self, header: &EncryptionInfoHeader) -> Result<AgileEncryptionInfo, OfficeCryptoError> {
        Ok(AgileEncryptionInfo {
            version_major: header.version_major,
            version_minor: header.version_minor,
            flags: header.flags,
            key_data: self.key_data.ok_or_else(|| missing("<keyData> element"))?,
            data_integrity: self
                .data_integrity
                .ok_or_else(|| missing("<dataIntegrity> element"))?,
            password_key_encryptor: self
                .password_key_encryptor
                .ok_or_else(|| missing("password <encryptedKey> element"))?,
        })
    }
}

fn parse_key_data(e: &BytesStart<'_>) -> Result<AgileKeyData, OfficeCryptoError> {
    let mut salt: Option<Vec<u8>> = None;
    let mut block_size: Option<usize> = None;
    let mut key_bits: Option<usize> = None;
    let mut hash_algorithm: Option<HashAlgorithm> = None;
    let mut cipher_algorithm: Option<String> = None;
    let mut cipher_chaining: Option<String> = None;

    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| missing("valid XML attribute"))?;
        let value = attr.value.as_ref();
        match local_name(attr.key.as_ref()) {
            b"saltValue" => salt = Some(decode_base64(value)?),
            b"blockSize" => block_size = Some(parse_decimal_usize(value)?),
            b"keyBits" => key_bits = Some(parse_decimal_usize(value)?),
            b"hashAlgorithm" => {
                hash_algorithm = Some(HashAlgorithm::parse_offcrypto_name(attr_str(value)?)?)
            }
            b"cipherAlgorithm" => cipher_algorithm = Some(attr_str(value)?.to_string()),
            b"cipherChaining" => cipher_chaining = Some(attr_str(value)?.to_string()),
            _ => {}
        }
    }

    Ok(AgileKeyData {
        salt: salt.ok_or_else(|| missing("keyData.saltValue"))?,
        block_size: block_size.ok_or_else(|| missing("keyData.blockSize"))?,
        key_bits: key_bits.ok_or_else(|| missing("keyData.keyBits"))?,
        hash_algorithm: hash_algorithm.ok_or_else(|| missing("keyData.hashAlgorithm"))?,
        cipher_algorithm: cipher_algorithm.unwrap_or_else(|| "AES".to_string()),
        cipher_chaining: cipher_chaining.unwrap_or_else(|| "ChainingModeCBC".to_string()),
    })
}

fn parse_data_integrity(e: &BytesStart<'_>) -> Result<AgileDataIntegrity, OfficeCryptoError> {
    let mut encrypted_hmac_key: Option<Vec<u8>> = None;
    let mut encrypted_hmac_value: Option<Vec<u8>> = None;

    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| missing("valid XML attribute"))?;
        let value = attr.value.as_ref();
        match local_name(attr.key.as_ref()) {
            b"encryptedHmacKey" => encrypted_hmac_key = Some(decode_base64(value)?),
            b"encryptedHmacValue" => encrypted_hmac_value = Some(decode_base64(value)?),
            _ => {}
        }
    }

    Ok(AgileDataIntegrity {
        encrypted_hmac_key: encrypted_hmac_key
            .ok_or_else(|| missing("dataIntegrity.encryptedHmacKey"))?,
        encrypted_hmac_value: encrypted_hmac_value
            .ok_or_else(|| missing("dataIntegrity.encryptedHmacValue"))?,
    })
}

fn parse_password_encrypted_key(
    e: &BytesStart<'_>,
) -> Result<AgilePasswordKeyEncryptor, OfficeCryptoError> {
    let mut salt: Option<Vec<u8>> = None;
    let mut block_size: Option<usize> = None;
    let mut key_bits: Option<usize> = None;
    let mut spin_count: Option<u32> = None;
    let mut hash_algorithm: Option<HashAlgorithm> = None;
    let mut cipher_algorithm: Option<String> = None;
    let mut cipher_chaining: Option<String> = None;
    let mut encrypted_verifier_hash_input: Option<Vec<u8>> = None;
    let mut encrypted_verifier_hash_value: Option<Vec<u8>> = None;
    let mut encrypted_key_value: Option<Vec<u8>> = None;

    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| missing("valid XML attribute"))?;
        let value = attr.value.as_ref();
        match local_name(attr.key.as_ref()) {
            b"saltValue" => salt = Some(decode_base64(value)?),
            b"blockSize" => block_size = Some(parse_decimal_usize(value)?),
            b"keyBits" => key_bits = Some(parse_decimal_usize(value)?),
            b"spinCount" => spin_count = Some(parse_decimal_u32(value)?),
            b"hashAlgorithm" => {
                hash_algorithm = Some(HashAlgorithm::parse_offcrypto_name(attr_str(value)?)?)
            }
            b"cipherAlgorithm" => cipher_algorithm = Some(attr_str(value)?.to_string()),
            b"cipherChaining" => cipher_chaining = Some(attr_str(value)?.to_string()),
            b"encryptedVerifierHashInput" => {
                encrypted_verifier_hash_input = Some(decode_base64(value)?)
            }
            b"encryptedVerifierHashValue" => {
                encrypted_verifier_hash_value = Some(decode_base64(value)?)
            }
            b"encryptedKeyValue" => encrypted_key_value = Some(decode_base64(value)?),
            _ => {}
        }
    }

    Ok(AgilePasswordKeyEncryptor {
        salt: salt.ok_or_else(|| missing("encryptedKey.saltValue"))?,
        block_size: block_size.ok_or_else(|| missing("encryptedKey.blockSize"))?,
        key_bits: key_bits.ok_or_else(|| missing("encryptedKey.keyBits"))?,
        spin_count: spin_count.ok_or_else(|| missing("encryptedKey.spinCount"))?,
        hash_algorithm: hash_algorithm.ok_or_else(|| missing("encryptedKey.hashAlgorithm"))?,
        cipher_algorithm: cipher_algorithm.unwrap_or_else(|| "AES".to_string()),
        cipher_chaining: cipher_chaining.unwrap_or_else(|| "ChainingModeCBC".to_string()),
        encrypted_verifier_hash_input: encrypted_verifier_hash_input
            .ok_or_else(|| missing("encryptedKey.encryptedVerifierHashInput"))?,
        encrypted_verifier_hash_value: encrypted_verifier_hash_value
            .ok_or_else(|| missing("encryptedKey.encryptedVerifierHashValue"))?,
        encrypted_key_value: encrypted_key_value
            .ok_or_else(|| missing("encryptedKey.encryptedKeyValue"))?,
    })
}

fn missing(what: &str) -> OfficeCryptoError {
    OfficeCryptoError::InvalidFormat(format!("missing {what}"))
}

#[derive(Debug, Clone)]
struct NamespaceFrame {
    decls: Vec<(Vec<u8> /* prefix */, Vec<u8> /* uri */)>,
}

fn push_namespace_frame(
    stack: &mut Vec<NamespaceFrame>,
    elem: &BytesStart<'_>,
) -> Result<(), OfficeCryptoError> {
    let mut frame = NamespaceFrame { decls: Vec::new() };

    for attr in elem.attributes().with_checks(false) {
        let attr = attr.map_err(|_| missing("valid XML attribute"))?;
        let key = attr.key.as_ref();
        let value = attr.value.as_ref();

        if key == b"xmlns" {
            frame.decls.push((Vec::new(), value.to_vec()));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            frame.decls.push((prefix.to_vec(), value.to_vec()));
        }
    }

    stack.push(frame);
    Ok(())
}

fn resolve_namespace_uri<'a>(stack: &'a [NamespaceFrame], prefix: &[u8]) -> Option<&'a [u8]> {
    for frame in stack.iter().rev() {
        for (p, uri) in &frame.decls {
            if p.as_slice() == prefix {
                return Some(uri.as_slice());
            }
        }
    }
    None
}

fn element_prefix(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| &name[..idx])
        .unwrap_or(&[])
}

fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| &name[idx + 1..])
        .unwrap_or(name)
}

fn attr_str(value: &[u8]) -> Result<&str, OfficeCryptoError> {
    std::str::from_utf8(value).map_err(|_| {
        OfficeCryptoError::InvalidFormat("invalid UTF-8 attribute value".to_string())
    })
}

fn decode_base64(value: &[u8]) -> Result<Vec<u8>, OfficeCryptoError> {
    // Some producers pretty-print the descriptor XML and may insert whitespace into long base64
    // attribute values; some omit `=` padding. Be permissive.
    let s = attr_str(value)?;
    let bytes = s.as_bytes();

    // Avoid allocating in the common case where there is no whitespace.
    let mut cleaned: Option<Vec<u8>> = None;
    for (idx, &b) in bytes.iter().enumerate() {
        if matches!(b, b'\r' | b'\n' | b'\t' | b' ') {
            let mut out = Vec::with_capacity(bytes.len());
            out.extend_from_slice(&bytes[..idx]);
            for &b2 in &bytes[idx..] {
                if !matches!(b2, b'\r' | b'\n' | b'\t' | b' ') {
                    out.push(b2);
                }
            }
            cleaned = Some(out);
            break;
        }
    }

    let input = cleaned.as_deref().unwrap_or(bytes);
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .map_err(|_| OfficeCryptoError::InvalidFormat("invalid base64 value".to_string()))
}

fn parse_decimal_u32(value: &[u8]) -> Result<u32, OfficeCryptoError> {
    attr_str(value)?
        .trim()
        .parse::<u32>()
        .map_err(|_| OfficeCryptoError::InvalidFormat("invalid numeric attribute".to_string()))
}

fn parse_decimal_usize(value: &[u8]) -> Result<usize, OfficeCryptoError> {
    attr_str(value)?
        .trim()
        .parse::<usize>()
        .map_err(|_| OfficeCryptoError::InvalidFormat("invalid numeric attribute".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `EncryptionInfo` stream bytes produced by the crate's own writer with low-cost parameters.
    pub(crate) fn agile_encryption_info_fixture() -> Vec<u8> {
        let opts = EncryptOptions {
            spin_count: 16,
            ..EncryptOptions::default()
        };
        let (encryption_info, _encrypted_package) =
            encrypt_agile_encrypted_package(b"PK\x03\x04fixture payload!", "pw", &opts)
                .expect("encrypt fixture");
        encryption_info
    }

    #[test]
    fn writer_descriptor_parses_back() {
        let bytes = agile_encryption_info_fixture();
        let header = util::parse_encryption_info_header(&bytes).expect("parse header");
        assert_eq!((header.version_major, header.version_minor), (4, 4));
        assert_eq!(header.flags, 0x40);

        let info = parse_agile_encryption_info(&bytes, &header).expect("parse agile");
        assert_eq!(info.key_data.salt.len(), 16);
        assert_eq!(info.key_data.block_size, 16);
        assert_eq!(info.key_data.key_bits, 256);
        assert_eq!(info.key_data.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(info.key_data.cipher_algorithm, "AES");
        assert_eq!(info.key_data.cipher_chaining, "ChainingModeCBC");

        let pke = &info.password_key_encryptor;
        assert_eq!(pke.spin_count, 16);
        assert_eq!(pke.salt.len(), 16);
        assert_eq!(pke.key_bits, 256);
        assert_eq!(pke.encrypted_verifier_hash_input.len() % 16, 0);
        assert_eq!(pke.encrypted_verifier_hash_value.len() % 16, 0);
        assert_eq!(pke.encrypted_key_value.len() % 16, 0);

        assert!(!info.data_integrity.encrypted_hmac_key.is_empty());
        assert!(!info.data_integrity.encrypted_hmac_value.is_empty());
    }

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let plaintext: Vec<u8> = {
            let mut v = b"PK\x03\x04".to_vec();
            // Span several segments so the per-segment IV derivation is exercised.
            v.extend((0..SEGMENT_LEN * 2 + 731).map(|i| (i % 251) as u8));
            v
        };
        let opts = EncryptOptions {
            spin_count: 16,
            ..EncryptOptions::default()
        };
        let (encryption_info, encrypted_package) =
            encrypt_agile_encrypted_package(&plaintext, "hunter2", &opts).expect("encrypt");

        let header = util::parse_encryption_info_header(&encryption_info).expect("header");
        let info = parse_agile_encryption_info(&encryption_info, &header).expect("parse");
        let decrypted =
            decrypt_agile_encrypted_package(&info, &encrypted_package, "hunter2").expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_password_is_rejected_before_package_decryption() {
        let opts = EncryptOptions {
            spin_count: 16,
            ..EncryptOptions::default()
        };
        let (encryption_info, encrypted_package) =
            encrypt_agile_encrypted_package(b"PK\x03\x04data", "correct", &opts).expect("encrypt");

        let header = util::parse_encryption_info_header(&encryption_info).expect("header");
        let info = parse_agile_encryption_info(&encryption_info, &header).expect("parse");
        let err = decrypt_agile_encrypted_package(&info, &encrypted_package, "incorrect")
            .expect_err("wrong password");
        assert!(matches!(err, OfficeCryptoError::InvalidPassword));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let opts = EncryptOptions {
            spin_count: 16,
            ..EncryptOptions::default()
        };
        let (encryption_info, encrypted_package) =
            encrypt_agile_encrypted_package(b"PK\x03\x04data here", "pw", &opts).expect("encrypt");

        let header = util::parse_encryption_info_header(&encryption_info).expect("header");
        let info = parse_agile_encryption_info(&encryption_info, &header).expect("parse");

        let truncated = &encrypted_package[..encrypted_package.len() - 16];
        let err = decrypt_agile_encrypted_package(&info, truncated, "pw")
            .expect_err("expected truncation error");
        assert!(matches!(err, OfficeCryptoError::InvalidFormat(_)));
    }

    #[test]
    fn parses_pretty_printed_descriptor_with_tolerant_base64() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption"
    xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltValue="AAECAwQF BgcICQoLDA0ODw" hashAlgorithm="SHA256" blockSize="16" keyBits="128"/>
  <dataIntegrity encryptedHmacKey="EBE SEw" encryptedHmacValue="q rvM"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
      <p:encryptedKey spinCount="100000" saltValue="AQID BA" hashAlgorithm="SHA512" keyBits="256"
        blockSize="16"
        encryptedKeyValue="BQY HCA"
        encryptedVerifierHashInput="CQoL DA"
        encryptedVerifierHashValue="DQ4P EA"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>
"#;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(xml.as_bytes());

        let header = util::parse_encryption_info_header(&bytes).expect("header");
        let info = parse_agile_encryption_info(&bytes, &header).expect("parse");

        assert_eq!(info.key_data.salt, (0u8..16).collect::<Vec<_>>());
        assert_eq!(info.key_data.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(info.data_integrity.encrypted_hmac_key, vec![0x10, 0x11, 0x12, 0x13]);
        assert_eq!(info.data_integrity.encrypted_hmac_value, vec![0xaa, 0xbb, 0xcc]);

        let pke = &info.password_key_encryptor;
        assert_eq!(pke.spin_count, 100_000);
        assert_eq!(pke.salt, vec![1, 2, 3, 4]);
        assert_eq!(pke.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(pke.key_bits, 256);
        assert_eq!(pke.encrypted_key_value, vec![5, 6, 7, 8]);
        assert_eq!(pke.encrypted_verifier_hash_input, vec![9, 10, 11, 12]);
        assert_eq!(pke.encrypted_verifier_hash_value, vec![13, 14, 15, 16]);
    }

    #[test]
    fn encrypted_key_outside_password_namespace_is_ignored() {
        let xml = r#"<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption">
  <keyData saltValue="AAECAwQFBgcICQoLDA0ODw==" hashAlgorithm="SHA512" blockSize="16" keyBits="256"/>
  <dataIntegrity encryptedHmacKey="EBESEw==" encryptedHmacValue="qrvM"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/certificate">
      <c:encryptedKey xmlns:c="http://schemas.microsoft.com/office/2006/keyEncryptor/certificate" encryptedKeyValue="BQYHCA=="/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(xml.as_bytes());

        let header = util::parse_encryption_info_header(&bytes).expect("header");
        let err = parse_agile_encryption_info(&bytes, &header).expect_err("no password encryptor");
        match err {
            OfficeCryptoError::InvalidFormat(msg) => {
                assert!(msg.contains("encryptedKey"), "got: {msg}");
            }
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn non_agile_version_is_unsupported() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let header = util::parse_encryption_info_header(&bytes).expect("header");
        let err = parse_agile_encryption_info(&bytes, &header).expect_err("standard descriptor");
        assert!(matches!(err, OfficeCryptoError::UnsupportedEncryption(_)));
    }

    #[test]
    fn sha1_descriptor_is_rejected_as_unsupported() {
        let xml = r#"<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption">
  <keyData saltValue="AAECAwQFBgcICQoLDA0ODw==" hashAlgorithm="SHA1" blockSize="16" keyBits="128"/>
</encryption>"#;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(xml.as_bytes());

        let header = util::parse_encryption_info_header(&bytes).expect("header");
        let err = parse_agile_encryption_info(&bytes, &header).expect_err("SHA1 descriptor");
        assert!(matches!(err, OfficeCryptoError::UnsupportedEncryption(_)));
    }
}

//! Hash and cipher primitives shared by the Agile encrypt and decrypt paths.

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use hmac::{Hmac, Mac as _};
use sha2::Digest as _;
use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;

use crate::error::OfficeCryptoError;

pub(crate) const AES_BLOCK_LEN: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub(crate) fn parse_offcrypto_name(name: &str) -> Result<Self, OfficeCryptoError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            other => Err(OfficeCryptoError::UnsupportedEncryption(format!(
                "hashAlgorithm {other}"
            ))),
        }
    }

    pub(crate) fn offcrypto_name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub(crate) fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub(crate) fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

fn hash_into(hash_alg: HashAlgorithm, data: &[u8], out: &mut [u8]) {
    match hash_alg {
        HashAlgorithm::Sha256 => out.copy_from_slice(&sha2::Sha256::digest(data)),
        HashAlgorithm::Sha384 => out.copy_from_slice(&sha2::Sha384::digest(data)),
        HashAlgorithm::Sha512 => out.copy_from_slice(&sha2::Sha512::digest(data)),
    }
}

/// Compute the Agile password *iterated hash*.
///
/// Algorithm:
/// 1. `H = Hash(salt || password_utf16le)`
/// 2. For `i in 0..spinCount`: `H = Hash(LE32(i) || H)`
pub(crate) fn agile_iterated_hash(
    password_utf16le: &[u8],
    salt: &[u8],
    hash_alg: HashAlgorithm,
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    let digest_len = hash_alg.output_len();
    let mut h = Zeroizing::new(vec![0u8; digest_len]);

    // Initial round: Hash(salt || password_utf16le)
    let mut buf = Zeroizing::new(Vec::with_capacity(salt.len() + password_utf16le.len()));
    buf.extend_from_slice(salt);
    buf.extend_from_slice(password_utf16le);
    hash_into(hash_alg, &buf[..], &mut h[..]);

    // Iteration 0..spinCount-1: Hash(LE32(i) || H)
    //
    // Avoid allocating in the loop: reuse a fixed-size buffer and overwrite the hash output.
    let mut round = Zeroizing::new(vec![0u8; 4 + digest_len]);
    for i in 0..spin_count {
        round[..4].copy_from_slice(&i.to_le_bytes());
        round[4..].copy_from_slice(&h);
        hash_into(hash_alg, &round[..], &mut h[..]);
    }

    h
}

/// Derive a per-purpose encryption key: `Hash(iterated_hash || block_key)`, truncated to
/// `key_bits / 8` bytes (padded with `0x36` when the digest is shorter than the key).
pub(crate) fn derive_encryption_key(
    iterated_hash: &[u8],
    block_key: &[u8],
    hash_alg: HashAlgorithm,
    key_bits: usize,
) -> Result<Zeroizing<Vec<u8>>, OfficeCryptoError> {
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(OfficeCryptoError::InvalidFormat(
            "keyBits is not divisible by 8".to_string(),
        ));
    }
    let key_len = key_bits / 8;

    let mut buf = Zeroizing::new(Vec::with_capacity(iterated_hash.len() + block_key.len()));
    buf.extend_from_slice(iterated_hash);
    buf.extend_from_slice(block_key);

    let mut key = Zeroizing::new(hash_alg.digest(&buf));
    key.resize(key_len, 0x36);
    Ok(key)
}

/// Derive a 16-byte AES-CBC IV: `Hash(salt || block_key)` truncated to `block_size` (padded with
/// `0x36` when the digest is shorter).
pub(crate) fn derive_iv(
    hash_alg: HashAlgorithm,
    salt: &[u8],
    block_key: &[u8],
    block_size: usize,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(salt.len() + block_key.len());
    buf.extend_from_slice(salt);
    buf.extend_from_slice(block_key);
    let mut iv = hash_alg.digest(&buf);
    iv.resize(block_size, 0x36);
    iv
}

pub(crate) fn aes_cbc_encrypt(
    plaintext: &[u8],
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    if plaintext.len() % AES_BLOCK_LEN != 0 {
        return Err(OfficeCryptoError::InvalidFormat(format!(
            "AES-CBC plaintext length {} is not a multiple of 16",
            plaintext.len()
        )));
    }

    fn encrypt_with<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), OfficeCryptoError>
    where
        C: BlockCipher + BlockEncryptMut + KeyInit,
    {
        let msg_len = buf.len();
        let enc = cbc::Encryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| OfficeCryptoError::InvalidOptions("invalid AES key/IV length".to_string()))?;
        enc.encrypt_padded_mut::<NoPadding>(buf, msg_len)
            .map_err(|_| {
                OfficeCryptoError::InvalidFormat("AES-CBC input is not block-aligned".to_string())
            })?;
        Ok(())
    }

    let mut buf = plaintext.to_vec();
    match key.len() {
        16 => encrypt_with::<Aes128>(key, iv, &mut buf)?,
        24 => encrypt_with::<Aes192>(key, iv, &mut buf)?,
        32 => encrypt_with::<Aes256>(key, iv, &mut buf)?,
        n => {
            return Err(OfficeCryptoError::InvalidOptions(format!(
                "invalid AES key length {n}; expected 16, 24, or 32 bytes"
            )))
        }
    }
    Ok(buf)
}

pub(crate) fn aes_cbc_decrypt(
    ciphertext: &[u8],
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    if ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(OfficeCryptoError::InvalidFormat(format!(
            "AES-CBC ciphertext length {} is not a multiple of 16",
            ciphertext.len()
        )));
    }

    fn decrypt_with<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), OfficeCryptoError>
    where
        C: BlockCipher + BlockDecryptMut + KeyInit,
    {
        let dec = cbc::Decryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| OfficeCryptoError::InvalidOptions("invalid AES key/IV length".to_string()))?;
        dec.decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| {
                OfficeCryptoError::InvalidFormat("AES-CBC input is not block-aligned".to_string())
            })?;
        Ok(())
    }

    let mut buf = ciphertext.to_vec();
    match key.len() {
        16 => decrypt_with::<Aes128>(key, iv, &mut buf)?,
        24 => decrypt_with::<Aes192>(key, iv, &mut buf)?,
        32 => decrypt_with::<Aes256>(key, iv, &mut buf)?,
        n => {
            return Err(OfficeCryptoError::InvalidOptions(format!(
                "invalid AES key length {n}; expected 16, 24, or 32 bytes"
            )))
        }
    }
    Ok(buf)
}

pub(crate) fn hmac(
    hash_alg: HashAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    fn bad_key(_: hmac::digest::InvalidLength) -> OfficeCryptoError {
        OfficeCryptoError::InvalidFormat("invalid HMAC key length".to_string())
    }

    match hash_alg {
        HashAlgorithm::Sha256 => {
            let mut mac = <Hmac<sha2::Sha256> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha384 => {
            let mut mac = <Hmac<sha2::Sha384> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha512 => {
            let mut mac = <Hmac<sha2::Sha512> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Constant-time byte comparison for password/integrity digests.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

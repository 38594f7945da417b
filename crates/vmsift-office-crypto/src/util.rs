use crate::error::OfficeCryptoError;

/// Length of the fixed `EncryptionVersionInfo` + flags prefix of an `EncryptionInfo` stream.
pub(crate) const ENCRYPTION_INFO_HEADER_LEN: usize = 8;

/// Parsed fixed-size prefix of an `EncryptionInfo` stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EncryptionInfoHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
}

pub(crate) fn parse_encryption_info_header(
    bytes: &[u8],
) -> Result<EncryptionInfoHeader, OfficeCryptoError> {
    let mut r = Reader::new(bytes);
    Ok(EncryptionInfoHeader {
        version_major: r.read_u16_le("EncryptionVersionInfo.major")?,
        version_minor: r.read_u16_le("EncryptionVersionInfo.minor")?,
        flags: r.read_u32_le("EncryptionVersionInfo.flags")?,
    })
}

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn take(
        &mut self,
        n: usize,
        context: &'static str,
    ) -> Result<&'a [u8], OfficeCryptoError> {
        let end = self.pos.saturating_add(n);
        if end > self.bytes.len() {
            return Err(OfficeCryptoError::InvalidFormat(format!(
                "truncated data while reading {context}"
            )));
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_u16_le(&mut self, context: &'static str) -> Result<u16, OfficeCryptoError> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32_le(&mut self, context: &'static str) -> Result<u32, OfficeCryptoError> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64_le(&mut self, context: &'static str) -> Result<u64, OfficeCryptoError> {
        let b = self.take(8, context)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Everything after the current read position.
    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

pub(crate) fn password_to_utf16le_bytes(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() * 2);
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

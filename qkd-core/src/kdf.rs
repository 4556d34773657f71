//! Privacy amplification: compress reconciled bits into a symmetric key

use crate::crypto::{decode_base64, encode_base64};
use crate::protocol::Bit;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the SHA-256 digest the key is cut from
pub const DIGEST_BYTES: usize = 32;

/// Session-ephemeral symmetric key, wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: Vec<u8>,
}

impl DerivedKey {
    /// Wrap raw key bytes, checking the expected length
    pub fn from_bytes(bytes: Vec<u8>, expected_len: usize) -> Result<Self> {
        if bytes.len() != expected_len {
            return Err(Error::InvalidKeyLength {
                expected: expected_len,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 key supplied by a client
    pub fn from_base64(s: &str, expected_len: usize) -> Result<Self> {
        Self::from_bytes(decode_base64(s)?, expected_len)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        encode_base64(&self.bytes)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Leading bits that feed the hash: at most `required_bytes * 8`, no padding
pub fn key_material(bits: &[Bit], required_bytes: usize) -> &[Bit] {
    &bits[..bits.len().min(required_bytes * 8)]
}

/// Hash reconciled bits into a `required_bytes` key
///
/// Each bit is fed to SHA-256 as its own byte (0x00 or 0x01), not packed.
pub fn derive_key(bits: &[Bit], required_bytes: usize) -> Result<DerivedKey> {
    if required_bytes == 0 || required_bytes > DIGEST_BYTES {
        return Err(Error::Validation(format!(
            "Key length must be between 1 and {} bytes",
            DIGEST_BYTES
        )));
    }

    let material = key_material(bits, required_bytes);
    if material.is_empty() {
        return Err(Error::InsufficientKeyMaterial {
            required: required_bytes * 8,
            available: 0,
        });
    }

    let digest = Sha256::digest(material);
    DerivedKey::from_bytes(digest[..required_bytes].to_vec(), required_bytes)
}

//! Authenticated encryption with the QKD-derived key
//!
//! AES-256-GCM with a fresh 96-bit nonce per message. The transport form of a
//! ciphertext is `base64(IV || ciphertext || tag)`.

use crate::{Error, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

/// AES-256 key size in bytes
pub const KEY_LEN: usize = 32;

/// GCM nonce size in bytes
pub const IV_LEN: usize = 12;

/// GCM authentication tag size in bytes
pub const TAG_LEN: usize = 16;

/// `IV || ciphertext || tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    bytes: Vec<u8>,
}

impl CipherEnvelope {
    /// Smallest valid envelope: IV plus tag over an empty plaintext
    pub const MIN_LEN: usize = IV_LEN + TAG_LEN;

    /// Wrap raw envelope bytes, rejecting anything too short to split
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(Error::MalformedEnvelope {
                len: bytes.len(),
                min: Self::MIN_LEN,
            });
        }
        Ok(Self { bytes })
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_bytes(decode_base64(s)?)
    }

    fn from_parts(iv: &[u8], sealed: Vec<u8>) -> Self {
        let mut bytes = Vec::with_capacity(iv.len() + sealed.len());
        bytes.extend_from_slice(iv);
        bytes.extend_from_slice(&sealed);
        Self { bytes }
    }

    pub fn iv(&self) -> &[u8] {
        &self.bytes[..IV_LEN]
    }

    /// Ciphertext followed by the authentication tag
    pub fn sealed(&self) -> &[u8] {
        &self.bytes[IV_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_base64(&self) -> String {
        encode_base64(&self.bytes)
    }
}

/// AES-256-GCM cipher bound to one key
#[derive(Clone)]
pub struct SymmetricCipher {
    aead: Aes256Gcm,
}

impl SymmetricCipher {
    /// Create a cipher; the key must be exactly [`KEY_LEN`] bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = || Error::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        };
        if key.len() != KEY_LEN {
            return Err(invalid());
        }
        let aead = Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?;
        Ok(Self { aead })
    }

    /// Encrypt under a freshly drawn OS-random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CipherEnvelope> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::Validation("Plaintext too long for AES-GCM".to_string()))?;
        Ok(CipherEnvelope::from_parts(nonce.as_slice(), sealed))
    }

    /// Verify the tag and decrypt; nothing is returned unless the tag verifies
    pub fn decrypt(&self, envelope: &CipherEnvelope) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(envelope.iv());
        self.aead
            .decrypt(nonce, envelope.sealed())
            .map_err(|_| Error::AuthenticationFailure)
    }

    /// Encrypt a UTF-8 message into its base64 envelope
    pub fn encrypt_message(&self, plaintext: &str) -> Result<String> {
        Ok(self.encrypt(plaintext.as_bytes())?.to_base64())
    }

    /// Decrypt a base64 envelope back into a UTF-8 message
    pub fn decrypt_message(&self, envelope: &str) -> Result<String> {
        let envelope = CipherEnvelope::from_base64(envelope)?;
        let plaintext = self.decrypt(&envelope)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

/// Encode bytes to base64 string
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 string to bytes
///
/// Strict: surrounding whitespace and missing padding are rejected.
pub fn decode_base64(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_base64_is_strict() {
        let encoded = encode_base64(b"key material");
        assert_eq!(decode_base64(&encoded).unwrap(), b"key material");

        for padded in [format!("  {}", encoded), format!("{}\n", encoded)] {
            assert!(matches!(
                decode_base64(&padded),
                Err(Error::InvalidEncoding(_))
            ));
        }
    }

    fn test_key() -> Vec<u8> {
        (0..KEY_LEN as u8).collect()
    }

    #[test]
    fn test_round_trip() {
        let cipher = SymmetricCipher::new(&test_key()).unwrap();
        let envelope = cipher.encrypt_message("hello quantum world").unwrap();
        assert_eq!(cipher.decrypt_message(&envelope).unwrap(), "hello quantum world");
    }

    #[test]
    fn test_envelope_layout() {
        let cipher = SymmetricCipher::new(&test_key()).unwrap();
        let envelope = cipher.encrypt(b"abc").unwrap();
        assert_eq!(envelope.as_bytes().len(), IV_LEN + 3 + TAG_LEN);
        assert_eq!(envelope.iv().len(), IV_LEN);
        assert_eq!(envelope.sealed().len(), 3 + TAG_LEN);
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = SymmetricCipher::new(&test_key()).unwrap();
        let envelope = cipher.encrypt(b"").unwrap();
        assert_eq!(envelope.as_bytes().len(), CipherEnvelope::MIN_LEN);
        assert!(cipher.decrypt(&envelope).unwrap().is_empty());
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let cipher = SymmetricCipher::new(&test_key()).unwrap();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let cipher = SymmetricCipher::new(&test_key()).unwrap();
        let other = SymmetricCipher::new(&[7u8; KEY_LEN]).unwrap();
        let envelope = cipher.encrypt(b"secret").unwrap();
        assert!(matches!(
            other.decrypt(&envelope),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_key_length_validation() {
        assert!(matches!(
            SymmetricCipher::new(&[0u8; 16]),
            Err(Error::InvalidKeyLength { expected: 32, actual: 16 })
        ));
        assert!(SymmetricCipher::new(&[]).is_err());
    }

    #[test]
    fn test_short_envelope_is_malformed() {
        let short = encode_base64(&[0u8; CipherEnvelope::MIN_LEN - 1]);
        assert!(matches!(
            CipherEnvelope::from_base64(&short),
            Err(Error::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            decode_base64("not base64!!"),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_base64_encoding() {
        let data = b"hello world";
        let b64 = encode_base64(data);
        let decoded = decode_base64(&b64).unwrap();
        assert_eq!(decoded, data);
    }

    proptest! {
        #[test]
        fn prop_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..512),
                           key in proptest::array::uniform32(any::<u8>())) {
            let cipher = SymmetricCipher::new(&key).unwrap();
            let envelope = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&envelope).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_flipped_byte_fails_authentication(
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let cipher = SymmetricCipher::new(&test_key()).unwrap();
            let mut bytes = cipher.encrypt(&plaintext).unwrap().into_bytes();
            let i = index.index(bytes.len());
            bytes[i] ^= mask;

            let tampered = CipherEnvelope::from_bytes(bytes).unwrap();
            prop_assert!(matches!(cipher.decrypt(&tampered), Err(Error::AuthenticationFailure)));
        }

        #[test]
        fn prop_wrong_key_length_is_rejected(len in 0usize..128) {
            prop_assume!(len != KEY_LEN);
            let key = vec![0u8; len];
            let is_length_error = matches!(
                SymmetricCipher::new(&key),
                Err(Error::InvalidKeyLength { .. })
            );
            prop_assert!(is_length_error);
        }
    }
}

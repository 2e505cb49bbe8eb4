//! Cryptography for the extended password handshake.
//!
//! During login negotiation the server hands out an RSA public key and a
//! nonce. Passwords travel as `OAEP-SHA1(nonce || password)`. On demand
//! command encryption additionally wraps packet payloads in AES-256-CBC
//! with a symmetric key the client generates and sends RSA-encrypted.

use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::error::ProtocolError;

const AES_BLOCK_SIZE: usize = 16;
const SYMMETRIC_KEY_SIZE: usize = 32;

/// Encrypt `nonce || plaintext` with a PEM-encoded PKCS#1 RSA public key
/// using OAEP with SHA-1.
///
/// # Errors
///
/// Returns [`ProtocolError::Crypto`] on a malformed key or if the payload
/// exceeds the OAEP limit for the key size.
pub fn rsa_encrypt(pem_public_key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let pem = std::str::from_utf8(pem_public_key)
        .map_err(|_| ProtocolError::Crypto("public key is not valid UTF-8".into()))?;
    let public_key = RsaPublicKey::from_pkcs1_pem(pem)
        .map_err(|err| ProtocolError::Crypto(format!("failed to parse public key: {err}")))?;

    let mut payload = Vec::with_capacity(nonce.len() + plaintext.len());
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(plaintext);

    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &payload)
        .map_err(|err| ProtocolError::Crypto(format!("RSA encryption failed: {err}")))
}

/// Generate a fresh 256 bit symmetric key for on demand encryption.
#[must_use]
pub fn generate_symmetric_key() -> Vec<u8> {
    let mut key = vec![0u8; SYMMETRIC_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// AES-256-CBC codec for encrypted packet payloads.
///
/// The payload is zero padded to the next full block; a message that is
/// already block aligned still gains a full padding block. The first
/// message of a stream uses a random IV which travels alongside the
/// ciphertext.
pub struct CipherChannel {
    key: Vec<u8>,
}

impl CipherChannel {
    /// Create a cipher channel from a symmetric key.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Crypto`] if the key is not 32 bytes.
    pub fn new(key: Vec<u8>) -> Result<Self, ProtocolError> {
        if key.len() != SYMMETRIC_KEY_SIZE {
            return Err(ProtocolError::Crypto(format!(
                "symmetric key is {} bytes long instead of {SYMMETRIC_KEY_SIZE}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    /// The symmetric key, for RSA wrapping during the handshake.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Encrypt a payload. Returns the ciphertext and the IV used; a fresh
    /// random IV is chosen when `iv` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Crypto`] for an IV of the wrong size.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
        let iv = match iv {
            Some(iv) if iv.len() == AES_BLOCK_SIZE => iv.to_vec(),
            Some(iv) => {
                return Err(ProtocolError::Crypto(format!(
                    "IV is {} bytes long instead of {AES_BLOCK_SIZE}",
                    iv.len()
                )));
            }
            None => {
                let mut iv = vec![0u8; AES_BLOCK_SIZE];
                OsRng.fill_bytes(&mut iv);
                iv
            }
        };

        let padding = AES_BLOCK_SIZE - plaintext.len() % AES_BLOCK_SIZE;
        let mut padded = Vec::with_capacity(plaintext.len() + padding);
        padded.extend_from_slice(plaintext);
        padded.resize(plaintext.len() + padding, 0);

        let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &iv)
            .map_err(|err| ProtocolError::Crypto(format!("error creating AES cipher: {err}")))?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<NoPadding>(&padded);

        Ok((ciphertext, iv))
    }

    /// Decrypt a payload. Zero padding is left in place; the packet length
    /// determines how much of the plaintext is meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Crypto`] for a misaligned ciphertext or an
    /// IV of the wrong size.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if iv.len() != AES_BLOCK_SIZE {
            return Err(ProtocolError::Crypto(format!(
                "IV is {} bytes long instead of {AES_BLOCK_SIZE}",
                iv.len()
            )));
        }
        if ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(ProtocolError::Crypto(format!(
                "ciphertext of {} bytes cannot be split into blocks of {AES_BLOCK_SIZE}",
                ciphertext.len()
            )));
        }

        let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(&self.key, iv)
            .map_err(|err| ProtocolError::Crypto(format!("error creating AES cipher: {err}")))?;
        decryptor
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|err| ProtocolError::Crypto(format!("AES decryption failed: {err}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_length() {
        assert_eq!(generate_symmetric_key().len(), 32);
    }

    #[test]
    fn test_cipher_round_trip() {
        let channel = CipherChannel::new(generate_symmetric_key()).unwrap();

        let plaintext = b"select @@version";
        let (ciphertext, iv) = channel.encrypt(plaintext, None).unwrap();
        assert_eq!(iv.len(), 16);
        assert_eq!(ciphertext.len() % 16, 0);
        assert!(ciphertext.len() > plaintext.len());

        let decrypted = channel.decrypt(&ciphertext, &iv).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext);
        assert!(decrypted[plaintext.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_aligned_payload_gains_padding_block() {
        let channel = CipherChannel::new(vec![7u8; 32]).unwrap();

        let plaintext = [1u8; 32];
        let (ciphertext, _) = channel.encrypt(&plaintext, None).unwrap();
        assert_eq!(ciphertext.len(), 48);
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(CipherChannel::new(vec![0u8; 16]).is_err());
    }

    #[test]
    fn test_rsa_encrypt_with_generated_key() {
        use rsa::RsaPrivateKey;
        use rsa::pkcs1::EncodeRsaPublicKey;

        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = private
            .to_public_key()
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .unwrap();

        let nonce = [0xaa; 16];
        let encrypted = rsa_encrypt(pem.as_bytes(), &nonce, b"secret").unwrap();
        assert_eq!(encrypted.len(), 256);

        let decrypted = private.decrypt(Oaep::new::<Sha1>(), &encrypted).unwrap();
        assert_eq!(&decrypted[..16], &nonce);
        assert_eq!(&decrypted[16..], b"secret");
    }
}

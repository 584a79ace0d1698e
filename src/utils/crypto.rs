//! Symmetric payload encryption for broadcast peers.
//!
//! Keys are configured out of band as strings (one per team) and stretched to
//! 256 bits with SHA-256. Every sealed payload carries its own random nonce:
//!
//! ```text
//! [Nonce(12 or 24)] [Ciphertext + Tag(N + 16)]
//! ```

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{ProtocolError, Result};

/// Ciphers a peer can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    ChaCha20Poly1305,
    XChaCha20Poly1305,
}

impl Cipher {
    /// Look up a cipher by its configuration name. Empty selects the default.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "xchacha20-poly1305" | "xchacha20poly1305" => Some(Cipher::XChaCha20Poly1305),
            "chacha20-poly1305" | "chacha20poly1305" => Some(Cipher::ChaCha20Poly1305),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cipher::ChaCha20Poly1305 => "chacha20-poly1305",
            Cipher::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }

    pub fn nonce_len(self) -> usize {
        match self {
            Cipher::ChaCha20Poly1305 => 12,
            Cipher::XChaCha20Poly1305 => 24,
        }
    }
}

enum Aead256 {
    ChaCha(ChaCha20Poly1305),
    XChaCha(XChaCha20Poly1305),
}

/// Installed cipher and key for one peer
pub struct CryptoContext {
    cipher: Cipher,
    aead: Aead256,
}

impl std::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoContext")
            .field("cipher", &self.cipher.name())
            .finish_non_exhaustive()
    }
}

impl CryptoContext {
    /// Build a context from a key string and cipher name
    pub fn new(key: &str, cipher_name: &str) -> Result<Self> {
        let cipher = Cipher::from_name(cipher_name)
            .ok_or_else(|| ProtocolError::UnsupportedCipher(cipher_name.to_string()))?;

        let mut key_bytes: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        let aead = match cipher {
            Cipher::ChaCha20Poly1305 => {
                Aead256::ChaCha(ChaCha20Poly1305::new(&key_bytes.into()))
            }
            Cipher::XChaCha20Poly1305 => {
                Aead256::XChaCha(XChaCha20Poly1305::new(&key_bytes.into()))
            }
        };
        key_bytes.zeroize();

        Ok(Self { cipher, aead })
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Encrypt a payload; output is nonce followed by ciphertext
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = generate_nonce(self.cipher.nonce_len())?;
        let ciphertext = match &self.aead {
            Aead256::ChaCha(c) => c.encrypt(Nonce::from_slice(&nonce), plaintext),
            Aead256::XChaCha(c) => c.encrypt(XNonce::from_slice(&nonce), plaintext),
        }
        .map_err(|_| ProtocolError::EncryptionFailure)?;

        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend(ciphertext);
        nonce.zeroize();
        Ok(out)
    }

    /// Decrypt a payload produced by [`CryptoContext::seal`]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let nonce_len = self.cipher.nonce_len();
        if sealed.len() < nonce_len {
            return Err(ProtocolError::DecryptionFailure);
        }
        let (nonce, ciphertext) = sealed.split_at(nonce_len);
        match &self.aead {
            Aead256::ChaCha(c) => c.decrypt(Nonce::from_slice(nonce), ciphertext),
            Aead256::XChaCha(c) => c.decrypt(XNonce::from_slice(nonce), ciphertext),
        }
        .map_err(|_| ProtocolError::DecryptionFailure)
    }
}

/// Random nonce of the given length from the OS RNG
pub fn generate_nonce(len: usize) -> Result<Vec<u8>> {
    let mut nonce = vec![0u8; len];
    getrandom::fill(&mut nonce)
        .map_err(|e| ProtocolError::Custom(format!("Nonce generation failed: {e}")))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_seal_open_both_ciphers() {
        for name in ["xchacha20-poly1305", "chacha20-poly1305"] {
            let ctx = CryptoContext::new("randomkey", name).unwrap();
            let sealed = ctx.seal(b"game state").unwrap();
            assert_eq!(sealed.len(), ctx.cipher().nonce_len() + 10 + 16);
            assert_eq!(ctx.open(&sealed).unwrap(), b"game state");
        }
    }

    #[test]
    fn test_nonce_differs_per_message() {
        let ctx = CryptoContext::new("k", "").unwrap();
        assert_ne!(ctx.seal(b"x").unwrap(), ctx.seal(b"x").unwrap());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let a = CryptoContext::new("team-a", DEFAULT).unwrap();
        let b = CryptoContext::new("team-b", DEFAULT).unwrap();
        let sealed = a.seal(b"orders").unwrap();
        assert!(matches!(b.open(&sealed), Err(ProtocolError::DecryptionFailure)));
        assert!(matches!(a.open(&sealed[..5]), Err(ProtocolError::DecryptionFailure)));
    }

    #[test]
    fn test_unknown_cipher() {
        assert!(matches!(
            CryptoContext::new("k", "rot13"),
            Err(ProtocolError::UnsupportedCipher(_))
        ));
    }

    const DEFAULT: &str = crate::config::DEFAULT_CIPHER;
}

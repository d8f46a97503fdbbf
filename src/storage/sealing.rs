// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token sealing for the credential database.
//!
//! Provider access tokens are the most sensitive data the gateway holds: a
//! leaked token grants read access to a user's brokerage account. Tokens are
//! therefore never written in clear. Each token is sealed with AES-256-GCM
//! under the key from `CREDENTIAL_ENCRYPTION_KEY`, using a fresh random nonce
//! and the owning `(user_id, item_id)` pair as additional authenticated data,
//! so a sealed value copied onto another row fails to open.
//!
//! ## Encoding
//!
//! ```text
//! base64( nonce[12] || ciphertext || tag[16] )
//! ```

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SealingError {
    #[error("sealing key must be {KEY_LEN} bytes of base64, got {0} bytes")]
    InvalidKeyLength(usize),

    #[error("sealing key is not valid base64")]
    InvalidKeyEncoding,

    #[error("sealed value is malformed")]
    Malformed,

    #[error("sealed value failed authentication")]
    Authentication,

    #[error("random nonce generation failed")]
    Randomness,
}

/// AES-256-GCM sealer bound to one key.
pub struct TokenSealer {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSealer").finish_non_exhaustive()
    }
}

impl TokenSealer {
    /// Build a sealer from the base64 key in configuration.
    pub fn from_base64(encoded: &str) -> Result<Self, SealingError> {
        let bytes = Base64::decode_vec(encoded.trim()).map_err(|_| SealingError::InvalidKeyEncoding)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SealingError> {
        if bytes.len() != KEY_LEN {
            return Err(SealingError::InvalidKeyLength(bytes.len()));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| SealingError::InvalidKeyLength(bytes.len()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Seal `plaintext`, binding it to `context`.
    pub fn seal(&self, plaintext: &str, context: &[u8]) -> Result<String, SealingError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SealingError::Randomness)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(context),
                &mut in_out,
            )
            .map_err(|_| SealingError::Authentication)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(Base64::encode_string(&sealed))
    }

    /// Open a value produced by [`TokenSealer::seal`] with the same `context`.
    pub fn open(&self, sealed: &str, context: &[u8]) -> Result<String, SealingError> {
        let raw = Base64::decode_vec(sealed).map_err(|_| SealingError::Malformed)?;
        if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(SealingError::Malformed);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| SealingError::Malformed)?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(context), &mut in_out)
            .map_err(|_| SealingError::Authentication)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| SealingError::Malformed)
    }
}

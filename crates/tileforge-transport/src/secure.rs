//! The `SEC1|` authenticated-encryption envelope.
//!
//! Wire format:
//!
//! ```text
//! "SEC1|" + base64( version(1) ‖ nonce(16) ‖ ciphertext(N) ‖ mac(32) )
//! ```
//!
//! Two keys are derived from the 256-bit shared secret:
//!
//! ```text
//! enc_key  = SHA-256(0x01 ‖ shared)
//! auth_key = SHA-256(0x02 ‖ shared)
//! ```
//!
//! The cipher is a counter-mode stream built from HMAC: block `i` of the
//! keystream is `HMAC(enc_key, nonce ‖ be_u64(i))`, XORed over the
//! plaintext and truncated to its length. The MAC is
//! `HMAC(auth_key, version ‖ nonce ‖ ciphertext)` and is always verified
//! (in constant time) before anything is decrypted.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::ChannelError;

type HmacSha256 = Hmac<Sha256>;

/// Text prefix every envelope starts with.
pub const ENVELOPE_PREFIX: &str = "SEC1|";
/// The only envelope version this server accepts.
pub const ENVELOPE_VERSION: u8 = 1;
/// Shared key length in bytes.
pub const KEY_LEN: usize = 32;
/// Per-message nonce length in bytes.
pub const NONCE_LEN: usize = 16;
/// HMAC-SHA-256 tag length in bytes.
pub const MAC_LEN: usize = 32;
/// Smallest decodable frame: version + nonce + empty ciphertext + MAC.
pub const MIN_ENVELOPE_LEN: usize = 1 + NONCE_LEN + MAC_LEN;

const KEYSTREAM_BLOCK_LEN: usize = 32;
const ENC_KEY_LABEL: u8 = 0x01;
const AUTH_KEY_LABEL: u8 = 0x02;

/// Seals and opens envelopes with keys derived from one static shared secret.
///
/// Stateless after construction, so it can live outside the server lock
/// and be shared freely.
#[derive(Clone)]
pub struct SecureChannel {
    enc_key: [u8; 32],
    auth_key: [u8; 32],
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel").finish_non_exhaustive()
    }
}

impl SecureChannel {
    /// Derives the encryption and authentication keys from `shared_key`.
    pub fn new(shared_key: &[u8; KEY_LEN]) -> Self {
        Self {
            enc_key: derive_key(ENC_KEY_LABEL, shared_key),
            auth_key: derive_key(AUTH_KEY_LABEL, shared_key),
        }
    }

    /// Builds a channel from a base64-encoded shared key.
    ///
    /// # Errors
    /// [`ChannelError::InvalidKey`] unless the key decodes to exactly
    /// [`KEY_LEN`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, ChannelError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ChannelError::InvalidKey(format!("not valid base64: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            ChannelError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self::new(&key))
    }

    /// Encrypts and authenticates `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> String {
        let nonce: [u8; NONCE_LEN] = rand::rng().random();
        self.seal_with_nonce(plaintext, &nonce)
    }

    /// Same as [`seal`](Self::seal) with a caller-chosen nonce.
    ///
    /// Reusing a nonce reuses keystream; only tests should call this.
    pub fn seal_with_nonce(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> String {
        let mut frame = Vec::with_capacity(MIN_ENVELOPE_LEN + plaintext.len());
        frame.push(ENVELOPE_VERSION);
        frame.extend_from_slice(nonce);
        frame.extend_from_slice(plaintext);
        self.apply_keystream(nonce, &mut frame[1 + NONCE_LEN..]);

        let tag = self.tag(&frame);
        frame.extend_from_slice(&tag);

        format!("{ENVELOPE_PREFIX}{}", STANDARD.encode(&frame))
    }

    /// Verifies and decrypts an envelope.
    ///
    /// # Errors
    /// One [`ChannelError`] per rejection reason. The MAC is checked
    /// before decryption, so a forged or corrupted envelope never yields
    /// plaintext.
    pub fn open(&self, envelope: &str) -> Result<Vec<u8>, ChannelError> {
        let encoded = envelope
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(ChannelError::MissingPrefix)?;
        let frame = STANDARD
            .decode(encoded.trim_end())
            .map_err(|_| ChannelError::BadBase64)?;

        if frame.len() < MIN_ENVELOPE_LEN {
            return Err(ChannelError::TooShort { len: frame.len() });
        }
        if frame[0] != ENVELOPE_VERSION {
            return Err(ChannelError::UnsupportedVersion(frame[0]));
        }

        let (authenticated, tag) = frame.split_at(frame.len() - MAC_LEN);
        let mut mac = self.keyed(&self.auth_key);
        mac.update(authenticated);
        mac.verify_slice(tag).map_err(|_| ChannelError::MacMismatch)?;

        let (header, ciphertext) = authenticated.split_at(1 + NONCE_LEN);
        let nonce = &header[1..];
        let mut plaintext = ciphertext.to_vec();
        self.apply_keystream(nonce, &mut plaintext);
        Ok(plaintext)
    }

    fn apply_keystream(&self, nonce: &[u8], data: &mut [u8]) {
        for (counter, block) in data.chunks_mut(KEYSTREAM_BLOCK_LEN).enumerate() {
            let mut mac = self.keyed(&self.enc_key);
            mac.update(nonce);
            mac.update(&(counter as u64).to_be_bytes());
            let pad = mac.finalize().into_bytes();
            for (byte, key) in block.iter_mut().zip(pad.iter()) {
                *byte ^= key;
            }
        }
    }

    fn tag(&self, authenticated: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = self.keyed(&self.auth_key);
        mac.update(authenticated);
        mac.finalize().into_bytes().into()
    }

    fn keyed(&self, key: &[u8; 32]) -> HmacSha256 {
        HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
    }
}

fn derive_key(label: u8, shared_key: &[u8; KEY_LEN]) -> [u8; 32] {
    Sha256::new()
        .chain_update([label])
        .chain_update(shared_key)
        .finalize()
        .into()
}

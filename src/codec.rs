//! Reversible payload encoding.
//!
//! Keeps raw payload text out of block fields. This is base64, optionally
//! XOR-folded with a single-byte key first. It is not encryption.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use thiserror::Error;

/// Displayed in place of a payload that fails to decode.
pub const DECODE_FAILED: &str = "[Decryption Failed]";

/// XOR key used by the encryption demo.
pub const DEMO_XOR_KEY: u8 = 123;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload token is not valid base64")]
    Malformed,
    #[error("decoded payload is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    xor_key: Option<u8>,
}

impl Codec {
    /// Plain base64, no XOR step.
    pub fn new() -> Self {
        Self { xor_key: None }
    }

    pub fn with_xor_key(key: u8) -> Self {
        Self { xor_key: Some(key) }
    }

    pub fn xor_key(&self) -> Option<u8> {
        self.xor_key
    }

    /// Deterministic: the same plaintext always yields the same token.
    pub fn encode(&self, plaintext: &str) -> String {
        let bytes = self.fold(plaintext.as_bytes().to_vec());
        B64.encode(bytes)
    }

    pub fn decode(&self, token: &str) -> Result<String, DecodeError> {
        let raw = B64.decode(token.as_bytes()).map_err(|_| DecodeError::Malformed)?;
        String::from_utf8(self.fold(raw)).map_err(|_| DecodeError::NotUtf8)
    }

    /// Like [`Codec::decode`] but yields [`DECODE_FAILED`] on failure.
    pub fn decode_or_sentinel(&self, token: &str) -> String {
        self.decode(token).unwrap_or_else(|_| DECODE_FAILED.to_string())
    }

    // XOR is its own inverse, so this serves both directions.
    fn fold(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        if let Some(key) = self.xor_key {
            for b in bytes.iter_mut() {
                *b ^= key;
            }
        }
        bytes
    }
}

//! Signatures returned by the signing instructions.
//!
//! The device answers `SignTx` and `PersonalSign` with a fixed-width "vrs"
//! encoding rather than DER:
//!
//! ```text
//! | v  | r   | s   |
//! |----|-----|-----|
//! | 1B | 32B | 32B |
//! ```
//!
//! - `v`: recovery parity of the ephemeral point
//! - `r`, `s`: the raw ECDSA scalars, big-endian
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::SignatureResult;
//!
//! let sig = SignatureResult::new(1, [0x11; 32], [0x22; 32]);
//! let bytes = sig.to_bytes();
//! assert_eq!(bytes[0], 1);
//! assert_eq!(bytes.len(), SignatureResult::BYTE_LEN);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A secp256k1 ECDSA signature in `v || r || s` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    /// The recovery parameter.
    v: u8,

    /// The R component of the signature (32 bytes).
    #[serde(with = "hex_bytes")]
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    #[serde(with = "hex_bytes")]
    s: [u8; 32],
}

/// Serde helper for hex encoding/decoding 32-byte arrays.
mod hex_bytes {
    use hex::{decode, encode};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", encode(bytes)))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = decode(s).map_err(de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| de::Error::custom("expected 32 bytes"))
    }
}

impl SignatureResult {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Creates a new signature from raw components.
    #[must_use]
    pub const fn new(v: u8, r: [u8; 32], s: [u8; 32]) -> Self {
        Self { v, r, s }
    }

    /// Creates a signature from a 65-byte `v || r || s` slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the slice is not exactly
    /// 65 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((&v, rest)) = bytes.split_first() else {
            return Err(Error::InvalidSignature("empty signature".to_string()));
        };
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let r: [u8; 32] = rest[0..32]
            .try_into()
            .map_err(|_| Error::InvalidSignature("invalid r component".to_string()))?;
        let s: [u8; 32] = rest[32..64]
            .try_into()
            .map_err(|_| Error::InvalidSignature("invalid s component".to_string()))?;

        Ok(Self::new(v, r, s))
    }

    /// Serializes the signature to its 65-byte `v || r || s` form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0] = self.v;
        bytes[1..33].copy_from_slice(&self.r);
        bytes[33..65].copy_from_slice(&self.s);
        bytes
    }

    /// Returns the raw 64-byte `r || s` encoding used for verification.
    #[must_use]
    pub fn rs_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Returns the recovery parameter (v).
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Encodes the signature as a hex string with `0x` prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use cfx_ledger_client::SignatureResult;
    ///
    /// let sig = SignatureResult::new(0, [0u8; 32], [0u8; 32]);
    /// let hex = sig.to_hex();
    /// assert!(hex.starts_with("0x"));
    /// assert_eq!(hex.len(), 132); // "0x" + 130 hex chars
    /// ```
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses a signature from a hex string, optionally prefixed with `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid, or
    /// [`Error::InvalidSignature`] if the decoded bytes are not 65 bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for SignatureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

//! Typed decoding of response bodies.
//!
//! Each instruction has a hand-defined body layout with no self-description.
//! Fields are read left to right with an explicit running offset; every
//! variable-length field is preceded by a one-byte length. Once all fields are
//! read the consumed length must equal the body length exactly, otherwise the
//! host and device are out of sync and [`Error::MalformedResponse`] is
//! returned.
//!
//! # Layouts
//!
//! ```text
//! GetVersion        major(1) minor(1) patch(1)
//! GetAppName        name(*)                                    ASCII
//! GetAppAndVersion  format(1) name_len(1) name version_len(1) version
//! GetPublicKey      pk_len(1) pk chain_code_len(1) chain_code
//! SignTx/Personal   v(1) r(32) s(32)
//! ```
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::ledger::response::AppAndVersionResult;
//!
//! let body = [0x01, 0x07, b'C', b'o', b'n', b'f', b'l', b'u', b'x', 0x05, b'1', b'.', b'0', b'.', b'3'];
//! let result = AppAndVersionResult::unpack(&body).unwrap();
//! assert_eq!(result.app_name, "Conflux");
//! assert_eq!(result.version, "1.0.3");
//!
//! // A trailing byte is a desynchronization.
//! let mut longer = body.to_vec();
//! longer.push(0x00);
//! assert!(AppAndVersionResult::unpack(&longer).is_err());
//! ```

use core::fmt;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Error, Result};
use crate::signature::SignatureResult;

/// A left-to-right reader over a response body.
#[derive(Debug)]
struct ResponseReader<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> ResponseReader<'a> {
    const fn new(body: &'a [u8]) -> Self {
        Self { body, offset: 0 }
    }

    fn read_u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.read_bytes(1, field)?[0])
    }

    fn read_bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let end = self.offset + len;
        let bytes = self.body.get(self.offset..end).ok_or_else(|| {
            Error::MalformedResponse(format!(
                "{field} needs {len} bytes at offset {}, body has {}",
                self.offset,
                self.body.len()
            ))
        })?;
        self.offset = end;
        Ok(bytes)
    }

    fn read_prefixed(&mut self, field: &str) -> Result<&'a [u8]> {
        let len = self.read_u8(field)?;
        self.read_bytes(usize::from(len), field)
    }

    fn read_ascii(&mut self, field: &str) -> Result<String> {
        let bytes = self.read_prefixed(field)?;
        ascii(bytes, field)
    }

    /// Fails unless the whole body has been consumed.
    fn finish(self) -> Result<()> {
        if self.offset == self.body.len() {
            Ok(())
        } else {
            Err(Error::MalformedResponse(format!(
                "consumed {} of {} bytes",
                self.offset,
                self.body.len()
            )))
        }
    }
}

fn ascii(bytes: &[u8], field: &str) -> Result<String> {
    if !bytes.is_ascii() {
        return Err(Error::MalformedResponse(format!("{field} is not ASCII")));
    }
    Ok(bytes.iter().copied().map(char::from).collect())
}

/// Application version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResult {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl VersionResult {
    /// Body length.
    pub const BYTE_LEN: usize = 3;

    /// Decodes a `GetVersion` body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] unless the body is exactly 3 bytes.
    pub fn unpack(body: &[u8]) -> Result<Self> {
        let mut reader = ResponseReader::new(body);
        let major = reader.read_u8("major")?;
        let minor = reader.read_u8("minor")?;
        let patch = reader.read_u8("patch")?;
        reader.finish()?;

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for VersionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Decodes a `GetAppName` body.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] if the name is not ASCII.
pub fn unpack_app_name(body: &[u8]) -> Result<String> {
    ascii(body, "app name")
}

/// Running application name and version, as reported by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAndVersionResult {
    /// Response format identifier.
    pub format_id: u8,
    /// Application name.
    pub app_name: String,
    /// Application version string.
    pub version: String,
}

impl AppAndVersionResult {
    /// Decodes a `GetAppAndVersion` body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if a length prefix overruns the
    /// body, a string is not ASCII, or bytes are left over.
    pub fn unpack(body: &[u8]) -> Result<Self> {
        let mut reader = ResponseReader::new(body);
        let format_id = reader.read_u8("format id")?;
        let app_name = reader.read_ascii("app name")?;
        let version = reader.read_ascii("version")?;
        reader.finish()?;

        Ok(Self {
            format_id,
            app_name,
            version,
        })
    }
}

/// Public key and chain code for a derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResult {
    /// SEC1-encoded secp256k1 public key (normally 65 bytes, uncompressed).
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// BIP32 chain code (normally 32 bytes).
    #[serde(with = "hex::serde")]
    pub chain_code: Vec<u8>,
}

impl PublicKeyResult {
    /// Decodes a `GetPublicKey` body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] unless
    /// `1 + len(public_key) + 1 + len(chain_code) == len(body)`.
    pub fn unpack(body: &[u8]) -> Result<Self> {
        let mut reader = ResponseReader::new(body);
        let public_key = reader.read_prefixed("public key")?.to_vec();
        let chain_code = reader.read_prefixed("chain code")?.to_vec();
        reader.finish()?;

        Ok(Self {
            public_key,
            chain_code,
        })
    }

    /// Parses the public key as a secp256k1 verifying key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the bytes are not a valid
    /// SEC1 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }

    /// Derives the hex account address (`0x1...`) for this key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the key cannot be parsed.
    pub fn address(&self) -> Result<String> {
        let address = crypto::account_address(&self.verifying_key()?);
        Ok(format!("0x{}", hex::encode(address)))
    }
}

/// Decodes a signing body in `v || r || s` form.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] unless the body is exactly
/// [`SignatureResult::BYTE_LEN`] bytes.
pub fn unpack_signature(body: &[u8]) -> Result<SignatureResult> {
    let mut reader = ResponseReader::new(body);
    let v = reader.read_u8("v")?;
    let r = reader.read_bytes(32, "r")?;
    let s = reader.read_bytes(32, "s")?;
    reader.finish()?;

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(r);
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(s);

    Ok(SignatureResult::new(v, r_bytes, s_bytes))
}

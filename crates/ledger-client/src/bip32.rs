//! BIP32 derivation paths.
//!
//! A [`Bip32Path`] is an ordered list of 32-bit child indices. Hardened
//! children carry the top bit (`0x8000_0000`).
//!
//! # Wire Format
//!
//! ```text
//! | count | element_0 | ... | element_{count-1} |
//! |-------|-----------|-----|-------------------|
//! | 1B    | 4B BE     |     | 4B BE             |
//! ```
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::Bip32Path;
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse().unwrap();
//! assert_eq!(path.len(), 5);
//! assert!(path.is_hardened(0));
//! assert!(!path.is_hardened(4));
//!
//! let bytes = path.to_bytes().unwrap();
//! assert_eq!(bytes[0], 5);
//! assert_eq!(&bytes[1..5], &[0x80, 0x00, 0x01, 0xF7]);
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{Error, Result};

/// The hardened-key bit flag (2^31).
pub const HARDENED: u32 = 0x8000_0000;

/// Maximum number of path elements the device accepts.
pub const MAX_DEPTH: usize = 10;

/// A BIP32 derivation path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bip32Path {
    /// Child indices, hardened bit included.
    elements: Vec<u32>,
}

impl Bip32Path {
    /// Creates a path from raw child indices (hardened bit included).
    #[must_use]
    pub const fn new(elements: Vec<u32>) -> Self {
        Self { elements }
    }

    /// Returns the raw child indices.
    #[must_use]
    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    /// Returns the number of path elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Checks if this is the master path (`m`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Checks if the element at `index` is hardened.
    ///
    /// Out-of-range indices report `false`.
    #[must_use]
    pub fn is_hardened(&self, index: usize) -> bool {
        self.elements
            .get(index)
            .is_some_and(|element| element & HARDENED != 0)
    }

    /// Serializes the path into its APDU payload form.
    ///
    /// # Returns
    ///
    /// One count byte followed by each element as a 4-byte big-endian integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the path has more than [`MAX_DEPTH`]
    /// elements.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.elements.len() > MAX_DEPTH {
            return Err(Error::Encoding(format!(
                "BIP32 path has {} elements, maximum is {MAX_DEPTH}",
                self.elements.len()
            )));
        }

        let mut bytes = Vec::with_capacity(1 + 4 * self.elements.len());
        bytes.push(self.elements.len() as u8);
        for element in &self.elements {
            bytes.extend_from_slice(&element.to_be_bytes());
        }
        Ok(bytes)
    }

    /// Decodes a path from its APDU payload form.
    ///
    /// The whole slice must be consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the slice is empty, the count exceeds
    /// [`MAX_DEPTH`], or the slice length disagrees with the count.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&count, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::Encoding("empty BIP32 path payload".to_string()))?;
        let count = usize::from(count);

        if count > MAX_DEPTH {
            return Err(Error::Encoding(format!(
                "BIP32 path has {count} elements, maximum is {MAX_DEPTH}"
            )));
        }
        if rest.len() != count * 4 {
            return Err(Error::Encoding(format!(
                "BIP32 path declares {count} elements but carries {} bytes",
                rest.len()
            )));
        }

        let elements = rest
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { elements })
    }
}

impl FromStr for Bip32Path {
    type Err = Error;

    /// Parses `m/44'/503'/0'/0/0` style paths.
    ///
    /// The `m/` prefix is optional. A trailing `'`, `h` or `H` marks a
    /// hardened element.
    fn from_str(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPath("path is empty".to_string()));
        }

        let body = if trimmed == "m" {
            return Ok(Self::default());
        } else if let Some(rest) = trimmed.strip_prefix("m/") {
            rest
        } else {
            trimmed
        };

        let mut elements = Vec::new();
        for segment in body.split('/') {
            if segment.is_empty() {
                return Err(Error::InvalidPath(format!("empty segment in '{path}'")));
            }

            let hardened = segment.ends_with(['\'', 'h', 'H']);
            let digits = if hardened {
                &segment[..segment.len() - 1]
            } else {
                segment
            };

            if !digits.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(Error::InvalidPath(format!(
                    "invalid segment '{segment}' in '{path}'"
                )));
            }
            let value = digits.parse::<u32>().map_err(|_| {
                Error::InvalidPath(format!("invalid segment '{segment}' in '{path}'"))
            })?;
            if value >= HARDENED {
                return Err(Error::InvalidPath(format!(
                    "segment '{segment}' is out of range (must be < 2^31)"
                )));
            }

            elements.push(if hardened { value | HARDENED } else { value });
        }

        Ok(Self { elements })
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for element in &self.elements {
            if element & HARDENED == 0 {
                write!(f, "/{element}")?;
            } else {
                write!(f, "/{}'", element & !HARDENED)?;
            }
        }
        Ok(())
    }
}

impl Serialize for Bip32Path {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bip32Path {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

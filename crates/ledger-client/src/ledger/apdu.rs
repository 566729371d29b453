//! APDU (Application Protocol Data Unit) frame and response types.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data |
//! |-----|-----|----|----|----|------|
//! | 1B  | 1B  | 1B | 1B | 1B | Lc B |
//! ```
//!
//! Only short frames are used: the payload never exceeds 255 bytes. Longer
//! logical payloads are split by the [command builder](super::command).
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! # Success Predicate
//!
//! A response is successful when `status_word & 0x9000 != 0`. This is a mask
//! test, not an equality check: `0x9100` or `0xB001` also count as success.
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::ledger::{Apdu, ApduResponse, Instruction};
//!
//! let apdu = Apdu::new(Instruction::GetVersion, 0x00, 0x00, vec![]).unwrap();
//! assert_eq!(apdu.to_bytes(), vec![0xE0, 0x01, 0x00, 0x00, 0x00]);
//!
//! let response = ApduResponse::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
//! assert!(response.is_success());
//! assert_eq!(response.data(), &[0x01, 0x02, 0x03]);
//! ```

use tracing::debug;

use super::instruction::Instruction;
use super::status::SW_DENY;
use crate::error::{Error, Result};

/// An APDU command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// The instruction, which fixes CLA and INS.
    instruction: Instruction,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_DATA: usize = 255;

    /// Creates a new APDU frame.
    ///
    /// # Arguments
    ///
    /// * `instruction` - The command, which fixes the CLA and INS bytes
    /// * `p1` - Parameter 1
    /// * `p2` - Parameter 2
    /// * `data` - Command data
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if `data` is longer than [`Apdu::MAX_DATA`].
    pub fn new(instruction: Instruction, p1: u8, p2: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > Self::MAX_DATA {
            return Err(Error::Encoding(format!(
                "{instruction} frame payload is {} bytes, maximum is {}",
                data.len(),
                Self::MAX_DATA
            )));
        }

        Ok(Self {
            instruction,
            p1,
            p2,
            data,
        })
    }

    /// Creates a frame with no payload.
    #[must_use]
    pub const fn without_data(instruction: Instruction, p1: u8, p2: u8) -> Self {
        Self {
            instruction,
            p1,
            p2,
            data: Vec::new(),
        }
    }

    /// Returns the instruction.
    #[must_use]
    pub const fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.instruction.cla()
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.instruction.ins()
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the frame to bytes.
    ///
    /// The `Lc` byte is always present, even for an empty payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());

        bytes.push(self.cla());
        bytes.push(self.ins());
        bytes.push(self.p1);
        bytes.push(self.p2);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);

        bytes
    }

    /// Parses a serialized frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the header is truncated, the `Lc` byte
    /// disagrees with the payload length, or the CLA/INS pair is unknown.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let [cla, ins, p1, p2, lc, data @ ..] = bytes else {
            return Err(Error::Encoding(format!(
                "APDU frame is {} bytes, header needs 5",
                bytes.len()
            )));
        };

        if usize::from(*lc) != data.len() {
            return Err(Error::Encoding(format!(
                "APDU Lc is {lc} but payload is {} bytes",
                data.len()
            )));
        }

        let instruction = Instruction::from_header(*cla, *ins).ok_or_else(|| {
            Error::Encoding(format!("unknown CLA/INS pair {cla:#04x}/{ins:#04x}"))
        })?;

        Self::new(instruction, *p1, *p2, data.to_vec())
    }
}

/// An APDU response from the device.
///
/// Contains the response body and the status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word.
    status_word: u16,
}

impl ApduResponse {
    /// Mask applied to the status word by [`is_success`](Self::is_success).
    pub const SUCCESS_MASK: u16 = 0x9000;

    /// Creates a response from its body and status word.
    #[must_use]
    pub const fn new(data: Vec<u8>, status_word: u16) -> Self {
        Self { data, status_word }
    }

    /// Creates a response from raw bytes (`data || SW1 || SW2`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if fewer than 2 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let [data @ .., sw1, sw2] = bytes else {
            return Err(Error::MalformedResponse(
                "response shorter than a status word".to_string(),
            ));
        };

        Ok(Self::new(data.to_vec(), u16::from_be_bytes([*sw1, *sw2])))
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(&self) -> u8 {
        (self.status_word >> 8) as u8
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.status_word as u8
    }

    /// Returns the full status word.
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        self.status_word
    }

    /// Checks if the response indicates success (`SW & 0x9000 != 0`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        is_success(self.status_word)
    }

    /// Checks the status word and returns an error if not successful.
    ///
    /// # Errors
    ///
    /// Returns the error produced by [`to_error`](Self::to_error).
    pub fn check(&self, instruction: Instruction) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.to_error(instruction))
        }
    }

    /// Checks the status word and returns the body on success.
    ///
    /// # Errors
    ///
    /// Returns the error produced by [`to_error`](Self::to_error).
    pub fn into_result(self, instruction: Instruction) -> Result<Vec<u8>> {
        self.check(instruction)?;
        Ok(self.data)
    }

    /// Converts the status word to a typed error tagged with `instruction`.
    #[must_use]
    pub fn to_error(&self, instruction: Instruction) -> Error {
        debug!(
            %instruction,
            "device returned failure status {:#06x}", self.status_word
        );
        map_status_word(self.status_word, instruction)
    }
}

/// The success predicate applied to every status word.
#[must_use]
pub const fn is_success(status_word: u16) -> bool {
    status_word & ApduResponse::SUCCESS_MASK != 0
}

/// Maps a non-success status word to an [`Error`].
///
/// The user-rejection code becomes [`Error::Denied`]; every other code is
/// surfaced verbatim as [`Error::Device`].
#[must_use]
pub const fn map_status_word(status_word: u16, instruction: Instruction) -> Error {
    match status_word {
        SW_DENY => Error::Denied { instruction },
        code => Error::Device { code, instruction },
    }
}

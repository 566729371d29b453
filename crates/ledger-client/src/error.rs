//! Error types for the Conflux Ledger client.
//!
//! This module provides the error type [`enum@Error`] covering every failure
//! mode of a host/device exchange: building frames, talking to the transport,
//! the device refusing a command, and the device answering with a body that
//! does not match the expected layout.
//!
//! # Error Categories
//!
//! - **Encoding errors**: a command could not be framed (path too deep, payload
//!   too large for the chunk counter)
//! - **Device errors**: the device answered with a non-success status word
//! - **Response errors**: a successful status word carried a malformed body
//! - **Transport errors**: the byte channel itself failed
//!
//! No layer of this crate retries. Every error reaches the caller.
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::Error;
//! use cfx_ledger_client::ledger::Instruction;
//!
//! let err = Error::Denied { instruction: Instruction::SignTx };
//! assert!(err.is_denied());
//! assert_eq!(err.status_word(), Some(0x6985));
//! ```

use core::result::Result as CoreResult;
use std::io::Error as IoError;

use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::ledger::Instruction;
use crate::ledger::status::SW_DENY;

/// The main error type for the Conflux Ledger client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Framing Errors
    // =========================================================================
    /// A command could not be encoded into APDU frames.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// A BIP32 path string could not be parsed.
    #[error("invalid BIP32 path: {0}")]
    InvalidPath(String),

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// The device answered with a non-success status word.
    #[error("{instruction} failed with status word {code:#06x}")]
    Device {
        /// The raw status word.
        code: u16,
        /// The instruction that produced it.
        instruction: Instruction,
    },

    /// The user rejected the request on the device.
    #[error("{instruction} denied by user")]
    Denied {
        /// The instruction that was rejected.
        instruction: Instruction,
    },

    /// The device answered with a successful status word but the body does
    /// not match the expected layout.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // =========================================================================
    // Channel Errors
    // =========================================================================
    /// A command was issued while an exchange awaiting confirmation is
    /// still outstanding.
    #[error("an exchange for {0} is still awaiting confirmation")]
    ExchangePending(Instruction),

    /// A pending exchange was handed to a channel that did not start it, or
    /// that has already resolved it.
    #[error("pending exchange does not belong to this channel")]
    UnknownExchange,

    /// A transport failure left the channel unable to tell which answer
    /// belongs to which command. The channel refuses every further command.
    #[error("channel desynchronized after a transport failure")]
    Desynchronized,

    /// The underlying byte channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to connect to the device or emulator.
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    // =========================================================================
    // Cryptographic Errors
    // =========================================================================
    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is invalid or malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns the status word carried by a device error, if any.
    #[must_use]
    pub const fn status_word(&self) -> Option<u16> {
        match self {
            Self::Device { code, .. } => Some(*code),
            Self::Denied { .. } => Some(SW_DENY),
            _ => None,
        }
    }

    /// Returns the instruction a device error originated from, if any.
    #[must_use]
    pub const fn instruction(&self) -> Option<Instruction> {
        match self {
            Self::Device { instruction, .. } | Self::Denied { instruction } => Some(*instruction),
            _ => None,
        }
    }

    /// Checks if the user rejected the request on the device.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Error::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Error::Transport(err.to_string())
    }
}

/// A specialized [`Result`] type for Conflux Ledger client operations.
pub type Result<T> = CoreResult<T, Error>;

#[cfg(test)]
mod tests {
    use serde_json::{Value, from_str};

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Device {
            code: 0x6D00,
            instruction: Instruction::GetPublicKey,
        };
        assert_eq!(
            err.to_string(),
            "GetPublicKey failed with status word 0x6d00"
        );

        let err = Error::Denied {
            instruction: Instruction::PersonalSign,
        };
        assert_eq!(err.to_string(), "PersonalSign denied by user");

        let err = Error::MalformedResponse("trailing bytes".to_string());
        assert_eq!(err.to_string(), "malformed response: trailing bytes");

        assert_eq!(
            Error::Desynchronized.to_string(),
            "channel desynchronized after a transport failure"
        );
    }

    #[test]
    fn device_error_accessors() {
        let err = Error::Device {
            code: 0xB005,
            instruction: Instruction::SignTx,
        };
        assert_eq!(err.status_word(), Some(0xB005));
        assert_eq!(err.instruction(), Some(Instruction::SignTx));
        assert!(!err.is_denied());

        let err = Error::Encoding("path too deep".to_string());
        assert_eq!(err.status_word(), None);
        assert_eq!(err.instruction(), None);
    }

    #[test]
    fn error_is_non_exhaustive() {
        let err = Error::UnknownExchange;
        match err {
            Error::UnknownExchange => {}
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn from_hex_error() {
        let hex_err = FromHexError::InvalidHexCharacter { c: 'g', index: 0 };
        let err: Error = hex_err.into();
        assert!(matches!(err, Error::HexDecodeFailed(_)));
    }

    #[test]
    fn from_json_error() {
        let json_err = from_str::<Value>("not valid json{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_io_error() {
        let io_err = IoError::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transport(_)));
    }
}

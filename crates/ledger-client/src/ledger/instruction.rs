//! Instruction definitions.
//!
//! Every command the client sends is identified by an [`Instruction`], which
//! fixes the class (`CLA`) and instruction (`INS`) bytes of the APDU header.
//!
//! # Instruction Overview
//!
//! | Instruction        | CLA  | INS  | Confirmation |
//! |--------------------|------|------|--------------|
//! | `GetVersion`       | 0xE0 | 0x01 | no           |
//! | `GetPublicKey`     | 0xE0 | 0x02 | optional     |
//! | `SignTx`           | 0xE0 | 0x03 | yes          |
//! | `PersonalSign`     | 0xE0 | 0x04 | yes          |
//! | `GetAppName`       | 0xE0 | 0x05 | no           |
//! | `GetAppAndVersion` | 0xB0 | 0x01 | no           |
//!
//! `GetAppAndVersion` is answered by the device dashboard rather than the
//! application, hence its distinct class byte.
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::ledger::Instruction;
//!
//! assert_eq!(Instruction::SignTx.ins(), 0x03);
//! assert_eq!(Instruction::SignTx.cla(), 0xE0);
//! assert!(Instruction::SignTx.is_chunked());
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Class byte of the Conflux application.
pub const CLA_APP: u8 = 0xE0;

/// Class byte of the device dashboard.
pub const CLA_DASHBOARD: u8 = 0xB0;

/// A command understood by the Conflux application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// Application version as three raw bytes.
    GetVersion,

    /// Application name as ASCII.
    GetAppName,

    /// Name and version of the running application, from the dashboard.
    GetAppAndVersion,

    /// Public key and chain code for a BIP32 path.
    GetPublicKey,

    /// Sign an opaque serialized transaction.
    SignTx,

    /// Sign a prefixed personal message.
    PersonalSign,
}

impl Instruction {
    /// Returns the class byte sent with this instruction.
    #[must_use]
    pub const fn cla(self) -> u8 {
        match self {
            Self::GetAppAndVersion => CLA_DASHBOARD,
            _ => CLA_APP,
        }
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(self) -> u8 {
        match self {
            Self::GetVersion | Self::GetAppAndVersion => 0x01,
            Self::GetPublicKey => 0x02,
            Self::SignTx => 0x03,
            Self::PersonalSign => 0x04,
            Self::GetAppName => 0x05,
        }
    }

    /// Checks if the payload of this instruction may span several frames.
    #[must_use]
    pub const fn is_chunked(self) -> bool {
        matches!(self, Self::SignTx | Self::PersonalSign)
    }

    /// Looks up the instruction matching an APDU header.
    #[must_use]
    pub const fn from_header(cla: u8, ins: u8) -> Option<Self> {
        match (cla, ins) {
            (CLA_APP, 0x01) => Some(Self::GetVersion),
            (CLA_APP, 0x02) => Some(Self::GetPublicKey),
            (CLA_APP, 0x03) => Some(Self::SignTx),
            (CLA_APP, 0x04) => Some(Self::PersonalSign),
            (CLA_APP, 0x05) => Some(Self::GetAppName),
            (CLA_DASHBOARD, 0x01) => Some(Self::GetAppAndVersion),
            _ => None,
        }
    }

    /// Returns the instruction name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetVersion => "GetVersion",
            Self::GetAppName => "GetAppName",
            Self::GetAppAndVersion => "GetAppAndVersion",
            Self::GetPublicKey => "GetPublicKey",
            Self::SignTx => "SignTx",
            Self::PersonalSign => "PersonalSign",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Instruction; 6] = [
        Instruction::GetVersion,
        Instruction::GetAppName,
        Instruction::GetAppAndVersion,
        Instruction::GetPublicKey,
        Instruction::SignTx,
        Instruction::PersonalSign,
    ];

    #[test]
    fn header_lookup_matches_bytes() {
        for instruction in ALL {
            assert_eq!(
                Instruction::from_header(instruction.cla(), instruction.ins()),
                Some(instruction)
            );
        }
    }

    #[test]
    fn unknown_header() {
        assert_eq!(Instruction::from_header(CLA_APP, 0x7F), None);
        assert_eq!(Instruction::from_header(0x00, 0x01), None);
    }

    #[test]
    fn only_signing_is_chunked() {
        let chunked: Vec<_> = ALL.into_iter().filter(|i| i.is_chunked()).collect();
        assert_eq!(chunked, vec![Instruction::SignTx, Instruction::PersonalSign]);
    }

    #[test]
    fn display_uses_name() {
        assert_eq!(Instruction::GetAppAndVersion.to_string(), "GetAppAndVersion");
    }
}

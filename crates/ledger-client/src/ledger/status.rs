//! Status words returned by the Conflux application.
//!
//! The error mapper does not interpret these; they exist so call sites can
//! compare an [`Error::status_word`](crate::Error::status_word) against a
//! named constant.

/// Command accepted.
pub const SW_OK: u16 = 0x9000;

/// The user rejected the request on screen.
pub const SW_DENY: u16 = 0x6985;

/// Invalid data.
pub const SW_INVALID_DATA: u16 = 0x6A80;

/// P1 or P2 not accepted for this instruction.
pub const SW_WRONG_P1P2: u16 = 0x6A86;

/// Wrong data length.
pub const SW_WRONG_DATA_LENGTH: u16 = 0x6A87;

/// Instruction not supported.
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;

/// Class not supported.
pub const SW_CLA_NOT_SUPPORTED: u16 = 0x6E00;

/// APDU length does not match its `Lc` byte.
pub const SW_WRONG_APDU_LENGTH: u16 = 0x6E03;

/// Unexpected internal failure.
pub const SW_INTERNAL_ERROR: u16 = 0x6F01;

/// Response would not fit the output buffer.
pub const SW_WRONG_RESPONSE_LENGTH: u16 = 0xB000;

/// Transaction could not be displayed.
pub const SW_TX_DISPLAY_FAIL: u16 = 0xB001;

/// Address could not be displayed.
pub const SW_ADDR_DISPLAY_FAIL: u16 = 0xB002;

/// Amount could not be displayed.
pub const SW_AMOUNT_DISPLAY_FAIL: u16 = 0xB003;

/// Accumulated transaction exceeds the device buffer.
pub const SW_TX_WRONG_LENGTH: u16 = 0xB004;

/// Transaction could not be decoded.
pub const SW_TX_PARSING_FAIL: u16 = 0xB005;

/// Transaction hashing failed.
pub const SW_TX_HASH_FAIL: u16 = 0xB006;

/// Chunk received out of sequence.
pub const SW_BAD_STATE: u16 = 0xB007;

/// Signing failed.
pub const SW_TX_SIGN_FAIL: u16 = 0xB008;

/// Key derivation failed.
pub const SW_KEY_DERIVE_FAIL: u16 = 0xB009;

/// Application version could not be parsed.
pub const SW_VERSION_PARSING_FAIL: u16 = 0xB00A;

/// Returns a short description of a known status word.
#[must_use]
pub const fn describe(code: u16) -> Option<&'static str> {
    Some(match code {
        SW_OK => "ok",
        SW_DENY => "denied by user",
        SW_INVALID_DATA => "invalid data",
        SW_WRONG_P1P2 => "wrong P1/P2",
        SW_WRONG_DATA_LENGTH => "wrong data length",
        SW_INS_NOT_SUPPORTED => "instruction not supported",
        SW_CLA_NOT_SUPPORTED => "class not supported",
        SW_WRONG_APDU_LENGTH => "wrong APDU length",
        SW_INTERNAL_ERROR => "internal error",
        SW_WRONG_RESPONSE_LENGTH => "wrong response length",
        SW_TX_DISPLAY_FAIL => "transaction display failed",
        SW_ADDR_DISPLAY_FAIL => "address display failed",
        SW_AMOUNT_DISPLAY_FAIL => "amount display failed",
        SW_TX_WRONG_LENGTH => "transaction too long",
        SW_TX_PARSING_FAIL => "transaction parsing failed",
        SW_TX_HASH_FAIL => "transaction hashing failed",
        SW_BAD_STATE => "bad state",
        SW_TX_SIGN_FAIL => "signing failed",
        SW_KEY_DERIVE_FAIL => "key derivation failed",
        SW_VERSION_PARSING_FAIL => "version parsing failed",
        _ => return None,
    })
}

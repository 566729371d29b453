//! APDU frame construction for every [`Instruction`].
//!
//! Frames are produced here and handed straight to the
//! [`ExchangeChannel`](super::ExchangeChannel); nothing keeps them afterwards.
//!
//! # Chunking
//!
//! `SignTx` and `PersonalSign` carry `path || data`. When that payload is
//! longer than 255 bytes it is cut into consecutive frames:
//!
//! ```text
//! frame 0: P1=0x00 P2=0x80  path || data[..]     (first)
//! frame 1: P1=0x01 P2=0x80  data[..]             (continuation)
//! ...
//! frame n: P1=n    P2=0x00  data[..]             (terminal)
//! ```
//!
//! A payload that fits one frame is sent as a single terminal frame with
//! `P1=0x00 P2=0x00`.
//!
//! # Example
//!
//! ```
//! use cfx_ledger_client::Bip32Path;
//! use cfx_ledger_client::ledger::command;
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse().unwrap();
//! let frames = command::sign_tx(&path, &[0xAB; 579]).unwrap();
//!
//! let sizes: Vec<usize> = frames.iter().map(|f| f.data().len()).collect();
//! assert_eq!(sizes, vec![255, 255, 90]);
//! ```

use tracing::trace;

use super::apdu::Apdu;
use super::instruction::Instruction;
use crate::bip32::Bip32Path;
use crate::error::{Error, Result};

/// P1 of the first chunk.
pub const P1_FIRST_CHUNK: u8 = 0x00;

/// P2 while more chunks follow.
pub const P2_MORE: u8 = 0x80;

/// P2 of the terminal chunk.
pub const P2_LAST: u8 = 0x00;

/// P2 asking the device to show the address on screen.
pub const P2_DISPLAY: u8 = 0x01;

/// P2 returning the public key silently.
pub const P2_NO_DISPLAY: u8 = 0x00;

/// Maximum number of frames one chunked command may span (P1 is one byte).
pub const MAX_CHUNKS: usize = 256;

/// Builds a `GetVersion` frame.
#[must_use]
pub const fn get_version() -> Apdu {
    Apdu::without_data(Instruction::GetVersion, 0x00, 0x00)
}

/// Builds a `GetAppName` frame.
#[must_use]
pub const fn get_app_name() -> Apdu {
    Apdu::without_data(Instruction::GetAppName, 0x00, 0x00)
}

/// Builds a `GetAppAndVersion` frame.
#[must_use]
pub const fn get_app_and_version() -> Apdu {
    Apdu::without_data(Instruction::GetAppAndVersion, 0x00, 0x00)
}

/// Builds a `GetPublicKey` frame.
///
/// # Arguments
///
/// * `path` - The derivation path of the requested key
/// * `display` - Whether the device must show the address for confirmation
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the path is deeper than
/// [`MAX_DEPTH`](crate::bip32::MAX_DEPTH).
pub fn get_public_key(path: &Bip32Path, display: bool) -> Result<Apdu> {
    let p2 = if display { P2_DISPLAY } else { P2_NO_DISPLAY };
    Apdu::new(Instruction::GetPublicKey, 0x00, p2, path.to_bytes()?)
}

/// Builds the frames of a `SignTx` request.
///
/// The transaction is treated as an opaque byte buffer.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the path is too deep or the payload would
/// need more than [`MAX_CHUNKS`] frames.
pub fn sign_tx(path: &Bip32Path, transaction: &[u8]) -> Result<Vec<Apdu>> {
    chunked(Instruction::SignTx, path, transaction)
}

/// Builds the frames of a `PersonalSign` request.
///
/// The message is sent raw; the device applies the signing prefix itself.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the path is too deep or the payload would
/// need more than [`MAX_CHUNKS`] frames.
pub fn personal_sign(path: &Bip32Path, message: &[u8]) -> Result<Vec<Apdu>> {
    chunked(Instruction::PersonalSign, path, message)
}

/// Splits `path || data` into ordered frames of at most [`Apdu::MAX_DATA`]
/// bytes.
fn chunked(instruction: Instruction, path: &Bip32Path, data: &[u8]) -> Result<Vec<Apdu>> {
    let mut payload = path.to_bytes()?;
    payload.extend_from_slice(data);

    let count = payload.len().div_ceil(Apdu::MAX_DATA);
    if count > MAX_CHUNKS {
        return Err(Error::Encoding(format!(
            "{instruction} payload of {} bytes needs {count} frames, maximum is {MAX_CHUNKS}",
            payload.len()
        )));
    }

    let frames = payload
        .chunks(Apdu::MAX_DATA)
        .enumerate()
        .map(|(index, chunk)| {
            let p2 = if index + 1 == count { P2_LAST } else { P2_MORE };
            Apdu::new(instruction, index as u8, p2, chunk.to_vec())
        })
        .collect::<Result<Vec<_>>>()?;

    trace!(%instruction, frames = frames.len(), bytes = payload.len(), "built chunked request");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Bip32Path {
        "m/503'/1'/0'/0/0".parse().unwrap()
    }

    /// Serialized length of [`path`].
    const PATH_LEN: usize = 21;

    #[test]
    fn simple_frames() {
        assert_eq!(get_version().to_bytes(), vec![0xE0, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(get_app_name().to_bytes(), vec![0xE0, 0x05, 0x00, 0x00, 0x00]);
        assert_eq!(
            get_app_and_version().to_bytes(),
            vec![0xB0, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn public_key_frame_carries_path_and_display_flag() {
        let silent = get_public_key(&path(), false).unwrap();
        assert_eq!(silent.p2(), P2_NO_DISPLAY);
        assert_eq!(silent.data(), path().to_bytes().unwrap().as_slice());

        let shown = get_public_key(&path(), true).unwrap();
        assert_eq!(shown.p2(), P2_DISPLAY);
    }

    #[test]
    fn public_key_rejects_deep_path() {
        let deep = Bip32Path::new(vec![1; 11]);
        assert!(matches!(
            get_public_key(&deep, false),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn short_payload_is_one_terminal_frame() {
        let frames = sign_tx(&path(), b"hello cfx").unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].p1(), P1_FIRST_CHUNK);
        assert_eq!(frames[0].p2(), P2_LAST);
        assert_eq!(&frames[0].data()[..PATH_LEN], path().to_bytes().unwrap().as_slice());
        assert_eq!(&frames[0].data()[PATH_LEN..], b"hello cfx");
    }

    #[test]
    fn exactly_255_bytes_is_one_frame() {
        let frames = sign_tx(&path(), &[0x11; 255 - PATH_LEN]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().len(), 255);
        assert_eq!(frames[0].p2(), P2_LAST);
    }

    #[test]
    fn exactly_256_bytes_is_two_frames() {
        let frames = sign_tx(&path(), &[0x11; 256 - PATH_LEN]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data().len(), 255);
        assert_eq!(frames[1].data(), &[0x11]);
        assert_eq!(frames[0].p2(), P2_MORE);
        assert_eq!(frames[1].p2(), P2_LAST);
    }

    #[test]
    fn chunk_order_and_terminal_marker() {
        let data: Vec<u8> = (0..600 - PATH_LEN).map(|i| i as u8).collect();
        let frames = personal_sign(&path(), &data).unwrap();

        assert_eq!(frames.len(), 3);
        let p1s: Vec<u8> = frames.iter().map(Apdu::p1).collect();
        assert_eq!(p1s, vec![0, 1, 2]);
        let terminal: Vec<bool> = frames.iter().map(|f| f.p2() == P2_LAST).collect();
        assert_eq!(terminal, vec![false, false, true]);

        let mut joined = Vec::new();
        for frame in &frames {
            assert_eq!(frame.instruction(), Instruction::PersonalSign);
            joined.extend_from_slice(frame.data());
        }
        assert_eq!(&joined[..PATH_LEN], path().to_bytes().unwrap().as_slice());
        assert_eq!(&joined[PATH_LEN..], data.as_slice());
    }

    #[test]
    fn empty_message_still_sends_path() {
        let frames = personal_sign(&path(), &[]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().len(), PATH_LEN);
    }

    #[test]
    fn too_many_chunks_fails() {
        let limit = MAX_CHUNKS * Apdu::MAX_DATA - PATH_LEN;
        assert_eq!(sign_tx(&path(), &vec![0; limit]).unwrap().len(), MAX_CHUNKS);
        assert!(matches!(
            sign_tx(&path(), &vec![0; limit + 1]),
            Err(Error::Encoding(_))
        ));
    }
}

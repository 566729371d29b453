//! Ledger APDU communication module.
//!
//! This module provides the protocol layer used to talk to the Conflux
//! application running on a Ledger device or emulator:
//!
//! - Frame construction, including chunking of large payloads
//! - Synchronous and confirmation-pending exchanges
//! - Offset-exact decoding of response bodies
//! - Status word classification
//!
//! # Architecture
//!
//! The module is organized into several submodules:
//!
//! - [`apdu`]: APDU frame/response types and the status word mapper
//! - [`instruction`]: the command set and its CLA/INS bytes
//! - [`command`]: frame builders for every instruction
//! - [`response`]: typed response decoding
//! - [`channel`]: the exchange channel and pending-exchange handles
//! - [`client`]: [`ConfluxApp`], the typed command sender
//! - [`button`]: confirmation drivers for the emulator
//! - [`tcp_transport`]: the emulator APDU socket
//!
//! # Transport Abstraction
//!
//! The [`Transport`] trait is the byte-level seam. Sending and receiving are
//! separate calls so that a request needing on-screen confirmation can be
//! sent without waiting for its answer.
//!
//! # Example
//!
//! ```no_run
//! use cfx_ledger_client::Bip32Path;
//! use cfx_ledger_client::ledger::{ConfluxApp, TcpTransport};
//!
//! let transport = TcpTransport::connect("127.0.0.1:9999", None)?;
//! let mut app = ConfluxApp::new(Box::new(transport));
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse()?;
//! let key = app.get_public_key(&path, false)?;
//! println!("address: {}", key.address()?);
//! # Ok::<(), cfx_ledger_client::Error>(())
//! ```

pub mod apdu;
pub mod button;
pub mod channel;
pub mod client;
pub mod command;
pub mod instruction;
pub mod response;
pub mod status;
pub mod tcp_transport;

#[cfg(test)]
pub(crate) mod mock;

pub use apdu::{Apdu, ApduResponse};
pub use button::{Button, NoOpButton, TcpButton};
pub use channel::{ExchangeChannel, PendingExchange};
pub use client::ConfluxApp;
pub use instruction::Instruction;
pub use tcp_transport::TcpTransport;

use crate::error::Result;

/// A byte channel to the device.
///
/// Implementations carry one frame per [`send`](Self::send) and hand back
/// exactly one response per [`receive`](Self::receive), in order. The device
/// accepts a single outstanding command, so callers must pair every send with
/// a receive before sending again.
pub trait Transport {
    /// Sends one APDU frame without waiting for the answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    fn send(&mut self, apdu: &Apdu) -> Result<()>;

    /// Blocks until the answer to the last sent frame arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the answer is truncated.
    fn receive(&mut self) -> Result<ApduResponse>;

    /// Sends an APDU frame and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if either half of the round trip fails.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        self.send(apdu)?;
        self.receive()
    }

    /// Checks if the transport is still connected.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn mock_transport_round_trip() {
        let (mut transport, sent) = MockTransport::new(vec![ApduResponse::new(vec![1, 0, 3], 0x9000)]);

        let response = transport.transmit(&command::get_version()).unwrap();

        assert!(response.is_success());
        assert_eq!(response.data(), &[1, 0, 3]);
        assert_eq!(sent.borrow().len(), 1);
        assert!(transport.is_connected());
    }

    #[test]
    fn mock_transport_runs_dry() {
        let (mut transport, _) = MockTransport::new(vec![]);
        assert!(transport.transmit(&command::get_app_name()).is_err());
    }
}

//! Typed command sender for the Conflux application.
//!
//! [`ConfluxApp`] composes the frame builders, the exchange channel, the
//! response decoders and the status word mapper into one call per
//! instruction. Every method either returns a decoded result or the first
//! error encountered; nothing is retried.
//!
//! # Confirmation-Gated Commands
//!
//! Signing (and displaying an address) requires the user to approve on the
//! device. Two shapes are offered:
//!
//! - **Split**: [`begin_sign_tx`](ConfluxApp::begin_sign_tx) returns a
//!   [`PendingExchange`]; drive the buttons yourself, then call
//!   [`finish_signing`](ConfluxApp::finish_signing).
//! - **Scoped**: [`sign_tx_with`](ConfluxApp::sign_tx_with) takes the
//!   confirmation step as a closure and always resolves the exchange.
//!
//! # Example
//!
//! ```no_run
//! use cfx_ledger_client::Bip32Path;
//! use cfx_ledger_client::config::EmulatorConfig;
//! use cfx_ledger_client::ledger::{Button, ConfluxApp, TcpButton, TcpTransport};
//!
//! let config = EmulatorConfig::default();
//! let mut app = ConfluxApp::new(Box::new(TcpTransport::from_config(&config)?));
//! let mut button = TcpButton::connect(&config)?;
//!
//! let path: Bip32Path = "m/503'/1'/0'/0/0".parse()?;
//! let signature = app.personal_sign_with(&path, b"Hello, world!", || {
//!     button.right_click()?;
//!     button.both_click()
//! })?;
//! println!("{signature}");
//! # Ok::<(), cfx_ledger_client::Error>(())
//! ```

use tracing::{debug, instrument};

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use super::channel::{ExchangeChannel, PendingExchange};
use super::command;
use super::instruction::Instruction;
use super::response::{
    AppAndVersionResult, PublicKeyResult, VersionResult, unpack_app_name, unpack_signature,
};
use crate::bip32::Bip32Path;
use crate::error::Result;
use crate::signature::SignatureResult;

/// A client for the Conflux application on a Ledger device.
#[derive(Debug)]
pub struct ConfluxApp {
    /// The exchange channel to the device.
    channel: ExchangeChannel,
}

impl ConfluxApp {
    /// Creates a client over the given transport.
    ///
    /// # Arguments
    ///
    /// * `transport` - The transport layer for communication
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_channel(ExchangeChannel::new(transport))
    }

    /// Creates a client over an existing channel.
    #[must_use]
    pub const fn with_channel(channel: ExchangeChannel) -> Self {
        Self { channel }
    }

    /// Returns the underlying channel for raw exchanges.
    pub fn channel(&mut self) -> &mut ExchangeChannel {
        &mut self.channel
    }

    /// Consumes the client and returns its channel.
    #[must_use]
    pub fn into_channel(self) -> ExchangeChannel {
        self.channel
    }

    /// Queries the application version.
    ///
    /// # Errors
    ///
    /// Returns a device error on a failure status word, or
    /// [`Error::MalformedResponse`](crate::Error::MalformedResponse) if the body is not exactly 3 bytes.
    #[instrument(skip(self), level = "debug")]
    pub fn get_version(&mut self) -> Result<VersionResult> {
        let body = self.simple(&command::get_version(), Instruction::GetVersion)?;
        VersionResult::unpack(&body)
    }

    /// Queries the application name.
    ///
    /// # Errors
    ///
    /// Returns a device error on a failure status word, or
    /// [`Error::MalformedResponse`](crate::Error::MalformedResponse) if the name is not ASCII.
    #[instrument(skip(self), level = "debug")]
    pub fn get_app_name(&mut self) -> Result<String> {
        let body = self.simple(&command::get_app_name(), Instruction::GetAppName)?;
        unpack_app_name(&body)
    }

    /// Queries the running application's name and version from the
    /// dashboard.
    ///
    /// # Errors
    ///
    /// Returns a device error on a failure status word, or
    /// [`Error::MalformedResponse`](crate::Error::MalformedResponse) if the body does not match its layout.
    #[instrument(skip(self), level = "debug")]
    pub fn get_app_and_version(&mut self) -> Result<AppAndVersionResult> {
        let body = self.simple(&command::get_app_and_version(), Instruction::GetAppAndVersion)?;
        AppAndVersionResult::unpack(&body)
    }

    /// Retrieves the public key and chain code for `path`.
    ///
    /// With `display` set, the device shows the address and waits for the
    /// user; this call then blocks until someone answers on the device. Use
    /// [`get_public_key_with`](Self::get_public_key_with) to drive the
    /// confirmation from the same thread.
    ///
    /// # Arguments
    ///
    /// * `path` - The derivation path
    /// * `show` - Whether the device must display the address
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`](crate::Error::Encoding) if the path is too deep
    /// - [`Error::Denied`](crate::Error::Denied) if the user rejects the displayed address
    /// - [`Error::MalformedResponse`](crate::Error::MalformedResponse) if the body does not match its layout
    #[instrument(skip(self, path, show), fields(path = %path, show = show), level = "debug")]
    pub fn get_public_key(&mut self, path: &Bip32Path, show: bool) -> Result<PublicKeyResult> {
        let apdu = command::get_public_key(path, show)?;
        let body = self.simple(&apdu, Instruction::GetPublicKey)?;
        PublicKeyResult::unpack(&body)
    }

    /// Displays the address for `path` and runs `confirm` while the device
    /// waits for the user.
    ///
    /// # Errors
    ///
    /// The error returned by `confirm` takes precedence over the device's
    /// answer. Otherwise as [`get_public_key`](Self::get_public_key).
    pub fn get_public_key_with<F>(&mut self, path: &Bip32Path, confirm: F) -> Result<PublicKeyResult>
    where
        F: FnOnce() -> Result<()>,
    {
        let apdu = command::get_public_key(path, true)?;
        let response = self.channel.exchange_with_confirmation(&[apdu], confirm)?;
        let body = response.into_result(Instruction::GetPublicKey)?;
        PublicKeyResult::unpack(&body)
    }

    /// Sends a transaction for signing without waiting for the answer.
    ///
    /// The transaction is treated as opaque bytes. Every frame but the last
    /// is acknowledged before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`](crate::Error::Encoding) if the path is too deep or the transaction too
    ///   large
    /// - A device error if an intermediate chunk is rejected
    /// - [`Error::ExchangePending`](crate::Error::ExchangePending) if another exchange is outstanding
    pub fn begin_sign_tx(&mut self, path: &Bip32Path, transaction: &[u8]) -> Result<PendingExchange> {
        let frames = command::sign_tx(path, transaction)?;
        self.channel.begin_async(&frames)
    }

    /// Sends a personal message for signing without waiting for the answer.
    ///
    /// # Errors
    ///
    /// As [`begin_sign_tx`](Self::begin_sign_tx).
    pub fn begin_personal_sign(&mut self, path: &Bip32Path, message: &[u8]) -> Result<PendingExchange> {
        let frames = command::personal_sign(path, message)?;
        self.channel.begin_async(&frames)
    }

    /// Waits for the answer to a signing request and decodes the signature.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownExchange`](crate::Error::UnknownExchange) if `pending` belongs to another channel
    /// - [`Error::Denied`](crate::Error::Denied) if the user rejected the request
    /// - [`Error::Device`](crate::Error::Device) for any other failure status word
    /// - [`Error::MalformedResponse`](crate::Error::MalformedResponse) if the body is not 65 bytes
    pub fn finish_signing(&mut self, pending: PendingExchange) -> Result<SignatureResult> {
        let instruction = pending.instruction();
        let response = self.channel.resolve_async(pending)?;
        signature_from(response, instruction)
    }

    /// Signs a transaction, running `confirm` while the device waits.
    ///
    /// The exchange is always resolved, even when `confirm` fails.
    ///
    /// # Errors
    ///
    /// The error returned by `confirm` takes precedence. Otherwise as
    /// [`begin_sign_tx`](Self::begin_sign_tx) and
    /// [`finish_signing`](Self::finish_signing).
    pub fn sign_tx_with<F>(&mut self, path: &Bip32Path, transaction: &[u8], confirm: F) -> Result<SignatureResult>
    where
        F: FnOnce() -> Result<()>,
    {
        let frames = command::sign_tx(path, transaction)?;
        let response = self.channel.exchange_with_confirmation(&frames, confirm)?;
        signature_from(response, Instruction::SignTx)
    }

    /// Signs a personal message, running `confirm` while the device waits.
    ///
    /// # Errors
    ///
    /// As [`sign_tx_with`](Self::sign_tx_with).
    pub fn personal_sign_with<F>(&mut self, path: &Bip32Path, message: &[u8], confirm: F) -> Result<SignatureResult>
    where
        F: FnOnce() -> Result<()>,
    {
        let frames = command::personal_sign(path, message)?;
        let response = self.channel.exchange_with_confirmation(&frames, confirm)?;
        signature_from(response, Instruction::PersonalSign)
    }

    fn simple(&mut self, apdu: &Apdu, instruction: Instruction) -> Result<Vec<u8>> {
        self.channel.exchange(apdu)?.into_result(instruction)
    }
}

fn signature_from(response: ApduResponse, instruction: Instruction) -> Result<SignatureResult> {
    let body = response.into_result(instruction)?;
    unpack_signature(&body).inspect_err(|_| {
        debug!(%instruction, len = body.len(), "signature body rejected");
    })
}

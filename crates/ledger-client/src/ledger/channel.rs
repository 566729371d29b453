//! The exchange channel and its pending-exchange handles.
//!
//! [`ExchangeChannel`] owns a [`Transport`] and sequences frames over it.
//! It offers three ways to run a command:
//!
//! - [`exchange`](ExchangeChannel::exchange): one frame, one response
//! - [`exchange_chunked`](ExchangeChannel::exchange_chunked): a chunk
//!   sequence whose intermediate acknowledgements are checked and dropped
//! - [`begin_async`](ExchangeChannel::begin_async) /
//!   [`resolve_async`](ExchangeChannel::resolve_async): the terminal frame
//!   is sent but its answer is collected later, after someone has pressed
//!   the buttons on the device
//!
//! # Pending Exchanges
//!
//! ```text
//!  begin_async ──► [chunk 0 ⇄ ack] … [chunk n-1 ⇄ ack] ──► send chunk n
//!                                                             │
//!                  caller drives the confirmation UI          │
//!                                                             ▼
//!  resolve_async(pending) ◄──────────────────────────── receive answer
//! ```
//!
//! A channel holds at most one pending exchange. While one is outstanding,
//! every other command fails with [`Error::ExchangePending`] until the handle
//! is resolved. A [`PendingExchange`] is not cloneable and is consumed by
//! resolution, so it can be resolved at most once.
//!
//! # Desynchronization
//!
//! Once a frame has been sent, the device owes exactly one answer for it. If
//! the transport fails between the send and the receive (a read timeout, a
//! dropped socket), that answer may still be in flight and would be read as
//! the answer to the next command. The channel becomes desynchronized on any
//! transport failure and refuses every further command with
//! [`Error::Desynchronized`]. Commands on a disconnected transport fail with
//! [`Error::Transport`] before anything is sent. Recover by opening a new
//! transport.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, trace, warn};

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use super::instruction::Instruction;
use crate::error::{Error, Result};

/// Source of pending-exchange identifiers, unique across channels.
static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(0);

/// A handle to a request whose terminal frame was sent but whose answer has
/// not been collected yet.
#[must_use = "a pending exchange blocks the channel until it is resolved"]
#[derive(Debug, PartialEq, Eq)]
pub struct PendingExchange {
    /// Process-unique identifier.
    id: u64,

    /// The instruction awaiting its answer.
    instruction: Instruction,
}

impl PendingExchange {
    /// Returns the instruction awaiting its answer.
    #[must_use]
    pub const fn instruction(&self) -> Instruction {
        self.instruction
    }
}

/// Sequences APDU frames over a transport.
pub struct ExchangeChannel {
    /// The underlying transport.
    transport: Box<dyn Transport>,

    /// The outstanding exchange, if any.
    pending: Option<(u64, Instruction)>,

    /// Set once a transport failure may have left an answer unread.
    desynchronized: bool,
}

impl fmt::Debug for ExchangeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeChannel")
            .field("pending", &self.pending)
            .field("desynchronized", &self.desynchronized)
            .finish_non_exhaustive()
    }
}

impl ExchangeChannel {
    /// Creates a channel over the given transport.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            pending: None,
            desynchronized: false,
        }
    }

    /// Returns the instruction of the outstanding exchange, if any.
    #[must_use]
    pub fn pending_instruction(&self) -> Option<Instruction> {
        self.pending.map(|(_, instruction)| instruction)
    }

    /// Checks if a transport failure has left the channel unusable.
    #[must_use]
    pub const fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Checks if the underlying transport is still connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Sends one frame and returns the raw response.
    ///
    /// The status word is not interpreted.
    ///
    /// # Errors
    ///
    /// - [`Error::ExchangePending`] if a pending exchange is outstanding
    /// - [`Error::Desynchronized`] after an earlier transport failure
    /// - Any transport error
    pub fn exchange(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        self.ensure_idle()?;
        self.round_trip(apdu)
    }

    /// Sends a chunk sequence and returns the terminal frame's response.
    ///
    /// Each non-terminal frame must be acknowledged with a success status
    /// word before the next one is sent. If a non-terminal frame fails, no
    /// further frames are sent and that failing response is returned as-is,
    /// so the caller sees the status word that aborted the sequence.
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`] if `frames` is empty
    /// - [`Error::ExchangePending`] if a pending exchange is outstanding
    /// - Any transport error
    pub fn exchange_chunked(&mut self, frames: &[Apdu]) -> Result<ApduResponse> {
        self.ensure_idle()?;
        let (last, init) = split_terminal(frames)?;

        for frame in init {
            let response = self.round_trip(frame)?;
            if !response.is_success() {
                warn!(
                    instruction = %frame.instruction(),
                    chunk = frame.p1(),
                    status_word = response.status_word(),
                    "chunk rejected, aborting sequence"
                );
                return Ok(response);
            }
        }

        self.round_trip(last)
    }

    /// Starts an exchange whose answer arrives after user confirmation.
    ///
    /// All non-terminal frames are sent and acknowledged synchronously. The
    /// terminal frame is sent without waiting, and a handle is returned
    /// immediately. The channel then refuses every other command until the
    /// handle is passed to [`resolve_async`](Self::resolve_async).
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`] if `frames` is empty
    /// - [`Error::ExchangePending`] if a pending exchange is outstanding
    /// - The mapped device error if a non-terminal frame is rejected
    /// - Any transport error
    pub fn begin_async(&mut self, frames: &[Apdu]) -> Result<PendingExchange> {
        self.ensure_idle()?;
        let (last, init) = split_terminal(frames)?;

        for frame in init {
            let response = self.round_trip(frame)?;
            if !response.is_success() {
                warn!(
                    instruction = %frame.instruction(),
                    chunk = frame.p1(),
                    status_word = response.status_word(),
                    "chunk rejected before confirmation"
                );
                return Err(response.to_error(frame.instruction()));
            }
        }

        let instruction = last.instruction();
        log_frame(last);
        if let Err(err) = self.transport.send(last) {
            self.desynchronize(instruction, &err);
            return Err(err);
        }

        let id = NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed);
        self.pending = Some((id, instruction));

        info!(%instruction, frames = frames.len(), "awaiting device confirmation");
        Ok(PendingExchange { id, instruction })
    }

    /// Blocks until the answer to a pending exchange arrives.
    ///
    /// The channel becomes idle again once the answer has been read. If the
    /// receive fails, the answer may still arrive later, so the channel is
    /// left desynchronized instead.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownExchange`] if `pending` was not started by this
    ///   channel
    /// - Any transport error
    pub fn resolve_async(&mut self, pending: PendingExchange) -> Result<ApduResponse> {
        match self.pending {
            Some((id, _)) if id == pending.id => {}
            _ => return Err(Error::UnknownExchange),
        }
        self.pending = None;

        let response = match self.transport.receive() {
            Ok(response) => response,
            Err(err) => {
                self.desynchronize(pending.instruction, &err);
                return Err(err);
            }
        };
        debug!(
            instruction = %pending.instruction,
            status_word = response.status_word(),
            "pending exchange resolved"
        );
        Ok(response)
    }

    /// Runs a confirmation-gated exchange with a scoped confirmation step.
    ///
    /// The frames are sent as by [`begin_async`](Self::begin_async), then
    /// `confirm` is invoked, then the exchange is resolved. Resolution
    /// happens on every path: if `confirm` fails, the answer is still
    /// collected and `confirm`'s error is returned. If `confirm` panics, the
    /// answer is collected while unwinding.
    ///
    /// # Errors
    ///
    /// - Any error from [`begin_async`](Self::begin_async)
    /// - The error returned by `confirm`
    /// - Any error from [`resolve_async`](Self::resolve_async)
    pub fn exchange_with_confirmation<F>(
        &mut self,
        frames: &[Apdu],
        confirm: F,
    ) -> Result<ApduResponse>
    where
        F: FnOnce() -> Result<()>,
    {
        let pending = self.begin_async(frames)?;
        let mut guard = ResolveOnUnwind(self);
        let confirmed = confirm();
        let response = guard.channel().resolve_async(pending);

        confirmed?;
        response
    }

    fn ensure_idle(&self) -> Result<()> {
        if let Some((_, instruction)) = self.pending {
            return Err(Error::ExchangePending(instruction));
        }
        if self.desynchronized {
            return Err(Error::Desynchronized);
        }
        if !self.transport.is_connected() {
            return Err(Error::Transport("transport is disconnected".to_string()));
        }
        Ok(())
    }

    fn desynchronize(&mut self, instruction: Instruction, err: &Error) {
        warn!(%instruction, error = %err, "transport failed mid-exchange, channel desynchronized");
        self.desynchronized = true;
    }

    /// Reads and drops the answer owed to an abandoned pending exchange.
    fn drain_pending(&mut self) {
        if let Some((_, instruction)) = self.pending.take() {
            warn!(%instruction, "pending exchange abandoned, draining its answer");
            if let Err(err) = self.transport.receive() {
                self.desynchronize(instruction, &err);
            }
        }
    }

    fn round_trip(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        log_frame(apdu);
        let response = match self.transport.transmit(apdu) {
            Ok(response) => response,
            Err(err) => {
                self.desynchronize(apdu.instruction(), &err);
                return Err(err);
            }
        };
        debug!(
            instruction = %apdu.instruction(),
            status_word = response.status_word(),
            len = response.data().len(),
            "received response"
        );
        trace!(body = %hex::encode(response.data()), "response body");
        Ok(response)
    }
}

/// Drains a still-pending exchange when dropped, so a panicking
/// confirmation step does not leave the channel blocked.
struct ResolveOnUnwind<'a>(&'a mut ExchangeChannel);

impl ResolveOnUnwind<'_> {
    fn channel(&mut self) -> &mut ExchangeChannel {
        self.0
    }
}

impl Drop for ResolveOnUnwind<'_> {
    fn drop(&mut self) {
        self.0.drain_pending();
    }
}

fn log_frame(apdu: &Apdu) {
    debug!(
        instruction = %apdu.instruction(),
        p1 = apdu.p1(),
        p2 = apdu.p2(),
        len = apdu.data().len(),
        "sending frame"
    );
    trace!(frame = %hex::encode(apdu.to_bytes()), "frame bytes");
}

fn split_terminal(frames: &[Apdu]) -> Result<(&Apdu, &[Apdu])> {
    frames
        .split_last()
        .ok_or_else(|| Error::Encoding("no frames to send".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bip32::Bip32Path;
    use crate::ledger::command;
    use crate::ledger::mock::MockTransport;
    use crate::ledger::status::{SW_DENY, SW_INVALID_DATA, SW_OK};

    fn path() -> Bip32Path {
        "m/503'/1'/0'/0/0".parse().unwrap()
    }

    fn ok() -> ApduResponse {
        ApduResponse::new(vec![], SW_OK)
    }

    #[test]
    fn exchange_returns_raw_response() {
        let (transport, sent) = MockTransport::boxed(vec![ApduResponse::new(vec![], SW_INVALID_DATA)]);
        let mut channel = ExchangeChannel::new(transport);

        let response = channel.exchange(&command::get_version()).unwrap();

        assert_eq!(response.status_word(), SW_INVALID_DATA);
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn chunked_exchange_returns_terminal_response() {
        let frames = command::sign_tx(&path(), &[0x5A; 600]).unwrap();
        assert_eq!(frames.len(), 3);

        let terminal = ApduResponse::new(vec![0xAB; 65], SW_OK);
        let (transport, sent) = MockTransport::boxed(vec![ok(), ok(), terminal.clone()]);
        let mut channel = ExchangeChannel::new(transport);

        let response = channel.exchange_chunked(&frames).unwrap();

        assert_eq!(response, terminal);
        assert_eq!(*sent.borrow(), frames);
    }

    #[test]
    fn chunked_exchange_stops_at_first_rejected_chunk() {
        let frames = command::sign_tx(&path(), &[0x5A; 600]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ok(), ApduResponse::new(vec![], SW_INVALID_DATA)]);
        let mut channel = ExchangeChannel::new(transport);

        let response = channel.exchange_chunked(&frames).unwrap();

        assert_eq!(response.status_word(), SW_INVALID_DATA);
        assert_eq!(sent.borrow().len(), 2);
    }

    #[test]
    fn chunked_exchange_rejects_empty_sequence() {
        let (transport, _) = MockTransport::boxed(vec![]);
        let mut channel = ExchangeChannel::new(transport);

        assert!(matches!(channel.exchange_chunked(&[]), Err(Error::Encoding(_))));
        assert!(matches!(channel.begin_async(&[]), Err(Error::Encoding(_))));
    }

    #[test]
    fn async_exchange_blocks_channel_until_resolved() {
        let frames = command::personal_sign(&path(), b"Hello, world!").unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ApduResponse::new(vec![0x01; 65], SW_OK), ok()]);
        let mut channel = ExchangeChannel::new(transport);

        let pending = channel.begin_async(&frames).unwrap();
        assert_eq!(pending.instruction(), Instruction::PersonalSign);
        assert_eq!(channel.pending_instruction(), Some(Instruction::PersonalSign));
        assert_eq!(sent.borrow().len(), 1);

        let err = channel.exchange(&command::get_version()).unwrap_err();
        assert!(matches!(err, Error::ExchangePending(Instruction::PersonalSign)));
        assert_eq!(sent.borrow().len(), 1);

        let response = channel.resolve_async(pending).unwrap();
        assert_eq!(response.data(), &[0x01; 65]);
        assert_eq!(channel.pending_instruction(), None);

        assert!(channel.exchange(&command::get_version()).unwrap().is_success());
    }

    #[test]
    fn async_exchange_acknowledges_intermediate_chunks() {
        let frames = command::sign_tx(&path(), &[0x00; 300]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ok(), ApduResponse::new(vec![], SW_DENY)]);
        let mut channel = ExchangeChannel::new(transport);

        let pending = channel.begin_async(&frames).unwrap();
        assert_eq!(sent.borrow().len(), 2);

        let response = channel.resolve_async(pending).unwrap();
        assert_eq!(response.status_word(), SW_DENY);
    }

    #[test]
    fn async_exchange_fails_on_rejected_chunk() {
        let frames = command::sign_tx(&path(), &[0x00; 300]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ApduResponse::new(vec![], SW_INVALID_DATA)]);
        let mut channel = ExchangeChannel::new(transport);

        let err = channel.begin_async(&frames).unwrap_err();

        assert_eq!(err.status_word(), Some(SW_INVALID_DATA));
        assert_eq!(sent.borrow().len(), 1);
        assert_eq!(channel.pending_instruction(), None);
    }

    #[test]
    fn foreign_pending_exchange_is_rejected() {
        let frames = command::sign_tx(&path(), &[0x01; 8]).unwrap();
        let (first, _) = MockTransport::boxed(vec![ok()]);
        let (second, _) = MockTransport::boxed(vec![ok()]);
        let mut a = ExchangeChannel::new(first);
        let mut b = ExchangeChannel::new(second);

        let pending_a = a.begin_async(&frames).unwrap();
        let pending_b = b.begin_async(&frames).unwrap();

        assert!(matches!(a.resolve_async(pending_b), Err(Error::UnknownExchange)));
        assert_eq!(a.pending_instruction(), Some(Instruction::SignTx));
        assert!(a.resolve_async(pending_a).is_ok());
    }

    #[test]
    fn confirmation_error_wins_after_resolution() {
        let frames = command::sign_tx(&path(), &[0x01; 8]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ok(), ok()]);
        let mut channel = ExchangeChannel::new(transport);

        let result = channel.exchange_with_confirmation(&frames, || {
            Err(Error::Transport("button socket closed".to_string()))
        });

        assert!(matches!(result, Err(Error::Transport(msg)) if msg == "button socket closed"));
        assert_eq!(channel.pending_instruction(), None);

        // Channel is usable again.
        assert!(channel.exchange(&command::get_app_name()).is_ok());
        assert_eq!(sent.borrow().len(), 2);
    }

    #[test]
    fn confirmation_runs_between_send_and_receive() {
        let frames = command::sign_tx(&path(), &[0x01; 8]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![ApduResponse::new(vec![0x02; 65], SW_OK)]);
        let mut channel = ExchangeChannel::new(transport);

        let observed = std::cell::Cell::new(0);
        let response = channel
            .exchange_with_confirmation(&frames, || {
                observed.set(sent.borrow().len());
                Ok(())
            })
            .unwrap();

        assert_eq!(observed.get(), 1);
        assert_eq!(response.data(), &[0x02; 65]);
    }

    #[test]
    fn failed_resolve_desynchronizes_channel() {
        let frames = command::personal_sign(&path(), b"slow").unwrap();
        let (mut transport, sent) =
            MockTransport::new(vec![ApduResponse::new(vec![0x03; 65], SW_OK), ok()]);
        transport.fail_next_receive();
        let mut channel = ExchangeChannel::new(Box::new(transport));

        let pending = channel.begin_async(&frames).unwrap();
        assert!(matches!(channel.resolve_async(pending), Err(Error::Transport(_))));
        assert_eq!(channel.pending_instruction(), None);
        assert!(channel.is_desynchronized());

        // The late signature must not be read as the version answer.
        assert!(matches!(
            channel.exchange(&command::get_version()),
            Err(Error::Desynchronized)
        ));
        assert!(matches!(channel.begin_async(&frames), Err(Error::Desynchronized)));
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn failed_round_trip_desynchronizes_channel() {
        let (mut transport, sent) = MockTransport::new(vec![ok(), ok()]);
        transport.fail_next_receive();
        let mut channel = ExchangeChannel::new(Box::new(transport));

        assert!(matches!(
            channel.exchange(&command::get_version()),
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            channel.exchange(&command::get_app_name()),
            Err(Error::Desynchronized)
        ));
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn disconnected_transport_is_refused() {
        let (mut transport, sent) = MockTransport::new(vec![ok()]);
        transport.disconnect();
        let mut channel = ExchangeChannel::new(Box::new(transport));

        let err = channel.exchange(&command::get_version()).unwrap_err();

        assert!(matches!(err, Error::Transport(msg) if msg == "transport is disconnected"));
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn panicking_confirmation_drains_pending_answer() {
        let frames = command::sign_tx(&path(), &[0x01; 8]).unwrap();
        let (transport, sent) = MockTransport::boxed(vec![
            ApduResponse::new(vec![0x04; 65], SW_OK),
            ApduResponse::new(vec![1, 0, 3], SW_OK),
        ]);
        let mut channel = ExchangeChannel::new(transport);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            channel.exchange_with_confirmation(&frames, || panic!("button thread died"))
        }));

        assert!(outcome.is_err());
        assert_eq!(channel.pending_instruction(), None);
        assert!(!channel.is_desynchronized());

        let response = channel.exchange(&command::get_version()).unwrap();
        assert_eq!(response.data(), &[1, 0, 3]);
        assert_eq!(sent.borrow().len(), 2);
    }
}

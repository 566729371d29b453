//! TCP transport for the device emulator's APDU socket.
//!
//! The emulator frames every message with a big-endian length:
//!
//! ```text
//! request:  | len (4B BE) | APDU (len B)                |
//! response: | len (4B BE) | data (len B) | SW1 | SW2    |
//! ```
//!
//! The response length covers the data only; the two status word bytes
//! always follow it.
//!
//! # Example
//!
//! ```no_run
//! use cfx_ledger_client::config::EmulatorConfig;
//! use cfx_ledger_client::ledger::TcpTransport;
//!
//! let transport = TcpTransport::from_config(&EmulatorConfig::from_env()?)?;
//! # Ok::<(), cfx_ledger_client::Error>(())
//! ```

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use crate::config::EmulatorConfig;
use crate::error::{Error, Result};

/// Largest response body accepted from the emulator.
const MAX_RESPONSE_LEN: usize = 0x1_0000;

/// A transport speaking the emulator's length-prefixed APDU protocol.
#[derive(Debug)]
pub struct TcpTransport {
    /// The APDU socket.
    stream: TcpStream,

    /// Whether the peer is still believed to be reachable.
    connected: bool,
}

impl TcpTransport {
    /// Connects to an emulator APDU socket.
    ///
    /// # Arguments
    ///
    /// * `addr` - The socket address, e.g. `"127.0.0.1:9999"`
    /// * `read_timeout` - Optional read timeout; `None` blocks indefinitely
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the socket cannot be opened.
    pub fn connect<A: ToSocketAddrs>(addr: A, read_timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::ConnectionFailed(format!("APDU socket: {e}")))?;
        stream
            .set_read_timeout(read_timeout)
            .map_err(|e| Error::ConnectionFailed(format!("set read timeout: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::ConnectionFailed(format!("set nodelay: {e}")))?;

        debug!(peer = ?stream.peer_addr().ok(), "connected to APDU socket");
        Ok(Self {
            stream,
            connected: true,
        })
    }

    /// Connects using the APDU address and timeout from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the socket cannot be opened.
    pub fn from_config(config: &EmulatorConfig) -> Result<Self> {
        Self::connect(config.apdu_addr(), config.io_timeout())
    }

    /// Closes the socket.
    pub fn close(&mut self) {
        // Already-closed sockets report an error we have no use for.
        let _ = self.stream.shutdown(Shutdown::Both);
        self.connected = false;
    }

    fn io<T>(&mut self, result: std::io::Result<T>) -> Result<T> {
        result.map_err(|e| {
            self.connected = false;
            Error::from(e)
        })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, apdu: &Apdu) -> Result<()> {
        let command = apdu.to_bytes();
        let len = u32::try_from(command.len())
            .map_err(|_| Error::Encoding("APDU too long for the emulator".to_string()))?;

        let mut message = Vec::with_capacity(4 + command.len());
        message.extend_from_slice(&len.to_be_bytes());
        message.extend_from_slice(&command);

        trace!(len = command.len(), "writing APDU");
        let written = self.stream.write_all(&message);
        self.io(written)
    }

    fn receive(&mut self) -> Result<ApduResponse> {
        let mut header = [0u8; 4];
        let read = self.stream.read_exact(&mut header);
        self.io(read)?;

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_RESPONSE_LEN {
            return Err(Error::MalformedResponse(format!(
                "emulator announced a {len}-byte response"
            )));
        }

        let mut body = vec![0u8; len + 2];
        let read = self.stream.read_exact(&mut body);
        self.io(read)?;

        trace!(len, "read APDU response");
        ApduResponse::from_bytes(&body)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

//! Confirmation drivers.
//!
//! A [`Button`] presses the physical buttons of the device on behalf of the
//! user. Against real hardware nothing can be automated, so [`NoOpButton`]
//! does nothing and a human confirms. Against the emulator, [`TcpButton`]
//! writes press/release codes to its button socket:
//!
//! | Action | Bytes  |
//! |--------|--------|
//! | right  | `Rr`   |
//! | left   | `Ll`   |
//! | both   | `LRlr` |
//!
//! Upper case presses, lower case releases. Each action is followed by a
//! settle delay so the emulated screen has moved on before the next one.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::EmulatorConfig;
use crate::error::{Error, Result};

/// Drives the confirmation UI of the device.
pub trait Button {
    /// Presses and releases the right button.
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not be delivered.
    fn right_click(&mut self) -> Result<()>;

    /// Presses and releases the left button.
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not be delivered.
    fn left_click(&mut self) -> Result<()>;

    /// Presses both buttons together, then releases them.
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not be delivered.
    fn both_click(&mut self) -> Result<()>;

    /// Releases the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver could not be shut down cleanly.
    fn close(&mut self) -> Result<()>;
}

/// A driver that does nothing, for use with real hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpButton;

impl Button for NoOpButton {
    fn right_click(&mut self) -> Result<()> {
        Ok(())
    }

    fn left_click(&mut self) -> Result<()> {
        Ok(())
    }

    fn both_click(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A driver writing to the emulator's button socket.
#[derive(Debug)]
pub struct TcpButton {
    /// The button socket.
    stream: TcpStream,

    /// Pause after each action.
    settle_delay: Duration,
}

impl TcpButton {
    /// Connects to the button socket named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the socket cannot be opened.
    pub fn connect(config: &EmulatorConfig) -> Result<Self> {
        let stream = TcpStream::connect(config.button_addr())
            .map_err(|e| Error::ConnectionFailed(format!("button socket: {e}")))?;

        debug!(addr = %config.button_addr(), "connected to button socket");
        Ok(Self::from_stream(stream, config.settle_delay()))
    }

    /// Wraps an already connected socket.
    #[must_use]
    pub const fn from_stream(stream: TcpStream, settle_delay: Duration) -> Self {
        Self {
            stream,
            settle_delay,
        }
    }

    fn press(&mut self, codes: &[u8]) -> Result<()> {
        trace!(codes = %String::from_utf8_lossy(codes), "button action");
        self.stream.write_all(codes)?;
        thread::sleep(self.settle_delay);
        Ok(())
    }
}

impl Button for TcpButton {
    fn right_click(&mut self) -> Result<()> {
        self.press(b"Rr")
    }

    fn left_click(&mut self) -> Result<()> {
        self.press(b"Ll")
    }

    fn both_click(&mut self) -> Result<()> {
        self.press(b"LRlr")
    }

    fn close(&mut self) -> Result<()> {
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn no_op_button_always_succeeds() {
        let mut button = NoOpButton;
        assert!(button.right_click().is_ok());
        assert!(button.left_click().is_ok());
        assert!(button.both_click().is_ok());
        assert!(button.close().is_ok());
    }

    #[test]
    fn tcp_button_writes_press_release_codes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = EmulatorConfig {
            button_port: listener.local_addr().unwrap().port(),
            settle_delay_ms: 0,
            ..EmulatorConfig::default()
        };

        let emulator = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).unwrap();
            received
        });

        let mut button = TcpButton::connect(&config).unwrap();
        button.right_click().unwrap();
        button.left_click().unwrap();
        button.both_click().unwrap();
        button.close().unwrap();

        assert_eq!(emulator.join().unwrap(), "RrLlLRlr");
    }
}

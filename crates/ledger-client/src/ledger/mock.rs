//! Scripted transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use crate::error::{Error, Result};

/// Frames the mock has been sent, shared with the test body.
pub(crate) type SentLog = Rc<RefCell<Vec<Apdu>>>;

/// A transport answering each frame with the next scripted response.
#[derive(Debug)]
pub(crate) struct MockTransport {
    responses: VecDeque<ApduResponse>,
    sent: SentLog,
    awaiting: usize,
    fail_next_receive: bool,
    connected: bool,
}

impl MockTransport {
    pub(crate) fn new(responses: Vec<ApduResponse>) -> (Self, SentLog) {
        let sent = SentLog::default();
        let transport = Self {
            responses: responses.into_iter().collect(),
            sent: Rc::clone(&sent),
            awaiting: 0,
            fail_next_receive: false,
            connected: true,
        };
        (transport, sent)
    }

    /// Makes the next receive time out, leaving its answer queued.
    pub(crate) fn fail_next_receive(&mut self) {
        self.fail_next_receive = true;
    }

    pub(crate) fn disconnect(&mut self) {
        self.connected = false;
    }

    pub(crate) fn boxed(responses: Vec<ApduResponse>) -> (Box<dyn Transport>, SentLog) {
        let (transport, sent) = Self::new(responses);
        (Box::new(transport), sent)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, apdu: &Apdu) -> Result<()> {
        self.sent.borrow_mut().push(apdu.clone());
        self.awaiting += 1;
        Ok(())
    }

    fn receive(&mut self) -> Result<ApduResponse> {
        if self.awaiting == 0 {
            return Err(Error::Transport("receive without send".to_string()));
        }
        if self.fail_next_receive {
            self.fail_next_receive = false;
            return Err(Error::Transport("timed out".to_string()));
        }
        self.awaiting -= 1;
        self.responses
            .pop_front()
            .ok_or_else(|| Error::Transport("no response".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

//! Mock raw-device transport for deterministic handshake tests.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/reply scripts. Each reply is either a chunk of bytes or a
//! silent receive window that ends in [`Error::Timeout`], so tests can
//! model a modem that answers late or in pieces.
//!
//! # Example
//!
//! ```
//! use modemlink_test_harness::{MockReply, MockTransport};
//!
//! let mut mock = MockTransport::new();
//! mock.expect(b"AT+SIMMODE=1\r", b"\r\nOK\r\n");
//! mock.expect_replies(
//!     b"AT+CMUX=0\r",
//!     vec![MockReply::Silence, MockReply::data(b"\r\nOK\r\n")],
//! );
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use modemlink_core::error::{Error, Result};
use modemlink_core::transport::Transport;

/// One scripted event returned by `receive()` after a matching `send()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Bytes delivered to the reader, possibly over several receives.
    Data(Vec<u8>),
    /// One receive window with no data: sleeps the timeout, then `Timeout`.
    Silence,
    /// The peer closes the link: `receive()` returns `Ok(0)`.
    Eof,
}

impl MockReply {
    pub fn data(bytes: &[u8]) -> Self {
        MockReply::Data(bytes.to_vec())
    }
}

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    replies: Vec<MockReply>,
}

/// State visible through a [`MockProbe`] after the transport is boxed and
/// handed to the code under test.
#[derive(Debug, Default)]
struct Shared {
    sent_log: Vec<Vec<u8>>,
    close_count: usize,
}

/// Observes a [`MockTransport`] from the test side.
#[derive(Debug, Clone)]
pub struct MockProbe {
    shared: Arc<Mutex<Shared>>,
}

impl MockProbe {
    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// Sent payloads decoded as text.
    pub fn sent_text(&self) -> Vec<String> {
        self.shared
            .lock()
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// How many times `close()` was called.
    pub fn close_count(&self) -> usize {
        self.shared.lock().close_count
    }
}

/// A mock [`Transport`] for testing the handshake without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; its replies
/// then feed the following `receive()` calls. With nothing scripted,
/// `receive()` waits out its timeout like a silent device.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    replies: VecDeque<MockReply>,
    connected: bool,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            replies: VecDeque::new(),
            connected: true,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// When `request` is sent, answer with `response` in one chunk.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expect_replies(request, vec![MockReply::data(response)]);
    }

    /// When `request` is sent, play back `replies` in order.
    pub fn expect_replies(&mut self, request: &[u8], replies: Vec<MockReply>) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            replies,
        });
    }

    /// A handle for inspecting this transport after it has been moved.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// When set to `false`, `send()` and `receive()` return
    /// [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.shared.lock().sent_log.push(data.to_vec());

        let Some(expectation) = self.expectations.pop_front() else {
            return Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        self.replies = expectation.replies.into();
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.replies.pop_front() {
            Some(MockReply::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.replies.push_front(MockReply::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(MockReply::Eof) => Ok(0),
            Some(MockReply::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.replies.clear();
        self.shared.lock().close_count += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

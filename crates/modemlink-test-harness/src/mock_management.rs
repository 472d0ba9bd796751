//! Mock modem management endpoint.
//!
//! [`MockManagement`] implements [`ManagementConnector`]. Each successful
//! `connect()` yields a link whose incoming text the test pushes with
//! [`MockManagement::notify`] and whose outgoing text is recorded. Dropping
//! the link from the test side ([`MockManagement::disconnect`]) makes the
//! next receive read EOF, which is how the monitor sees the daemon go away.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use modemlink_core::error::{Error, Result};
use modemlink_core::transport::{ManagementConnector, Transport};

#[derive(Default)]
struct ManagementState {
    available: bool,
    link: Option<mpsc::UnboundedSender<Vec<u8>>>,
    sent: Vec<String>,
    attempts: usize,
}

/// Scriptable [`ManagementConnector`].
#[derive(Clone)]
pub struct MockManagement {
    state: Arc<Mutex<ManagementState>>,
    connects: Arc<watch::Sender<usize>>,
}

impl MockManagement {
    /// A connector whose endpoint accepts connections.
    pub fn new() -> Self {
        let (connects, _) = watch::channel(0);
        MockManagement {
            state: Arc::new(Mutex::new(ManagementState {
                available: true,
                ..Default::default()
            })),
            connects: Arc::new(connects),
        }
    }

    /// Make subsequent `connect()` calls fail (`false`) or succeed.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Deliver `text` on the current link. Returns `false` if no link is up.
    pub fn notify(&self, text: &str) -> bool {
        self.state
            .lock()
            .link
            .as_ref()
            .is_some_and(|tx| tx.send(text.as_bytes().to_vec()).is_ok())
    }

    /// Close the current link from the endpoint side.
    pub fn disconnect(&self) {
        self.state.lock().link = None;
    }

    /// Text the code under test wrote to any link, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Number of `connect()` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Number of successful connections so far.
    pub fn connects(&self) -> usize {
        *self.connects.borrow()
    }

    /// Wait until at least `count` connections have succeeded.
    pub async fn wait_for_connects(&self, count: usize) {
        let mut rx = self.connects.subscribe();
        let _ = rx.wait_for(|c| *c >= count).await;
    }
}

impl Default for MockManagement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagementConnector for MockManagement {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let rx = {
            let mut state = self.state.lock();
            state.attempts += 1;
            if !state.available {
                return Err(Error::Transport("mock management endpoint down".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            state.link = Some(tx);
            rx
        };
        self.connects.send_modify(|c| *c += 1);
        Ok(Box::new(MockManagementLink {
            incoming: Some(rx),
            state: Arc::clone(&self.state),
        }))
    }
}

/// One connection handed out by [`MockManagement`].
struct MockManagementLink {
    incoming: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    state: Arc<Mutex<ManagementState>>,
}

#[async_trait]
impl Transport for MockManagementLink {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.incoming.is_none() {
            return Err(Error::NotConnected);
        }
        self.state
            .lock()
            .sent
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let incoming = self.incoming.as_mut().ok_or(Error::NotConnected)?;
        match tokio::time::timeout(timeout, incoming.recv()).await {
            Ok(Some(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Ok(None) => Ok(0),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.incoming = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.incoming.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_reaches_link() {
        let mgmt = MockManagement::new();
        let mut link = mgmt.connect().await.unwrap();
        assert_eq!(mgmt.connects(), 1);

        assert!(mgmt.notify("Modem Alive"));
        let mut buf = [0u8; 64];
        let n = link.receive(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&buf[..n], b"Modem Alive");

        link.send(b"Modem Blocked\n").await.unwrap();
        assert_eq!(mgmt.sent(), vec!["Modem Blocked\n"]);
    }

    #[tokio::test]
    async fn disconnect_reads_eof() {
        let mgmt = MockManagement::new();
        let mut link = mgmt.connect().await.unwrap();
        mgmt.disconnect();

        let mut buf = [0u8; 8];
        assert_eq!(link.receive(&mut buf, Duration::from_secs(1)).await.unwrap(), 0);
        assert!(!mgmt.notify("Modem Alive"));
    }

    #[tokio::test]
    async fn unavailable_endpoint_fails_connect() {
        let mgmt = MockManagement::new();
        mgmt.set_available(false);
        assert!(matches!(mgmt.connect().await, Err(Error::Transport(_))));
        assert_eq!(mgmt.attempts(), 1);
        assert_eq!(mgmt.connects(), 0);

        mgmt.set_available(true);
        assert!(mgmt.connect().await.is_ok());
        mgmt.wait_for_connects(1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_link_times_out() {
        let mgmt = MockManagement::new();
        let mut link = mgmt.connect().await.unwrap();
        let mut buf = [0u8; 8];
        let result = link.receive(&mut buf, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}

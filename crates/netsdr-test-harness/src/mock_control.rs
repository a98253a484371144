//! Mock control transport for deterministic testing of the client.
//!
//! [`MockControlTransport`] implements [`ControlTransport`] without a
//! socket. Every sent frame is recorded, and inbound frames are pushed to
//! the registered handler either automatically (an auto-response fired from
//! inside `send`, the way a fast receiver answers) or explicitly through
//! [`deliver`](MockControlTransport::deliver) from any task.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockControlTransport;
//!
//! // Connected, answering every command with a NAK.
//! let mock = MockControlTransport::with_auto_response(&[0x02, 0x00]);
//! mock.set_connected(true);
//! assert_eq!(mock.sent_count(), 0);
//! ```

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{CloseHandler, ControlTransport, FrameHandler};

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    connect_calls: usize,
    disconnect_calls: usize,
    /// Log of all frames sent through this transport.
    sent: Vec<Vec<u8>>,
    /// Delivered to the handler after every successful send.
    auto_response: Option<Vec<u8>>,
    /// When set, `connect()` fails with this message.
    connect_error: Option<String>,
    /// When set, `send()` fails with this message.
    send_error: Option<String>,
}

/// A mock [`ControlTransport`].
///
/// Starts disconnected with no auto-response.
pub struct MockControlTransport {
    state: Mutex<MockState>,
    handler: Mutex<Option<FrameHandler>>,
    close_handler: Mutex<Option<CloseHandler>>,
    sent_notify: Notify,
}

impl MockControlTransport {
    pub fn new() -> Self {
        MockControlTransport {
            state: Mutex::new(MockState::default()),
            handler: Mutex::new(None),
            close_handler: Mutex::new(None),
            sent_notify: Notify::new(),
        }
    }

    /// Create a mock that answers every send with `response`.
    pub fn with_auto_response(response: &[u8]) -> Self {
        let mock = Self::new();
        mock.set_auto_response(Some(response));
        mock
    }

    /// Force the connection flag without counting a connect call.
    pub fn set_connected(&self, connected: bool) {
        self.lock_state().connected = connected;
    }

    /// Replace the auto-response. `None` makes sends go unanswered.
    pub fn set_auto_response(&self, response: Option<&[u8]>) {
        self.lock_state().auto_response = response.map(<[u8]>::to_vec);
    }

    /// Make subsequent `connect()` calls fail.
    pub fn fail_connect(&self, message: &str) {
        self.lock_state().connect_error = Some(message.to_string());
    }

    /// Make subsequent sends fail, or succeed again with `None`.
    pub fn set_send_error(&self, message: Option<&str>) {
        self.lock_state().send_error = message.map(str::to_string);
    }

    /// Push an inbound frame to the registered handler.
    ///
    /// Returns `false` if no handler is registered.
    pub fn deliver(&self, frame: &[u8]) -> bool {
        let handler = lock(&self.handler).clone();
        match handler {
            Some(h) => {
                h(frame.to_vec());
                true
            }
            None => false,
        }
    }

    /// Drop the connection as if the receiver hung up.
    ///
    /// Marks the mock disconnected, then runs the close handler. Returns
    /// `false` if no close handler is registered.
    pub fn close_remote(&self) -> bool {
        self.lock_state().connected = false;
        let handler = lock(&self.close_handler).clone();
        match handler {
            Some(h) => {
                h();
                true
            }
            None => false,
        }
    }

    /// All frames sent so far, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock_state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock_state().sent.len()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock_state().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.lock_state().disconnect_calls
    }

    /// Wait until at least `count` frames have been sent.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.sent_notify.notified();
            if self.sent_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent_count() >= count;
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

impl Default for MockControlTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlTransport for MockControlTransport {
    async fn connect(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.connect_calls += 1;
        if let Some(message) = &state.connect_error {
            return Err(Error::Transport(message.clone()));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.lock_state();
        state.disconnect_calls += 1;
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock_state().connected
    }

    async fn send(&self, frame: &[u8]) -> Result<()> {
        let response = {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if let Some(message) = &state.send_error {
                return Err(Error::Transport(message.clone()));
            }
            state.sent.push(frame.to_vec());
            state.auto_response.clone()
        };
        self.sent_notify.notify_waiters();

        tracing::trace!(frame = ?frame, "Mock control send");

        if let Some(response) = response {
            self.deliver(&response);
        }
        Ok(())
    }

    fn set_frame_handler(&self, handler: FrameHandler) {
        *lock(&self.handler) = Some(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        *lock(&self.close_handler) = Some(handler);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_handler(mock: &MockControlTransport) -> Arc<Mutex<Vec<Vec<u8>>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        mock.set_frame_handler(Arc::new(move |frame| {
            sink.lock().unwrap().push(frame);
        }));
        received
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let mock = MockControlTransport::new();
        assert!(!mock.is_connected());
        let result = mock.send(&[0x02, 0x00]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(mock.sent_count(), 0);
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_counted() {
        let mock = MockControlTransport::new();
        mock.connect().await.unwrap();
        assert!(mock.is_connected());
        assert_eq!(mock.connect_calls(), 1);

        mock.disconnect();
        mock.disconnect();
        assert!(!mock.is_connected());
        assert_eq!(mock.disconnect_calls(), 2);
    }

    #[tokio::test]
    async fn failing_connect_leaves_transport_closed() {
        let mock = MockControlTransport::new();
        mock.fail_connect("connection failed");

        let err = mock.connect().await.unwrap_err();
        assert_eq!(err.to_string(), "transport error: connection failed");
        assert!(!mock.is_connected());
        assert_eq!(mock.connect_calls(), 1);
    }

    #[tokio::test]
    async fn auto_response_is_delivered_on_send() {
        let mock = MockControlTransport::with_auto_response(&[0x00]);
        mock.set_connected(true);
        let received = recording_handler(&mock);

        mock.send(&[0x04, 0x20, 0x18, 0x00]).await.unwrap();

        assert_eq!(mock.sent_frames(), vec![vec![0x04, 0x20, 0x18, 0x00]]);
        assert_eq!(*received.lock().unwrap(), vec![vec![0x00]]);
    }

    #[tokio::test]
    async fn failing_send_is_not_recorded() {
        let mock = MockControlTransport::with_auto_response(&[0x00]);
        mock.set_connected(true);
        let received = recording_handler(&mock);

        mock.set_send_error(Some("broken pipe"));
        assert!(matches!(
            mock.send(&[0x02, 0x00]).await,
            Err(Error::Transport(_))
        ));
        assert_eq!(mock.sent_count(), 0);
        assert!(received.lock().unwrap().is_empty());

        mock.set_send_error(None);
        mock.send(&[0x02, 0x00]).await.unwrap();
        assert_eq!(mock.sent_count(), 1);
    }

    #[tokio::test]
    async fn deliver_without_handler() {
        let mock = MockControlTransport::new();
        assert!(!mock.deliver(&[0x02, 0x00]));
        let received = recording_handler(&mock);
        assert!(mock.deliver(&[0x02, 0x00]));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_remote_disconnects_and_notifies() {
        let mock = MockControlTransport::new();
        mock.set_connected(true);
        assert!(!mock.close_remote());
        assert!(!mock.is_connected());

        mock.set_connected(true);
        let closes = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&closes);
        mock.set_close_handler(Arc::new(move || {
            *counter.lock().unwrap() += 1;
        }));
        assert!(mock.close_remote());
        assert!(!mock.is_connected());
        assert_eq!(*closes.lock().unwrap(), 1);
        assert_eq!(mock.disconnect_calls(), 0);
    }

    #[tokio::test]
    async fn wait_for_sent_observes_other_task() {
        let mock = Arc::new(MockControlTransport::new());
        mock.set_connected(true);

        let sender = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                mock.send(&[0x02, 0x00]).await.unwrap();
            })
        };

        assert!(mock.wait_for_sent(1, Duration::from_secs(2)).await);
        assert!(!mock.wait_for_sent(2, Duration::from_millis(30)).await);
        sender.await.unwrap();
    }
}

//! Mock stream transport.
//!
//! [`MockStreamTransport`] records start/stop calls so tests can assert
//! that the IQ stream is started only after a confirmed start command and
//! never restarted.

use async_trait::async_trait;
use std::sync::Mutex;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::StreamTransport;

#[derive(Debug, Default)]
struct StreamState {
    listening: bool,
    start_calls: usize,
    stop_calls: usize,
    start_error: Option<String>,
}

/// A mock [`StreamTransport`].
#[derive(Debug, Default)]
pub struct MockStreamTransport {
    state: Mutex<StreamState>,
}

impl MockStreamTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `start_listening()` calls fail.
    pub fn fail_start(&self, message: &str) {
        self.lock_state().start_error = Some(message.to_string());
    }

    pub fn start_calls(&self) -> usize {
        self.lock_state().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.lock_state().stop_calls
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StreamTransport for MockStreamTransport {
    async fn start_listening(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.start_calls += 1;
        if let Some(message) = &state.start_error {
            return Err(Error::Transport(message.clone()));
        }
        state.listening = true;
        Ok(())
    }

    fn stop_listening(&self) {
        let mut state = self.lock_state();
        state.stop_calls += 1;
        state.listening = false;
    }

    fn is_listening(&self) -> bool {
        self.lock_state().listening
    }
}

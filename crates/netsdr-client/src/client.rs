//! NetSDR receiver client.
//!
//! [`SdrClient`] drives a receiver over an injected [`ControlTransport`]
//! (TCP port 50000 on real hardware) and switches an injected
//! [`StreamTransport`] (UDP IQ data) on and off. It sends the initialization
//! sequence on connect, starts and stops the IQ stream, and retunes the
//! receiver.
//!
//! NetSDR control messages carry no sequence number, so correlation is
//! positional: the client keeps at most one exchange in flight and treats
//! the next inbound frame as its response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{ControlTransport, StreamTransport};

use crate::codec::{self, ControlItem, DEFAULT_SAMPLE_RATE_HZ, InitCommand};
use crate::state::ClientState;

/// The single pending-exchange slot shared with the inbound frame handler.
type PendingSlot = Arc<Mutex<Option<oneshot::Sender<Vec<u8>>>>>;

/// Options for configuring the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// IQ output sample rate sent during initialization.
    pub sample_rate_hz: u32,
    /// How long to wait for each response. `None` waits indefinitely.
    pub response_timeout: Option<Duration>,
    /// Reject responses that are not an echo of the command's control item.
    pub validate_responses: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            response_timeout: None,
            validate_responses: false,
        }
    }
}

/// NetSDR receiver client.
///
/// All methods take `&self`; share the client across tasks with an `Arc`.
/// Concurrent operations are serialized so that only one command is ever
/// awaiting a response.
pub struct SdrClient {
    control: Arc<dyn ControlTransport>,
    stream: Arc<dyn StreamTransport>,

    /// Resolved by the first inbound frame after a command is sent.
    pending: PendingSlot,

    /// Held for the whole send-and-await cycle of one exchange.
    exchange_lock: tokio::sync::Mutex<()>,

    /// True between a confirmed start and a confirmed stop.
    iq_started: AtomicBool,

    options: ClientOptions,
}

impl SdrClient {
    /// Create a client with default options.
    ///
    /// No I/O happens until [`connect`](SdrClient::connect).
    pub fn new(control: Arc<dyn ControlTransport>, stream: Arc<dyn StreamTransport>) -> Self {
        Self::with_options(control, stream, ClientOptions::default())
    }

    /// Create a client with custom options.
    ///
    /// Registers the client's frame and close handlers on `control`,
    /// replacing any handlers registered before.
    pub fn with_options(
        control: Arc<dyn ControlTransport>,
        stream: Arc<dyn StreamTransport>,
        options: ClientOptions,
    ) -> Self {
        let pending: PendingSlot = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&pending);
        control.set_frame_handler(Arc::new(move |frame| resolve_pending(&slot, frame)));

        let slot = Arc::clone(&pending);
        control.set_close_handler(Arc::new(move || {
            if lock(&slot).take().is_some() {
                tracing::debug!("Pending exchange abandoned: connection lost");
            }
        }));

        SdrClient {
            control,
            stream,
            pending,
            exchange_lock: tokio::sync::Mutex::new(()),
            iq_started: AtomicBool::new(false),
            options,
        }
    }

    /// Open the control connection and initialize the receiver.
    ///
    /// Does nothing if already connected. Otherwise sends the sample rate,
    /// RF filter and A/D mode commands, each one only after the previous
    /// one has been answered. A transport connect failure is returned
    /// before any frame is sent.
    pub async fn connect(&self) -> Result<()> {
        if self.control.is_connected() {
            tracing::trace!("connect: already connected");
            return Ok(());
        }

        let _exchange = self.exchange_lock.lock().await;
        if self.control.is_connected() {
            return Ok(());
        }

        tracing::debug!(
            sample_rate_hz = self.options.sample_rate_hz,
            "Connecting to NetSDR receiver"
        );
        self.control.connect().await?;

        for command in InitCommand::ALL {
            let frame = codec::cmd_init(command, self.options.sample_rate_hz)?;
            self.exchange_locked(command.item(), &frame)
                .await
                .inspect_err(|e| {
                    tracing::warn!(command = ?command, error = %e, "Initialization failed");
                })?;
        }

        tracing::info!("NetSDR receiver initialized");
        Ok(())
    }

    /// Close the control connection.
    ///
    /// Always calls the transport's disconnect, whatever the current state.
    /// A command still waiting for its response fails with
    /// [`Error::ConnectionLost`]. The IQ flag is left as it is.
    pub fn disconnect(&self) {
        tracing::debug!("Disconnecting NetSDR client");
        self.control.disconnect();
        if lock(&self.pending).take().is_some() {
            tracing::debug!("Pending exchange abandoned by disconnect");
        }
    }

    /// Start the IQ stream.
    ///
    /// Does nothing if the stream is already started or the client is not
    /// connected. The stream transport is started only after the receiver
    /// has answered the start command.
    pub async fn start_iq(&self) -> Result<()> {
        if self.iq_started() {
            tracing::trace!("start_iq: already started");
            return Ok(());
        }
        if !self.control.is_connected() {
            tracing::debug!("start_iq ignored: not connected");
            return Ok(());
        }

        let _exchange = self.exchange_lock.lock().await;
        if self.iq_started() || !self.control.is_connected() {
            return Ok(());
        }

        let frame = codec::cmd_start_iq()?;
        self.exchange_locked(ControlItem::ReceiverState, &frame).await?;
        self.set_iq_started(true);
        tracing::info!("IQ stream started");

        self.stream.start_listening().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to start IQ listener");
        })
    }

    /// Stop the IQ stream.
    ///
    /// Does nothing if the stream is not started or the client is not
    /// connected.
    pub async fn stop_iq(&self) -> Result<()> {
        if !self.iq_started() {
            tracing::trace!("stop_iq: not started");
            return Ok(());
        }
        if !self.control.is_connected() {
            tracing::debug!("stop_iq ignored: not connected");
            return Ok(());
        }

        let _exchange = self.exchange_lock.lock().await;
        if !self.iq_started() || !self.control.is_connected() {
            return Ok(());
        }

        let frame = codec::cmd_stop_iq()?;
        self.exchange_locked(ControlItem::ReceiverState, &frame).await?;
        self.set_iq_started(false);
        self.stream.stop_listening();
        tracing::info!("IQ stream stopped");
        Ok(())
    }

    /// Tune `channel` to `frequency_hz`.
    ///
    /// Does nothing if the client is not connected. Frequencies above
    /// [`codec::MAX_FREQUENCY_HZ`] are rejected with
    /// [`Error::InvalidParameter`]. The channel travels as a single byte
    /// in the frequency frame, so it is taken as a `u8`.
    pub async fn change_frequency(&self, frequency_hz: u64, channel: u8) -> Result<()> {
        if !self.control.is_connected() {
            tracing::debug!(frequency_hz, channel, "change_frequency ignored: not connected");
            return Ok(());
        }

        let frame = codec::cmd_set_frequency(frequency_hz, channel)?;
        self.exchange(ControlItem::ReceiverFrequency, &frame).await?;
        tracing::debug!(frequency_hz, channel, "Frequency set");
        Ok(())
    }

    /// Whether the IQ stream has been started.
    pub fn iq_started(&self) -> bool {
        self.iq_started.load(Ordering::SeqCst)
    }

    /// Override the IQ flag without talking to the receiver.
    pub fn set_iq_started(&self, started: bool) {
        self.iq_started.store(started, Ordering::SeqCst);
    }

    /// Current connection/streaming state.
    pub fn state(&self) -> ClientState {
        ClientState::from_flags(self.control.is_connected(), self.iq_started())
    }

    /// The options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn exchange(&self, item: ControlItem, frame: &[u8]) -> Result<Vec<u8>> {
        let _exchange = self.exchange_lock.lock().await;
        self.exchange_locked(item, frame).await
    }

    /// Send `frame` and wait for the next inbound frame.
    ///
    /// The caller must hold `exchange_lock`.
    async fn exchange_locked(&self, item: ControlItem, frame: &[u8]) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        // Registered before sending so a fast response cannot be missed.
        let _slot = PendingGuard::register(&self.pending, tx);

        tracing::trace!(item = ?item, frame = ?frame, "Sending command");
        self.control.send(frame).await?;

        let response = match self.options.response_timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.map_err(|_| {
                tracing::warn!(item = ?item, timeout = ?limit, "No response from receiver");
                Error::Timeout
            })?,
            None => rx.await,
        }
        .map_err(|_| Error::ConnectionLost)?;

        tracing::trace!(item = ?item, response = ?response, "Response received");

        if self.options.validate_responses {
            codec::check_response(item, &response).inspect_err(|e| {
                tracing::warn!(item = ?item, error = %e, "Command rejected");
            })?;
        }
        Ok(response)
    }
}

/// Hand an inbound frame to the waiting exchange, if any.
fn resolve_pending(slot: &Mutex<Option<oneshot::Sender<Vec<u8>>>>, frame: Vec<u8>) {
    let waiter = lock(slot).take();
    match waiter {
        Some(tx) => {
            // The waiter may have timed out in the meantime.
            let _ = tx.send(frame);
        }
        None => {
            tracing::trace!(frame = ?frame, "Unsolicited frame dropped");
        }
    }
}

/// Clears the pending slot when an exchange ends, however it ends.
struct PendingGuard<'a> {
    slot: &'a Mutex<Option<oneshot::Sender<Vec<u8>>>>,
}

impl<'a> PendingGuard<'a> {
    fn register(
        slot: &'a Mutex<Option<oneshot::Sender<Vec<u8>>>>,
        tx: oneshot::Sender<Vec<u8>>,
    ) -> Self {
        *lock(slot) = Some(tx);
        PendingGuard { slot }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.slot).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

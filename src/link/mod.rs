//! Device link: public handle, configuration, and event loop.
//!
//! A [`Link`] owns one persistent WebSocket session to a device. Internally
//! it spawns a tokio event-loop task that handles:
//!
//! - Connection attempts and exponential-backoff reconnection
//! - Flushing the outbound queue as single batch frames
//! - Decoding inbound batches and routing them to pins or peripherals
//!
//! The handle is cheap to clone; all clones drive the same session. Pin and
//! peripheral calls never fail on connection trouble — commands queue while
//! the link is down and flush in FIFO order once it reopens. Callers observe
//! connection health by polling [`Link::status`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::clock::{SharedClock, SystemClock};
use crate::error::{Error, Result};
use crate::peripheral::{
    MessageHandler, PeripheralInfo, PeripheralTable, PixelStrip, Servo, Ultrasonic,
};
use crate::protocol::defs::{
    ANALOG_READ, ANALOG_WRITE, DEVICE_PORT, DIGITAL_READ, DIGITAL_WRITE, END, PIN_MODE,
    RESERVED_START,
};
use crate::protocol::{BatchFrame, CommandDescriptor, PinMode};
use crate::session::reconnect::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::session::{
    ConnectionState, EventRegistry, OutboundQueue, ReconnectDecision, Reconnector, decode_frame,
    route_frame,
};
use crate::transport::{self, WsSink, WsStream};

// ============================================================================
// Constants
// ============================================================================

/// Default minimum milliseconds between throttled writes to one channel.
const DEFAULT_WRITE_INTERVAL_MS: u64 = 100;

/// Default interval for periodic input reads.
const DEFAULT_READ_INTERVAL_MS: u64 = 200;

/// Default analog-write change threshold.
const DEFAULT_ANALOG_THRESHOLD: f64 = 2.0;

// ============================================================================
// LinkConfig
// ============================================================================

/// Resolved link configuration.
#[derive(Debug, Clone)]
pub(crate) struct LinkConfig {
    pub endpoint: Url,
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub write_interval_ms: u64,
    pub read_interval_ms: u64,
}

// ============================================================================
// LinkStatus
// ============================================================================

/// Poll-only snapshot of connection health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Current connection lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Configured attempt limit.
    pub max_reconnect_attempts: u32,
    /// Device endpoint the link targets.
    pub endpoint: Url,
}

impl LinkStatus {
    /// Returns `true` if the link is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns `true` once reconnection attempts are exhausted; only a
    /// manual [`Link::reconnect`] call resumes.
    #[inline]
    #[must_use]
    pub fn is_dormant(&self) -> bool {
        self.state == ConnectionState::Disconnected
            && self.reconnect_attempts >= self.max_reconnect_attempts
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// State shared between handle clones and the event loop.
pub(crate) struct Shared {
    pub registry: Mutex<EventRegistry>,
    pub peripherals: Mutex<PeripheralTable>,
    status: Mutex<StatusInner>,
}

#[derive(Debug, Clone, Copy)]
struct StatusInner {
    state: ConnectionState,
    attempts: u32,
}

// ============================================================================
// LinkCommand
// ============================================================================

/// Internal commands for the event loop.
enum LinkCommand {
    /// Append descriptors to the outbound queue (and flush if connected).
    Enqueue(Vec<CommandDescriptor>),
    /// Manual reconnect: reset the attempt counter and connect immediately.
    Reconnect,
    /// Manual disconnect: close and suppress automatic reconnection.
    Disconnect,
    /// Tear the session down for good.
    Shutdown,
}

// ============================================================================
// LinkBuilder
// ============================================================================

/// Builder for configuring and opening a [`Link`].
///
/// # Example
///
/// ```no_run
/// use boardlink::Link;
///
/// # fn example() -> boardlink::Result<()> {
/// let link = Link::builder()
///     .host("192.168.1.50")
///     .max_reconnect_attempts(5)
///     .connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    host: Option<String>,
    port: u16,
    max_reconnect_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    write_interval_ms: u64,
    read_interval_ms: u64,
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self {
            host: None,
            port: DEVICE_PORT,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            write_interval_ms: DEFAULT_WRITE_INTERVAL_MS,
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
        }
    }
}

impl LinkBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the device host or IP address (required).
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Overrides the device port. The firmware default is 81.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the reconnection attempt limit (default 10).
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the backoff base delay (default 1s).
    #[inline]
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff delay cap (default 30s).
    #[inline]
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the default throttle interval for writes (default 100ms).
    #[inline]
    #[must_use]
    pub fn write_interval_ms(mut self, interval_ms: u64) -> Self {
        self.write_interval_ms = interval_ms;
        self
    }

    /// Sets the default interval for periodic reads (default 200ms).
    #[inline]
    #[must_use]
    pub fn read_interval_ms(mut self, interval_ms: u64) -> Self {
        self.read_interval_ms = interval_ms;
        self
    }

    /// Validates the configuration and opens the link.
    ///
    /// Returns immediately; the first connection attempt (and any
    /// reconnection) happens on the spawned event loop. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the host is missing or malformed.
    /// Connection failures are never returned here — poll
    /// [`Link::status`].
    pub fn connect(self) -> Result<Link> {
        self.connect_with_clock(Arc::new(SystemClock))
    }

    /// As [`connect`](Self::connect), with an injected clock for the
    /// throttle gates.
    pub fn connect_with_clock(self, clock: SharedClock) -> Result<Link> {
        let host = self
            .host
            .ok_or_else(|| Error::config("device host is required. Use .host() to set it."))?;

        let mut endpoint = transport::endpoint_url(&host)?;
        if self.port != DEVICE_PORT {
            endpoint
                .set_port(Some(self.port))
                .map_err(|()| Error::config(format!("invalid port {}", self.port)))?;
        }

        let config = Arc::new(LinkConfig {
            endpoint,
            max_reconnect_attempts: self.max_reconnect_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            write_interval_ms: self.write_interval_ms,
            read_interval_ms: self.read_interval_ms,
        });

        Ok(Link::open(config, clock))
    }
}

// ============================================================================
// Link
// ============================================================================

/// Handle to one device session.
///
/// Cloning is cheap; all clones share the queue, registry, and connection.
#[derive(Clone)]
pub struct Link {
    command_tx: mpsc::UnboundedSender<LinkCommand>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) clock: SharedClock,
    config: Arc<LinkConfig>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("endpoint", &self.config.endpoint.as_str())
            .finish()
    }
}

impl Link {
    /// Returns a builder for configuring a link.
    #[inline]
    #[must_use]
    pub fn builder() -> LinkBuilder {
        LinkBuilder::new()
    }

    /// Opens a link to a device host with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a malformed host.
    pub fn connect(host: impl Into<String>) -> Result<Self> {
        Self::builder().host(host).connect()
    }

    fn open(config: Arc<LinkConfig>, clock: SharedClock) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            registry: Mutex::new(EventRegistry::new(clock.clone())),
            peripherals: Mutex::new(PeripheralTable::new()),
            status: Mutex::new(StatusInner {
                state: ConnectionState::Disconnected,
                attempts: 0,
            }),
        });

        let event_loop = EventLoop {
            config: config.clone(),
            command_rx,
            shared: shared.clone(),
            queue: OutboundQueue::new(),
            reconnector: Reconnector::new(
                config.max_reconnect_attempts,
                config.base_delay,
                config.max_delay,
            ),
        };

        tokio::spawn(event_loop.run());

        Self {
            command_tx,
            shared,
            clock,
            config,
        }
    }

    // ========================================================================
    // Status & lifecycle
    // ========================================================================

    /// Snapshot of connection health.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        let inner = *self.shared.status.lock();
        LinkStatus {
            state: inner.state,
            reconnect_attempts: inner.attempts,
            max_reconnect_attempts: self.config.max_reconnect_attempts,
            endpoint: self.config.endpoint.clone(),
        }
    }

    /// Returns `true` if the link is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Closes the connection and disables automatic reconnection until
    /// [`reconnect`](Self::reconnect) is called.
    pub fn disconnect(&self) {
        self.command(LinkCommand::Disconnect);
    }

    /// Resets the attempt counter and reconnects immediately, regardless of
    /// any pending backoff.
    pub fn reconnect(&self) {
        self.command(LinkCommand::Reconnect);
    }

    /// Tears the session down. Further calls on any clone are no-ops.
    pub fn shutdown(&self) {
        self.command(LinkCommand::Shutdown);
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Enqueues one command descriptor.
    ///
    /// Descriptors flush in strict FIFO order as soon as the link is
    /// connected; while it is down they wait in the queue.
    pub fn enqueue(&self, descriptor: CommandDescriptor) {
        self.command(LinkCommand::Enqueue(vec![descriptor]));
    }

    /// Enqueues a sequence of descriptors, preserving their relative order.
    pub fn enqueue_batch(&self, descriptors: Vec<CommandDescriptor>) {
        if !descriptors.is_empty() {
            self.command(LinkCommand::Enqueue(descriptors));
        }
    }

    fn command(&self, command: LinkCommand) {
        if self.command_tx.send(command).is_err() {
            trace!("Event loop gone; command dropped");
        }
    }

    // ========================================================================
    // Pin API
    // ========================================================================

    /// Configures a pin's mode.
    ///
    /// Clears any registered events for the pin so stale throttle state
    /// cannot suppress writes after a mode change.
    pub fn pin_mode(&self, pin: u16, mode: PinMode) {
        self.shared.registry.lock().end(pin);
        self.enqueue(CommandDescriptor::new(pin, PIN_MODE, vec![mode.code()]));
    }

    /// Writes a digital value (0 or 1) with default throttling.
    pub fn digital_write(&self, pin: u16, value: u8) {
        self.digital_write_throttled(pin, value, self.config.write_interval_ms, 0.0);
    }

    /// Writes a digital value with an explicit throttle interval and
    /// threshold.
    ///
    /// The value is transmitted only when the throttle interval has elapsed
    /// and it differs from the last sent value (or nothing was sent yet).
    pub fn digital_write_throttled(&self, pin: u16, value: u8, interval_ms: u64, threshold: f64) {
        let admitted = self.shared.registry.lock().admit_write(
            pin,
            DIGITAL_WRITE,
            interval_ms,
            threshold,
            f64::from(value),
        );

        if admitted {
            self.enqueue(CommandDescriptor::new(
                pin,
                DIGITAL_WRITE,
                vec![i64::from(value)],
            ));
        }
    }

    /// Writes an analog value with default throttling (threshold 2).
    pub fn analog_write(&self, pin: u16, value: f64) {
        self.analog_write_throttled(
            pin,
            value,
            self.config.write_interval_ms,
            DEFAULT_ANALOG_THRESHOLD,
        );
    }

    /// Writes an analog value with an explicit throttle interval and change
    /// threshold.
    ///
    /// The value is rounded to an integer before gating; it is transmitted
    /// only when the interval has elapsed and the change exceeds the
    /// threshold.
    pub fn analog_write_throttled(&self, pin: u16, value: f64, interval_ms: u64, threshold: f64) {
        let rounded = value.round();
        let admitted = self.shared.registry.lock().admit_write(
            pin,
            ANALOG_WRITE,
            interval_ms,
            threshold,
            rounded,
        );

        if admitted {
            self.enqueue(CommandDescriptor::new(
                pin,
                ANALOG_WRITE,
                vec![rounded as i64],
            ));
        }
    }

    /// Reads a digital input, subscribing at the default interval.
    ///
    /// The first call for a pin sends the subscribe command; every call
    /// returns the latest value pushed by the device (0 before the first
    /// reading arrives).
    #[must_use]
    pub fn digital_read(&self, pin: u16) -> u8 {
        self.digital_read_every(pin, self.config.read_interval_ms)
    }

    /// Reads a digital input with an explicit reporting interval.
    #[must_use]
    pub fn digital_read_every(&self, pin: u16, interval_ms: u64) -> u8 {
        let (subscribe, value) = {
            let mut registry = self.shared.registry.lock();
            let subscribe = registry.admit_read(pin, DIGITAL_READ, interval_ms);
            (subscribe, registry.value(pin, DIGITAL_READ))
        };

        if subscribe {
            self.enqueue(CommandDescriptor::new(
                pin,
                DIGITAL_READ,
                vec![interval_ms as i64],
            ));
        }

        u8::from(value.unwrap_or(0.0) != 0.0)
    }

    /// Reads an analog input, subscribing at the default interval.
    #[must_use]
    pub fn analog_read(&self, pin: u16) -> f64 {
        self.analog_read_every(pin, self.config.read_interval_ms)
    }

    /// Reads an analog input with an explicit reporting interval.
    #[must_use]
    pub fn analog_read_every(&self, pin: u16, interval_ms: u64) -> f64 {
        let (subscribe, value) = {
            let mut registry = self.shared.registry.lock();
            let subscribe = registry.admit_read(pin, ANALOG_READ, interval_ms);
            (subscribe, registry.value(pin, ANALOG_READ))
        };

        if subscribe {
            self.enqueue(CommandDescriptor::new(
                pin,
                ANALOG_READ,
                vec![interval_ms as i64],
            ));
        }

        value.unwrap_or(0.0)
    }

    /// Stops all periodic activity on a pin.
    ///
    /// Removes every registration kind for the pin and tells the device to
    /// stop reporting it.
    pub fn end(&self, pin: u16) {
        let removed = self.shared.registry.lock().end(pin);
        debug!(pin, removed, "Stopped periodic activity");
        self.enqueue(CommandDescriptor::new(pin, END, Vec::new()));
    }

    // ========================================================================
    // Peripherals
    // ========================================================================

    /// Attaches a servo under a name and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralExists`] if the name is taken.
    pub fn add_servo(&self, name: impl Into<String>) -> Result<Servo> {
        Servo::register(self.clone(), name.into())
    }

    /// Attaches a pixel strip under a name and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralExists`] if the name is taken.
    pub fn add_pixel_strip(&self, name: impl Into<String>) -> Result<PixelStrip> {
        PixelStrip::register(self.clone(), name.into())
    }

    /// Attaches an ultrasonic sensor under a name and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralExists`] if the name is taken.
    pub fn add_ultrasonic(&self, name: impl Into<String>) -> Result<Ultrasonic> {
        Ultrasonic::register(self.clone(), name.into())
    }

    /// Lists attached peripherals, sorted by logical id.
    #[must_use]
    pub fn peripherals(&self) -> Vec<PeripheralInfo> {
        self.shared.peripherals.lock().list()
    }

    /// Registers a custom peripheral handler and returns its logical id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralExists`] if the name is taken.
    pub fn add_peripheral(
        &self,
        name: impl Into<String>,
        device_type: u16,
        handler: Box<dyn MessageHandler>,
    ) -> Result<u16> {
        if device_type < RESERVED_START {
            return Err(Error::invalid_argument(format!(
                "device type {device_type} is below the reserved range ({RESERVED_START}+)"
            )));
        }

        let name = name.into();
        let logical_id = self
            .shared
            .peripherals
            .lock()
            .register(name.clone(), device_type, handler)?;

        info!(name, device_type, logical_id, "Peripheral registered");
        Ok(logical_id)
    }

    /// Default interval for periodic reads, used by peripheral handles.
    #[inline]
    pub(crate) fn default_read_interval_ms(&self) -> u64 {
        self.config.read_interval_ms
    }
}

// ============================================================================
// Event loop
// ============================================================================

/// Outcome of a connected session.
enum SessionEnd {
    /// Connection lost; enter backoff.
    Lost,
    /// Manual reconnect requested.
    ConnectNow,
    /// Manual disconnect; go dormant.
    Dormant,
    /// Shut the loop down.
    Shutdown,
}

/// Outcome of a backoff wait.
enum WaitOutcome {
    Elapsed,
    ConnectNow,
    Dormant,
    Shutdown,
}

/// Outcome of the dormant state.
enum DormantEnd {
    Resume,
    Shutdown,
}

struct EventLoop {
    config: Arc<LinkConfig>,
    command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    shared: Arc<Shared>,
    queue: OutboundQueue,
    reconnector: Reconnector,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            self.reconnector.on_connecting();
            self.publish_status();

            match transport::connect(&self.config.endpoint).await {
                Ok(stream) => {
                    self.reconnector.on_open();
                    self.publish_status();
                    info!(endpoint = %self.config.endpoint, "Device connected");

                    match self.connected_session(stream).await {
                        SessionEnd::Lost => {}
                        SessionEnd::ConnectNow => continue,
                        SessionEnd::Dormant => match self.dormant().await {
                            DormantEnd::Resume => continue,
                            DormantEnd::Shutdown => return,
                        },
                        SessionEnd::Shutdown => return,
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Connection attempt failed");
                }
            }

            match self.reconnector.on_closed() {
                ReconnectDecision::Retry(delay) => {
                    self.publish_status();
                    warn!(
                        attempt = self.reconnector.attempts(),
                        max = self.reconnector.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );

                    match self.backoff_wait(delay).await {
                        WaitOutcome::Elapsed | WaitOutcome::ConnectNow => {}
                        WaitOutcome::Dormant => match self.dormant().await {
                            DormantEnd::Resume => {}
                            DormantEnd::Shutdown => return,
                        },
                        WaitOutcome::Shutdown => return,
                    }
                }
                ReconnectDecision::GiveUp => {
                    error!(
                        max = self.reconnector.max_attempts(),
                        "Reconnection attempts exhausted; link dormant"
                    );
                    self.publish_status();

                    match self.dormant().await {
                        DormantEnd::Resume => {}
                        DormantEnd::Shutdown => return,
                    }
                }
            }
        }
    }

    /// Drives one open connection until it ends.
    async fn connected_session(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        // Commands that arrived while the handshake was in flight are still
        // sitting in the channel; pull them in so they join the first flush.
        loop {
            match self.command_rx.try_recv() {
                Ok(LinkCommand::Enqueue(descriptors)) => self.queue.enqueue(descriptors),
                Ok(LinkCommand::Reconnect) => {
                    self.reconnector.reset();
                    transport::close(&mut sink).await;
                    return SessionEnd::ConnectNow;
                }
                Ok(LinkCommand::Disconnect) => {
                    self.reconnector.force_dormant();
                    transport::close(&mut sink).await;
                    return SessionEnd::Dormant;
                }
                Ok(LinkCommand::Shutdown) => {
                    transport::close(&mut sink).await;
                    return SessionEnd::Shutdown;
                }
                Err(_) => break,
            }
        }

        // Exactly one flush on the transition into Connected.
        self.flush(&mut sink).await;

        loop {
            tokio::select! {
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_inbound(&text),

                    Some(Ok(Message::Close(_))) => {
                        debug!("Connection closed by device");
                        return SessionEnd::Lost;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        return SessionEnd::Lost;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        return SessionEnd::Lost;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                },

                command = self.command_rx.recv() => match command {
                    Some(LinkCommand::Enqueue(descriptors)) => {
                        self.queue.enqueue(descriptors);
                        self.flush(&mut sink).await;
                    }

                    Some(LinkCommand::Reconnect) => {
                        self.reconnector.reset();
                        transport::close(&mut sink).await;
                        return SessionEnd::ConnectNow;
                    }

                    Some(LinkCommand::Disconnect) => {
                        self.reconnector.force_dormant();
                        transport::close(&mut sink).await;
                        info!("Manually disconnected; auto-reconnect disabled");
                        return SessionEnd::Dormant;
                    }

                    Some(LinkCommand::Shutdown) | None => {
                        transport::close(&mut sink).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }

    /// Drains the queue into one batch frame and sends it.
    ///
    /// A failed send restores the snapshot to the head of the queue, ahead
    /// of anything enqueued during the attempt, so the next flush retries it
    /// in original order.
    async fn flush(&mut self, sink: &mut WsSink) {
        let Some(snapshot) = self.queue.begin_flush() else {
            return;
        };

        let frame = BatchFrame::new(snapshot);
        match transport::send_frame(sink, &frame).await {
            Ok(()) => {
                trace!(descriptors = frame.len(), "Outbound batch flushed");
            }
            Err(e) => {
                warn!(error = %e, descriptors = frame.len(), "Flush failed; batch requeued");
                self.queue.restore_front(frame.data);
            }
        }

        self.queue.finish_flush();
    }

    /// Decodes and routes one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    fn handle_inbound(&self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropped malformed inbound frame");
                return;
            }
        };

        let mut registry = self.shared.registry.lock();
        let mut peripherals = self.shared.peripherals.lock();
        let summary = route_frame(&frame, &mut registry, &mut peripherals);

        trace!(
            pin_updates = summary.pin_updates,
            delivered = summary.delivered,
            unmatched = summary.unmatched,
            "Inbound batch routed"
        );
    }

    /// Waits out a backoff delay, still servicing commands.
    ///
    /// Only one reconnect timer is ever pending: a manual reconnect or
    /// disconnect cancels it by returning from this wait.
    async fn backoff_wait(&mut self, delay: Duration) -> WaitOutcome {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return WaitOutcome::Elapsed,

                command = self.command_rx.recv() => match command {
                    Some(LinkCommand::Enqueue(descriptors)) => {
                        self.queue.enqueue(descriptors);
                    }
                    Some(LinkCommand::Reconnect) => {
                        self.reconnector.reset();
                        return WaitOutcome::ConnectNow;
                    }
                    Some(LinkCommand::Disconnect) => {
                        self.reconnector.force_dormant();
                        self.publish_status();
                        return WaitOutcome::Dormant;
                    }
                    Some(LinkCommand::Shutdown) | None => return WaitOutcome::Shutdown,
                }
            }
        }
    }

    /// Dormant state: no automatic attempts; wakes only for a manual
    /// reconnect or shutdown. Enqueued descriptors keep accumulating.
    async fn dormant(&mut self) -> DormantEnd {
        loop {
            match self.command_rx.recv().await {
                Some(LinkCommand::Enqueue(descriptors)) => {
                    self.queue.enqueue(descriptors);
                }
                Some(LinkCommand::Reconnect) => {
                    self.reconnector.reset();
                    self.publish_status();
                    return DormantEnd::Resume;
                }
                Some(LinkCommand::Disconnect) => {}
                Some(LinkCommand::Shutdown) | None => return DormantEnd::Shutdown,
            }
        }
    }

    fn publish_status(&self) {
        *self.shared.status.lock() = StatusInner {
            state: self.reconnector.state(),
            attempts: self.reconnector.attempts(),
        };
    }
}

// ============================================================================
// Tests
// ============================================================================

//! # BLE Session
//!
//! State machine owning the single active peripheral connection.
//!
//! ```text
//! Idle --scan--> Scanning --> DevicesFound --select--> (address bound)
//!   --list_characteristics--> ListingCharacteristics --> CharacteristicsFound
//!   --subscribe--> Subscribed | ReadingWindow
//!   --stop | window elapsed--> Disconnected
//!   --connection lost--> Error
//! Error | Disconnected --scan--> Scanning (buffer cleared)
//! ```
//!
//! Transitions take `&mut self`, so they are serialized by ownership.
//! Notifications are handled on a spawned task that only decodes and pushes
//! into the shared [`TelemetryFeed`]; renderers read it through a
//! [`TelemetryView`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::directory::{CharacteristicDescriptor, DeviceDirectory, DiscoveredDevice};
use super::stack::{BleConnection, BleStack, NotificationEvent, NotificationReceiver};
use crate::error::{ConnectionError, MonitorError, Result};
use crate::telemetry::{BufferPolicy, DecodeMode, TelemetryFeed, TelemetryView};

/// Default collection window for [`SubscriptionPolicy::TimedWindow`]
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Default discovery duration
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on connect + characteristic listing
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a subscription stays open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPolicy {
    /// Collect for a fixed duration, then unsubscribe and disconnect
    TimedWindow(Duration),
    /// Collect until [`BleSession::stop`] or the link drops
    Continuous,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        SubscriptionPolicy::TimedWindow(DEFAULT_WINDOW)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    DevicesFound,
    ListingCharacteristics,
    CharacteristicsFound,
    /// Continuous subscription active
    Subscribed,
    /// Timed window subscription active
    ReadingWindow,
    Disconnected,
    /// Terminal failure for this session; recover with a new scan
    Error(String),
}

impl SessionState {
    /// True while notifications are being delivered
    pub fn is_subscribed(&self) -> bool {
        matches!(self, SessionState::Subscribed | SessionState::ReadingWindow)
    }

    /// True while a one-shot operation is in flight
    fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Scanning | SessionState::ListingCharacteristics
        ) || self.is_subscribed()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error(reason) => write!(f, "Error({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Session-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub decode_mode: DecodeMode,
    pub buffer_policy: BufferPolicy,
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            decode_mode: DecodeMode::FixedQuad,
            buffer_policy: BufferPolicy::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Why a subscription ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEnd {
    WindowElapsed,
    Stopped,
    ConnectionLost(String),
}

/// Unsubscribe + disconnect, run at most once per subscription
struct Release {
    connection: Arc<dyn BleConnection>,
    uuid: String,
    done: AtomicBool,
}

impl Release {
    fn new(connection: Arc<dyn BleConnection>, uuid: String) -> Arc<Self> {
        Arc::new(Self {
            connection,
            uuid,
            done: AtomicBool::new(false),
        })
    }

    /// Unsubscribe and disconnect; later calls are no-ops
    async fn release(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        let address = self.connection.address();
        if let Err(e) = self.connection.stop_notify(&self.uuid).await {
            warn!(%address, uuid = %self.uuid, error = %e, "stop_notify failed");
        }
        if let Err(e) = self.connection.disconnect().await {
            warn!(%address, error = %e, "disconnect failed");
        }
        info!(%address, uuid = %self.uuid, "subscription released");
    }
}

struct ActiveSubscription {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<SubscriptionEnd>,
    release: Arc<Release>,
}

/// The single active BLE session
pub struct BleSession<S: BleStack> {
    stack: S,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionState>>,
    directory: DeviceDirectory,
    selected: Option<DiscoveredDevice>,
    connection: Option<Arc<dyn BleConnection>>,
    subscription: Option<ActiveSubscription>,
    feed: Arc<TelemetryFeed>,
}

impl<S: BleStack> BleSession<S> {
    pub fn new(stack: S, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let feed = TelemetryFeed::new(config.buffer_policy, config.decode_mode);

        Self {
            stack,
            config,
            state: Arc::new(state),
            directory: DeviceDirectory::default(),
            selected: None,
            connection: None,
            subscription: None,
            feed,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Read handle on the telemetry buffer
    pub fn telemetry(&self) -> TelemetryView {
        self.feed.view()
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub fn selected(&self) -> Option<&DiscoveredDevice> {
        self.selected.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one discovery pass
    ///
    /// Starting a scan resets the session: any previous connection is
    /// dropped and the telemetry buffer is cleared. An empty result is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A scan, listing or subscription is still in progress
    /// - The adapter is unavailable (session moves to `Error`)
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>> {
        self.require("scan", |s| !s.is_busy())?;
        // A subscription that ended on its own still needs joining
        self.reap().await;

        self.reset().await;
        self.transition(SessionState::Scanning);

        match self.stack.discover(self.config.scan_timeout).await {
            Ok(devices) => {
                info!(count = devices.len(), "scan complete");
                for device in &devices {
                    debug!(%device, "discovered");
                }
                self.directory = DeviceDirectory::new(devices.clone());
                self.transition(SessionState::DevicesFound);
                Ok(devices)
            }
            Err(e) => {
                error!(error = %e, "scan failed");
                self.transition(SessionState::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Bind the session to a discovered device by address
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if the address was not in the last scan;
    /// the session stays in `DevicesFound`.
    pub fn select(&mut self, address: &str) -> Result<&DiscoveredDevice> {
        self.require("select a device", |s| *s == SessionState::DevicesFound)?;

        let device = self
            .directory
            .find_by_address(address)
            .cloned()
            .ok_or_else(|| MonitorError::DeviceNotFound {
                target: address.to_string(),
            })?;
        Ok(self.bind(device))
    }

    /// Bind the session to the first device whose name contains `name`
    pub fn select_by_name(&mut self, name: &str) -> Result<&DiscoveredDevice> {
        self.require("select a device", |s| *s == SessionState::DevicesFound)?;

        let device = self
            .directory
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| MonitorError::DeviceNotFound {
                target: name.to_string(),
            })?;
        Ok(self.bind(device))
    }

    fn bind(&mut self, device: DiscoveredDevice) -> &DiscoveredDevice {
        info!(%device, "device selected");
        self.selected.insert(device)
    }

    /// Connect to the selected device and enumerate its characteristics
    ///
    /// # Errors
    ///
    /// Returns error if no device is selected, or if connecting or listing
    /// fails (session moves to `Error`).
    pub async fn list_characteristics(&mut self) -> Result<Vec<CharacteristicDescriptor>> {
        self.require("list characteristics", |s| *s == SessionState::DevicesFound)?;
        let address = match &self.selected {
            Some(device) => device.address.clone(),
            None => {
                return Err(MonitorError::InvalidState {
                    operation: "list characteristics",
                    state: "DevicesFound without a selected device".to_string(),
                })
            }
        };

        self.transition(SessionState::ListingCharacteristics);

        match self.connect_and_list(&address).await {
            Ok((connection, characteristics)) => {
                info!(%address, count = characteristics.len(), "characteristics listed");
                self.directory
                    .record_characteristics(&address, characteristics.clone());
                self.connection = Some(connection);
                self.transition(SessionState::CharacteristicsFound);
                Ok(characteristics)
            }
            Err(e) => {
                error!(%address, error = %e, "characteristic listing failed");
                self.transition(SessionState::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    async fn connect_and_list(
        &self,
        address: &str,
    ) -> std::result::Result<
        (Arc<dyn BleConnection>, Vec<CharacteristicDescriptor>),
        ConnectionError,
    > {
        let timeout = self.config.connect_timeout;
        let timed_out = || ConnectionError::Timeout {
            address: address.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let connection = tokio::time::timeout(timeout, self.connect(address))
            .await
            .map_err(|_| timed_out())??;

        let listed = tokio::time::timeout(timeout, connection.list_characteristics()).await;
        match listed {
            Ok(Ok(characteristics)) => Ok((connection, characteristics)),
            Ok(Err(e)) => {
                disconnect_logged(connection.as_ref()).await;
                Err(e)
            }
            Err(_) => {
                disconnect_logged(connection.as_ref()).await;
                Err(timed_out())
            }
        }
    }

    /// Open a connection and confirm the peripheral reports it as connected
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Refused` if the stack rejects the connection
    /// or the peripheral does not report connected afterwards.
    pub async fn connect(
        &self,
        address: &str,
    ) -> std::result::Result<Arc<dyn BleConnection>, ConnectionError> {
        info!(%address, "connecting");
        let connection = self.stack.connect(address).await?;

        if !connection.is_connected().await? {
            return Err(ConnectionError::Refused {
                address: address.to_string(),
                reason: "peripheral did not report connected".to_string(),
            });
        }

        info!(%address, "connected");
        Ok(connection)
    }

    /// Start delivering notifications from `uuid` into the telemetry buffer
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Characteristics have not been listed
    /// - `uuid` was not listed or cannot notify
    /// - Enabling notifications fails (session moves to `Error`)
    pub async fn subscribe(&mut self, uuid: &str, policy: SubscriptionPolicy) -> Result<()> {
        self.require("subscribe", |s| *s == SessionState::CharacteristicsFound)?;
        let connection = match &self.connection {
            Some(connection) => Arc::clone(connection),
            None => {
                return Err(MonitorError::InvalidState {
                    operation: "subscribe",
                    state: "CharacteristicsFound without a connection".to_string(),
                })
            }
        };
        let address = connection.address().to_string();

        let descriptor = self
            .directory
            .characteristic(&address, uuid)
            .cloned()
            .ok_or_else(|| MonitorError::CharacteristicNotFound {
                address: address.clone(),
                uuid: uuid.to_string(),
            })?;
        if !descriptor.can_notify() {
            return Err(MonitorError::NotNotifiable {
                address,
                uuid: descriptor.uuid,
            });
        }

        let events = match connection.start_notify(&descriptor.uuid).await {
            Ok(events) => events,
            Err(e) => {
                error!(%address, uuid = %descriptor.uuid, error = %e, "start_notify failed");
                disconnect_logged(connection.as_ref()).await;
                self.connection = None;
                self.transition(SessionState::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let release = Release::new(Arc::clone(&connection), descriptor.uuid.clone());
        let (stop_tx, stop_rx) = oneshot::channel();
        let delivery = Delivery {
            address: address.clone(),
            events,
            stop_rx,
            policy,
            feed: Arc::clone(&self.feed),
            state: Arc::clone(&self.state),
            release: Arc::clone(&release),
        };
        let task = tokio::spawn(delivery.run());

        self.subscription = Some(ActiveSubscription {
            stop_tx: Some(stop_tx),
            task,
            release,
        });

        info!(%address, uuid = %descriptor.uuid, ?policy, "subscribed");
        self.transition(match policy {
            SubscriptionPolicy::TimedWindow(_) => SessionState::ReadingWindow,
            SubscriptionPolicy::Continuous => SessionState::Subscribed,
        });
        Ok(())
    }

    /// Stop the active subscription
    ///
    /// Unsubscribes, disconnects and moves to `Disconnected`. Safe to call
    /// repeatedly and after a window has already elapsed; returns the
    /// resulting state.
    pub async fn stop(&mut self) -> SessionState {
        if let Some(subscription) = self.subscription.as_mut() {
            if let Some(stop_tx) = subscription.stop_tx.take() {
                let _ = stop_tx.send(());
            }
        }
        self.reap().await;
        self.state()
    }

    /// Wait for the active subscription to end on its own
    ///
    /// Under `TimedWindow` this returns once the window has elapsed. Returns
    /// `None` if nothing was subscribed.
    ///
    /// Cancel safe: dropping the future leaves the subscription in place, so
    /// it can be raced against a shutdown signal and followed by [`stop`].
    ///
    /// [`stop`]: BleSession::stop
    pub async fn wait(&mut self) -> Option<SubscriptionEnd> {
        let end = self.reap().await;
        if end.is_some() {
            debug!(state = %self.state(), "subscription ended");
        }
        end
    }

    /// Join a finished (or stopping) subscription task and drop the link
    async fn reap(&mut self) -> Option<SubscriptionEnd> {
        let joined = (&mut self.subscription.as_mut()?.task).await;
        let subscription = self.subscription.take()?;

        let end = match joined {
            Ok(end) => end,
            Err(e) => {
                error!(error = %e, "notification task failed");
                subscription.release.release().await;
                self.transition(SessionState::Disconnected);
                SubscriptionEnd::Stopped
            }
        };

        // No-op unless the task died before releasing
        subscription.release.release().await;
        self.connection = None;
        Some(end)
    }

    /// Forget the previous device and telemetry before a new scan
    async fn reset(&mut self) {
        if let Some(connection) = self.connection.take() {
            disconnect_logged(connection.as_ref()).await;
        }
        self.selected = None;
        self.directory = DeviceDirectory::default();
        self.feed.reset();
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: impl Fn(&SessionState) -> bool,
    ) -> Result<()> {
        let state = self.state();
        if allowed(&state) {
            Ok(())
        } else {
            Err(MonitorError::InvalidState {
                operation,
                state: state.to_string(),
            })
        }
    }

    fn transition(&self, next: SessionState) {
        transition(&self.state, next);
    }
}

impl<S: BleStack> Drop for BleSession<S> {
    fn drop(&mut self) {
        // Dropping the stop sender ends the delivery task, which releases
        // the subscription on its way out.
        if let Some(subscription) = self.subscription.as_mut() {
            if let Some(stop_tx) = subscription.stop_tx.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}

fn transition(state: &watch::Sender<SessionState>, next: SessionState) {
    state.send_modify(|current| {
        if *current != next {
            debug!(from = %current, to = %next, "session state");
            *current = next;
        }
    });
}

/// Notification delivery task
struct Delivery {
    address: String,
    events: NotificationReceiver,
    stop_rx: oneshot::Receiver<()>,
    policy: SubscriptionPolicy,
    feed: Arc<TelemetryFeed>,
    state: Arc<watch::Sender<SessionState>>,
    release: Arc<Release>,
}

impl Delivery {
    async fn run(mut self) -> SubscriptionEnd {
        let policy = self.policy;
        let window = async move {
            match policy {
                SubscriptionPolicy::TimedWindow(duration) => tokio::time::sleep(duration).await,
                SubscriptionPolicy::Continuous => std::future::pending().await,
            }
        };
        tokio::pin!(window);

        let end = loop {
            tokio::select! {
                biased;

                // A dropped sender means the session is gone; stop as well
                _ = &mut self.stop_rx => break SubscriptionEnd::Stopped,

                _ = &mut window => break SubscriptionEnd::WindowElapsed,

                event = self.events.recv() => match event {
                    Some(NotificationEvent::Value(value)) => {
                        // Decode failures are counted and logged by the feed
                        let _ = self.feed.ingest(&value);
                    }
                    Some(NotificationEvent::Disconnected(reason)) => {
                        break SubscriptionEnd::ConnectionLost(reason);
                    }
                    None => {
                        break SubscriptionEnd::ConnectionLost(
                            "notification stream closed".to_string(),
                        );
                    }
                },
            }
        };

        match &end {
            SubscriptionEnd::WindowElapsed | SubscriptionEnd::Stopped => {
                self.drain();
                info!(address = %self.address, ?end, "subscription ending");
                self.release.release().await;
                transition(&self.state, SessionState::Disconnected);
            }
            SubscriptionEnd::ConnectionLost(reason) => {
                let err = ConnectionError::Lost {
                    address: self.address.clone(),
                    reason: reason.clone(),
                };
                error!(error = %err, "subscription aborted");
                // The link may still be up when only the stream ended
                self.release.release().await;
                transition(&self.state, SessionState::Error(err.to_string()));
            }
        }

        end
    }

    /// Ingest values that arrived before the subscription was ended
    fn drain(&mut self) {
        while let Ok(NotificationEvent::Value(value)) = self.events.try_recv() {
            let _ = self.feed.ingest(&value);
        }
    }
}

/// Disconnect, logging a failure instead of propagating it
async fn disconnect_logged(connection: &dyn BleConnection) {
    if let Err(e) = connection.disconnect().await {
        warn!(address = %connection.address(), error = %e, "disconnect failed");
    }
}

use crate::core::protocol::{self, Command, ReceiveOptions};
use crate::core::session::state::{ConnectionState, ExchangeStatus};
use crate::core::transport::{
    DeviceInfo, LineSettings, PermissionEvent, PermissionNotifier, Transport, TransportLink,
};
use crate::domain::config::SessionSettings;
use crate::domain::error::{BridgeError, BridgeResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

type SharedLink = Arc<Mutex<Box<dyn TransportLink>>>;

/// Result of a `connect` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The link is open
    Connected,
    /// Access was requested; the open completes when the answer arrives
    PermissionRequested,
    /// A link is already open or a connect is in flight; nothing was done
    AlreadyActive,
}

impl std::fmt::Display for ConnectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectOutcome::Connected => write!(f, "Connected"),
            ConnectOutcome::PermissionRequested => write!(f, "Permission requested"),
            ConnectOutcome::AlreadyActive => write!(f, "Already active"),
        }
    }
}

/// Owner of the single link to an IR bridge device.
///
/// Cloning yields another handle to the same session. At most one open and
/// at most one exchange run at a time; extra callers are turned away rather
/// than queued. State is published through `watch` channels so observers on
/// any task see every transition.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct SerialSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    link: Mutex<Option<SharedLink>>,
    pending: Mutex<Option<DeviceInfo>>,
    opening: AtomicBool,
    busy: AtomicBool,
    // Bumped by every close; work started under an older epoch is stale.
    epoch: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
    status_tx: watch::Sender<ExchangeStatus>,
    permission_tx: mpsc::UnboundedSender<PermissionEvent>,
}

/// Claim on the exchange window; released on drop.
struct Exchange {
    inner: Arc<SessionInner>,
    link: SharedLink,
    epoch: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_blocking<T, F>(f: F) -> BridgeResult<T>
where
    F: FnOnce() -> BridgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::IoFault(format!("worker task failed: {}", e)))?
}

impl SessionInner {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.current_epoch() != epoch
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session {} state {} -> {}", self.id, previous, state);
        }
    }

    fn set_status(&self, status: ExchangeStatus) {
        self.status_tx.send_replace(status);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let link = lock(&self.link).take();
        if let Some(link) = link {
            lock(&link).close();
            info!("Session {} dropped, link closed", self.id);
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        {
            let slot = lock(&self.inner.link);
            if !self.inner.is_stale(self.epoch) && slot.is_some() {
                self.inner.set_state(ConnectionState::Connected);
            }
        }
        self.inner.busy.store(false, Ordering::SeqCst);
    }
}

impl SerialSession {
    /// Create a session over `transport` and start listening for permission answers.
    pub fn new(transport: Arc<dyn Transport>, settings: SessionSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (status_tx, _) = watch::channel(ExchangeStatus::Idle);
        let (permission_tx, permission_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            id: uuid::Uuid::new_v4().simple().to_string(),
            transport,
            settings,
            link: Mutex::new(None),
            pending: Mutex::new(None),
            opening: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            state_tx,
            status_tx,
            permission_tx,
        });

        tokio::spawn(Self::listen_for_permissions(
            Arc::downgrade(&inner),
            permission_rx,
        ));

        info!(
            "Created session {} over {} transport",
            inner.id,
            inner.transport.name()
        );
        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn status(&self) -> ExchangeStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ExchangeStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Connect to the first enumerated device.
    ///
    /// Returns immediately after issuing an access request when the device
    /// is not yet accessible; the open then completes in the background.
    pub async fn connect(&self) -> BridgeResult<ConnectOutcome> {
        if lock(&self.inner.link).is_some() {
            return Ok(ConnectOutcome::AlreadyActive);
        }
        if self
            .inner
            .opening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Connect ignored, another attempt is in flight");
            return Ok(ConnectOutcome::AlreadyActive);
        }
        let epoch = self.inner.current_epoch();

        let transport = Arc::clone(&self.inner.transport);
        let devices = match run_blocking(move || transport.enumerate()).await {
            Ok(devices) => devices,
            Err(e) => return Err(self.abort_connect(epoch, e)),
        };
        if self.inner.is_stale(epoch) {
            return Err(BridgeError::Closed);
        }

        let Some(device) = devices.into_iter().next() else {
            info!("No serial device attached");
            return Err(self.abort_connect(epoch, BridgeError::NoDeviceFound));
        };

        // The access check may touch the device node, so it stays off the executor.
        let transport = Arc::clone(&self.inner.transport);
        let probe = device.clone();
        let accessible = match run_blocking(move || Ok(transport.has_access(&probe))).await {
            Ok(accessible) => accessible,
            Err(e) => return Err(self.abort_connect(epoch, e)),
        };
        if self.inner.is_stale(epoch) {
            return Err(BridgeError::Closed);
        }

        if !accessible {
            info!("Requesting access to {}", device);
            *lock(&self.inner.pending) = Some(device.clone());
            self.inner.set_state(ConnectionState::AwaitingPermission);
            let notifier = PermissionNotifier::new(self.inner.permission_tx.clone());
            self.inner.transport.request_access(&device, notifier);
            return Ok(ConnectOutcome::PermissionRequested);
        }

        self.open_device(device, epoch).await?;
        Ok(ConnectOutcome::Connected)
    }

    /// Wait until the session leaves `AwaitingPermission`.
    pub async fn wait_until_settled(&self, timeout: Duration) -> BridgeResult<ConnectionState> {
        let mut states = self.subscribe_state();
        let settled = async {
            loop {
                let state = *states.borrow_and_update();
                if state != ConnectionState::AwaitingPermission {
                    return state;
                }
                if states.changed().await.is_err() {
                    return *states.borrow();
                }
            }
        };
        tokio::time::timeout(timeout, settled)
            .await
            .map_err(|_| BridgeError::Timeout)
    }

    /// Release the link and return to `Disconnected`. Always succeeds.
    ///
    /// A running exchange notices within one poll interval and ends with
    /// `BridgeError::Closed`.
    pub async fn close(&self) {
        let link = {
            let mut slot = lock(&self.inner.link);
            // Bumped under the slot lock: an exchange reads link and epoch together.
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            let link = slot.take();
            *lock(&self.inner.pending) = None;
            self.inner.opening.store(false, Ordering::SeqCst);
            self.inner.set_state(ConnectionState::Disconnected);
            link
        };

        if let Some(link) = link {
            let closed = run_blocking(move || {
                lock(&link).close();
                Ok(())
            })
            .await;
            if let Err(e) = closed {
                warn!("Error while closing link: {}", e);
            }
            info!("Session {} disconnected", self.inner.id);
        }
    }

    /// Ask the device for one IR capture and wait up to `timeout` for it.
    ///
    /// Returns `Busy` at once if another exchange is running. A timeout
    /// leaves the link connected; a link fault disconnects it.
    pub async fn request_receive(&self, timeout: Duration) -> BridgeResult<String> {
        let exchange = self.begin_exchange()?;
        let span = info_span!("exchange", session = %self.inner.id, command = "receive");

        async move {
            self.inner.set_status(ExchangeStatus::Waiting);
            let link = Arc::clone(&exchange.link);
            let inner = Arc::clone(&self.inner);
            let epoch = exchange.epoch;
            let write_timeout = self.inner.settings.write_timeout;
            let options = ReceiveOptions {
                timeout,
                poll_interval: self.inner.settings.poll_interval,
            };

            let result = run_blocking(move || {
                protocol::write_command(&link, &Command::Receive, write_timeout)?;
                protocol::receive_payload(&link, options, || inner.is_stale(epoch))
            })
            .await;

            let result = self.finish_exchange(exchange, result).await;
            if let Ok(payload) = &result {
                info!("Received {}", payload);
                self.inner.set_status(ExchangeStatus::Received(payload.clone()));
            }
            result
        }
        .instrument(span)
        .await
    }

    /// `request_receive` with the configured deadline
    pub async fn receive(&self) -> BridgeResult<String> {
        self.request_receive(self.inner.settings.receive_timeout).await
    }

    /// Write `SEND:<payload>` to the device. Shares the exchange window with
    /// `request_receive` so writes never interleave with a pending read.
    /// The payload is validated after the window is claimed; a busy session
    /// answers `Busy` and leaves the published status alone.
    pub async fn send_raw(&self, payload: &str) -> BridgeResult<()> {
        let exchange = self.begin_exchange()?;
        let command = match Command::send(payload) {
            Ok(command) => command,
            Err(e) => {
                self.inner.set_status(ExchangeStatus::Error(e.to_string()));
                return Err(e);
            }
        };
        let span = info_span!("exchange", session = %self.inner.id, command = "send");

        async move {
            let link = Arc::clone(&exchange.link);
            let write_timeout = self.inner.settings.write_timeout;
            let result =
                run_blocking(move || protocol::write_command(&link, &command, write_timeout)).await;

            let result = self.finish_exchange(exchange, result).await;
            if result.is_ok() {
                info!("Sent {} byte payload", payload.len());
                self.inner.set_status(ExchangeStatus::Sent);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn listen_for_permissions(
        inner: Weak<SessionInner>,
        mut events: mpsc::UnboundedReceiver<PermissionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            SerialSession { inner }.on_permission(event).await;
        }
    }

    async fn on_permission(&self, event: PermissionEvent) {
        let device = {
            let mut pending = lock(&self.inner.pending);
            match pending.as_ref() {
                Some(device) if device.id == event.device_id => pending.take(),
                _ => None,
            }
        };
        let Some(device) = device else {
            debug!("Ignoring permission answer for {}", event.device_id);
            return;
        };

        let epoch = self.inner.current_epoch();
        if event.granted {
            info!("Access granted for {}", device);
            if let Err(e) = self.open_device(device, epoch).await {
                warn!("Open after permission grant failed: {}", e);
            }
        } else {
            warn!("Access denied for {}", device);
            self.abort_connect(epoch, BridgeError::AccessDenied);
        }
    }

    /// Release the open claim after a failed connect and publish the error.
    fn abort_connect(&self, epoch: u64, err: BridgeError) -> BridgeError {
        if !self.inner.is_stale(epoch) {
            let _slot = lock(&self.inner.link);
            self.inner.opening.store(false, Ordering::SeqCst);
            self.inner.set_state(ConnectionState::Disconnected);
            self.inner.set_status(ExchangeStatus::Error(err.to_string()));
        }
        err
    }

    async fn open_device(&self, device: DeviceInfo, epoch: u64) -> BridgeResult<()> {
        match self.try_open(device, epoch).await {
            Ok(()) => {
                if !self.inner.is_stale(epoch) {
                    self.inner.opening.store(false, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(BridgeError::Closed) => Err(BridgeError::Closed),
            Err(e) => {
                error!("Failed to open device: {}", e);
                Err(self.abort_connect(epoch, e))
            }
        }
    }

    async fn try_open(&self, device: DeviceInfo, epoch: u64) -> BridgeResult<()> {
        let transport = Arc::clone(&self.inner.transport);
        let settings = LineSettings::default();
        let target = device.clone();

        let link = run_blocking(move || {
            let mut link = transport.open(&target, &settings)?;
            // Setup steps are best-effort; some adapters lack control lines.
            if let Err(e) = link.set_control_lines(true, true) {
                warn!("Could not assert DTR/RTS on {}: {}", target, e);
            }
            if let Err(e) = link.purge(true, true) {
                warn!("Could not purge buffers on {}: {}", target, e);
            }
            Ok(link)
        })
        .await?;

        if !self.inner.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settings.settle_delay).await;
        }

        let link = {
            let mut slot = lock(&self.inner.link);
            if self.inner.is_stale(epoch) {
                Some(link)
            } else {
                *slot = Some(Arc::new(Mutex::new(link)));
                self.inner.set_state(ConnectionState::Connected);
                None
            }
        };

        if let Some(mut orphan) = link {
            debug!("Session closed while opening {}, releasing link", device);
            let _ = run_blocking(move || {
                orphan.close();
                Ok(())
            })
            .await;
            return Err(BridgeError::Closed);
        }

        info!("Connected to {} at {}", device, settings);
        Ok(())
    }

    fn begin_exchange(&self) -> BridgeResult<Exchange> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Exchange rejected, session busy");
            return Err(BridgeError::Busy);
        }

        let slot = lock(&self.inner.link);
        let Some(link) = slot.clone() else {
            drop(slot);
            self.inner.busy.store(false, Ordering::SeqCst);
            self.inner
                .set_status(ExchangeStatus::Error(BridgeError::NotConnected.to_string()));
            return Err(BridgeError::NotConnected);
        };
        self.inner.set_state(ConnectionState::Busy);

        Ok(Exchange {
            inner: Arc::clone(&self.inner),
            link,
            epoch: self.inner.current_epoch(),
        })
    }

    /// Publish failures and tear the link down on fatal faults.
    async fn finish_exchange<T>(&self, exchange: Exchange, result: BridgeResult<T>) -> BridgeResult<T> {
        let result = match result {
            Err(_) if self.inner.is_stale(exchange.epoch) => Err(BridgeError::Closed),
            other => other,
        };

        if let Err(e) = &result {
            self.inner.set_status(ExchangeStatus::Error(e.to_string()));
            if e.is_fatal() {
                error!("Link fault, disconnecting: {}", e);
                self.close().await;
            } else {
                warn!("Exchange failed: {}", e);
            }
        }
        drop(exchange);
        result
    }
}

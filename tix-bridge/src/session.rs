//! One connected remote session and the registry of all of them.
//!
//! A [`Session`] owns everything tied to one bridge connection: the
//! guarded handle, the frame channel, the notification watcher, the
//! heartbeat and the input translator. Its two background threads talk
//! back to the UI context through [`SessionEvent`]s.
//!
//! Teardown order: heartbeat, watcher, pending input, bridge handle,
//! frame segment. [`SessionRegistry::remove`] drops the interceptor
//! route before all of that.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeConnection, HostBridge};
use crate::config::ConnectConfig;
use crate::display::DisplaySink;
use crate::error::BridgeError;
use crate::heartbeat::ConnectionHeartbeat;
use crate::input::{InputTranslator, LocalKeyboard, TranslatorTiming};
use crate::intercept::{HookInstaller, KeyInterceptor, WindowId};
use crate::ipc::IpcBackend;
use crate::notify::NotificationWatcher;
use crate::shm::{FrameChannel, HEADER_SIZE};

// ── Ids and events ───────────────────────────────────────────────

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signals posted to the UI context by a session's background threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The producer committed a frame (maybe).
    FrameReady(SessionId),
    /// The bridge reported the connection gone.
    Disconnected(SessionId),
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match *self {
            Self::FrameReady(id) | Self::Disconnected(id) => id,
        }
    }
}

// ── SessionOptions ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Initial mapping size for the frame segment.
    pub initial_capacity: usize,
    pub timing: TranslatorTiming,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            initial_capacity: HEADER_SIZE + 1920 * 1080 * 4,
            timing: TranslatorTiming::default(),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session<B: IpcBackend> {
    id: SessionId,
    server: String,
    remote_size: (u32, u32),
    connection: Arc<BridgeConnection>,
    channel: Option<FrameChannel<B>>,
    watcher: NotificationWatcher,
    heartbeat: Option<ConnectionHeartbeat>,
    input: InputTranslator,
    last_frame_id: u32,
    visible: bool,
    closed: bool,
}

impl<B: IpcBackend> Session<B> {
    /// Connect and bring up the frame and liveness paths.
    ///
    /// A refused connection is an error. Missing frame resources are
    /// logged and leave a session without frames. Anything acquired
    /// before a later failure is released on return, in the same order
    /// as [`Session::close`].
    pub fn start(
        id: SessionId,
        bridge: Arc<dyn HostBridge>,
        ipc: B,
        config: &ConnectConfig,
        keyboard: Arc<dyn LocalKeyboard>,
        options: SessionOptions,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, BridgeError> {
        Self::start_with(
            id,
            bridge,
            ipc,
            config,
            keyboard,
            options,
            events,
            ConnectionHeartbeat::spawn,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn start_with<F>(
        id: SessionId,
        bridge: Arc<dyn HostBridge>,
        ipc: B,
        config: &ConnectConfig,
        keyboard: Arc<dyn LocalKeyboard>,
        options: SessionOptions,
        events: UnboundedSender<SessionEvent>,
        spawn_heartbeat: F,
    ) -> Result<Self, BridgeError>
    where
        F: FnOnce(
            Arc<BridgeConnection>,
            SessionId,
            UnboundedSender<SessionEvent>,
        ) -> Result<ConnectionHeartbeat, BridgeError>,
    {
        config.validate()?;
        let connection = Arc::new(BridgeConnection::open(bridge, config)?);
        let (shm_name, event_name) = connection.resource_names()?;
        debug!(%id, %shm_name, %event_name, "bridge resources");

        let channel = match FrameChannel::open(ipc.clone(), &shm_name, options.initial_capacity) {
            Ok(channel) => Some(channel),
            Err(e) => {
                error!(%id, error = %e, "frame segment unavailable; session has no frames");
                None
            }
        };

        let watcher = match ipc.open_notifier(&event_name) {
            Ok(notifier) => NotificationWatcher::spawn(notifier, id, events.clone()).unwrap_or_else(|e| {
                warn!(%id, error = %e, "frame watcher not started");
                NotificationWatcher::idle()
            }),
            Err(e) => {
                warn!(%id, error = %e, "frame notification unavailable");
                NotificationWatcher::idle()
            }
        };

        let mut input = InputTranslator::new(Arc::clone(&connection), keyboard, options.timing);
        input.schedule_lock_sync(Instant::now() + options.timing.lock_sync_delay);

        let mut session = Self {
            id,
            server: config.server.clone(),
            remote_size: (config.width, config.height),
            connection,
            channel,
            watcher,
            heartbeat: None,
            input,
            last_frame_id: 0,
            visible: true,
            closed: false,
        };

        // On failure `session` drops through `close`.
        let heartbeat = spawn_heartbeat(Arc::clone(&session.connection), id, events)?;
        session.heartbeat = Some(heartbeat);

        info!(%id, server = %config.server, width = config.width, height = config.height, "session started");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Desktop size requested from the server.
    pub fn remote_size(&self) -> (u32, u32) {
        self.remote_size
    }

    pub fn connection(&self) -> &Arc<BridgeConnection> {
        &self.connection
    }

    pub fn has_frames(&self) -> bool {
        self.channel.is_some()
    }

    pub fn frame_channel(&self) -> Option<&FrameChannel<B>> {
        self.channel.as_ref()
    }

    pub fn last_frame_id(&self) -> u32 {
        self.last_frame_id
    }

    pub fn input(&self) -> &InputTranslator {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputTranslator {
        &mut self.input
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hidden sessions keep acknowledging frames but skip the upload.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle one frame-ready signal. Returns whether a frame was
    /// presented.
    pub fn pump_frame<S>(&mut self, sink: &mut S) -> Result<bool, BridgeError>
    where
        S: DisplaySink + ?Sized,
    {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(false);
        };
        let check = channel.check_new_frame(self.last_frame_id);
        if !check.is_new {
            return Ok(false);
        }
        self.last_frame_id = check.frame_id;

        if !self.visible {
            return Ok(false);
        }
        match channel.frame() {
            Some(frame) => {
                sink.present(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Present the current frame again, e.g. after the window is
    /// restored. Returns whether anything was presented.
    pub fn repaint<S>(&self, sink: &mut S) -> Result<bool, BridgeError>
    where
        S: DisplaySink + ?Sized,
    {
        if !self.visible {
            return Ok(false);
        }
        match self.channel.as_ref().and_then(|c| c.frame()) {
            Some(frame) => {
                sink.present(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ordered teardown; safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.watcher.stop();
        self.input.discard_pending();
        self.connection.release();
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        info!(id = %self.id, server = %self.server, "session closed");
    }
}

impl<B: IpcBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}

// ── SessionRegistry ──────────────────────────────────────────────

struct Entry<B: IpcBackend> {
    window: WindowId,
    session: Session<B>,
}

/// Live sessions by id, plus the interceptor routes for their windows.
pub struct SessionRegistry<B: IpcBackend, H: HookInstaller> {
    interceptor: KeyInterceptor<H>,
    entries: HashMap<SessionId, Entry<B>>,
}

impl<B: IpcBackend, H: HookInstaller> SessionRegistry<B, H> {
    pub fn new(hook: H) -> Self {
        Self {
            interceptor: KeyInterceptor::new(hook),
            entries: HashMap::new(),
        }
    }

    pub fn interceptor(&self) -> &KeyInterceptor<H> {
        &self.interceptor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.keys().copied().collect()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session<B>> {
        self.entries.get(&id).map(|e| &e.session)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<B>> {
        self.entries.get_mut(&id).map(|e| &mut e.session)
    }

    pub fn window_of(&self, id: SessionId) -> Option<WindowId> {
        self.entries.get(&id).map(|e| e.window)
    }

    /// Take ownership of a started session shown in `window`.
    pub fn insert(&mut self, window: WindowId, session: Session<B>) -> SessionId {
        let id = session.id();
        self.interceptor
            .register(window, session.input().key_forwarder());
        self.entries.insert(id, Entry { window, session });
        self.sync_interception();
        id
    }

    /// Tear down a session: route first, then the session itself.
    pub fn remove(&mut self, id: SessionId) -> bool {
        let Some(mut entry) = self.entries.remove(&id) else {
            return false;
        };
        self.interceptor.unregister(entry.window);
        entry.session.close();
        self.sync_interception();
        true
    }

    pub fn close_all(&mut self) {
        for id in self.ids() {
            self.remove(id);
        }
    }

    fn sync_interception(&mut self) {
        let installed = self.interceptor.is_installed();
        for entry in self.entries.values_mut() {
            entry.session.input_mut().set_modifiers_intercepted(installed);
        }
    }
}

impl<B: IpcBackend, H: HookInstaller> Drop for SessionRegistry<B, H> {
    fn drop(&mut self) {
        self.close_all();
    }
}

//! Blocking wait on the frame notification.
//!
//! The watcher thread sleeps on the bridge's auto-reset event and posts
//! [`SessionEvent::FrameReady`] to the UI context for every signal. The
//! wait timeout only bounds how long [`NotificationWatcher::stop`] takes;
//! nothing is checked on timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::ipc::FrameNotifier;
use crate::session::{SessionEvent, SessionId};

/// Upper bound on a single wait.
pub const WAIT_INTERVAL: Duration = Duration::from_millis(500);

pub struct NotificationWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NotificationWatcher {
    /// Start waiting on `notifier` on a dedicated thread.
    pub fn spawn<N>(
        notifier: N,
        session: SessionId,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, BridgeError>
    where
        N: FrameNotifier + Send + 'static,
    {
        Self::spawn_with_interval(notifier, session, events, WAIT_INTERVAL)
    }

    pub fn spawn_with_interval<N>(
        notifier: N,
        session: SessionId,
        events: UnboundedSender<SessionEvent>,
        interval: Duration,
    ) -> Result<Self, BridgeError>
    where
        N: FrameNotifier + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name(format!("tix-frames-{session}"))
            .spawn(move || {
                debug!(%session, "frame watcher started");
                while !flag.load(Ordering::Acquire) {
                    if notifier.wait(interval) && events.send(SessionEvent::FrameReady(session)).is_err() {
                        break;
                    }
                }
                debug!(%session, "frame watcher exited");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// A watcher with nothing to wait on.
    pub fn idle() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(true)),
            thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to exit and join it; returns within one wait interval.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                info!("frame watcher panicked");
            }
        }
    }
}

impl Drop for NotificationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

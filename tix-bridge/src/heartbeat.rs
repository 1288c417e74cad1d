//! Liveness loop over the bridge's `step`.
//!
//! `step` blocks inside the bridge for as long as it likes, so the loop
//! adds no sleep of its own. The first `0` posts
//! [`SessionEvent::Disconnected`] and ends the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::bridge::BridgeConnection;
use crate::error::BridgeError;
use crate::session::{SessionEvent, SessionId};

pub struct ConnectionHeartbeat {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ConnectionHeartbeat {
    pub fn spawn(
        connection: Arc<BridgeConnection>,
        session: SessionId,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, BridgeError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name(format!("tix-heartbeat-{session}"))
            .spawn(move || {
                debug!(%session, "heartbeat started");
                while !flag.load(Ordering::Acquire) {
                    if connection.step() != 0 {
                        continue;
                    }
                    // A zero caused by our own shutdown is not a disconnect.
                    if !flag.load(Ordering::Acquire) {
                        error!(%session, server = connection.server(), "connection lost");
                        let _ = events.send(SessionEvent::Disconnected(session));
                    }
                    break;
                }
                debug!(%session, "heartbeat exited");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to exit and wait for the in-flight `step` to return.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                info!("heartbeat panicked");
            }
        }
    }
}

impl Drop for ConnectionHeartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCall, MockBridge};
    use crate::config::ConnectConfig;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    fn wait_for_exit(hb: &ConnectionHeartbeat) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while hb.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn zero_step_disconnects_once_and_stops_stepping() {
        let bridge = Arc::new(MockBridge::new().script_steps([1, 1, 0]));
        let conn = Arc::new(BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = SessionId::new(9);

        let mut hb = ConnectionHeartbeat::spawn(conn, id, tx).unwrap();
        wait_for_exit(&hb);
        assert!(!hb.is_running());

        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::Disconnected(id)));
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.count(|c| matches!(c, BridgeCall::Step)), 3);
        hb.stop();
    }

    #[test]
    fn stop_is_quiet() {
        let bridge = Arc::new(MockBridge::new());
        let conn = Arc::new(BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut hb = ConnectionHeartbeat::spawn(conn, SessionId::new(1), tx).unwrap();
        thread::sleep(Duration::from_millis(10));
        hb.stop();
        assert!(!hb.is_running());
        assert!(rx.try_recv().is_err());
        assert!(bridge.count(|c| matches!(c, BridgeCall::Step)) >= 1);
    }

    #[test]
    fn zero_during_shutdown_is_not_a_disconnect() {
        let bridge = Arc::new(
            MockBridge::new()
                .script_steps([0])
                .step_delay(Duration::from_millis(50)),
        );
        let conn = Arc::new(BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut hb = ConnectionHeartbeat::spawn(conn, SessionId::new(2), tx).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while bridge.count(|c| matches!(c, BridgeCall::Step)) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let asked = Instant::now();
        hb.stop();
        // `stop` joined the in-flight step instead of abandoning it.
        assert!(asked.elapsed() >= Duration::from_millis(10));
        assert!(!hb.is_running());
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.count(|c| matches!(c, BridgeCall::Step)), 1);
    }
}

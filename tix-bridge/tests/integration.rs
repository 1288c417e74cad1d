//! Integration tests: whole sessions over the in-process IPC backend
//! and the recording bridge, from frame signal to presentation, through
//! disconnect and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tix_bridge::bridge::{BridgeCall, MockBridge};
use tix_bridge::display::RecordingSink;
use tix_bridge::input::keymap::vk;
use tix_bridge::input::{FixedKeyboard, KeyFlags, MouseAction, MouseButton};
use tix_bridge::intercept::MockHook;
use tix_bridge::shm::HEADER_SIZE;
use tix_bridge::{
    ConnectConfig, FrameHeader, HookDecision, MemoryIpc, Session, SessionEvent, SessionId,
    SessionOptions, SessionRegistry, WindowId,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const SHM: &str = "Local\\RdpBridgeMem_it";
const EVT: &str = "Local\\RdpBridgeEvent_it";
const FULL_HD: usize = HEADER_SIZE + 1920 * 1080 * 4;

// ── Helpers ──────────────────────────────────────────────────────

fn bridge() -> Arc<MockBridge> {
    Arc::new(MockBridge::with_names(SHM, EVT))
}

fn start(
    bridge: &Arc<MockBridge>,
    ipc: &MemoryIpc,
    initial_capacity: usize,
) -> (Session<MemoryIpc>, UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let options = SessionOptions {
        initial_capacity,
        ..SessionOptions::default()
    };
    let session = Session::start(
        SessionId::next(),
        bridge.clone(),
        ipc.clone(),
        &ConnectConfig::default(),
        Arc::new(FixedKeyboard::new()),
        options,
        tx,
    )
    .unwrap();
    (session, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout")
        .expect("event channel closed")
}

// ── Frames ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_signalled_frame_is_presented() {
    let bridge = bridge();
    let ipc = MemoryIpc::new();
    let writer = ipc.create_segment(SHM, FULL_HD);
    let event = ipc.create_event(EVT);
    let (mut session, mut rx) = start(&bridge, &ipc, FULL_HD);

    let header = FrameHeader::new(800, 600, 3200, 1);
    let mut pixels = vec![0u8; 3200 * 600];
    pixels[..4].copy_from_slice(&[0x10, 0x20, 0x30, 0xFF]);
    writer.publish(&header, &pixels).unwrap();
    event.set();

    assert_eq!(next_event(&mut rx).await, SessionEvent::FrameReady(session.id()));

    let mut sink = RecordingSink::new();
    assert!(session.pump_frame(&mut sink).unwrap());
    assert_eq!(sink.frames, vec![header]);
    assert_eq!(sink.first_pixels, vec![[0x10, 0x20, 0x30, 0xFF]]);

    // Same header again: nothing new.
    event.set();
    assert_eq!(next_event(&mut rx).await, SessionEvent::FrameReady(session.id()));
    assert!(!session.pump_frame(&mut sink).unwrap());
    assert_eq!(sink.frames.len(), 1);

    session.close();
}

#[tokio::test]
async fn test_mapping_grows_for_larger_frame() {
    let bridge = bridge();
    let ipc = MemoryIpc::new();
    let writer = ipc.create_segment(SHM, FULL_HD);
    ipc.create_event(EVT);
    let (mut session, _rx) = start(&bridge, &ipc, 1024);
    assert_eq!(session.frame_channel().unwrap().capacity(), 1024);

    let mut sink = RecordingSink::new();
    writer.write_header(&FrameHeader::new(1920, 1080, 7680, 1)).unwrap();
    assert!(session.pump_frame(&mut sink).unwrap());

    let channel = session.frame_channel().unwrap();
    assert!(channel.capacity() >= FULL_HD);
    assert_eq!(channel.remap_count(), 1);

    // Shrinking back never shrinks the mapping.
    writer.write_header(&FrameHeader::packed(640, 480, 2)).unwrap();
    assert!(session.pump_frame(&mut sink).unwrap());
    assert!(session.frame_channel().unwrap().capacity() >= FULL_HD);
    assert_eq!(sink.frames.len(), 2);
}

// ── Liveness ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_reported_once() {
    let bridge = Arc::new(MockBridge::with_names(SHM, EVT).script_steps([1, 1, 0]));
    let ipc = MemoryIpc::new();
    let (mut session, mut rx) = start(&bridge, &ipc, 1024);

    assert_eq!(next_event(&mut rx).await, SessionEvent::Disconnected(session.id()));
    session.close();

    // The heartbeat is gone, so its sender is too.
    assert!(rx.recv().await.is_none());
    assert_eq!(bridge.count(|c| *c == BridgeCall::Step), 3);
    assert_eq!(bridge.count(|c| *c == BridgeCall::Free), 1);
}

// ── Input ────────────────────────────────────────────────────────

#[test]
fn test_release_flushed_by_next_press() {
    let bridge = bridge();
    let ipc = MemoryIpc::new();
    let (mut session, _rx) = start(&bridge, &ipc, 1024);
    let t0 = Instant::now();

    let input = session.input_mut();
    input.button_down(MouseButton::Left, 100, 100, t0);
    input.button_up(MouseButton::Left, 101, 102, t0 + Duration::from_millis(10));
    input.button_down(MouseButton::Right, 50, 60, t0 + Duration::from_millis(30));
    input.tick(t0 + Duration::from_millis(200));

    let mice: Vec<_> = bridge
        .inputs()
        .into_iter()
        .filter(|c| matches!(c, BridgeCall::Mouse { .. }))
        .collect();
    assert_eq!(
        mice,
        vec![
            BridgeCall::Mouse {
                action: MouseAction::LeftDown,
                x: 100,
                y: 100
            },
            BridgeCall::Mouse {
                action: MouseAction::LeftUp,
                x: 101,
                y: 102
            },
            BridgeCall::Mouse {
                action: MouseAction::RightDown,
                x: 50,
                y: 60
            },
        ]
    );
}

#[test]
fn test_reserved_keys_follow_foreground_window() {
    let first = Arc::new(MockBridge::with_names("Mem_a", "Evt_a"));
    let second = Arc::new(MockBridge::with_names("Mem_b", "Evt_b"));
    let ipc = MemoryIpc::new();
    let hook = MockHook::new();
    let mut registry = SessionRegistry::new(hook.clone());

    let (a, _ra) = start(&first, &ipc, 1024);
    let (b, _rb) = start(&second, &ipc, 1024);
    let ida = registry.insert(WindowId::new(0xA), a);
    let idb = registry.insert(WindowId::new(0xB), b);
    assert_eq!(hook.installs(), 1);

    let keys_only = |bridge: &MockBridge| {
        bridge.count(|c| matches!(c, BridgeCall::Scancode { .. }))
    };

    assert_eq!(
        hook.press(Some(WindowId::new(0xA)), vk::RCONTROL, true),
        HookDecision::Suppress
    );
    assert_eq!(
        hook.press(Some(WindowId::new(0xC)), vk::RCONTROL, true),
        HookDecision::PassThrough
    );
    assert_eq!(keys_only(&first), 1);
    assert_eq!(keys_only(&second), 0);
    assert!(first.calls().contains(&BridgeCall::Scancode {
        scancode: 0x1D,
        flags: (KeyFlags::DOWN | KeyFlags::EXTENDED).bits(),
    }));

    registry.remove(ida);
    assert_eq!(
        hook.press(Some(WindowId::new(0xA)), vk::RCONTROL, false),
        HookDecision::PassThrough
    );
    assert!(hook.is_installed());

    registry.remove(idb);
    assert!(!hook.is_installed());
    assert_eq!(
        hook.press(Some(WindowId::new(0xB)), vk::LWIN, true),
        HookDecision::PassThrough
    );
    assert!(registry.is_empty());
}

//! Worker Bridge Integration Tests
//!
//! Tests the async bridge between Tokio callers and the worker thread that
//! owns the session controller.
//!
//! Run with: `cargo test -p common --test bridge_tests`

use common::test_utils::{MockTransport, sample_operations, sample_profile, with_timeout};
use common::{
    DeviceSummary, EngineError, LightCommand, PollPolicy, SessionController, create_light_bridge,
};
use protocol::{Block, LightingOperation, PacketKind, ProtocolError, Rgb, encode};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

type WorkerHandle = thread::JoinHandle<SessionController<MockTransport>>;

fn spawn_worker(session: SessionController<MockTransport>) -> (common::LightBridge, WorkerHandle) {
    let (bridge, worker) = create_light_bridge();
    let handle = thread::spawn(move || {
        worker.run(session, || {
            vec![DeviceSummary {
                vendor_id: 0x187c,
                product_id: 0x0521,
                bus_number: 1,
                device_address: 4,
                product: Some("AW1517".to_string()),
            }]
        })
    });
    (bridge, handle)
}

// ============================================================================
// Command Flow
// ============================================================================

#[tokio::test]
async fn test_list_devices_runs_on_worker() {
    let profile = sample_profile();
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    let devices = with_timeout(bridge.list_devices()).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].vendor_id, 0x187c);

    bridge.shutdown().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn test_apply_reports_success() {
    let profile = Arc::new(sample_profile());
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    with_timeout(bridge.apply(profile.clone(), Block::persistent(1), sample_operations()))
        .await
        .unwrap();

    bridge.shutdown().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn test_apply_reports_encoding_error() {
    let profile = Arc::new(sample_profile());
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    // no EndBlockLine
    let ops = vec![LightingOperation::fixed(0x1, Rgb::WHITE)];
    let err = with_timeout(bridge.apply(profile.clone(), Block::volatile(1), ops))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Protocol(ProtocolError::UnterminatedBlock(1))
    ));

    bridge.shutdown().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn test_apply_reports_not_ready() {
    let profile = Arc::new(sample_profile());
    let busy = profile.constants().state_busy;
    let session = SessionController::new(MockTransport::ready(&profile).with_statuses([busy; 4]))
        .with_poll_policy(PollPolicy::from_attempts(2));
    let (bridge, handle) = spawn_worker(session);

    let err = with_timeout(bridge.apply(profile.clone(), Block::volatile(1), sample_operations()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotReady { attempts: 2 }));

    bridge.shutdown().await.unwrap();
    handle.join().unwrap();
}

// ============================================================================
// Serialization
// ============================================================================

#[tokio::test]
async fn test_concurrent_applies_are_serialized() {
    let profile = Arc::new(sample_profile());
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    let mut tasks = Vec::new();
    for block_id in 1..=8u8 {
        let bridge = bridge.clone();
        let profile = profile.clone();
        tasks.push(tokio::spawn(async move {
            bridge
                .apply(profile, Block::persistent(block_id), sample_operations())
                .await
        }));
    }

    for task in tasks {
        with_timeout(task).await.unwrap().unwrap();
    }

    bridge.shutdown().await.unwrap();
    let session = handle.join().unwrap();
    let mock = session.transport();

    // Each apply is one probe (status + reset) followed by one whole block
    let block_len = encode(&profile, Block::persistent(1), &sample_operations())
        .unwrap()
        .len();
    let group_len = 2 + block_len;
    assert_eq!(mock.kinds.len(), 8 * group_len);

    let mut block_ids = Vec::new();
    for (kinds, bytes) in mock
        .kinds
        .chunks(group_len)
        .zip(mock.written.chunks(group_len))
    {
        assert_eq!(kinds[0], PacketKind::GetStatus);
        assert_eq!(kinds[1], PacketKind::Reset);
        assert!(
            kinds[2..]
                .iter()
                .all(|k| !matches!(k, PacketKind::GetStatus | PacketKind::Reset))
        );
        assert_eq!(kinds[group_len - 1], PacketKind::Save);

        // Every save-next marker in a group names the same block
        let ids: Vec<u8> = kinds
            .iter()
            .zip(bytes)
            .filter(|(kind, _)| **kind == PacketKind::SaveNext)
            .map(|(_, bytes)| bytes[2])
            .collect();
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|id| *id == ids[0]));
        block_ids.push(ids[0]);
    }

    block_ids.sort_unstable();
    assert_eq!(block_ids, (1..=8u8).collect::<Vec<_>>());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_worker_stops_when_bridge_dropped() {
    let profile = sample_profile();
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    drop(bridge);
    handle.join().unwrap();
}

#[tokio::test]
async fn test_send_after_shutdown_fails() {
    let profile = sample_profile();
    let (bridge, handle) = spawn_worker(SessionController::new(MockTransport::ready(&profile)));

    bridge.shutdown().await.unwrap();
    handle.join().unwrap();

    let (tx, _rx) = oneshot::channel();
    let result = bridge
        .send_command(LightCommand::ListDevices { response: tx })
        .await;
    assert!(matches!(result, Err(EngineError::Channel(_))));
}

use std::{sync::Arc, time::Duration};

use green_tracker_data_management::{database::db::SnapshotDatabase, DataManager};
use green_tracker_lib::{
    comms::{decode_frame, encode_frame, LiveMessage, LiveUpdate, StopRequest, TrackingOptions, UpdateAck},
    location_sample::LocationSample,
    snapshot::Snapshot,
    transport_mode::TransportMode,
};
use server::{live_endpoint, server_state::ServerState};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{tcp::{OwnedReadHalf, OwnedWriteHalf}, TcpListener, TcpStream},
    time::timeout,
};

async fn start_relay(data_manager: DataManager) -> (Arc<ServerState>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(data_manager));
    tokio::spawn(live_endpoint::listen(listener, state.clone()));
    (state, addr)
}

async fn connect(addr: std::net::SocketAddr) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
    (BufReader::new(reader).lines(), writer)
}

async fn send(writer: &mut OwnedWriteHalf, message: &LiveMessage) {
    writer.write_all(encode_frame(message).unwrap().as_bytes()).await.unwrap();
}

async fn next_message(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> LiveMessage {
    let line = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap().unwrap();
    decode_frame(&line).unwrap()
}

fn stop_request() -> StopRequest {
    StopRequest::new(
        Snapshot::new(
            20., 2, 10., TransportMode::Car, 0.0042, 0.03,
            vec![LocationSample::new(0., 0., 0), LocationSample::new(0., 0.00009, 1000), LocationSample::new(0., 0.00018, 2000)],
            Some(0), Some(2000),
        ),
        Some("rider-7".into()),
    )
}

#[tokio::test]
async fn stop_is_stored_and_acknowledged() {
    let data_manager = DataManager::with_store(Arc::new(SnapshotDatabase::connect_in_memory().await.unwrap()));
    let (state, addr) = start_relay(data_manager).await;
    let (mut lines, mut writer) = connect(addr).await;

    send(&mut writer, &LiveMessage::Stop(StopRequest { exchange: Some(3), ..stop_request() })).await;

    let LiveMessage::StopAck(ack) = next_message(&mut lines).await else {
        panic!("expected live:stop:ack");
    };
    assert!(ack.ok);
    assert!(!ack.degraded);
    assert_eq!(ack.exchange, Some(3));

    let stored = state.data_manager.get_snapshot(&ack.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.user_id.as_deref(), Some("rider-7"));
    assert_eq!(stored.snapshot, stop_request().snapshot);
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_connection() {
    let (_, addr) = start_relay(DataManager::unconfigured()).await;
    let (mut lines, mut writer) = connect(addr).await;

    writer.write_all(b"this is not json\n{\"event\":\"live:teleport\",\"data\":{}}\n\n").await.unwrap();
    writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
    send(&mut writer, &LiveMessage::Update(LiveUpdate { total_distance_meters: Some(12.5) })).await;

    assert_eq!(next_message(&mut lines).await, LiveMessage::UpdateAck(UpdateAck { ok: true, total: 12.5 }));
}

#[tokio::test]
async fn degraded_ack_without_store() {
    let (_, addr) = start_relay(DataManager::unconfigured()).await;
    let (mut lines, mut writer) = connect(addr).await;

    send(&mut writer, &LiveMessage::Stop(stop_request())).await;

    let LiveMessage::StopAck(ack) = next_message(&mut lines).await else {
        panic!("expected live:stop:ack");
    };
    assert!(ack.ok && ack.degraded);
    assert!(ack.id.is_some());
}

#[tokio::test]
async fn mock_feed_starts_and_stops() {
    let (_, addr) = start_relay(DataManager::unconfigured()).await;
    let (mut lines, mut writer) = connect(addr).await;

    send(&mut writer, &LiveMessage::StartTracking(TrackingOptions { interval_ms: Some(50) })).await;
    for _ in 0..3 {
        let LiveMessage::GpsData(reading) = next_message(&mut lines).await else {
            panic!("expected gps-data");
        };
        assert!((reading.latitude - 34.0522).abs() <= 0.005 + 1e-9);
    }

    send(&mut writer, &LiveMessage::StopTracking).await;
    send(&mut writer, &LiveMessage::Update(LiveUpdate::default())).await;

    // Readings already queued may still arrive before the ack, none after it.
    loop {
        match next_message(&mut lines).await {
            LiveMessage::GpsData(_) => continue,
            message => {
                assert_eq!(message, LiveMessage::UpdateAck(UpdateAck { ok: true, total: 0. }));
                break;
            }
        }
    }
    let quiet = timeout(Duration::from_millis(300), lines.next_line()).await;
    assert!(quiet.is_err(), "feed kept running after stop-tracking");
}

#[tokio::test]
async fn connection_count_follows_clients() {
    let (state, addr) = start_relay(DataManager::unconfigured()).await;
    let (mut lines, mut writer) = connect(addr).await;

    // A round trip guarantees the connection task is running.
    send(&mut writer, &LiveMessage::Update(LiveUpdate::default())).await;
    next_message(&mut lines).await;
    assert_eq!(state.connections(), 1);

    drop(writer);
    drop(lines);
    timeout(Duration::from_secs(5), async {
        while state.connections() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }).await.unwrap();
}

use std::{net::SocketAddr, sync::Arc};

use green_tracker_data_management::SaveReceipt;
use green_tracker_lib::{
    comms::{decode_frame, encode_frame, LiveMessage, StopAck, UpdateAck},
    frame_reader::FrameReader,
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{gps_feed, server_state::ServerState};

/// Accepts live clients until the listener fails for good.
pub async fn listen(listener: TcpListener, server_state: Arc<ServerState>) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Live endpoint listening on {}", addr);
    }

    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            tracing::error!("Failed to accept connection");
            continue;
        };

        tracing::info!("New connection from {}", addr);

        let server_state = server_state.clone();
        tokio::spawn(async move {
            server_state.connection_opened();
            let res = handle_connection(stream, addr, server_state.clone()).await;
            server_state.connection_closed();
            tracing::info!("Connection from {} ended with result: {:?}", addr, res);
        });
    }
}

/// Reads one frame per line. Replies and feed readings share a single writer task,
/// so frames never interleave on the socket. Bad frames are skipped, never fatal.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, server_state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let (reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<LiveMessage>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let frame = match encode_frame(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Dropping outbound {}: {e}", message.event_name());
                    continue;
                }
            };
            if writer.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut feed: Option<JoinHandle<()>> = None;
    let mut frames = FrameReader::new(reader);

    let result = loop {
        let line = match frames.next_frame().await {
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(e))) => {
                tracing::warn!("Skipping frame from {}: {e}", addr);
                continue;
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.into()),
        };

        if line.trim().is_empty() {
            continue;
        }

        let message = match decode_frame(&line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring frame from {}: {e}", addr);
                continue;
            }
        };

        tracing::debug!("{} from {}", message.event_name(), addr);

        match message {
            LiveMessage::StartTracking(options) => {
                if let Some(previous) = feed.replace(gps_feed::spawn_mock_feed(&options, out_tx.clone())) {
                    previous.abort();
                }
            }
            LiveMessage::StopTracking => {
                if let Some(previous) = feed.take() {
                    previous.abort();
                }
            }
            message => {
                if let Some(reply) = dispatch(message, &server_state).await {
                    if out_tx.send(reply).is_err() {
                        break Ok(());
                    }
                }
            }
        }
    };

    if let Some(feed) = feed.take() {
        feed.abort();
    }
    drop(out_tx);
    let _ = writer_task.await;

    result
}

/// Handles one request frame and returns the reply, if it deserves one.
pub async fn dispatch(message: LiveMessage, server_state: &ServerState) -> Option<LiveMessage> {
    match message {
        LiveMessage::Stop(request) => {
            let ack = match server_state.data_manager.save_snapshot(&request).await {
                Ok(SaveReceipt::Stored { id }) => {
                    tracing::info!("Stored snapshot {} ({:.0} m, {})", id, request.snapshot.distance_meters, request.snapshot.mode);
                    StopAck::stored(id)
                }
                Ok(SaveReceipt::Unconfigured { id }) => {
                    tracing::warn!("Acknowledged snapshot {} without durable store", id);
                    StopAck::degraded(id)
                }
                Err(e) => {
                    tracing::error!("Failed to save snapshot: {e}");
                    StopAck::failed(e.to_string())
                }
            };
            Some(LiveMessage::StopAck(ack.answering(request.exchange)))
        }
        LiveMessage::Update(update) => Some(LiveMessage::UpdateAck(UpdateAck {
            ok: true,
            total: update.total_distance_meters.unwrap_or(0.),
        })),
        other => {
            tracing::warn!("Unexpected {} from client", other.event_name());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use green_tracker_data_management::{database::db::StoredSnapshot, DataManager, DataManagerError, DocumentStore};
    use green_tracker_lib::{comms::{LiveUpdate, StopRequest}, snapshot::Snapshot, transport_mode::TransportMode};

    fn stop() -> LiveMessage {
        LiveMessage::Stop(StopRequest::new(
            Snapshot::new(1000., 60, 16.7, TransportMode::Public, 0.089, 0.5, Vec::new(), Some(0), Some(60_000)),
            None,
        ))
    }

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn insert(&self, _: &StopRequest, _: DateTime<Utc>) -> Result<String, DataManagerError> {
            Err(DataManagerError::Database("write rejected".into()))
        }

        async fn get(&self, _: &str) -> Result<Option<StoredSnapshot>, DataManagerError> {
            Ok(None)
        }

        async fn list(&self, _: i64) -> Result<Vec<StoredSnapshot>, DataManagerError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _: &str) -> Result<bool, DataManagerError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn unconfigured_store_still_acknowledges() {
        let state = ServerState::new(DataManager::unconfigured());
        let Some(LiveMessage::StopAck(ack)) = dispatch(stop(), &state).await else {
            panic!("expected a stop ack");
        };

        assert!(ack.ok);
        assert!(ack.degraded);
        assert!(ack.id.unwrap().parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn store_failure_is_a_nack() {
        let state = ServerState::new(DataManager::with_store(Arc::new(BrokenStore)));
        let reply = dispatch(stop(), &state).await;

        assert_eq!(reply, Some(LiveMessage::StopAck(StopAck::failed("Database error: write rejected".into()))));
    }

    #[tokio::test]
    async fn ack_carries_the_request_exchange() {
        let state = ServerState::new(DataManager::unconfigured());
        let LiveMessage::Stop(request) = stop() else { unreachable!() };

        let reply = dispatch(LiveMessage::Stop(StopRequest { exchange: Some(12), ..request }), &state).await;
        let Some(LiveMessage::StopAck(ack)) = reply else {
            panic!("expected a stop ack");
        };
        assert_eq!(ack.exchange, Some(12));

        let reply = dispatch(stop(), &state).await;
        let Some(LiveMessage::StopAck(ack)) = reply else {
            panic!("expected a stop ack");
        };
        assert_eq!(ack.exchange, None);
    }

    #[tokio::test]
    async fn update_echoes_total() {
        let state = ServerState::new(DataManager::unconfigured());

        let reply = dispatch(LiveMessage::Update(LiveUpdate { total_distance_meters: Some(42.5) }), &state).await;
        assert_eq!(reply, Some(LiveMessage::UpdateAck(UpdateAck { ok: true, total: 42.5 })));

        let reply = dispatch(LiveMessage::Update(LiveUpdate::default()), &state).await;
        assert_eq!(reply, Some(LiveMessage::UpdateAck(UpdateAck { ok: true, total: 0. })));
    }

    #[tokio::test]
    async fn client_bound_events_get_no_reply() {
        let state = ServerState::new(DataManager::unconfigured());
        assert_eq!(dispatch(LiveMessage::StopAck(StopAck::stored("1".into())), &state).await, None);
    }
}

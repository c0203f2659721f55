use std::{
    collections::BTreeMap,
    sync::{atomic::{AtomicU64, Ordering}, Arc},
    time::Duration,
};

use async_trait::async_trait;
use green_tracker_lib::{
    comms::{decode_frame, encode_frame, LiveMessage, LiveUpdate, StopAck, StopRequest, ACK_TIMEOUT_MS},
    frame_reader::FrameReader,
};
use tokio::{
    io::AsyncWriteExt,
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};

/// How one save exchange ended. Exactly one per `send`.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The relay accepted the snapshot. `degraded` means it kept no durable copy.
    Ack { id: Option<String>, degraded: bool },
    /// The relay tried and failed.
    Nack(String),
    /// No acknowledgement within the window.
    Timeout,
    /// The send itself failed or the connection dropped.
    ChannelError(String),
}

impl From<StopAck> for SaveOutcome {
    fn from(ack: StopAck) -> Self {
        if ack.ok {
            SaveOutcome::Ack { id: ack.id, degraded: ack.degraded }
        } else {
            SaveOutcome::Nack(ack.error.unwrap_or_else(|| "unknown error".into()))
        }
    }
}

/// Best-effort remote save of a finished trip.
#[async_trait]
pub trait SaveChannel: Send + Sync {
    async fn send(&self, request: StopRequest) -> SaveOutcome;
}

type PendingAcks = Arc<Mutex<BTreeMap<u64, oneshot::Sender<StopAck>>>>;

/**
 * An explicitly owned connection to the relay's live endpoint.
 * Every save is an exchange with its own id, echoed back in the ack. The ack and the
 * timeout race, and whichever loses finds the exchange already gone, so late acks are
 * logged and dropped. Acks without an id answer the oldest open exchange.
 */
pub struct RelayChannel {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingAcks,
    next_exchange: AtomicU64,
    reader: JoinHandle<()>,
    ack_timeout: Duration,
}

impl RelayChannel {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        tracing::info!("Connected to relay at {}", addr);

        let (reader, writer) = stream.into_split();
        let pending: PendingAcks = Arc::new(Mutex::new(BTreeMap::new()));

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let mut frames = FrameReader::new(reader);
            loop {
                let line = match frames.next_frame().await {
                    Ok(Some(Ok(line))) => line,
                    Ok(Some(Err(e))) => {
                        tracing::warn!("Skipping frame from relay: {e}");
                        continue;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Relay connection failed: {e}");
                        break;
                    }
                };

                match decode_frame(&line) {
                    Ok(LiveMessage::StopAck(ack)) => {
                        let resolve = {
                            let mut pending = reader_pending.lock().await;
                            match ack.exchange {
                                Some(exchange) => pending.remove(&exchange),
                                None => pending.pop_first().map(|(_, resolve)| resolve),
                            }
                        };
                        match resolve {
                            Some(resolve) => {
                                let _ = resolve.send(ack);
                            }
                            None => tracing::debug!("Ignoring late acknowledgement {:?}", ack),
                        }
                    }
                    Ok(LiveMessage::UpdateAck(ack)) => tracing::trace!("Relay saw {} m", ack.total),
                    Ok(message) => tracing::trace!("Ignoring {} from relay", message.event_name()),
                    Err(e) => tracing::warn!("Bad frame from relay: {e}"),
                }
            }

            // Anyone still waiting learns the connection is gone.
            reader_pending.lock().await.clear();
            tracing::info!("Relay connection closed");
        });

        Ok(Self {
            writer: Mutex::new(writer),
            pending,
            next_exchange: AtomicU64::new(0),
            reader,
            ack_timeout: Duration::from_millis(ACK_TIMEOUT_MS),
        })
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Reports the running distance. No reply is awaited.
    pub async fn send_update(&self, total_distance_meters: f64) -> std::io::Result<()> {
        let message = LiveMessage::Update(LiveUpdate { total_distance_meters: Some(total_distance_meters) });
        self.write(&message).await
    }

    pub async fn close(&self) {
        self.reader.abort();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::debug!("Relay shutdown: {e}");
        }
    }

    async fn write(&self, message: &LiveMessage) -> std::io::Result<()> {
        let frame = encode_frame(message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await
    }

    async fn clear_pending(&self, exchange: u64) {
        self.pending.lock().await.remove(&exchange);
    }
}

#[async_trait]
impl SaveChannel for RelayChannel {
    async fn send(&self, mut request: StopRequest) -> SaveOutcome {
        let exchange = self.next_exchange.fetch_add(1, Ordering::SeqCst) + 1;
        request.exchange = Some(exchange);

        let (resolve, resolved) = oneshot::channel();
        self.pending.lock().await.insert(exchange, resolve);

        if let Err(e) = self.write(&LiveMessage::Stop(request)).await {
            self.clear_pending(exchange).await;
            tracing::warn!("Failed to send snapshot: {e}");
            return SaveOutcome::ChannelError(e.to_string());
        }

        match timeout(self.ack_timeout, resolved).await {
            Ok(Ok(ack)) => SaveOutcome::from(ack),
            Ok(Err(_)) => SaveOutcome::ChannelError("relay connection closed".into()),
            Err(_) => {
                self.clear_pending(exchange).await;
                tracing::warn!("No acknowledgement within {:?}", self.ack_timeout);
                SaveOutcome::Timeout
            }
        }
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acks_map_to_outcomes() {
        assert_eq!(SaveOutcome::from(StopAck::stored("9".into())), SaveOutcome::Ack { id: Some("9".into()), degraded: false });
        assert_eq!(SaveOutcome::from(StopAck::degraded("1".into())), SaveOutcome::Ack { id: Some("1".into()), degraded: true });
        assert_eq!(SaveOutcome::from(StopAck::failed("nope".into())), SaveOutcome::Nack("nope".into()));
        assert_eq!(
            SaveOutcome::from(StopAck { ok: false, id: None, error: None, degraded: false, exchange: None }),
            SaveOutcome::Nack("unknown error".into())
        );
    }
}

//! Push channel lifecycle: connect, receive, detect loss, reconnect.

use futures_util::StreamExt;
use monitor_core::{EndpointRecord, Result};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::transport::{FrameStream, PushTransport};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// `Disconnected -> Connecting -> Open -> Disconnected`, with a timed
/// `Disconnected -> Connecting` edge. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connecting { attempt: u64 },
    Opened,
    Update(EndpointRecord),
    /// The channel closed or could not be opened. `reason` is set when an
    /// error caused it.
    Closed { reason: Option<String> },
}

/// Counters shared with the running manager task.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    attempts: Arc<AtomicU64>,
    dropped_frames: Arc<AtomicU64>,
}

impl ConnectionStats {
    /// Connect attempts so far, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Push messages discarded because they did not decode.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ReceiverGone;

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    reconnect_delay: Duration,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            reconnect_delay,
            stats: ConnectionStats::default(),
        }
    }

    /// Handle on the counters; stays live after [`spawn`](Self::spawn).
    pub fn stats(&self) -> ConnectionStats {
        self.stats.clone()
    }

    /// Spawns [`run`](Self::run) and hands back the event stream.
    pub fn spawn(
        self,
    ) -> (
        mpsc::UnboundedReceiver<ConnectionEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(tx));
        (rx, task)
    }

    /// Connects, forwards updates, and reconnects after a fixed delay,
    /// forever. Returns only once nobody listens to `events` anymore.
    pub async fn run(mut self, events: mpsc::UnboundedSender<ConnectionEvent>) {
        while self.cycle(&events).await.is_ok() {
            tokio::time::sleep(self.reconnect_delay).await;
        }
        debug!(
            "connection manager stopped after {} attempts",
            self.stats.attempts()
        );
    }

    /// One `Connecting -> ... -> Disconnected` pass.
    async fn cycle(
        &mut self,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> std::result::Result<(), ReceiverGone> {
        let attempt = self.stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("push channel connecting (attempt {})", attempt);
        emit(events, ConnectionEvent::Connecting { attempt })?;

        let reason = match self.transport.connect().await {
            Ok(mut frames) => {
                info!("Push channel connected");
                emit(events, ConnectionEvent::Opened)?;
                self.pump(&mut frames, events).await?
            }
            Err(e) => {
                error!("Push channel failed to open: {}", e);
                Some(e.to_string())
            }
        };

        info!(
            "Push channel disconnected, reconnecting in {}ms",
            self.reconnect_delay.as_millis()
        );
        emit(events, ConnectionEvent::Closed { reason })
    }

    async fn pump(
        &mut self,
        frames: &mut FrameStream,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> std::result::Result<Option<String>, ReceiverGone> {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(text) => match decode_update(&text) {
                    Ok(record) => emit(events, ConnectionEvent::Update(record))?,
                    Err(e) => {
                        self.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping malformed push message: {} ({} bytes)", e, text.len());
                    }
                },
                Err(e) => {
                    error!("Push channel error: {}", e);
                    return Ok(Some(e.to_string()));
                }
            }
        }
        Ok(None)
    }
}

fn emit(
    events: &mpsc::UnboundedSender<ConnectionEvent>,
    event: ConnectionEvent,
) -> std::result::Result<(), ReceiverGone> {
    events.send(event).map_err(|_| ReceiverGone)
}

/// Each push message carries exactly one endpoint record.
pub fn decode_update(text: &str) -> Result<EndpointRecord> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use monitor_core::Error;
    use tokio::time::Instant;

    const E1: &str = r#"{"id":"e1","name":"API","url":"https://api.example.com","method":"GET","interval":30,"timeout":10,"status":"up"}"#;
    const E2: &str = r#"{"id":"e2","name":"Web","url":"https://www.example.com","method":"GET","interval":60,"timeout":10,"status":"down","error":"connection refused"}"#;

    async fn next(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        rx.recv().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_updates_in_order() {
        let transport = ScriptedTransport::new();
        transport.push_session(vec![Ok(E1.to_string()), Ok(E2.to_string())]);
        let manager = ConnectionManager::new(Arc::new(transport), DEFAULT_RECONNECT_DELAY);
        let (mut rx, task) = manager.spawn();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting { attempt: 1 });
        assert_eq!(next(&mut rx).await, ConnectionEvent::Opened);
        match next(&mut rx).await {
            ConnectionEvent::Update(record) => assert_eq!(record.id, "e1"),
            other => panic!("unexpected event {:?}", other),
        }
        match next(&mut rx).await {
            ConnectionEvent::Update(record) => {
                assert_eq!(record.id, "e2");
                assert_eq!(record.error.as_deref(), Some("connection refused"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(next(&mut rx).await, ConnectionEvent::Closed { reason: None });

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped_without_closing() {
        let transport = ScriptedTransport::new();
        transport.push_session(vec![
            Ok("not json".to_string()),
            Ok(r#"{"id":"e9"}"#.to_string()),
            Ok(E1.to_string()),
        ]);
        let manager = ConnectionManager::new(Arc::new(transport), DEFAULT_RECONNECT_DELAY);
        let stats = manager.stats();
        let (mut rx, task) = manager.spawn();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting { attempt: 1 });
        assert_eq!(next(&mut rx).await, ConnectionEvent::Opened);
        match next(&mut rx).await {
            ConnectionEvent::Update(record) => assert_eq!(record.id, "e1"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(stats.dropped_frames(), 2);
        assert_eq!(stats.attempts(), 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn channel_error_closes_and_reconnects_after_delay() {
        let transport = ScriptedTransport::new();
        transport.push_session(vec![
            Ok(E1.to_string()),
            Err(Error::websocket("connection reset")),
            Ok(E2.to_string()),
        ]);
        transport.push_session(vec![Ok(E2.to_string())]);
        let manager = ConnectionManager::new(Arc::new(transport), DEFAULT_RECONNECT_DELAY);
        let (mut rx, task) = manager.spawn();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting { attempt: 1 });
        assert_eq!(next(&mut rx).await, ConnectionEvent::Opened);
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Update(r) if r.id == "e1"));
        match next(&mut rx).await {
            ConnectionEvent::Closed { reason } => {
                assert!(reason.unwrap().contains("connection reset"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let closed_at = Instant::now();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Connecting { attempt: 2 });
        assert_eq!(closed_at.elapsed(), DEFAULT_RECONNECT_DELAY);
        assert_eq!(next(&mut rx).await, ConnectionEvent::Opened);
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Update(r) if r.id == "e2"));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn retries_without_bound_at_fixed_cadence() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let manager = ConnectionManager::new(transport.clone(), DEFAULT_RECONNECT_DELAY);
        let stats = manager.stats();
        let (mut rx, task) = manager.spawn();

        let mut attempts_seen = Vec::new();
        while attempts_seen.len() < 12 {
            if let ConnectionEvent::Connecting { attempt } = next(&mut rx).await {
                attempts_seen.push((attempt, Instant::now()));
            }
        }

        for pair in attempts_seen.windows(2) {
            assert_eq!(pair[1].0, pair[0].0 + 1);
            assert_eq!(pair[1].1 - pair[0].1, DEFAULT_RECONNECT_DELAY);
        }
        assert!(transport.connects() >= 12);
        assert!(stats.attempts() >= 12);
        assert_eq!(stats.dropped_frames(), 0);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_is_dropped() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let manager = ConnectionManager::new(transport.clone(), DEFAULT_RECONNECT_DELAY);
        let (rx, task) = manager.spawn();
        drop(rx);

        task.await.unwrap();
        assert_eq!(transport.connects(), 0);
    }

    #[test]
    fn stats_start_at_zero() {
        let manager = ConnectionManager::new(
            Arc::new(ScriptedTransport::new()),
            DEFAULT_RECONNECT_DELAY,
        );
        let stats = manager.stats();
        assert_eq!(stats.attempts(), 0);
        assert_eq!(stats.dropped_frames(), 0);
    }
}

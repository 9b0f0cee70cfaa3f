//! The synchronization engine: one loop owns the endpoint state and applies
//! push updates, snapshot loads and command results in arrival order.

use chrono::Utc;
use monitor_core::{EndpointRecord, Result};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::api::EndpointApi;
use crate::commands::{Command, CommandDispatcher};
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats, DEFAULT_RECONNECT_DELAY,
};
use crate::render::{DisplayTree, render};
use crate::snapshot::{self, SnapshotLoader, SnapshotStatus};
use crate::store::StateStore;
use crate::transport::PushTransport;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reconnect_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl From<&monitor_core::Config> for EngineConfig {
    fn from(config: &monitor_core::Config) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Results of spawned server requests, fed back into the loop.
enum Completion {
    Snapshot {
        result: Result<Vec<EndpointRecord>>,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    Created {
        name: String,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
    Removed {
        id: String,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Owned engine instance. Dropping every handle, or calling
/// [`stop`](Self::stop), ends the loop and the push channel with it.
pub struct DashboardEngine {
    dispatcher: CommandDispatcher,
    frames: watch::Receiver<DisplayTree>,
    connection: watch::Receiver<ConnectionState>,
    stats: ConnectionStats,
    task: JoinHandle<()>,
}

impl DashboardEngine {
    /// Opens the push channel and starts the initial snapshot load.
    pub fn start(
        config: EngineConfig,
        api: Arc<dyn EndpointApi>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = watch::channel(DisplayTree::default());
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Disconnected);

        let manager = ConnectionManager::new(transport, config.reconnect_delay);
        let stats = manager.stats();
        let (events_rx, connection_task) = manager.spawn();

        let engine_loop = EngineLoop {
            store: StateStore::new(),
            snapshot: SnapshotStatus::Pending,
            api: api.clone(),
            loader: SnapshotLoader::new(api),
            frames: frames_tx,
            connection: connection_tx,
            completions: completions_tx,
        };
        let task = tokio::spawn(engine_loop.run(
            commands_rx,
            events_rx,
            completions_rx,
            connection_task,
        ));

        info!("Dashboard engine started");
        Self {
            dispatcher: CommandDispatcher::new(commands_tx),
            frames: frames_rx,
            connection: connection_rx,
            stats,
            task,
        }
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        self.dispatcher.clone()
    }

    /// Latest rendered frame; changes after every state mutation.
    pub fn frames(&self) -> watch::Receiver<DisplayTree> {
        self.frames.clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.stats.clone()
    }

    /// Stops the loop and closes the push channel. In-flight requests are
    /// left to finish; their results are discarded.
    pub async fn stop(self) {
        if self.dispatcher.shutdown().is_ok() {
            if let Err(e) = self.task.await {
                error!("Dashboard engine task failed: {}", e);
            }
        }
        info!("Dashboard engine stopped");
    }
}

struct EngineLoop {
    store: StateStore,
    snapshot: SnapshotStatus,
    api: Arc<dyn EndpointApi>,
    loader: SnapshotLoader,
    frames: watch::Sender<DisplayTree>,
    connection: watch::Sender<ConnectionState>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl EngineLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        connection_task: JoinHandle<()>,
    ) {
        self.load_snapshot(None);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = events.recv() => self.on_connection_event(event),
                Some(completion) = completions.recv() => self.on_completion(completion),
            }
        }

        connection_task.abort();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Refresh { reply } => self.load_snapshot(Some(reply)),
            Command::Create { request, reply } => {
                let api = self.api.clone();
                self.spawn_request(async move {
                    let result = api.create_endpoint(&request).await;
                    Completion::Created {
                        name: request.name,
                        result,
                        reply,
                    }
                });
            }
            Command::CheckNow { id } => {
                let api = self.api.clone();
                tokio::spawn(async move {
                    if let Err(e) = api.check_endpoint(&id).await {
                        warn!("Error checking endpoint {}: {}", id, e);
                    }
                });
            }
            Command::Remove { id, reply } => {
                let api = self.api.clone();
                self.spawn_request(async move {
                    let result = api.delete_endpoint(&id).await;
                    Completion::Removed { id, result, reply }
                });
            }
            Command::Records { reply } => {
                let _ = reply.send(self.store.values().cloned().collect());
            }
            Command::Shutdown => {}
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting { .. } => {
                self.connection.send_replace(ConnectionState::Connecting);
            }
            ConnectionEvent::Opened => {
                self.connection.send_replace(ConnectionState::Open);
            }
            ConnectionEvent::Closed { .. } => {
                self.connection.send_replace(ConnectionState::Disconnected);
            }
            ConnectionEvent::Update(record) => {
                self.store.upsert(record);
                self.publish();
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot { result, reply } => {
                snapshot::apply(&mut self.store, &mut self.snapshot, &result);
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(result.map(|_| ()));
                }
            }
            Completion::Created {
                name,
                result,
                reply,
            } => {
                match &result {
                    Ok(()) => {
                        info!("Added endpoint {}", name);
                        self.load_snapshot(None);
                    }
                    Err(e) => error!("Error adding endpoint {}: {}", name, e),
                }
                let _ = reply.send(result);
            }
            Completion::Removed { id, result, reply } => {
                match &result {
                    Ok(()) => {
                        self.store.remove(&id);
                        info!("Removed endpoint {}", id);
                        self.publish();
                    }
                    Err(e) => error!("Error removing endpoint {}: {}", id, e),
                }
                let _ = reply.send(result);
            }
        }
    }

    fn load_snapshot(&self, reply: Option<oneshot::Sender<Result<()>>>) {
        let loader = self.loader.clone();
        self.spawn_request(async move {
            let result = loader.fetch().await;
            Completion::Snapshot { result, reply }
        });
    }

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let _ = completions.send(request.await);
        });
    }

    fn publish(&self) {
        let frame = render(self.store.values(), &self.snapshot, Utc::now());
        self.frames.send_replace(frame);
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

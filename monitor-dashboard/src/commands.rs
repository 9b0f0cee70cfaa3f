//! Operator intents: create, check now, remove.

use async_trait::async_trait;
use monitor_core::{CreateEndpointRequest, EndpointRecord, Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::form::CreateForm;
use crate::render::UiCommand;

pub const REMOVE_PROMPT: &str = "Are you sure you want to remove this endpoint?";

/// Interactive confirmation for destructive commands.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Cancelled,
}

pub(crate) enum Command {
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    Create {
        request: CreateEndpointRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    CheckNow {
        id: String,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Records {
        reply: oneshot::Sender<Vec<EndpointRecord>>,
    },
    Shutdown,
}

/// Cloneable entry point for operator commands. Every command is executed
/// by the engine loop; this side only validates, confirms and waits.
#[derive(Clone)]
pub struct CommandDispatcher {
    commands: mpsc::UnboundedSender<Command>,
}

impl CommandDispatcher {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| Error::EngineStopped)
    }

    /// Validates the form and creates the endpoint. The form is cleared only
    /// once the server accepted it; a snapshot reload follows.
    pub async fn create(&self, form: &mut CreateForm) -> Result<()> {
        let request = form.validate()?;
        self.request(|reply| Command::Create { request, reply })
            .await??;
        form.clear();
        Ok(())
    }

    /// Fire-and-forget; the result shows up later on the push channel.
    pub fn check_now(&self, id: &str) {
        debug!("check requested for {}", id);
        if let Err(e) = self.send(Command::CheckNow { id: id.to_string() }) {
            warn!("Error checking endpoint {}: {}", id, e);
        }
    }

    pub async fn remove(&self, id: &str, confirm: &dyn Confirm) -> Result<RemoveOutcome> {
        if !confirm.confirm(REMOVE_PROMPT).await {
            debug!("removal of {} cancelled", id);
            return Ok(RemoveOutcome::Cancelled);
        }
        let id = id.to_string();
        self.request(|reply| Command::Remove { id, reply }).await??;
        Ok(RemoveOutcome::Removed)
    }

    /// Reloads the full snapshot.
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Current store contents, in store order.
    pub async fn records(&self) -> Result<Vec<EndpointRecord>> {
        self.request(|reply| Command::Records { reply }).await
    }

    /// Runs a command emitted by a rendered card.
    pub async fn dispatch(&self, command: &UiCommand, confirm: &dyn Confirm) -> Result<()> {
        match command {
            UiCommand::CheckNow(id) => {
                self.check_now(id);
                Ok(())
            }
            UiCommand::Remove(id) => self.remove(id, confirm).await.map(|_| ()),
        }
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

//! In-memory stand-ins for the server, shared by unit tests.

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use monitor_core::{CreateEndpointRequest, EndpointRecord, Error, Result};
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use tokio::sync::mpsc;

use crate::api::EndpointApi;
use crate::transport::{FrameStream, PushTransport};

/// Serves one scripted session per `connect`. Once the script runs out it
/// either fails every connect or hands out a channel that never yields.
pub struct ScriptedTransport {
    sessions: Mutex<VecDeque<FrameStream>>,
    fail_when_exhausted: bool,
    connects: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            fail_when_exhausted: false,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_when_exhausted: true,
            ..Self::new()
        }
    }

    pub fn push_session(&self, frames: Vec<Result<String>>) {
        self.sessions
            .lock()
            .unwrap()
            .push_back(stream::iter(frames).boxed());
    }

    /// Queues a session whose frames are fed through the returned sender;
    /// dropping the sender closes the channel.
    pub fn push_live_session(&self) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        self.sessions.lock().unwrap().push_back(frames.boxed());
        tx
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(&self) -> Result<FrameStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().unwrap().pop_front();
        match session {
            Some(frames) => Ok(frames),
            None if self.fail_when_exhausted => Err(Error::websocket("connection refused")),
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// Server state held in memory, with switches to make each call fail.
#[derive(Default)]
pub struct FakeApi {
    endpoints: Mutex<Vec<EndpointRecord>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_check: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeApi {
    pub fn with_endpoints(endpoints: Vec<EndpointRecord>) -> Self {
        Self {
            endpoints: Mutex::new(endpoints),
            ..Self::default()
        }
    }

    pub fn set_endpoints(&self, endpoints: Vec<EndpointRecord>) {
        *self.endpoints.lock().unwrap() = endpoints;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl EndpointApi for FakeApi {
    async fn list_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        self.record_call("list".to_string());
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::websocket("connection refused"));
        }
        Ok(self.endpoints.lock().unwrap().clone())
    }

    async fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<()> {
        self.record_call(format!("create {}", request.name));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::rejected(400, "Invalid JSON"));
        }
        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.endpoints.lock().unwrap().push(EndpointRecord {
            id,
            name: request.name.clone(),
            url: request.url.clone(),
            method: request.method.clone(),
            interval_seconds: request.interval,
            timeout_seconds: request.timeout,
            status: "checking".to_string(),
            status_code: None,
            response_time_ms: None,
            last_check: None,
            error: None,
            labels: Default::default(),
            probe_type: None,
        });
        Ok(())
    }

    async fn check_endpoint(&self, id: &str) -> Result<()> {
        self.record_call(format!("check {}", id));
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(Error::rejected(404, "Endpoint not found"));
        }
        Ok(())
    }

    async fn delete_endpoint(&self, id: &str) -> Result<()> {
        self.record_call(format!("delete {}", id));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::rejected(500, "Internal server error"));
        }
        self.endpoints.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }
}

//! Full-state bootstrap and refresh.

use monitor_core::{EndpointRecord, Error, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::EndpointApi;
use crate::store::StateStore;

/// Outcome of the most recent snapshot load. Keeps "confirmed empty" apart
/// from "unknown because the fetch failed".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SnapshotStatus {
    #[default]
    Pending,
    Loaded,
    Failed(String),
}

#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn EndpointApi>,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn EndpointApi>) -> Self {
        Self { api }
    }

    pub async fn fetch(&self) -> Result<Vec<EndpointRecord>> {
        self.api.list_endpoints().await
    }
}

/// Replaces the store on success; on failure the store is left as it was.
pub fn apply(
    store: &mut StateStore,
    status: &mut SnapshotStatus,
    result: &Result<Vec<EndpointRecord>>,
) {
    match result {
        Ok(records) => {
            store.replace_all(records.iter().cloned());
            *status = SnapshotStatus::Loaded;
            info!("Loaded {} endpoints", store.len());
        }
        Err(e) => {
            log_failure(e);
            *status = SnapshotStatus::Failed(e.to_string());
        }
    }
}

fn log_failure(e: &Error) {
    if e.is_transport() {
        warn!("Error loading endpoints, keeping previous state: {}", e);
    } else {
        error!("Error loading endpoints, keeping previous state: {}", e);
    }
}

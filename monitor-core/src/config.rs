use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub path: String,
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub push: PushConfig,
}

impl Config {
    /// Defaults, then the optional config file, then `DASHBOARD__*` variables,
    /// then `MONITOR_SERVER_URL`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut cfg = config::Config::builder();

        cfg = cfg
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("server.request_timeout_secs", 10)?
            .set_default("push.path", "/ws")?
            .set_default("push.reconnect_delay_ms", 3000)?;

        if let Some(path) = file {
            cfg = cfg.add_source(config::File::from(path).required(true));
        }

        cfg = cfg.add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("__")
                .separator("__"),
        );

        if let Ok(server_url) = env::var("MONITOR_SERVER_URL") {
            cfg = cfg.set_override("server.base_url", server_url)?;
        }

        Ok(cfg.build()?.try_deserialize()?)
    }

    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server.base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::validation(format!(
                "server.base_url must use http or https, got {}",
                other
            ))),
        }
    }

    /// Push channel URL, derived from the base URL unless `push.url` is set.
    /// `push.path` is resolved under the base path, like the API routes.
    pub fn push_url(&self) -> Result<Url> {
        if let Some(explicit) = &self.push.url {
            return Ok(Url::parse(explicit)?);
        }

        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::internal(format!("cannot switch {} to {}", url, scheme)))?;
        url.path_segments_mut()
            .map_err(|_| Error::internal(format!("{} cannot be a base URL", self.server.base_url)))?
            .pop_if_empty()
            .extend(self.push.path.split('/').filter(|segment| !segment.is_empty()));
        url.set_query(None);
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.push.reconnect_delay_ms)
    }
}

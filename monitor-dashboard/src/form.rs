//! Operator input for creating an endpoint.

use monitor_core::{CreateEndpointRequest, Error, Result};
use reqwest::Method;
use url::Url;

/// Raw, unvalidated form fields. Left untouched when a create fails so the
/// operator can correct them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateForm {
    pub name: String,
    pub url: String,
    pub method: String,
    pub interval: String,
    pub timeout: String,
}

impl CreateForm {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<CreateEndpointRequest> {
        let name = required("name", &self.name)?;

        let url = required("url", &self.url)?;
        let parsed = Url::parse(url).map_err(|e| Error::validation(format!("url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "url: scheme must be http or https, got {}",
                parsed.scheme()
            )));
        }

        let method = required("method", &self.method)?.to_ascii_uppercase();
        Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::validation(format!("method: {} is not an HTTP method", method)))?;

        Ok(CreateEndpointRequest {
            name: name.to_string(),
            url: url.to_string(),
            method,
            interval: seconds("interval", &self.interval)?,
            timeout: seconds("timeout", &self.timeout)?,
        })
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(value)
}

fn seconds(field: &str, value: &str) -> Result<u32> {
    match required(field, value)?.parse::<u32>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(Error::validation(format!(
            "{} must be a positive number of seconds",
            field
        ))),
    }
}

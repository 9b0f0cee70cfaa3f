use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Latest known state of one monitored endpoint, as sent by the server on
/// both `GET /api/endpoints` and the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    #[serde(rename = "interval")]
    pub interval_seconds: u32,
    #[serde(rename = "timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(
        default,
        deserialize_with = "zero_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub status_code: Option<u16>,
    #[serde(
        rename = "responseTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_time_ms: Option<u64>,
    #[serde(
        default,
        deserialize_with = "zero_time_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "zero_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(
        rename = "probe_type",
        default,
        deserialize_with = "zero_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub probe_type: Option<String>,
}

/// Body of `POST /api/endpoints`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEndpointRequest {
    pub name: String,
    pub url: String,
    pub method: String,
    pub interval: u32,
    pub timeout: u32,
}

fn unknown_status() -> String {
    "unknown".to_string()
}

// The server encodes "no value" as the zero value of the field type.
fn zero_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default + PartialEq,
{
    Ok(Option::<T>::deserialize(deserializer)?.filter(|value| *value != T::default()))
}

fn zero_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.filter(|time| time.year() > 1))
}

pub mod models;
pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{CreateEndpointRequest, EndpointRecord};

//! Health endpoint probing.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{ClientError, MonitorError};

/// One request against a health endpoint.
pub trait HealthProbe {
    /// Return the HTTP status, or `Err` when no status was received.
    fn probe(&self, url: &str) -> Result<u16, MonitorError>;
}

/// [`HealthProbe`] issuing a plain `GET`.
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HealthProbe for HttpHealthProbe {
    fn probe(&self, url: &str) -> Result<u16, MonitorError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| MonitorError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        debug!(url, status, "health probe answered");
        Ok(status)
    }
}

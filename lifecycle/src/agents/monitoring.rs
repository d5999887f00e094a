//! Health endpoint polling after deployment.

use tracing::{info, instrument};

use crate::core::retry::{RetryPolicy, always, retry_with_backoff};
use crate::error::MonitorError;
use crate::io::health::HealthProbe;

/// Status that counts as healthy.
const HEALTHY_STATUS: u16 = 200;

pub struct MonitoringAgent<'a> {
    probe: &'a dyn HealthProbe,
    health_url: String,
    policy: RetryPolicy,
}

impl<'a> MonitoringAgent<'a> {
    pub fn new(probe: &'a dyn HealthProbe, health_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            probe,
            health_url: health_url.into(),
            policy,
        }
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Probe until the endpoint answers 200 or the attempt budget is spent.
    #[instrument(skip_all, fields(url = %self.health_url))]
    pub fn check_health(&self) -> Result<(), MonitorError> {
        let mut attempts = 0;
        let outcome = retry_with_backoff(
            &self.policy,
            "health check",
            |attempt| {
                attempts = attempt;
                match self.probe.probe(&self.health_url)? {
                    HEALTHY_STATUS => Ok(()),
                    status => Err(MonitorError::UnexpectedStatus(status)),
                }
            },
            always,
        );
        match outcome {
            Ok(()) => {
                info!(attempts, "service healthy");
                Ok(())
            }
            Err(last) => Err(MonitorError::Unhealthy {
                url: self.health_url.clone(),
                attempts,
                last: Box::new(last),
            }),
        }
    }
}

//! Polling helpers
//!
//! Waiters poll a resource's status field until it reaches a target, hits a
//! declared failure status, or the deadline passes. Status comparison is
//! case-insensitive because services disagree on casing (`ACTIVE` vs
//! `active`, `error` vs `ERROR`).

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::error::{Error, Result};
use crate::resource::Resource;

use super::Proxy;

/// Polling interval and deadline for the wait helpers.
#[derive(Debug, Clone, Copy)]
pub struct WaitOpts {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOpts {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

impl Proxy {
    /// Poll the resource until its status field equals `target`. A status
    /// listed in the definition's `failure_statuses` fails fast, carrying
    /// the resource's fault message when the service reports one.
    pub async fn wait_for_status(
        &self,
        resource: &mut Resource,
        target: &str,
        opts: WaitOpts,
    ) -> Result<()> {
        let def = resource.def();
        self.check_service(resource.key(), def)?;

        let deadline = Instant::now() + opts.timeout;
        loop {
            self.refresh(resource).await?;
            let status = resource.status().unwrap_or_default();

            if status.eq_ignore_ascii_case(target) {
                tracing::debug!("{} {:?} reached {}", resource.key(), resource.id(), status);
                return Ok(());
            }

            if def
                .failure_statuses
                .iter()
                .any(|failure| failure.eq_ignore_ascii_case(&status))
            {
                return Err(Error::ResourceFailed {
                    resource: resource.key().to_string(),
                    id: resource.id().unwrap_or_default(),
                    status,
                    fault: fault_message(resource),
                });
            }

            if Instant::now() + opts.interval > deadline {
                return Err(Error::WaitTimeout {
                    resource: resource.key().to_string(),
                    id: resource.id().unwrap_or_default(),
                    last_status: status,
                });
            }
            sleep(opts.interval).await;
        }
    }

    /// Poll until fetching the resource returns NotFound. A 404 on the very
    /// first poll counts as success.
    pub async fn wait_for_delete(&self, key: &str, id: &str, opts: WaitOpts) -> Result<()> {
        self.resolve(key)?;
        let mut resource = self.stub(key, id, &[])?;

        let deadline = Instant::now() + opts.timeout;
        loop {
            match self.refresh(&mut resource).await {
                Err(err) if err.is_not_found() => {
                    tracing::debug!("{} {} is gone", key, id);
                    return Ok(());
                }
                Err(err) => return Err(err),
                Ok(()) => {}
            }

            if Instant::now() + opts.interval > deadline {
                return Err(Error::WaitTimeout {
                    resource: key.to_string(),
                    id: id.to_string(),
                    last_status: resource
                        .status()
                        .unwrap_or_else(|| "present".to_string()),
                });
            }
            sleep(opts.interval).await;
        }
    }
}

/// Fault message the compute and block-storage services attach to failed
/// resources, when present.
fn fault_message(resource: &Resource) -> String {
    resource
        .get("fault")
        .and_then(|fault| fault.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no fault reported")
        .to_string()
}

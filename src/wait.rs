//! Readiness barrier for freshly launched instances
//!
//! A launch call returns while the instance is still `pending`. The barrier
//! re-fetches the instance by name on a fixed interval until it reports
//! `running`; exhausting the retry budget is an error, not a silent timeout.

use std::time::Duration;

use tracing::warn;

use crate::aws::ec2::Ec2Api;
use crate::error::{CloudError, ErrorCode, LifecycleError, Result};
use crate::instance::{fetch_instance, Instance};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_RETRIES: u32 = 9;

/// Barrier applied to an instance after launch.
#[derive(Debug, Clone)]
pub enum Barrier {
    /// Return the instance exactly as the provider reported it.
    Noop,
    /// Poll until the instance reaches `running`, re-fetching it by name up
    /// to `retries` times with `interval` between attempts.
    UntilRunning { interval: Duration, retries: u32 },
}

impl Barrier {
    /// Running barrier with the stock polling budget.
    pub fn until_running() -> Self {
        Self::UntilRunning {
            interval: DEFAULT_INTERVAL,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Hold `instance` against the barrier.
    pub async fn wait(&self, ec2: &impl Ec2Api, instance: Instance) -> Result<Instance> {
        match *self {
            Self::Noop => Ok(instance),
            Self::UntilRunning { interval, retries } => {
                wait_until_running(ec2, instance, interval, retries).await
            }
        }
    }
}

fn is_running(instance: &Instance) -> bool {
    instance.state == "running"
}

async fn wait_until_running(
    ec2: &impl Ec2Api,
    mut instance: Instance,
    interval: Duration,
    retries: u32,
) -> Result<Instance> {
    if is_running(&instance) {
        return Ok(instance);
    }

    // Polling goes through the name lookup, so an unnamed instance cannot
    // be waited on.
    let name = instance
        .name
        .clone()
        .ok_or_else(|| CloudError::new("cannot poll an instance with no Name tag"))?;

    for attempt in 1..=retries {
        warn!(attempt, retries, "Instance is pending, checking again");
        tokio::time::sleep(interval).await;

        instance = fetch_instance(ec2, &name).await?;
        if is_running(&instance) {
            return Ok(instance);
        }
    }

    Err(LifecycleError::error(
        ErrorCode::InstanceNotRunning,
        format!("Instance not running, still in {}", instance.state),
    ))
}

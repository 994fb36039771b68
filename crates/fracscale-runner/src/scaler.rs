//! The external scaler capability and a shell-command implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ScaleError, ScaleResult};

/// Sets the whole-replica count of the worker deployment.
#[async_trait]
pub trait Scaler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Request `replicas` workers. Returns the count now in effect.
    async fn apply(&self, replicas: u32) -> ScaleResult<u32>;
}

/// Runs a command template through `sh -c`, substituting `{replicas}`.
///
/// Each run is bounded by a timeout; a command still running when it
/// elapses is killed and reported as unavailable.
///
/// ```text
/// kubectl scale --replicas={replicas} deploy/worker
/// ```
#[derive(Debug, Clone)]
pub struct CommandScaler {
    template: String,
    timeout: Duration,
}

impl CommandScaler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn render(&self, replicas: u32) -> String {
        self.template.replace("{replicas}", &replicas.to_string())
    }
}

#[async_trait]
impl Scaler for CommandScaler {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn apply(&self, replicas: u32) -> ScaleResult<u32> {
        let command = self.render(replicas);
        debug!(%command, "running scale command");

        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(output) => {
                output.map_err(|e| ScaleError::Unavailable(format!("`{command}`: {e}")))?
            }
            Err(_) => {
                warn!(%command, timeout = ?self.timeout, "scale command timed out");
                return Err(ScaleError::Unavailable(format!(
                    "`{command}` timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => output.status.to_string(),
                msg => msg.to_string(),
            };
            return Err(ScaleError::Rejected {
                requested: replicas,
                reason,
            });
        }

        info!(replicas, "scale command succeeded");
        Ok(replicas)
    }
}

//! Shared scalar parameters (key/value store semantics).
//!
//! Gates and fractional throttling parameters are plain string values.
//! Every typed read falls back to a safe default when the key is absent
//! or unparsable: `false` for gates, `0.0` for reals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use fracscale_core::FractionalParameters;

use crate::error::QueueResult;

/// Gate that lets workers register.
pub const WORKER_GATE: &str = "worker_should_go";
/// Gate that lets the load generator start.
pub const LOAD_GATE: &str = "load_gen_should_go";
/// Probability that a worker skips a work cycle.
pub const FRACTIONAL_PROB: &str = "fractional_prob";
/// Seconds a skipped cycle sleeps.
pub const FRACTIONAL_DELAY: &str = "fractional_delay_s";

/// A key/value store for shared scalars.
#[async_trait]
pub trait ParamStore: Send + Sync {
    async fn get(&self, key: &str) -> QueueResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> QueueResult<()>;

    /// Read a boolean gate; absent means `false`.
    async fn flag(&self, key: &str) -> QueueResult<bool> {
        Ok(self
            .get(key)
            .await?
            .is_some_and(|v| matches!(v.trim(), "true" | "1" | "yes")))
    }

    /// Read a real; absent or unparsable means `0.0`.
    async fn real(&self, key: &str) -> QueueResult<f64> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0))
    }

    /// Read the current fractional parameters; absent reads as (0, 0).
    async fn fractional(&self) -> QueueResult<FractionalParameters> {
        let probability = self.real(FRACTIONAL_PROB).await?;
        let delay_s = self.real(FRACTIONAL_DELAY).await?.max(0.0);
        Ok(FractionalParameters::new(
            probability,
            Duration::from_secs_f64(delay_s),
        ))
    }

    /// Publish new fractional parameters for every worker.
    async fn publish_fractional(&self, params: FractionalParameters) -> QueueResult<()> {
        self.set(FRACTIONAL_PROB, &params.probability.to_string())
            .await?;
        self.set(FRACTIONAL_DELAY, &params.delay.as_secs_f64().to_string())
            .await
    }
}

/// In-process parameter store.
#[derive(Clone, Default)]
pub struct MemoryParams {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryParams {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParamStore for MemoryParams {
    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        debug!(%key, %value, "parameter set");
        Ok(())
    }
}

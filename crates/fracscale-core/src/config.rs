//! fracscale.toml configuration parser.
//!
//! Every field has a default, so an empty document is a valid
//! configuration. Durations are strings ("5s", "500ms", "2m").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FracscaleConfig {
    pub controller: ControllerConfig,
    pub policy: PolicyConfig,
    pub runner: RunnerConfig,
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub load: LoadConfig,
}

// ── Controllers ───────────────────────────────────────────────────

/// Which controller strategy drives the loop, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerConfig {
    #[serde(rename = "bangbang", alias = "bang_bang")]
    BangBang(BangBangConfig),
    #[serde(rename = "pid", alias = "proportional")]
    Proportional(ProportionalConfig),
    Scheduled(ScheduledConfig),
    #[serde(alias = "add_delete_fixed")]
    Fixed(FixedConfig),
    #[serde(alias = "k8s_native")]
    Passthrough(PassthroughConfig),
    Random,
    DoNothing,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::BangBang(BangBangConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BangBangConfig {
    /// Latency objective for p99, in milliseconds.
    pub slo_ms: f64,
    /// Scale down below `low_fraction * slo_ms`.
    pub low_fraction: f64,
    /// Scale up above `high_fraction * slo_ms`.
    pub high_fraction: f64,
    /// Magnitude of each step.
    pub step: f64,
}

impl Default for BangBangConfig {
    fn default() -> Self {
        Self {
            slo_ms: 150.0,
            low_fraction: 0.5,
            high_fraction: 0.8,
            step: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProportionalConfig {
    /// Expected seconds to process one unit on one replica.
    pub processing_time_s: f64,
    /// Target arrival/service ratio.
    pub target_utilization: f64,
    /// Proportional gain. Arrival counts are turned into a rate over the
    /// control period (`runner.period`).
    pub k_p: f64,
}

impl Default for ProportionalConfig {
    fn default() -> Self {
        Self {
            processing_time_s: 0.02,
            target_utilization: 0.4,
            k_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledConfig {
    /// Slash-separated deltas applied one per tick, wrapping ("1/0/-1/0").
    pub pattern: String,
    /// Initial running count; taken from the first snapshot when unset.
    pub start_replicas: Option<f64>,
}

impl Default for ScheduledConfig {
    fn default() -> Self {
        Self {
            pattern: "1/0/-1/0".to_string(),
            start_replicas: None,
        }
    }
}

impl ScheduledConfig {
    /// Parse `pattern` into its deltas.
    pub fn deltas(&self) -> ConfigResult<Vec<f64>> {
        let deltas = self
            .pattern
            .split('/')
            .map(|s| s.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::invalid("controller.pattern", e.to_string()))?;
        if deltas.is_empty() || deltas.iter().any(|d| !d.is_finite()) {
            return Err(ConfigError::invalid(
                "controller.pattern",
                format!("`{}` has no usable deltas", self.pattern),
            ));
        }
        Ok(deltas)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedConfig {
    /// Delta applied every tick.
    pub delta: f64,
    pub start_replicas: Option<f64>,
}

impl Default for FixedConfig {
    fn default() -> Self {
        Self {
            delta: 1.0,
            start_replicas: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughConfig {
    /// CPU utilization percentage handed to the external autoscaler.
    pub target_cpu: u32,
    pub max_replicas: u32,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            target_cpu: 50,
            max_replicas: 72,
        }
    }
}

impl ControllerConfig {
    /// Registry name of this controller.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BangBang(_) => "bangbang",
            Self::Proportional(_) => "pid",
            Self::Scheduled(_) => "scheduled",
            Self::Fixed(_) => "fixed",
            Self::Passthrough(_) => "passthrough",
            Self::Random => "random",
            Self::DoNothing => "do_nothing",
        }
    }

    /// Default configuration for a registry name.
    pub fn default_for(kind: &str) -> ConfigResult<Self> {
        Ok(match kind {
            "bangbang" | "bang_bang" => Self::BangBang(BangBangConfig::default()),
            "pid" | "proportional" => Self::Proportional(ProportionalConfig::default()),
            "scheduled" => Self::Scheduled(ScheduledConfig::default()),
            "fixed" | "add_delete_fixed" => Self::Fixed(FixedConfig::default()),
            "passthrough" | "k8s_native" => Self::Passthrough(PassthroughConfig::default()),
            "random" => Self::Random,
            "do_nothing" => Self::DoNothing,
            other => return Err(ConfigError::UnknownController(other.to_string())),
        })
    }

    /// Build a controller config from a registry name and `k=v,k=v`
    /// arguments layered over the kind's defaults.
    pub fn from_args(kind: &str, args: &str) -> ConfigResult<Self> {
        let mut config = Self::default_for(kind)?;
        for (key, value) in parse_custom_args(args)? {
            config.set_arg(&key, &value)?;
        }
        Ok(config)
    }

    fn set_arg(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let bad = || ConfigError::BadArgument(format!("{key}={value}"));
        let real = || value.parse::<f64>().map_err(|_| bad());
        let whole = || value.parse::<u32>().map_err(|_| bad());

        match (self, key) {
            (Self::BangBang(c), "slo" | "slo_ms") => c.slo_ms = real()?,
            (Self::BangBang(c), "low" | "low_fraction") => c.low_fraction = real()?,
            (Self::BangBang(c), "high" | "high_fraction") => c.high_fraction = real()?,
            (Self::BangBang(c), "step") => c.step = real()?,
            (Self::Proportional(c), "model_processing_time_s" | "processing_time_s") => {
                c.processing_time_s = real()?
            }
            (Self::Proportional(c), "target_sigma" | "target_utilization") => {
                c.target_utilization = real()?
            }
            (Self::Proportional(c), "k_p") => c.k_p = real()?,
            (Self::Scheduled(c), "pattern") => c.pattern = value.to_string(),
            (Self::Scheduled(c), "start_replicas") => c.start_replicas = Some(real()?),
            (Self::Fixed(c), "delta") => c.delta = real()?,
            (Self::Fixed(c), "start_replicas") => c.start_replicas = Some(real()?),
            (Self::Passthrough(c), "target_cpu") => c.target_cpu = whole()?,
            (Self::Passthrough(c), "max_replicas") => c.max_replicas = whole()?,
            _ => return Err(bad()),
        }
        Ok(())
    }

    /// Check parameter ranges for the selected controller.
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::BangBang(c) => {
                if !(c.slo_ms > 0.0) {
                    return Err(ConfigError::invalid("controller.slo_ms", "must be positive"));
                }
                if !(c.low_fraction > 0.0 && c.low_fraction < c.high_fraction) {
                    return Err(ConfigError::invalid(
                        "controller.low_fraction",
                        format!(
                            "thresholds must satisfy 0 < low ({}) < high ({})",
                            c.low_fraction, c.high_fraction
                        ),
                    ));
                }
                if !c.step.is_finite() || c.step < 0.0 {
                    return Err(ConfigError::invalid("controller.step", "must be non-negative"));
                }
            }
            Self::Proportional(c) => {
                if !(c.processing_time_s > 0.0) {
                    return Err(ConfigError::invalid(
                        "controller.processing_time_s",
                        "must be positive",
                    ));
                }
                if !(c.target_utilization > 0.0) {
                    return Err(ConfigError::invalid(
                        "controller.target_utilization",
                        "must be positive",
                    ));
                }
                if !c.k_p.is_finite() {
                    return Err(ConfigError::invalid("controller.k_p", "must be finite"));
                }
            }
            Self::Scheduled(c) => {
                c.deltas()?;
            }
            Self::Fixed(c) => {
                if !c.delta.is_finite() {
                    return Err(ConfigError::invalid("controller.delta", "must be finite"));
                }
            }
            Self::Passthrough(c) => {
                if c.target_cpu == 0 || c.target_cpu >= 100 {
                    return Err(ConfigError::invalid(
                        "controller.target_cpu",
                        "must be in (0, 100)",
                    ));
                }
                if c.max_replicas == 0 {
                    return Err(ConfigError::invalid("controller.max_replicas", "must be positive"));
                }
            }
            Self::Random | Self::DoNothing => {}
        }
        Ok(())
    }
}

/// Split `k=v,k=v` into ordered pairs. An empty string yields no pairs.
pub fn parse_custom_args(args: &str) -> ConfigResult<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for pair in args.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::BadArgument(pair.to_string()))?;
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(parsed)
}

// ── Policy ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 72,
        }
    }
}

// ── Runner ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Control period.
    pub period: String,
    /// Replicas that must register before load starts.
    pub start_replicas: u32,
    /// Consecutive 100%-complete ticks required before stopping.
    pub stabilization_ticks: u32,
    /// How often to poll while waiting for replicas to register.
    pub registration_poll: String,
    /// Root directory for run artifacts.
    pub results_dir: PathBuf,
    /// Scale command template; `{replicas}` is substituted. When unset
    /// the runner scales an in-process worker pool.
    pub scale_command: Option<String>,
    /// Bounded wait for one scale command; a timeout fails the tick.
    pub scale_timeout: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            period: "5s".to_string(),
            start_replicas: 5,
            stabilization_ticks: 3,
            registration_poll: "1s".to_string(),
            results_dir: PathBuf::from("results"),
            scale_command: None,
            scale_timeout: "30s".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn period(&self) -> Duration {
        parse_duration(&self.period).unwrap_or(Duration::from_secs(5))
    }

    pub fn registration_poll(&self) -> Duration {
        parse_duration(&self.registration_poll).unwrap_or(Duration::from_secs(1))
    }

    pub fn scale_timeout(&self) -> Duration {
        parse_duration(&self.scale_timeout).unwrap_or(Duration::from_secs(30))
    }
}

// ── Worker ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Bounded wait for a single pop.
    pub pop_timeout: String,
    pub heartbeat_interval: String,
    /// A successful heartbeat after a gap this long forces re-registration.
    pub heartbeat_lapse: String,
    pub fractional_poll: String,
    pub termination_poll: String,
    /// Poll interval while waiting for the start gate.
    pub gate_poll: String,
    /// Simulated processing time per unit for the default handler.
    pub processing_time: String,
    /// Apply the fractional skip check before each pull.
    pub fractional_enabled: bool,
    /// File whose appearance retires the worker pool and ends the run.
    pub termination_marker: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pop_timeout: "1s".to_string(),
            heartbeat_interval: "1s".to_string(),
            heartbeat_lapse: "5s".to_string(),
            fractional_poll: "1s".to_string(),
            termination_poll: "1s".to_string(),
            gate_poll: "1s".to_string(),
            processing_time: "20ms".to_string(),
            fractional_enabled: true,
            termination_marker: None,
        }
    }
}

impl WorkerConfig {
    pub fn pop_timeout(&self) -> Duration {
        parse_duration(&self.pop_timeout).unwrap_or(Duration::from_secs(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        parse_duration(&self.heartbeat_interval).unwrap_or(Duration::from_secs(1))
    }

    pub fn heartbeat_lapse(&self) -> Duration {
        parse_duration(&self.heartbeat_lapse).unwrap_or(Duration::from_secs(5))
    }

    pub fn fractional_poll(&self) -> Duration {
        parse_duration(&self.fractional_poll).unwrap_or(Duration::from_secs(1))
    }

    pub fn termination_poll(&self) -> Duration {
        parse_duration(&self.termination_poll).unwrap_or(Duration::from_secs(1))
    }

    pub fn gate_poll(&self) -> Duration {
        parse_duration(&self.gate_poll).unwrap_or(Duration::from_secs(1))
    }

    pub fn processing_time(&self) -> Duration {
        parse_duration(&self.processing_time).unwrap_or(Duration::from_millis(20))
    }
}

// ── Queue engine ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Heartbeat age after which a queue is treated as abandoned.
    pub heartbeat_timeout: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: "5s".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        parse_duration(&self.heartbeat_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ── Load generator ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Inter-arrival deltas in ms: a JSON array or one number per line.
    pub deltas_file: Option<PathBuf>,
    pub payload_bytes: usize,
    /// Fractional skip delay published alongside the probability.
    pub fractional_delay: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            deltas_file: None,
            payload_bytes: 100,
            fractional_delay: "1s".to_string(),
        }
    }
}

impl LoadConfig {
    pub fn fractional_delay(&self) -> Duration {
        parse_duration(&self.fractional_delay).unwrap_or(Duration::from_secs(1))
    }
}

// ── Loading + validation ──────────────────────────────────────────

impl FracscaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the control loop cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.controller.validate()?;

        if self.policy.min_replicas < 1 {
            return Err(ConfigError::invalid("policy.min_replicas", "must be at least 1"));
        }
        if self.policy.min_replicas > self.policy.max_replicas {
            return Err(ConfigError::invalid(
                "policy.max_replicas",
                format!(
                    "max ({}) is below min ({})",
                    self.policy.max_replicas, self.policy.min_replicas
                ),
            ));
        }
        if self.runner.stabilization_ticks == 0 {
            return Err(ConfigError::invalid(
                "runner.stabilization_ticks",
                "must be at least 1",
            ));
        }

        require_duration("runner.period", &self.runner.period, false)?;
        require_duration("runner.registration_poll", &self.runner.registration_poll, false)?;
        require_duration("runner.scale_timeout", &self.runner.scale_timeout, false)?;
        require_duration("worker.pop_timeout", &self.worker.pop_timeout, false)?;
        require_duration("worker.heartbeat_interval", &self.worker.heartbeat_interval, false)?;
        require_duration("worker.heartbeat_lapse", &self.worker.heartbeat_lapse, false)?;
        require_duration("worker.fractional_poll", &self.worker.fractional_poll, false)?;
        require_duration("worker.termination_poll", &self.worker.termination_poll, false)?;
        require_duration("worker.gate_poll", &self.worker.gate_poll, false)?;
        require_duration("worker.processing_time", &self.worker.processing_time, true)?;
        require_duration("queue.heartbeat_timeout", &self.queue.heartbeat_timeout, false)?;
        require_duration("load.fractional_delay", &self.load.fractional_delay, true)?;
        Ok(())
    }
}

fn require_duration(field: &'static str, value: &str, allow_zero: bool) -> ConfigResult<()> {
    match parse_duration(value) {
        Some(d) if allow_zero || !d.is_zero() => Ok(()),
        Some(_) => Err(ConfigError::invalid(field, "must be greater than zero")),
        None => Err(ConfigError::invalid(
            field,
            format!("`{value}` is not a duration"),
        )),
    }
}

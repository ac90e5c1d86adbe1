//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Application configuration sections, defaults, loading and validation."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    4800
}

fn default_nominal_frequency() -> f64 {
    60.0
}

fn default_headroom() -> f64 {
    0.1
}

fn default_voltage_full_scale() -> f64 {
    300.0
}

fn default_current_full_scale() -> f64 {
    100.0
}

fn default_sequence_poll() -> Duration {
    Duration::from_millis(50)
}

fn default_waveform_interval() -> Duration {
    Duration::from_millis(16)
}

fn default_analysis_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_idle_sleep() -> Duration {
    Duration::from_millis(2)
}

fn default_max_harmonic() -> usize {
    15
}

fn default_goose_timeout() -> Duration {
    Duration::from_millis(20)
}

fn default_tester_poll() -> Duration {
    Duration::from_millis(10)
}

/// Primary configuration object for the R-PRT runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub goose: GooseConfig,
    #[serde(default)]
    pub testers: TesterConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "R_PRT_CONFIG";

    /// Load configuration from disk, respecting the `R_PRT_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;
        self.sequence.validate()?;
        self.analyzer.validate()?;
        if self.goose.receive_timeout.is_zero() {
            return Err(anyhow!("goose receive_timeout must be non-zero"));
        }
        if self.testers.poll_interval.is_zero() {
            return Err(anyhow!("testers poll_interval must be non-zero"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter used when neither `R_PRT_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write the daily rolling JSON file next to stdout.
    #[serde(default = "default_true")]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
            to_file: true,
        }
    }
}

/// Sampled Value codec defaults and tick driver placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_nominal_frequency")]
    pub nominal_frequency: f64,
    /// Fraction of the integer range that full-scale RMS maps onto.
    #[serde(default = "default_headroom")]
    pub headroom: f64,
    #[serde(default = "default_voltage_full_scale")]
    pub voltage_full_scale: f64,
    #[serde(default = "default_current_full_scale")]
    pub current_full_scale: f64,
    /// SCHED_FIFO level for tick drivers. `None` keeps the default scheduler.
    #[serde(default)]
    pub tick_priority: Option<i32>,
    #[serde(default)]
    pub cpu_affinity: Vec<usize>,
    #[serde(default)]
    pub lock_memory: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            nominal_frequency: default_nominal_frequency(),
            headroom: default_headroom(),
            voltage_full_scale: default_voltage_full_scale(),
            current_full_scale: default_current_full_scale(),
            tick_priority: None,
            cpu_affinity: Vec::new(),
            lock_memory: false,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(anyhow!("codec sample_rate must be positive"));
        }
        if self.nominal_frequency <= 0.0 {
            return Err(anyhow!("codec nominal_frequency must be positive"));
        }
        if !(self.headroom > 0.0 && self.headroom <= 1.0) {
            return Err(anyhow!(
                "codec headroom {} must lie in (0, 1]",
                self.headroom
            ));
        }
        if self.voltage_full_scale <= 0.0 || self.current_full_scale <= 0.0 {
            return Err(anyhow!("codec full-scale values must be positive"));
        }
        if let Some(priority) = self.tick_priority {
            if !(1..=99).contains(&priority) {
                return Err(anyhow!(
                    "codec tick_priority {} outside SCHED_FIFO range 1..=99",
                    priority
                ));
            }
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "default_sequence_poll")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_sequence_poll(),
        }
    }
}

impl SequenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("sequence poll_interval must be non-zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_nominal_frequency")]
    pub nominal_frequency: f64,
    #[serde(default = "default_waveform_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub waveform_interval: Duration,
    #[serde(default = "default_analysis_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub analysis_interval: Duration,
    #[serde(default = "default_idle_sleep")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_sleep: Duration,
    #[serde(default = "default_max_harmonic")]
    pub max_harmonic: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            nominal_frequency: default_nominal_frequency(),
            waveform_interval: default_waveform_interval(),
            analysis_interval: default_analysis_interval(),
            idle_sleep: default_idle_sleep(),
            max_harmonic: default_max_harmonic(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nominal_frequency <= 0.0 {
            return Err(anyhow!("analyzer nominal_frequency must be positive"));
        }
        if self.waveform_interval.is_zero() || self.analysis_interval.is_zero() {
            return Err(anyhow!("analyzer cadences must be non-zero"));
        }
        if self.max_harmonic < 2 {
            return Err(anyhow!(
                "analyzer max_harmonic {} must be at least 2",
                self.max_harmonic
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GooseConfig {
    #[serde(default = "default_goose_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub receive_timeout: Duration,
}

impl Default for GooseConfig {
    fn default() -> Self {
        Self {
            receive_timeout: default_goose_timeout(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterConfig {
    #[serde(default = "default_tester_poll")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_tester_poll(),
        }
    }
}

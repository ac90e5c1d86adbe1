//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Bench configuration: application sections plus initial streams and rules."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use r_prt_codec::StreamConfig;
use r_prt_common::AppConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything a [`TestBench`](crate::TestBench) is built from.
///
/// ```toml
/// [codec]
/// sample_rate = 4800
///
/// [[streams]]
/// sv_id = "MU01"
///
/// [rules]
/// ptrc = "IED1/PTRC1.Tr.general == true"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(flatten)]
    pub app: AppConfig,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    /// Trip rules by name, added in document order.
    #[serde(default)]
    pub rules: IndexMap<String, String>,
}

impl BenchConfig {
    /// Load from the first existing candidate, honouring `R_PRT_CONFIG`.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(AppConfig::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(&PathBuf::from(env_path));
            }
        }
        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                return Self::from_path(path);
            }
        }
        info!("no bench configuration found, using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading bench configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("invalid bench configuration {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.app.validate()?;
        let mut seen = HashSet::new();
        for stream in &self.streams {
            stream
                .validate()
                .with_context(|| format!("stream {} is invalid", stream.sv_id))?;
            if !seen.insert(stream.sv_id.as_str()) {
                return Err(anyhow!("stream {} is declared twice", stream.sv_id));
            }
        }
        if let Some((name, _)) = self.rules.iter().find(|(_, expr)| expr.trim().is_empty()) {
            return Err(anyhow!("rule {name} has an empty expression"));
        }
        Ok(())
    }
}

impl FromStr for BenchConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> Result<Self> {
        let config: BenchConfig =
            toml::from_str(content).with_context(|| "failed to parse bench configuration")?;
        config.validate()?;
        Ok(config)
    }
}

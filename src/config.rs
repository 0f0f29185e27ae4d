use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{ContextCache, LoadBalancer, PerformanceMonitor};
use crate::{olog_debug, Error, Result};

pub const DEFAULT_CACHE_SIZE: usize = 256;
pub const DEFAULT_MONITOR_WINDOW: usize = 50;
pub const DEFAULT_REGRESSION_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    /// New-window mean must exceed old-window mean times this to count as a regression.
    #[serde(default = "default_regression_factor")]
    pub regression_factor: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_MONITOR_WINDOW,
            regression_factor: DEFAULT_REGRESSION_FACTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_window() -> usize {
    DEFAULT_MONITOR_WINDOW
}

fn default_regression_factor() -> f64 {
    DEFAULT_REGRESSION_FACTOR
}

impl Config {
    pub fn mcpopt_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".mcpopt"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::mcpopt_dir()?.join("mcpopt.toml"))
    }

    /// Load from `~/.mcpopt/mcpopt.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load and validate a config file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        olog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            olog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        olog_debug!(
            "Config loaded: cache.max_size={}, monitor.window={}, providers={}",
            config.cache.max_size,
            config.monitor.window,
            config.providers.len()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                olog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        olog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            return Err(Error::Validation(
                "cache.max_size must be at least 1".to_string(),
            ));
        }
        if self.monitor.window == 0 {
            return Err(Error::Validation(
                "monitor.window must be at least 1".to_string(),
            ));
        }
        let factor = self.monitor.regression_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(Error::Validation(format!(
                "monitor.regression_factor must be a finite value >= 1.0, got {}",
                factor
            )));
        }
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Validation("provider name is empty".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::Validation(format!(
                    "provider {} is declared twice",
                    provider.name
                )));
            }
        }
        Ok(())
    }

    pub fn build_cache<V>(&self) -> ContextCache<V> {
        ContextCache::new(self.cache.max_size)
    }

    pub fn build_balancer(&self) -> LoadBalancer {
        let mut balancer = LoadBalancer::new();
        for provider in &self.providers {
            balancer.register_server(&provider.name, &provider.capabilities);
        }
        balancer
    }

    pub fn build_monitor(&self) -> PerformanceMonitor {
        PerformanceMonitor::with_factor(self.monitor.window, self.monitor.regression_factor)
    }
}

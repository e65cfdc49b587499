//! Benchmark configuration.
//!
//! Loads [`BenchConfig`] from a TOML file (missing fields take defaults),
//! then applies `ACCELBENCH_*` environment overrides. Command-line values are
//! layered on top by the binary before [`BenchConfig::validate`] runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::SessionOptions;

/// Which class of accelerator to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTarget {
    /// Prefer a compute-only (NPU-class) adapter, fall back to a GPU.
    #[default]
    Npu,
    /// First compute-capable adapter, graphics or not.
    Gpu,
    /// Same policy as [`DeviceTarget::Gpu`].
    Any,
}

impl DeviceTarget {
    pub const fn prefer_compute_only(self) -> bool {
        matches!(self, Self::Npu)
    }
}

impl std::fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Npu => write!(f, "npu"),
            Self::Gpu => write!(f, "gpu"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl std::str::FromStr for DeviceTarget {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npu" => Ok(Self::Npu),
            "gpu" => Ok(Self::Gpu),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown device target: {other} (expected npu, gpu or any)")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    /// Override: `ACCELBENCH_LOG_LEVEL`
    pub level: String,
    /// Override: `ACCELBENCH_LOG_FORMAT`
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Benchmark configuration loaded from TOML with environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Timed iterations after warmup.
    /// Override: `ACCELBENCH_ITERATIONS`
    pub iterations: u32,

    /// Override: `ACCELBENCH_DEVICE`
    pub device: DeviceTarget,

    /// Per-wait fence timeout in milliseconds; absent waits forever.
    /// Override: `ACCELBENCH_WAIT_TIMEOUT_MS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,

    pub session: SessionOptions,

    pub logging: LoggingConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            device: DeviceTarget::Npu,
            wait_timeout_ms: None,
            session: SessionOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl BenchConfig {
    /// Default configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Validation(format!("default config does not serialize: {e}")))
    }

    /// Read a TOML file and apply environment overrides. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut cfg: BenchConfig = toml::from_str(&contents)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Parse TOML text, apply environment overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: BenchConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::Validation("iterations must be > 0".into()));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "wait_timeout_ms must be > 0 (omit it to wait forever)".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level must not be empty".into()));
        }
        Ok(())
    }

    /// Apply `ACCELBENCH_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("ACCELBENCH_ITERATIONS") {
            self.iterations = val.parse::<u32>().map_err(|e| ConfigError::EnvOverride {
                key: "ACCELBENCH_ITERATIONS".into(),
                value: val.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Ok(val) = std::env::var("ACCELBENCH_DEVICE") {
            self.device = val.parse::<DeviceTarget>().map_err(|reason| ConfigError::EnvOverride {
                key: "ACCELBENCH_DEVICE".into(),
                value: val.clone(),
                reason,
            })?;
        }

        if let Ok(val) = std::env::var("ACCELBENCH_WAIT_TIMEOUT_MS") {
            self.wait_timeout_ms = match val.as_str() {
                "" | "infinite" => None,
                ms => Some(ms.parse::<u64>().map_err(|e| ConfigError::EnvOverride {
                    key: "ACCELBENCH_WAIT_TIMEOUT_MS".into(),
                    value: val.clone(),
                    reason: e.to_string(),
                })?),
            };
        }

        if let Ok(val) = std::env::var("ACCELBENCH_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("ACCELBENCH_LOG_FORMAT") {
            self.logging.format =
                val.parse::<LogFormat>().map_err(|reason| ConfigError::EnvOverride {
                    key: "ACCELBENCH_LOG_FORMAT".into(),
                    value: val.clone(),
                    reason,
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionMode;
    use serial_test::serial;

    const ENV_KEYS: [&str; 5] = [
        "ACCELBENCH_ITERATIONS",
        "ACCELBENCH_DEVICE",
        "ACCELBENCH_WAIT_TIMEOUT_MS",
        "ACCELBENCH_LOG_LEVEL",
        "ACCELBENCH_LOG_FORMAT",
    ];

    fn clean_env_with(
        set: &[(&'static str, &'static str)],
    ) -> Vec<(&'static str, Option<&'static str>)> {
        ENV_KEYS
            .iter()
            .map(|k| (*k, set.iter().find(|(key, _)| key == k).map(|(_, v)| *v)))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = BenchConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.iterations, 100);
        assert!(cfg.device.prefer_compute_only());
        assert_eq!(cfg.wait_timeout_ms, None);
    }

    #[test]
    fn default_toml_round_trips() {
        let toml_str = BenchConfig::default_toml().unwrap();
        let cfg: BenchConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg, BenchConfig::default());
    }

    #[test]
    #[serial(accelbench_env)]
    fn partial_toml_keeps_defaults() {
        temp_env::with_vars(clean_env_with(&[]), || {
            let cfg = BenchConfig::from_toml(
                r#"
iterations = 250
wait_timeout_ms = 5000

[session]
per_session_threads = true

[logging]
format = "json"
"#,
            )
            .unwrap();
            assert_eq!(cfg.iterations, 250);
            assert_eq!(cfg.device, DeviceTarget::Npu);
            assert_eq!(cfg.wait_timeout_ms, Some(5000));
            assert!(cfg.session.per_session_threads);
            assert_eq!(cfg.session.execution_mode, ExecutionMode::Sequential);
            assert_eq!(cfg.logging.format, LogFormat::Json);
            assert_eq!(cfg.logging.level, "info");
        });
    }

    #[test]
    fn zero_iterations_rejected() {
        let cfg = BenchConfig { iterations: 0, ..BenchConfig::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("iterations must be > 0"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = BenchConfig { wait_timeout_ms: Some(0), ..BenchConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn device_target_parse() {
        assert_eq!("NPU".parse::<DeviceTarget>().unwrap(), DeviceTarget::Npu);
        assert!(!"gpu".parse::<DeviceTarget>().unwrap().prefer_compute_only());
        assert!(!DeviceTarget::Any.prefer_compute_only());
        assert!("tpu".parse::<DeviceTarget>().is_err());
    }

    #[test]
    #[serial(accelbench_env)]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accelbench.toml");
        std::fs::write(&path, "iterations = 7\ndevice = \"any\"\n").unwrap();
        temp_env::with_vars(clean_env_with(&[]), || {
            let cfg = BenchConfig::load(&path).unwrap();
            assert_eq!(cfg.iterations, 7);
            assert_eq!(cfg.device, DeviceTarget::Any);
        });
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            BenchConfig::from_toml("iterations = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    #[serial(accelbench_env)]
    fn env_overrides_multiple_fields() {
        temp_env::with_vars(
            clean_env_with(&[
                ("ACCELBENCH_ITERATIONS", "12"),
                ("ACCELBENCH_DEVICE", "gpu"),
                ("ACCELBENCH_WAIT_TIMEOUT_MS", "750"),
                ("ACCELBENCH_LOG_LEVEL", "debug"),
                ("ACCELBENCH_LOG_FORMAT", "compact"),
            ]),
            || {
                let cfg = BenchConfig::from_env().unwrap();
                assert_eq!(cfg.iterations, 12);
                assert_eq!(cfg.device, DeviceTarget::Gpu);
                assert_eq!(cfg.wait_timeout_ms, Some(750));
                assert_eq!(cfg.logging.level, "debug");
                assert_eq!(cfg.logging.format, LogFormat::Compact);
            },
        );
    }

    #[test]
    #[serial(accelbench_env)]
    fn env_infinite_timeout_clears_file_value() {
        temp_env::with_vars(clean_env_with(&[("ACCELBENCH_WAIT_TIMEOUT_MS", "infinite")]), || {
            let cfg = BenchConfig::from_toml("wait_timeout_ms = 10").unwrap();
            assert_eq!(cfg.wait_timeout_ms, None);
        });
    }

    #[test]
    #[serial(accelbench_env)]
    fn env_override_invalid_device() {
        temp_env::with_vars(clean_env_with(&[("ACCELBENCH_DEVICE", "tpu")]), || {
            match BenchConfig::from_env().unwrap_err() {
                ConfigError::EnvOverride { key, .. } => assert_eq!(key, "ACCELBENCH_DEVICE"),
                other => panic!("expected EnvOverride, got: {other}"),
            }
        });
    }

    #[test]
    #[serial(accelbench_env)]
    fn env_zero_iterations_fails_validation() {
        temp_env::with_vars(clean_env_with(&[("ACCELBENCH_ITERATIONS", "0")]), || {
            assert!(matches!(BenchConfig::from_env(), Err(ConfigError::Validation(_))));
        });
    }
}

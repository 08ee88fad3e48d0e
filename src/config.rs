/*!
 * Configuration types for lumisplit
 */

use crate::error::Result;
use crate::splitting::SplitAlgorithm;
use lumisplit_core_perf::CurveServiceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level splitter configuration, usually read from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Splitting strategy and its parameters
    #[serde(default)]
    pub algorithm: SplitAlgorithm,

    /// Luminosity and performance curve services
    #[serde(default)]
    pub curves: CurveServiceConfig,

    /// Directory of recovery masks: `<dir>/<collection>/<fileset>.json`
    #[serde(default)]
    pub recovery_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,

    Warn,

    #[default]
    Info,

    Debug,

    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl SplitterConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SplitterConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitting::{EventAwareLumiConfig, SplittingStrategy};
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SplitterConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.verbose);
        assert!(config.recovery_dir.is_none());
        assert!(!config.curves.is_enabled());
        assert_eq!(config.algorithm.name(), "EventAwareLumiBased");
    }

    #[test]
    fn test_parse_event_aware() {
        let config: SplitterConfig = toml::from_str(
            r#"
            log_level = "debug"
            recovery_dir = "/data/acdc"

            [algorithm]
            algorithm = "EventAwareLumiBased"
            events_per_job = 1000
            splitOnRun = false
            runs = [1, 2]
            lumis = ["1,10", "3,4,8,9"]

            [algorithm.performance]
            time_per_event = 4.0
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        let SplitAlgorithm::EventAwareLumiBased(algo) = &config.algorithm else {
            panic!("expected EventAwareLumiBased");
        };
        assert_eq!(algo.events_per_job, 1000);
        assert!(!algo.split_on_run);
        assert_eq!(algo.performance.time_per_event, 4.0);
        assert_eq!(algo.performance.size_per_event, 512.0);
        assert!(algo.validate().is_ok());
    }

    #[test]
    fn test_parse_curves() {
        let config: SplitterConfig = toml::from_str(
            r#"
            [curves]
            lumi_url = "https://lumi.example.org/api/runs"
            perf_url = "https://perf.example.org/api/curve"
            timeout_secs = 3
            "#,
        )
        .unwrap();
        assert!(config.curves.is_enabled());
        assert_eq!(config.curves.timeout_secs, 3);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lumisplit.toml");
        let config = SplitterConfig {
            verbose: true,
            algorithm: SplitAlgorithm::EventAwareLumiBased(EventAwareLumiConfig::with_events_per_job(250)),
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(SplitterConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(SplitterConfig::from_file(&dir.path().join("absent.toml")).is_err());
    }
}

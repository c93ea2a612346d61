//! Configuration for the quality engine and rollout policy.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Review-rejection delta above which a canary is rolled back.
pub const SOUL_REVIEW_DELTA_WARN: f64 = 0.05;
/// QA-failure delta above which a canary is rolled back.
pub const SOUL_QA_DELTA_WARN: f64 = 0.03;
/// Case deadline applied when a run config omits one.
pub const DEFAULT_CASE_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub rollout: RolloutPolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Applied when a run request omits `case_timeout_ms`.
    pub default_case_timeout_ms: u64,
    /// Default for `keep_conversation_artifacts`.
    pub keep_artifacts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_case_timeout_ms: DEFAULT_CASE_TIMEOUT_MS,
            keep_artifacts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// When false, runs score on rules alone and all judge scores are null.
    pub enabled: bool,
    /// Applied when a case omits `min_quality_score`.
    pub default_min_quality: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_min_quality: 0.0,
        }
    }
}

/// Canary decision thresholds. Comparisons are strict `>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPolicyConfig {
    pub review_reject_delta_warn: f64,
    pub qa_failure_delta_warn: f64,
    /// Applied when a rollout omits `minimum_sample_size`.
    pub default_minimum_sample_size: u64,
}

impl Default for RolloutPolicyConfig {
    fn default() -> Self {
        Self {
            review_reject_delta_warn: SOUL_REVIEW_DELTA_WARN,
            qa_failure_delta_warn: SOUL_QA_DELTA_WARN,
            default_minimum_sample_size: 50,
        }
    }
}

pub fn parse_quality_config(contents: &str) -> Result<QualityConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_quality_config(path: impl AsRef<Path>) -> Result<QualityConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_quality_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_quality_config(
    path: impl AsRef<Path>,
    config: &QualityConfig,
) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path_ref.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_constants() {
        let config = QualityConfig::default();
        assert_eq!(config.rollout.review_reject_delta_warn, 0.05);
        assert_eq!(config.rollout.qa_failure_delta_warn, 0.03);
        assert_eq!(config.engine.default_case_timeout_ms, 60_000);
        assert!(config.judge.enabled);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = parse_quality_config(
            r#"
[engine]
default_case_timeout_ms = 30000
keep_artifacts = false

[rollout]
review_reject_delta_warn = 0.1
qa_failure_delta_warn = 0.05
default_minimum_sample_size = 200
"#,
        )
        .expect("parse config");

        assert_eq!(config.engine.default_case_timeout_ms, 30_000);
        assert!(!config.engine.keep_artifacts);
        assert_eq!(config.rollout.default_minimum_sample_size, 200);
        // [judge] omitted entirely, defaults apply.
        assert!(config.judge.enabled);
        assert_eq!(config.judge.default_min_quality, 0.0);
    }

    #[test]
    fn empty_toml_parses_to_defaults() {
        let config = parse_quality_config("").expect("parse empty config");
        assert_eq!(config, QualityConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("qc-config-{}", std::process::id()));
        let path = dir.join("quality.toml");

        let mut config = QualityConfig::default();
        config.rollout.default_minimum_sample_size = 75;
        save_quality_config(&path, &config).expect("save config");

        let loaded = load_quality_config(&path).expect("load config");
        assert_eq!(loaded, config);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = load_quality_config("/nonexistent/quality.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/quality.toml"));
    }
}

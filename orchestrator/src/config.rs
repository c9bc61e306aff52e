use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::SandboxMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Unknown project type '{name}'")]
    UnknownProjectType { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    #[serde(default = "default_pod_selector")]
    pub pod_selector: String,
    #[serde(default)]
    pub mode: SandboxMode,
    #[serde(default = "default_ephemeral_timeout", with = "duration_str")]
    pub ephemeral_ready_timeout: Duration,
    #[serde(default = "default_reuse_timeout", with = "duration_str")]
    pub reuse_ready_timeout: Duration,
    #[serde(default = "default_project_type")]
    pub default_project_type: String,
    #[serde(default = "default_project_types")]
    pub project_types: BTreeMap<String, ProjectType>,
}

/// Conventions for one kind of project: which sandbox to start, how to
/// install its dependencies, and how to run its tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectType {
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub install: Option<String>,
    pub test: String,
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("deployments/templates")
}

fn default_source_dir() -> String {
    "/app/repo".to_string()
}

fn default_pod_selector() -> String {
    "app=test-pod".to_string()
}

fn default_ephemeral_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_reuse_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_project_type() -> String {
    "python".to_string()
}

fn default_project_types() -> BTreeMap<String, ProjectType> {
    let mut types = BTreeMap::new();
    types.insert(
        "python".to_string(),
        ProjectType {
            template: None,
            install: Some("pip install --quiet -r requirements.txt".to_string()),
            test: "pytest tests/".to_string(),
        },
    );
    types.insert(
        "node".to_string(),
        ProjectType {
            template: None,
            install: Some("npm ci --no-audit --no-fund".to_string()),
            test: "npm test".to_string(),
        },
    );
    types
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            templates_dir: default_templates_dir(),
            source_dir: default_source_dir(),
            pod_selector: default_pod_selector(),
            mode: SandboxMode::default(),
            ephemeral_ready_timeout: default_ephemeral_timeout(),
            reuse_ready_timeout: default_reuse_timeout(),
            default_project_type: default_project_type(),
            project_types: default_project_types(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from `SANDBOX_CONFIG` when set, otherwise use the built-in
    /// defaults. `KUBECTL_BIN` overrides the kubectl binary either way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("SANDBOX_CONFIG").ok();
        Self::load_or_default(path.as_deref())
    }

    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if !path.trim().is_empty() => load_config(path)?,
            _ => Self::default(),
        };

        if let Ok(bin) = std::env::var("KUBECTL_BIN") {
            if !bin.trim().is_empty() {
                debug!("Using kubectl binary from KUBECTL_BIN: {}", bin);
                config.kubectl = bin;
            }
        }

        validate_config(&config)?;
        Ok(config)
    }

    pub fn project(&self, name: &str) -> Result<&ProjectType, ConfigError> {
        self.project_types
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProjectType {
                name: name.to_string(),
            })
    }

    /// Template applied for a project type: its explicit path, or
    /// `<templatesDir>/<name>.yaml`.
    pub fn template_for(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let project = self.project(name)?;
        Ok(project
            .template
            .clone()
            .unwrap_or_else(|| self.templates_dir.join(format!("{}.yaml", name))))
    }

    pub fn ready_timeout(&self, mode: SandboxMode) -> Duration {
        match mode {
            SandboxMode::Ephemeral => self.ephemeral_ready_timeout,
            SandboxMode::Reuse => self.reuse_ready_timeout,
        }
    }
}

pub fn load_config(config_path: &str) -> Result<OrchestratorConfig, ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_string(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: config_path.to_string(),
        source,
    })
}

pub fn validate_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| -> Result<(), ConfigError> {
        Err(ConfigError::Invalid {
            message: message.to_string(),
        })
    };

    if config.kubectl.trim().is_empty() {
        return invalid("kubectl is required");
    }

    if !Path::new(&config.source_dir).is_absolute() {
        return invalid("sourceDir must be an absolute path inside the sandbox");
    }

    if config.pod_selector.trim().is_empty() {
        return invalid("podSelector is required");
    }

    if config.ephemeral_ready_timeout.is_zero() || config.reuse_ready_timeout.is_zero() {
        return invalid("readiness timeouts must be greater than zero");
    }

    if config.project_types.is_empty() {
        return invalid("at least one project type must be configured");
    }

    if !config.project_types.contains_key(&config.default_project_type) {
        return Err(ConfigError::UnknownProjectType {
            name: config.default_project_type.clone(),
        });
    }

    for (name, project) in &config.project_types {
        if project.test.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("projectTypes.{}.test cannot be empty", name),
            });
        }
    }

    Ok(())
}

mod duration_str {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        validate_config(&config).unwrap();
        assert_eq!(config.ready_timeout(SandboxMode::Ephemeral), Duration::from_secs(120));
        assert_eq!(config.ready_timeout(SandboxMode::Reuse), Duration::from_secs(180));
        assert_eq!(
            config.template_for("python").unwrap(),
            PathBuf::from("deployments/templates/python.yaml")
        );
    }

    #[test]
    fn loads_yaml_with_humantime_durations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
sourceDir: /workspace/src
mode: reuse
reuseReadyTimeout: 5m
defaultProjectType: rust
projectTypes:
  rust:
    template: /etc/sandbox/rust-pod.yaml
    test: cargo test
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        validate_config(&config).unwrap();

        assert_eq!(config.mode, SandboxMode::Reuse);
        assert_eq!(config.reuse_ready_timeout, Duration::from_secs(300));
        assert_eq!(config.ephemeral_ready_timeout, Duration::from_secs(120));
        assert_eq!(config.project("rust").unwrap().install, None);
        assert_eq!(
            config.template_for("rust").unwrap(),
            PathBuf::from("/etc/sandbox/rust-pod.yaml")
        );
    }

    #[test]
    fn example_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/sandbox.example.yaml");
        let config = load_config(path).unwrap();
        let defaults = OrchestratorConfig::default();

        validate_config(&config).unwrap();
        assert_eq!(config.project_types, defaults.project_types);
        assert_eq!(config.ephemeral_ready_timeout, defaults.ephemeral_ready_timeout);
        assert_eq!(config.reuse_ready_timeout, defaults.reuse_ready_timeout);
    }

    #[test]
    fn rejects_unknown_default_project_type() {
        let config = OrchestratorConfig {
            default_project_type: "cobol".to_string(),
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnknownProjectType { .. })
        ));
    }

    #[test]
    fn rejects_relative_source_dir() {
        let config = OrchestratorConfig {
            source_dir: "repo".to_string(),
            ..OrchestratorConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sourceDir"));
    }
}

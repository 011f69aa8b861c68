use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Per-instance engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Instance name the snapshot is published under.
    pub name: String,
    /// Path to the PERM model file.
    pub model_path: PathBuf,
    /// Optional CSV policy file loaded through a [`crate::adapter::FileAdapter`].
    pub policy_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            model_path: PathBuf::from("model.conf"),
            policy_path: None,
        }
    }
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy_path: impl Into<PathBuf>) -> Self {
        self.policy_path = Some(policy_path.into());
        self
    }

    /// Load configuration from an optional file with environment
    /// overrides: `PERIHELION__NAME=prod`, `PERIHELION__MODEL_PATH=…`.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let defaults = EngineConfig::default();
        let mut builder = config::Config::builder()
            .set_default("name", defaults.name)?
            .set_default(
                "model_path",
                defaults.model_path.to_string_lossy().to_string(),
            )?;

        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("PERIHELION").separator("__"));

        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_file() {
        let cfg = EngineConfig::load("/nonexistent/perihelion.toml").unwrap();
        assert_eq!(cfg.name, "default");
        assert_eq!(cfg.model_path, PathBuf::from("model.conf"));
        assert!(cfg.policy_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perihelion.toml");
        std::fs::write(
            &path,
            "name = \"prod\"\nmodel_path = \"/etc/perihelion/model.conf\"\npolicy_path = \"/etc/perihelion/policy.csv\"\n",
        )
        .unwrap();

        let cfg = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.name, "prod");
        assert_eq!(cfg.model_path, PathBuf::from("/etc/perihelion/model.conf"));
        assert_eq!(cfg.policy_path, Some(PathBuf::from("/etc/perihelion/policy.csv")));
    }

    #[test]
    fn test_builder_style_construction() {
        let cfg = EngineConfig::new("tenant-a", "model.conf").with_policy("policy.csv");
        assert_eq!(cfg.name, "tenant-a");
        assert_eq!(cfg.policy_path, Some(PathBuf::from("policy.csv")));
    }
}

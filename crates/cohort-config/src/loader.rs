//! Configuration loader with multi-source merging

use crate::{CohortConfig, ConfigError, Paths};
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "COHORT".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "COHORT")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/cohort/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<CohortConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = CohortConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/cohort/config.toml)
        if self.include_user_config {
            let paths = Paths::new();
            if let Ok(user_config_file) = paths.user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Cluster config (cohort.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (cohort.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (COHORT_CONTROLLER__MAX_HISTORY_ENTRIES=10)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let cohort_config: CohortConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cohort_config.validate()?;
        Ok(cohort_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> CohortConfig {
        self.load().unwrap_or_default()
    }

    /// Reads a single TOML file without layering, e.g. one passed on the
    /// command line.
    pub fn load_file(path: impl AsRef<Path>) -> Result<CohortConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CohortConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .without_user_config()
            .load()
            .expect("Failed to load config");

        assert_eq!(config.cluster.name, "content");
        assert_eq!(config.controller.max_history_entries, 50);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[cluster]
name = "music"
redundancy = 3
nodes = [{ index = 0 }, { index = 1 }, { index = 2, retired = true }]

[cluster.distribution]
name = "root"
nodes = [0, 1, 2]

[controller]
min_merge_completion_ratio = 0.8
max_history_entries = 10
"#;
        fs::write(project_dir.join("cohort.toml"), config_content)
            .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .without_user_config()
            .load()
            .expect("Failed to load config");

        assert_eq!(config.cluster.name, "music");
        assert_eq!(config.cluster.redundancy, 3);
        assert_eq!(config.cluster.nodes.len(), 3);
        assert!(config.cluster.nodes[2].retired);
        assert_eq!(config.controller.min_merge_completion_ratio, 0.8);
        assert_eq!(config.controller.max_history_entries, 10);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("cohort.toml"),
            r"
[controller]
max_history_entries = 20
",
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("cohort.local.toml"),
            r"
[controller]
max_history_entries = 5
",
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .without_user_config()
            .load()
            .expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.controller.max_history_entries, 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("cohort.toml"),
            "[controller]\nmin_merge_completion_ratio = 2.0\n",
        )
        .expect("Failed to write config");

        let result = ConfigLoader::new()
            .with_project_dir(project_dir)
            .without_user_config()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_load_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("standalone.toml");
        fs::write(&path, "[cluster]\nname = \"books\"\n").expect("Failed to write config");

        let config = ConfigLoader::load_file(&path).expect("Failed to load file");
        assert_eq!(config.cluster.name, "books");
        assert_eq!(config.cluster.nodes.len(), 4);
    }

    #[test]
    fn test_load_file_errors() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            ConfigLoader::load_file(&missing),
            Err(ConfigError::ReadError { .. })
        ));

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "[cluster\n").expect("Failed to write config");
        assert!(matches!(
            ConfigLoader::load_file(&broken),
            Err(ConfigError::ParseError { .. })
        ));
    }
}

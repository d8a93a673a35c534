use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub filename: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            filename: Some(default_database_filename()),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> String {
        let url = self.connection_string();
        url.strip_prefix("sqlite://").unwrap_or(&url).to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    #[serde(default = "default_files_root")]
    pub files_root: PathBuf,
    #[serde(default = "default_workspace")]
    pub default_workspace: String,
    #[serde(default = "default_synthetic_email_domain")]
    pub synthetic_email_domain: String,
    #[serde(default = "default_baseline_role")]
    pub baseline_role: String,
    #[serde(default = "default_operator")]
    pub operator: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            files_root: default_files_root(),
            default_workspace: default_workspace(),
            synthetic_email_domain: default_synthetic_email_domain(),
            baseline_role: default_baseline_role(),
            operator: default_operator(),
        }
    }
}

impl Config {
    /// Loads the YAML file at `path`, falling back to defaults when it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::parse(&std::fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.import.default_workspace.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "import.default_workspace cannot be empty".to_string(),
            ));
        }

        let domain = &self.import.synthetic_email_domain;
        if domain.is_empty() || domain.contains('@') || domain.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(format!(
                "import.synthetic_email_domain is not a valid domain: {:?}",
                domain
            )));
        }

        if self.import.baseline_role.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "import.baseline_role cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn normalize(&mut self) {
        self.import.default_workspace = self.import.default_workspace.trim().to_string();
        self.import.synthetic_email_domain = self
            .import
            .synthetic_email_domain
            .trim()
            .trim_start_matches('@')
            .to_ascii_lowercase();
        self.import.operator = self.import.operator.trim().to_string();
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("SLACK_IMPORT_DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("SLACK_IMPORT_FILES_ROOT") {
            self.import.files_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("SLACK_IMPORT_OPERATOR") {
            self.import.operator = value;
        }
    }
}

fn default_database_filename() -> String {
    "raven.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_files_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_workspace() -> String {
    "Slack".to_string()
}

fn default_synthetic_email_domain() -> String {
    "slack.local".to_string()
}

fn default_baseline_role() -> String {
    "Raven User".to_string()
}

fn default_operator() -> String {
    "Administrator".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.import.default_workspace, "Slack");
        assert_eq!(config.import.synthetic_email_domain, "slack.local");
        assert_eq!(config.import.baseline_role, "Raven User");
        assert_eq!(config.database.connection_string(), "sqlite://raven.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn url_wins_over_filename() {
        let config = Config::parse(
            "database:\n  url: sqlite:///var/lib/raven.db\n  filename: other.db\n",
        )
        .unwrap();
        assert_eq!(config.database.sqlite_path(), "/var/lib/raven.db");
    }

    #[test]
    fn normalize_strips_domain_prefix() {
        let mut config =
            Config::parse("import:\n  synthetic_email_domain: ' @Slack.Local '\n").unwrap();
        config.normalize();
        assert_eq!(config.import.synthetic_email_domain, "slack.local");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_domain() {
        let config = Config::parse("import:\n  synthetic_email_domain: 'a b'\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_database() {
        let config = Config::parse("database:\n  filename: null\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}

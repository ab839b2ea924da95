use std::path::Path;

use anyhow::{bail, Result};
use axum::http::HeaderValue;
use serde::Deserialize;

use crate::dataset::coercion::RoleThresholds;
use crate::dataset::parser::ParseOptions;
use crate::dataset::profiling::ProfileOptions;
use crate::dataset::BuildOptions;
use crate::query::ChartOptions;

const DEFAULT_CONFIG_FILE: &str = "data-explorer";
const ENV_PREFIX: &str = "DATA_EXPLORER";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Limits and tuning knobs of the dataset engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_upload_bytes: usize,
    pub preview_default_limit: usize,
    pub preview_max_limit: usize,
    /// Rows returned alongside a freshly registered dataset.
    pub upload_preview_rows: usize,
    pub sample_size: usize,
    pub top_values: usize,
    pub categorical_max_distinct: usize,
    pub categorical_max_ratio: f64,
    pub scatter_point_limit: usize,
    pub default_bin_count: usize,
    /// Upper bound on a requested `binCount`.
    pub max_bin_count: usize,
    pub recent_datasets_limit: usize,
    pub max_upload_sessions: usize,
    pub session_idle_timeout_secs: u64,
    pub session_sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            preview_default_limit: 20,
            preview_max_limit: 200,
            upload_preview_rows: 20,
            sample_size: 5,
            top_values: 5,
            categorical_max_distinct: 50,
            categorical_max_ratio: 0.2,
            scatter_point_limit: 500,
            default_bin_count: 10,
            max_bin_count: 1000,
            recent_datasets_limit: 5,
            max_upload_sessions: 100,
            session_idle_timeout_secs: 3600,
            session_sweep_interval_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn build_options(&self, parse: ParseOptions) -> BuildOptions {
        BuildOptions {
            parse,
            thresholds: RoleThresholds {
                max_distinct: self.categorical_max_distinct,
                max_ratio: self.categorical_max_ratio,
            },
            profile: ProfileOptions {
                sample_size: self.sample_size,
                top_values: self.top_values,
            },
        }
    }

    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            scatter_point_limit: self.scatter_point_limit,
            default_bin_count: self.default_bin_count,
            max_bin_count: self.max_bin_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            bail!("engine.max_upload_bytes must be greater than zero");
        }
        if self.preview_max_limit == 0 {
            bail!("engine.preview_max_limit must be greater than zero");
        }
        if self.preview_default_limit == 0 || self.preview_default_limit > self.preview_max_limit {
            bail!(
                "engine.preview_default_limit must be within 1..={}",
                self.preview_max_limit
            );
        }
        if self.max_bin_count == 0 {
            bail!("engine.max_bin_count must be at least 1");
        }
        if self.default_bin_count == 0 || self.default_bin_count > self.max_bin_count {
            bail!("engine.default_bin_count must be within 1..={}", self.max_bin_count);
        }
        if self.max_upload_sessions == 0 {
            bail!("engine.max_upload_sessions must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.categorical_max_ratio) {
            bail!("engine.categorical_max_ratio must be between 0 and 1");
        }
        if self.session_sweep_interval_secs == 0 {
            bail!("engine.session_sweep_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "data_explorer=debug,tower_http=debug,axum=debug".to_string(),
            directory: None,
        }
    }
}

impl Config {
    /// Loads `.env`, then an optional TOML file, then `DATA_EXPLORER__*`
    /// environment variables (e.g. `DATA_EXPLORER__SERVER__PORT=8080`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(environment())
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        for origin in &self.server.cors_allowed_origins {
            if HeaderValue::from_str(origin.trim()).is_err() {
                bail!("server.cors_allowed_origins has an invalid origin: {origin:?}");
            }
        }
        self.engine.validate()
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("server.cors_allowed_origins")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::{File, FileFormat};

    fn from_toml(toml: &str) -> Config {
        ::config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.engine.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.engine.preview_max_limit, 200);
        assert!(config.logging.directory.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = from_toml(
            r#"
            [server]
            port = 8080

            [engine]
            scatter_point_limit = 50
            categorical_max_ratio = 0.5
            "#,
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.engine.scatter_point_limit, 50);
        assert_eq!(config.engine.preview_default_limit, 20);

        let options = config.engine.build_options(ParseOptions::default());
        assert_eq!(options.thresholds.max_ratio, 0.5);
        assert_eq!(config.engine.chart_options().scatter_point_limit, 50);
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        let config = from_toml(
            r#"
            [engine]
            preview_default_limit = 500
            "#,
        );
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.default_bin_count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.max_bin_count = 0;
        assert!(config.validate().is_err());

        let config = from_toml(
            r#"
            [engine]
            default_bin_count = 20
            max_bin_count = 10
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bin_count_cap_reaches_chart_options() {
        let config = from_toml(
            r#"
            [engine]
            max_bin_count = 64
            "#,
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.chart_options().max_bin_count, 64);
        assert_eq!(Config::default().engine.chart_options().max_bin_count, 1000);
    }

    #[test]
    fn test_validation_rejects_bad_cors_origins() {
        let mut config = Config::default();
        config.server.cors_allowed_origins = vec!["https://ok.example".to_string()];
        assert!(config.validate().is_ok());

        config.server.cors_allowed_origins.push("bad\norigin".to_string());
        assert!(config.validate().is_err());
    }
}

use serde::Deserialize;
use std::time::Duration;
use tundra_common::{Error, Result};

/// Default ceiling for connection-level operations against the data store.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 18_000;

const ENV_PREFIX: &str = "TUNDRA_SOURCE";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Connection target of the data-store client.
    pub master: String,
    pub table: String,
    /// Projected columns; empty reads every column.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Number of key ranges to cut; defaults to `parallelism`.
    #[serde(default)]
    pub split_count: Option<usize>,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Upper bound on the whole boundary scan. Unbounded when unset.
    #[serde(default)]
    pub scan_deadline_ms: Option<u64>,
}

fn default_parallelism() -> usize {
    1
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}

impl SourceSettings {
    /// Loads settings from `TUNDRA_SOURCE_CONFIG_PATH` (or `config/source.toml`),
    /// overridden by `TUNDRA_SOURCE__*` environment variables.
    pub fn new() -> std::result::Result<Self, config::ConfigError> {
        let config_file_path = std::env::var("TUNDRA_SOURCE_CONFIG_PATH")
            .unwrap_or_else(|_| "config/source.toml".to_string());
        Self::from_file(&config_file_path)
    }

    pub fn from_file(path: &str) -> std::result::Result<Self, config::ConfigError> {
        Self::load(path, ENV_PREFIX)
    }

    fn load(path: &str, env_prefix: &str) -> std::result::Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("columns")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }

    /// Rejects settings that cannot describe a readable source.
    pub fn validate(&self) -> Result<()> {
        if self.master.trim().is_empty() {
            return Err(Error::InvalidConfig("`master` must not be empty".to_string()));
        }
        if self.table.trim().is_empty() {
            return Err(Error::InvalidConfig("`table` must not be empty".to_string()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidConfig("`parallelism` must be at least 1".to_string()));
        }
        if self.split_count == Some(0) {
            return Err(Error::InvalidConfig("`split_count` must be at least 1".to_string()));
        }
        if let Some(blank) = self.columns.iter().find(|c| c.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!("blank column name `{blank}` in `columns`")));
        }
        Ok(())
    }

    pub fn split_count(&self) -> usize {
        self.split_count.unwrap_or(self.parallelism)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn scan_deadline(&self) -> Option<Duration> {
        self.scan_deadline_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SourceSettings {
        SourceSettings {
            master: "127.0.0.1:7051".to_string(),
            table: "orders".to_string(),
            columns: vec![],
            parallelism: 3,
            split_count: None,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            scan_deadline_ms: None,
        }
    }

    #[test]
    fn split_count_defaults_to_parallelism() {
        assert_eq!(settings().split_count(), 3);
        let explicit = SourceSettings { split_count: Some(8), ..settings() };
        assert_eq!(explicit.split_count(), 8);
    }

    #[test]
    fn validate_rejects_missing_parameters() {
        assert!(settings().validate().is_ok());
        for bad in [
            SourceSettings { master: " ".to_string(), ..settings() },
            SourceSettings { table: String::new(), ..settings() },
            SourceSettings { parallelism: 0, ..settings() },
            SourceSettings { split_count: Some(0), ..settings() },
            SourceSettings { columns: vec!["id".to_string(), "".to_string()], ..settings() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))), "{bad:?}");
        }
    }

    #[test]
    fn loads_toml_with_defaults_and_env_override() {
        let path = std::env::temp_dir().join("tundra_source_settings_test.toml");
        std::fs::write(&path, "master = \"kudu:7051\"\ntable = \"orders\"\ncolumns = [\"id\", \"total\"]\n")
            .unwrap();
        std::env::set_var("TUNDRA_SOURCE_TEST__PARALLELISM", "4");

        let loaded = SourceSettings::load(path.to_str().unwrap(), "TUNDRA_SOURCE_TEST").unwrap();
        assert_eq!(loaded.table, "orders");
        assert_eq!(loaded.columns, vec!["id".to_string(), "total".to_string()]);
        assert_eq!(loaded.parallelism, 4);
        assert_eq!(loaded.operation_timeout(), Duration::from_millis(18_000));
        assert_eq!(loaded.scan_deadline(), None);

        std::env::remove_var("TUNDRA_SOURCE_TEST__PARALLELISM");
        std::fs::remove_file(path).unwrap();
    }
}

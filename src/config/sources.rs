use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "CHEMFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/chemfetch.toml";
const ENV_PREFIX: &str = "CHEMFETCH";
const ENV_SEPARATOR: &str = "__";

/// Config file path: `CHEMFETCH_CONFIG` if set, else the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Load configuration from a file the caller named explicitly
///
/// Same layering as [`load`], but the file must exist.
pub fn load_explicit(config_path: PathBuf) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    if !config_path.exists() {
        tracing::warn!("Configuration file not found at {}", config_path.display());
    }
    build(config_path, true)
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    build(config_path, false)
}

fn build(config_path: PathBuf, required: bool) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if required || config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(required));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    builder = builder.add_source(environment());

    let config = builder.build()?;
    config.try_deserialize()
}

/// `CHEMFETCH__FETCH__MAX_ATTEMPTS` -> `fetch.max_attempts`
///
/// `CHEMFETCH__PROXY__STATIC` takes a comma-separated proxy list.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("proxy.static")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.fetch.max_attempts, 10);
        assert_eq!(config.batch.chunk_size, 50);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[proxy]
pool_url = "http://pool.internal:5010"
acquire_timeout_ms = 2000

[fetch]
max_attempts = 5
retry_backoff_ms = 100
user_agent = "test-agent"

[batch]
max_concurrency = 8
chunk_size = 25
timeout_secs = 120

[api]
base_url = "http://mirror.internal/rest"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.proxy.pool_url, "http://pool.internal:5010");
        assert_eq!(config.proxy.acquire_timeout_ms, 2000);
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.fetch.retry_backoff_ms, 100);
        assert_eq!(config.fetch.user_agent, "test-agent");
        assert_eq!(config.batch.max_concurrency, 8);
        assert_eq!(config.batch.chunk_size, 25);
        assert_eq!(config.batch.timeout_secs, Some(120));
        assert_eq!(config.api.base_url, "http://mirror.internal/rest");
    }

    #[test]
    fn test_static_proxy_list() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[proxy]
static = ["10.0.0.1:3128", "http://10.0.0.2:8080"]
            "#,
        )
        .unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(
            config.proxy.static_proxies,
            vec!["10.0.0.1:3128", "http://10.0.0.2:8080"]
        );
    }

    #[test]
    fn test_static_proxy_list_from_environment() {
        let mut vars = config::Map::new();
        vars.insert(
            "CHEMFETCH__PROXY__STATIC".to_string(),
            "10.0.0.1:3128,10.0.0.2:3128".to_string(),
        );
        vars.insert("CHEMFETCH__FETCH__MAX_ATTEMPTS".to_string(), "4".to_string());

        let config: Config = config::Config::builder()
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(
            config.proxy.static_proxies,
            vec!["10.0.0.1:3128", "10.0.0.2:3128"]
        );
        assert_eq!(config.fetch.max_attempts, 4);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("missing.toml");

        assert!(load_explicit(config_path).is_err());
    }

    #[test]
    fn test_explicit_path_loads_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("explicit.toml");
        fs::write(&config_path, "[batch]\nchunk_size = 7\n").unwrap();

        let config = load_explicit(config_path).unwrap();
        assert_eq!(config.batch.chunk_size, 7);
    }
}

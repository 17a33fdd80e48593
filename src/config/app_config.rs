use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tokio_native_tls::TlsConnector as TokioTlsConnector;

use super::model::{DEFAULT_COUNTER, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

pub const CONFIG_FILE_ENV: &str = "OXYPING_CONFIG";
pub const DNS_HOSTS_ENV: &str = "DNS_HOSTS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid DNS server {0}")]
    DnsServer(String),
}

/// Defaults for a run, read from an optional YAML file.
///
/// Every field is optional; the CLI overrides whatever is set here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Option<Duration>,
    pub counter: Option<u64>,
    pub http_method: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub dns_servers: Vec<String>,
    pub meta: Option<bool>,
    pub insecure: Option<bool>,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub counter: u64,
    pub http_method: String,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub dns_hosts: Vec<String>,
    pub meta: bool,
    pub insecure: bool,
}

impl From<FileConfig> for AppConfig {
    fn from(file: FileConfig) -> Self {
        AppConfig {
            timeout: file.timeout.unwrap_or(DEFAULT_TIMEOUT),
            interval: file.interval.unwrap_or(DEFAULT_INTERVAL),
            counter: file.counter.unwrap_or(DEFAULT_COUNTER),
            http_method: file.http_method.unwrap_or_else(|| "GET".to_string()),
            user_agent: file
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            proxy: file.proxy,
            dns_hosts: file.dns_servers,
            meta: file.meta.unwrap_or(false),
            insecure: file.insecure.unwrap_or(false),
        }
    }
}

/// Load the application defaults from a YAML file and environment variables.
///
/// The file is `path` when given, otherwise the one named by `OXYPING_CONFIG`.
/// Without either, built-in defaults are used. `DNS_HOSTS` (comma separated)
/// replaces the DNS servers from the file.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_with(path, |key| env::var(key).ok())
}

/// [`load_config`] reading environment variables through `lookup`.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let location = path
        .map(Path::to_path_buf)
        .or_else(|| lookup(CONFIG_FILE_ENV).map(PathBuf::from));

    let file = match location {
        Some(location) => {
            let raw = std::fs::read_to_string(&location).map_err(|source| ConfigError::Read {
                path: location.clone(),
                source,
            })?;
            let file = parse_file_config(&raw).map_err(|source| ConfigError::Yaml {
                path: location.clone(),
                source,
            })?;
            log::info!("Loaded configuration from {}", location.display());
            file
        }
        None => FileConfig::default(),
    };

    let mut config = AppConfig::from(file);

    if let Some(hosts) = lookup(DNS_HOSTS_ENV) {
        config.dns_hosts = split_hosts(&hosts);
    }
    if !config.dns_hosts.is_empty() {
        log::info!("Using DNS hosts: {:?}", config.dns_hosts);
    }

    Ok(config)
}

pub fn parse_file_config(raw: &str) -> Result<FileConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(raw)
}

fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Setup a TLS connector, optionally accepting invalid certificates and host names.
pub fn setup_tls_connector(accept_invalid: bool) -> Result<TokioTlsConnector, native_tls::Error> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(accept_invalid);
    builder.danger_accept_invalid_hostnames(accept_invalid);
    let connector = builder.build()?;
    Ok(TokioTlsConnector::from(connector))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_file_config_deserialization() {
        let yaml = r#"
            timeout: 500ms
            interval: 2s
            counter: 10
            http_method: HEAD
            dns_servers:
              - 1.1.1.1
              - 8.8.8.8
            meta: true
        "#;

        let file = parse_file_config(yaml).expect("valid YAML");
        assert_eq!(file.timeout, Some(Duration::from_millis(500)));
        assert_eq!(file.interval, Some(Duration::from_secs(2)));
        assert_eq!(file.counter, Some(10));
        assert_eq!(file.http_method.as_deref(), Some("HEAD"));
        assert_eq!(file.dns_servers, vec!["1.1.1.1", "8.8.8.8"]);
        assert_eq!(file.meta, Some(true));
        assert_eq!(file.proxy, None);
    }

    #[test]
    fn test_defaults_when_file_is_empty() {
        let config = AppConfig::from(parse_file_config("").expect("empty is valid"));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.counter, DEFAULT_COUNTER);
        assert_eq!(config.http_method, "GET");
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(!config.meta);
        assert!(config.dns_hosts.is_empty());
    }

    #[test]
    fn test_rejects_bad_duration_and_unknown_keys() {
        assert!(parse_file_config("timeout: soon").is_err());
        assert!(parse_file_config("timeuot: 1s").is_err());
    }

    #[test]
    fn test_example_file_parses() {
        let file = parse_file_config(include_str!("../../oxyping.example.yml")).expect("valid example");
        assert_eq!(file.interval, Some(Duration::from_millis(500)));
        assert_eq!(file.proxy, None);
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_config_from_path() {
        let file = yaml_file("counter: 7\ninterval: 250ms\ndns_servers: [9.9.9.9]\n");

        let config = load_config_with(Some(file.path()), no_env).expect("loads");
        assert_eq!(config.counter, 7);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.dns_hosts, vec!["9.9.9.9"]);
    }

    #[test]
    fn test_load_config_from_env_file_and_dns_hosts() {
        let file = yaml_file("counter: 2\ndns_servers: [9.9.9.9]\n");
        let location = file.path().to_string_lossy().into_owned();
        let lookup = |key: &str| match key {
            CONFIG_FILE_ENV => Some(location.clone()),
            DNS_HOSTS_ENV => Some("1.1.1.1, 8.8.8.8".to_string()),
            _ => None,
        };

        let config = load_config_with(None, lookup).expect("loads");
        assert_eq!(config.counter, 2);
        assert_eq!(config.dns_hosts, vec!["1.1.1.1", "8.8.8.8"]);
    }

    #[test]
    fn test_explicit_path_beats_env_file() {
        let explicit = yaml_file("counter: 3\n");
        let from_env = yaml_file("counter: 9\n");
        let location = from_env.path().to_string_lossy().into_owned();
        let lookup = |key: &str| (key == CONFIG_FILE_ENV).then(|| location.clone());

        let config = load_config_with(Some(explicit.path()), lookup).expect("loads");
        assert_eq!(config.counter, 3);
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config_with(None, no_env).expect("defaults");
        assert_eq!(config.counter, DEFAULT_COUNTER);
        assert!(config.dns_hosts.is_empty());
    }

    #[test]
    fn test_load_config_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing.yml");
        assert!(matches!(
            load_config_with(Some(&missing), no_env),
            Err(ConfigError::Read { path, .. }) if path == missing
        ));

        let broken = yaml_file("counter: [not, a, number]\n");
        assert!(matches!(
            load_config_with(Some(broken.path()), no_env),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn test_split_hosts() {
        assert_eq!(split_hosts("1.1.1.1, 8.8.8.8,,"), vec!["1.1.1.1", "8.8.8.8"]);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use oxyping::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "oxyping",
    author,
    version,
    about = "Ping a TCP, HTTP or HTTPS endpoint and report connect times",
    after_help = "Examples:\n  oxyping google.com\n  oxyping google.com 443 --meta\n  oxyping https://example.com/health -c 10 -I 500ms\n  oxyping http://example.com --http-method POST --proxy http://127.0.0.1:3128\n\nDefaults can be set in a YAML file passed with --config or OXYPING_CONFIG."
)]
pub struct Cli {
    /// Host, host:port or URL with a tcp://, http:// or https:// scheme
    pub address: String,

    /// Port, overrides the one in the address
    pub port: Option<u16>,

    /// Number of probes to send, 0 probes until interrupted [default: 4]
    #[arg(short = 'c', long)]
    pub counter: Option<u64>,

    /// Timeout of each probe, e.g. 1s or 500ms [default: 1s]
    #[arg(short = 'T', long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Time between probes [default: 1s]
    #[arg(short = 'I', long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// HTTP method for http(s) targets [default: GET]
    #[arg(long, value_name = "METHOD")]
    pub http_method: Option<String>,

    /// User-Agent header for http(s) targets [default: oxyping]
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Print certificate details (tcp) or request phase timings (http)
    #[arg(long)]
    pub meta: bool,

    /// HTTP proxy for http(s) targets, e.g. http://127.0.0.1:3128
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Skip certificate verification for https targets
    #[arg(long)]
    pub insecure: bool,

    /// DNS server (ip, ip:port or host[:port]) to resolve with instead of the system resolver, repeatable
    #[arg(short = 'D', long = "dns-server", value_name = "ADDR")]
    pub dns_servers: Vec<String>,

    /// YAML file with defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(counter) = self.counter {
            config.counter = counter;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(method) = &self.http_method {
            config.http_method = method.clone();
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(proxy) = &self.proxy {
            config.proxy = Some(proxy.clone());
        }
        if !self.dns_servers.is_empty() {
            config.dns_hosts = self.dns_servers.clone();
        }
        config.meta |= self.meta;
        config.insecure |= self.insecure;
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use oxyping::config::app_config::FileConfig;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_come_from_config() {
        let cli = Cli::try_parse_from(["oxyping", "example.com"]).expect("parses");
        assert_eq!(cli.address, "example.com");
        assert_eq!(cli.port, None);

        let mut config = AppConfig::from(FileConfig::default());
        cli.apply(&mut config);
        assert_eq!(config.counter, 4);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.http_method, "GET");
        assert!(!config.meta);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "oxyping",
            "https://example.com/health",
            "8443",
            "-c",
            "0",
            "-T",
            "250ms",
            "-I",
            "2s",
            "--http-method",
            "HEAD",
            "--meta",
            "-D",
            "1.1.1.1",
            "-D",
            "8.8.8.8",
        ])
        .expect("parses");
        assert_eq!(cli.port, Some(8443));

        let mut config = AppConfig::from(FileConfig {
            counter: Some(10),
            timeout: Some(Duration::from_secs(5)),
            dns_servers: vec!["9.9.9.9".to_string()],
            insecure: Some(true),
            ..Default::default()
        });
        cli.apply(&mut config);

        assert_eq!(config.counter, 0);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.http_method, "HEAD");
        assert_eq!(config.dns_hosts, vec!["1.1.1.1", "8.8.8.8"]);
        assert!(config.meta);
        // Boolean flags can only switch a file setting on.
        assert!(config.insecure);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        assert!(Cli::try_parse_from(["oxyping", "example.com", "-T", "soon"]).is_err());
    }
}

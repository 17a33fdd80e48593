use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::address::host_port;
use crate::dns::{self, DnsResolver};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_COUNTER: u64 = 4;
pub const DEFAULT_USER_AGENT: &str = "oxyping";

/// Transport used to probe a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Https => 443,
            Protocol::Tcp | Protocol::Http => 80,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("protocol {0} not supported")]
pub struct UnsupportedProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnsupportedProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(UnsupportedProtocol(other.to_string())),
        }
    }
}

/// The endpoint being probed and the run configuration around it.
///
/// Built once from parsed input and never mutated after the ping loop starts.
#[derive(Debug, Clone)]
pub struct Target {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Full request URL for HTTP(S) targets, including path and query.
    pub url: Url,
    pub proxy: Option<Url>,

    pub counter: u64,
    pub interval: Duration,
    pub timeout: Duration,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, host_port(&self.host, self.port))
    }
}

/// Per-probe settings shared by every probe kind.
#[derive(Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    /// Resolver for this run. Falls back to the process-wide resolver when unset.
    pub resolver: Option<Arc<DnsResolver>>,
    pub proxy: Option<Url>,
    pub user_agent: String,
    /// Skip certificate verification for HTTPS probes.
    pub insecure: bool,
}

impl ProbeOptions {
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    pub fn resolver(&self) -> Arc<DnsResolver> {
        match &self.resolver {
            Some(resolver) => resolver.clone(),
            None => dns::global_resolver(),
        }
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            resolver: None,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            insecure: false,
        }
    }
}

impl fmt::Debug for ProbeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeOptions")
            .field("timeout", &self.timeout)
            .field("custom_resolver", &self.resolver.is_some())
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("user_agent", &self.user_agent)
            .field("insecure", &self.insecure)
            .finish()
    }
}

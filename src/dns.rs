//! Name resolution for probes.
//!
//! A run either uses the system resolver or a set of custom name servers.
//! The resolver is injected per run through [`ProbeOptions`](crate::config::ProbeOptions);
//! [`install_global`] is kept for callers that still configure it process-wide.

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::{Arc, RwLock};

use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{
    NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts,
};

use crate::config::{ConfigError, format_ip};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DNS_PORT: u16 = 53;

static GLOBAL_RESOLVER: RwLock<Option<Arc<DnsResolver>>> = RwLock::new(None);

pub enum DnsResolver {
    /// The operating system resolver (`getaddrinfo`).
    System,
    /// Queries the given name servers directly.
    Custom {
        servers: Vec<SocketAddr>,
        resolver: TokioAsyncResolver,
    },
}

impl DnsResolver {
    /// Setup a resolver that queries `servers` over UDP.
    ///
    /// Each entry is an IP (`1.1.1.1`, `[2606:4700::1111]`), a socket address
    /// (`1.1.1.1:5353`) or a host name with an optional port, resolved once here
    /// with the system resolver. Caching is disabled so that every probe measures
    /// a real lookup.
    pub fn from_servers(servers: &[String]) -> Result<Self, ConfigError> {
        let mut addrs = Vec::with_capacity(servers.len());
        let mut name_servers = NameServerConfigGroup::new();

        for server in servers {
            let socket_addr = parse_server(server)?;
            name_servers.push(NameServerConfig {
                socket_addr,
                protocol: Protocol::Udp,
                tls_dns_name: None,
                trust_negative_responses: false,
                bind_addr: None,
            });
            addrs.push(socket_addr);
        }

        let mut opts = ResolverOpts::default();
        opts.attempts = 2;
        opts.cache_size = 0;

        let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
        Ok(DnsResolver::Custom {
            servers: addrs,
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        })
    }

    /// Resolve `host` to socket addresses on `port`. IP literals are returned as-is.
    pub async fn lookup(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, BoxError> {
        if let Some(ip) = ip_literal(host) {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let addrs: Vec<SocketAddr> = match self {
            DnsResolver::System => tokio::net::lookup_host((host, port)).await?.collect(),
            DnsResolver::Custom { resolver, .. } => resolver
                .lookup_ip(host)
                .await?
                .iter()
                .map(|ip| SocketAddr::new(ip, port))
                .collect(),
        };

        if addrs.is_empty() {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such host {host}"),
            )));
        }
        Ok(addrs)
    }

    pub fn servers(&self) -> &[SocketAddr] {
        match self {
            DnsResolver::System => &[],
            DnsResolver::Custom { servers, .. } => servers,
        }
    }
}

/// Whether `host` needs no resolution at all.
pub fn ip_literal(host: &str) -> Option<IpAddr> {
    host.trim_matches(|c: char| c == '[' || c == ']').parse().ok()
}

fn parse_server(server: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::DnsServer(server.to_string());
    let trimmed = server.trim();

    if let Some(ip) = format_ip(trimmed).as_deref().and_then(ip_literal) {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let (host, port) = match trimmed.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (trimmed, DNS_PORT),
    };
    let valid_name = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid_name {
        return Err(invalid());
    }

    let addr = (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(invalid)?;
    log::debug!("DNS server {host} resolved to {addr}");
    Ok(addr)
}

/// Install `resolver` as the process-wide default.
///
/// Used by every probe whose options carry no resolver of their own. It is
/// never reset automatically; concurrent runs that need different resolvers
/// should pass them through their options instead.
pub fn install_global(resolver: Arc<DnsResolver>) {
    match GLOBAL_RESOLVER.write() {
        Ok(mut global) => *global = Some(resolver),
        Err(poisoned) => *poisoned.into_inner() = Some(resolver),
    }
}

pub fn global_resolver() -> Arc<DnsResolver> {
    let installed = match GLOBAL_RESOLVER.read() {
        Ok(global) => global.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    installed.unwrap_or_else(|| Arc::new(DnsResolver::System))
}

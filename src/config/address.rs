use std::net::IpAddr;

use url::{Host, Url};

use super::model::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("{0} is an invalid target: {1}")]
    Invalid(String, #[source] url::ParseError),

    #[error("{0} has no host")]
    MissingHost(String),

    #[error(transparent)]
    Protocol(#[from] super::model::UnsupportedProtocol),

    #[error("port cannot be 0")]
    ZeroPort,
}

/// A parsed probe address: protocol, bare host, effective port and the URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub url: Url,
}

/// Parse `addr` as a URL, defaulting the scheme to `tcp://` when none is given.
pub fn parse_url(addr: &str) -> Result<Url, AddressError> {
    let raw = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("tcp://{addr}")
    };
    Url::parse(&raw).map_err(|e| AddressError::Invalid(addr.to_string(), e))
}

/// Resolve a user supplied address into protocol, host and port.
///
/// The port comes from `port_override` first, then from the address itself,
/// then from the protocol default (443 for https, 80 otherwise).
pub fn parse_address(addr: &str, port_override: Option<u16>) -> Result<Address, AddressError> {
    let mut url = parse_url(addr)?;
    let protocol: Protocol = url.scheme().parse()?;
    let host = bare_host(&url).ok_or_else(|| AddressError::MissingHost(addr.to_string()))?;

    let port = port_override
        .or_else(|| url.port())
        .unwrap_or_else(|| protocol.default_port());
    if port == 0 {
        return Err(AddressError::ZeroPort);
    }
    // For http(s) the url crate drops the port again when it equals the scheme default.
    let _ = url.set_port(Some(port));

    Ok(Address {
        protocol,
        host,
        port,
        url,
    })
}

/// Host of `url` without IPv6 brackets.
pub fn bare_host(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Trim spaces and brackets around an IP literal and normalise it.
///
/// IPv4 comes back as `192.168.9.1`, IPv6 as `[2002:ac1f:91c5:1::bd59]`.
/// Returns `None` when the input is not an IP address.
pub fn format_ip(ip: &str) -> Option<String> {
    let host = ip.trim_matches(|c: char| c == '[' || c == ']' || c == ' ');
    match host.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(v4.to_string()),
        IpAddr::V6(v6) => Some(format!("[{v6}]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_tcp_port_80() {
        let address = parse_address("google.com", None).expect("valid address");
        assert_eq!(address.protocol, Protocol::Tcp);
        assert_eq!(address.host, "google.com");
        assert_eq!(address.port, 80);
    }

    #[test]
    fn test_port_precedence() {
        let address = parse_address("google.com:8080", None).expect("valid address");
        assert_eq!(address.port, 8080);

        let address = parse_address("google.com:8080", Some(443)).expect("valid address");
        assert_eq!(address.port, 443);

        let address = parse_address("https://example.com/health", None).expect("valid address");
        assert_eq!(address.protocol, Protocol::Https);
        assert_eq!(address.port, 443);
        assert_eq!(address.url.as_str(), "https://example.com/health");
    }

    #[test]
    fn test_port_override_lands_in_http_url() {
        let address = parse_address("http://example.com/a?b=c", Some(8080)).expect("valid address");
        assert_eq!(address.url.as_str(), "http://example.com:8080/a?b=c");
    }

    #[test]
    fn test_ipv6_host_is_unbracketed() {
        let address = parse_address("[::1]:22", None).expect("valid address");
        assert_eq!(address.host, "::1");
        assert_eq!(address.port, 22);
        assert_eq!(host_port(&address.host, address.port), "[::1]:22");
    }

    #[test]
    fn test_rejects_unknown_scheme_and_zero_port() {
        assert!(matches!(
            parse_address("ftp://example.com", None),
            Err(AddressError::Protocol(_))
        ));
        assert!(matches!(
            parse_address("example.com", Some(0)),
            Err(AddressError::ZeroPort)
        ));
    }

    #[test]
    fn test_format_ip() {
        assert_eq!(format_ip("192.168.0.1").as_deref(), Some("192.168.0.1"));
        assert_eq!(format_ip("192.0.1"), None);
        assert_eq!(format_ip("[192.0.1.1] ").as_deref(), Some("192.0.1.1"));
        assert_eq!(
            format_ip("[2002:ac1f:91c5:1::bd59]").as_deref(),
            Some("[2002:ac1f:91c5:1::bd59]")
        );
        assert_eq!(format_ip("2002:ac1f:91c5:1:"), None);
        assert_eq!(
            format_ip("2002:ac1f:91c5:1::bd59 ").as_deref(),
            Some("[2002:ac1f:91c5:1::bd59]")
        );
    }
}

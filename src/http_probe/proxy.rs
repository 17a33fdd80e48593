use std::net::IpAddr;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderValue, Method, Request, Uri};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use url::Url;

use super::{AbortOnDrop, Io};
use crate::config::address::bare_host;
use crate::probe::ProbeError;

/// Proxy to use for `target`: the explicit one, else whatever the environment says.
pub fn proxy_for(target: &Url, explicit: Option<&Url>) -> Option<Url> {
    if let Some(proxy) = explicit {
        return Some(proxy.clone());
    }
    from_lookup(target, |key| std::env::var(key).ok())
}

/// Resolve the proxy for `target` from environment style variables read through `lookup`.
///
/// Loopback targets and hosts matched by `NO_PROXY` go direct.
pub fn from_lookup<F>(target: &Url, lookup: F) -> Option<Url>
where
    F: Fn(&str) -> Option<String>,
{
    let host = bare_host(target)?.to_ascii_lowercase();
    if is_loopback(&host) {
        return None;
    }

    let no_proxy = first_set(&lookup, &["NO_PROXY", "no_proxy"]).unwrap_or_default();
    if bypassed(&host, target.port_or_known_default(), &no_proxy) {
        log::debug!("{host} matches NO_PROXY, going direct");
        return None;
    }

    let keys: &[&str] = match target.scheme() {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        _ => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
    };
    let raw = first_set(&lookup, keys)?;
    parse_proxy(&raw)
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// `host:port` proxies without a scheme are taken as http.
fn parse_proxy(raw: &str) -> Option<Url> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    match Url::parse(&with_scheme) {
        Ok(url) if url.scheme() == "http" => Some(url),
        Ok(url) => {
            log::warn!("ignoring proxy {url}, only http:// proxies are supported");
            None
        }
        Err(err) => {
            log::warn!("ignoring invalid proxy {raw:?}: {err}");
            None
        }
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Whether `host` is excluded by a comma separated `NO_PROXY` list.
fn bypassed(host: &str, port: Option<u16>, no_proxy: &str) -> bool {
    for entry in no_proxy.split(',') {
        let entry = entry.trim().to_ascii_lowercase();
        if entry.is_empty() {
            continue;
        }
        if entry == "*" {
            return true;
        }

        let (pattern, entry_port) = split_port(&entry);
        if let Some(entry_port) = entry_port {
            if Some(entry_port) != port {
                continue;
            }
        }

        let matched = match pattern.strip_prefix('.') {
            Some(suffix) => host == suffix || host.ends_with(&format!(".{suffix}")),
            None => host == pattern || host.ends_with(&format!(".{pattern}")),
        };
        if matched {
            return true;
        }
    }
    false
}

fn split_port(entry: &str) -> (&str, Option<u16>) {
    // Bare IPv6 literals carry colons without a port.
    if entry.parse::<IpAddr>().is_ok() {
        return (entry, None);
    }
    match entry.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.trim_matches(['[', ']']), Some(port)),
            Err(_) => (entry, None),
        },
        None => (entry, None),
    }
}

/// Open a `CONNECT` tunnel to `authority` through an already connected proxy stream.
pub(crate) async fn tunnel(
    io: Box<dyn Io>,
    authority: &str,
    proxy: &Url,
    user_agent: &HeaderValue,
) -> Result<Box<dyn Io>, ProbeError> {
    let refused = |reason: String| ProbeError::Proxy {
        proxy: proxy.to_string(),
        reason,
    };

    let uri: Uri = authority
        .parse()
        .map_err(|err: http::uri::InvalidUri| refused(err.to_string()))?;
    let host = HeaderValue::from_str(authority).map_err(|err| refused(err.to_string()))?;

    let (mut sender, conn) =
        hyper::client::conn::http1::handshake::<_, Empty<Bytes>>(TokioIo::new(io))
            .await
            .map_err(ProbeError::Http)?;
    let _driver = AbortOnDrop(tokio::spawn(conn.with_upgrades()));

    let mut req = Request::new(Empty::new());
    *req.method_mut() = Method::CONNECT;
    *req.uri_mut() = uri;
    req.headers_mut().insert(HOST, host);
    req.headers_mut().insert(USER_AGENT, user_agent.clone());

    let res = sender.send_request(req).await.map_err(ProbeError::Http)?;
    if !res.status().is_success() {
        return Err(refused(res.status().to_string()));
    }

    let upgraded = hyper::upgrade::on(res).await.map_err(ProbeError::Http)?;
    log::debug!("tunnel to {authority} open through {proxy}");
    Ok(Box::new(TokioIo::new(upgraded)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Box<dyn Fn(&str) -> Option<String>> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Box::new(move |key| vars.get(key).cloned())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).expect("url")
    }

    #[test]
    fn test_explicit_proxy_wins() {
        let explicit = url("http://10.0.0.1:3128");
        let proxy = proxy_for(&url("http://127.0.0.1/"), Some(&explicit));
        assert_eq!(proxy, Some(explicit));
    }

    #[test]
    fn test_scheme_specific_variables() {
        let lookup = env(&[
            ("HTTP_PROXY", "http://plain.proxy:8080"),
            ("https_proxy", "secure.proxy:3128"),
        ]);
        assert_eq!(
            from_lookup(&url("http://example.com/"), &lookup).map(String::from),
            Some("http://plain.proxy:8080/".to_string())
        );
        assert_eq!(
            from_lookup(&url("https://example.com/"), &lookup).map(String::from),
            Some("http://secure.proxy:3128/".to_string())
        );
    }

    #[test]
    fn test_all_proxy_fallback() {
        let lookup = env(&[("ALL_PROXY", "http://any.proxy:1080")]);
        assert!(from_lookup(&url("https://example.com/"), &lookup).is_some());
        assert!(from_lookup(&url("http://example.com/"), &lookup).is_some());
    }

    #[test]
    fn test_no_proxy_rules() {
        let lookup = env(&[
            ("HTTP_PROXY", "http://proxy:8080"),
            ("NO_PROXY", "internal.example, .corp.local,exact.host, api.io:8443"),
        ]);
        let direct = |u: &str| from_lookup(&url(u), &lookup).is_none();

        assert!(direct("http://internal.example/"));
        assert!(direct("http://a.internal.example/"));
        assert!(direct("http://corp.local/"));
        assert!(direct("http://b.corp.local/"));
        assert!(direct("http://exact.host/"));
        assert!(direct("http://api.io:8443/"));

        assert!(!direct("http://api.io/"));
        assert!(!direct("http://notinternal.example/"));
        assert!(!direct("http://exact.host.org/"));
    }

    #[test]
    fn test_no_proxy_wildcard_and_loopback() {
        let lookup = env(&[("HTTP_PROXY", "http://proxy:8080"), ("no_proxy", "*")]);
        assert!(from_lookup(&url("http://example.com/"), &lookup).is_none());

        let lookup = env(&[("HTTP_PROXY", "http://proxy:8080")]);
        assert!(from_lookup(&url("http://localhost:8080/"), &lookup).is_none());
        assert!(from_lookup(&url("http://127.0.0.1/"), &lookup).is_none());
        assert!(from_lookup(&url("http://[::1]/"), &lookup).is_none());
    }

    #[test]
    fn test_non_http_proxy_is_ignored() {
        let lookup = env(&[("HTTP_PROXY", "socks5://proxy:1080")]);
        assert!(from_lookup(&url("http://example.com/"), &lookup).is_none());
        let lookup = env(&[("HTTP_PROXY", "  ")]);
        assert!(from_lookup(&url("http://example.com/"), &lookup).is_none());
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderValue, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::time::Instant;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use url::Url;

use super::proxy;
use super::trace::{IoClock, PhaseTimings, TimedIo};
use super::{AbortOnDrop, Io};
use crate::config::address::{bare_host, host_port};
use crate::config::{ProbeOptions, setup_tls_connector};
use crate::probe::context::Bound;
use crate::probe::tcp::{dial, resolve};
use crate::probe::{BuildError, Extra, Probe, ProbeContext, ProbeError, Stats};

/// Sends one HTTP request per probe over a fresh connection.
///
/// Redirects are never followed, a 3xx is reported like any other status.
/// The response body is read to the end so the timing covers the full
/// transfer.
pub struct HttpProbe {
    url: Url,
    host: String,
    port: u16,
    method: Method,
    origin_uri: Uri,
    absolute_uri: Uri,
    host_header: HeaderValue,
    user_agent: HeaderValue,
    options: Arc<ProbeOptions>,
    tls: Option<TokioTlsConnector>,
    trace: bool,
}

impl HttpProbe {
    /// `method` defaults to GET when empty.
    pub fn new(
        method: &str,
        url: &str,
        options: Arc<ProbeOptions>,
        trace: bool,
    ) -> Result<Self, BuildError> {
        let method = if method.trim().is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| BuildError::InvalidMethod(method.to_string()))?
        };

        let mut url = Url::parse(url).map_err(|err| BuildError::InvalidRequest(format!("{url}: {err}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(BuildError::UnsupportedScheme(other.to_string())),
        }
        url.set_fragment(None);

        let host = bare_host(&url)
            .ok_or_else(|| BuildError::InvalidRequest(format!("{url}: missing host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BuildError::InvalidRequest(format!("{url}: missing port")))?;

        let invalid = |err: &dyn std::fmt::Display| BuildError::InvalidRequest(format!("{url}: {err}"));
        let origin = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        let origin_uri: Uri = origin.parse().map_err(|err| invalid(&err))?;
        let absolute_uri: Uri = url.as_str().parse().map_err(|err| invalid(&err))?;

        let authority = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => host.clone(),
        };
        let host_header = HeaderValue::from_str(&authority).map_err(|err| invalid(&err))?;
        let user_agent = HeaderValue::from_str(&options.user_agent).map_err(|err| invalid(&err))?;

        if let Some(proxy) = &options.proxy {
            if proxy.scheme() != "http" {
                return Err(BuildError::UnsupportedProxy(proxy.to_string()));
            }
        }

        let tls = if url.scheme() == "https" {
            Some(setup_tls_connector(options.insecure).map_err(BuildError::Tls)?)
        } else {
            None
        };

        Ok(Self {
            url,
            host,
            port,
            method,
            origin_uri,
            absolute_uri,
            host_header,
            user_agent,
            options,
            tls,
            trace,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    fn request(&self, absolute_form: bool) -> Request<Full<Bytes>> {
        let body = if self.method == Method::POST {
            Bytes::from_static(b"{}")
        } else {
            Bytes::new()
        };
        let has_body = !body.is_empty();

        let mut req = Request::new(Full::new(body));
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = if absolute_form {
            self.absolute_uri.clone()
        } else {
            self.origin_uri.clone()
        };
        let headers = req.headers_mut();
        headers.insert(HOST, self.host_header.clone());
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        req
    }

    async fn exchange(
        &self,
        bound: &Bound<'_>,
        stats: &mut Stats,
        phases: &mut PhaseTimings,
    ) -> Result<(), ProbeError> {
        let proxy = proxy::proxy_for(&self.url, self.options.proxy.as_ref());
        let (dial_host, dial_port) = match &proxy {
            Some(proxy) => (
                bare_host(proxy).unwrap_or_default(),
                proxy.port_or_known_default().unwrap_or(80),
            ),
            None => (self.host.clone(), self.port),
        };

        let (addrs, dns_duration) = resolve(&self.options, bound, &dial_host, dial_port).await?;
        phases.dns = dns_duration;

        let connect_start = Instant::now();
        let stream = bound.run(dial(&addrs, stats)).await?;
        if let Ok(peer) = stream.peer_addr() {
            stats.address = peer.to_string();
        }
        let mut io: Box<dyn Io> = Box::new(stream);
        let tunnelled = proxy.is_some() && self.tls.is_some();
        if let (true, Some(proxy)) = (tunnelled, &proxy) {
            let authority = host_port(&self.host, self.port);
            io = bound
                .run(proxy::tunnel(io, &authority, proxy, &self.user_agent))
                .await?;
        }
        phases.connect = connect_start.elapsed();

        if let Some(connector) = &self.tls {
            let tls_start = Instant::now();
            let tls = bound
                .run(async {
                    connector
                        .connect(&self.host, io)
                        .await
                        .map_err(ProbeError::Tls)
                })
                .await?;
            io = Box::new(tls);
            phases.tls = Some(tls_start.elapsed());
        }

        let ready = Instant::now();
        let clock = Arc::new(IoClock::default());
        let (mut sender, conn) = bound
            .run(async {
                hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(TimedIo::new(
                    io,
                    clock.clone(),
                )))
                .await
                .map_err(ProbeError::Http)
            })
            .await?;
        let _driver = AbortOnDrop(tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::debug!("http connection closed: {err}");
            }
        }));

        let request = self.request(proxy.is_some() && !tunnelled);
        let response = bound
            .run(async { sender.send_request(request).await.map_err(ProbeError::Http) })
            .await?;
        let headers_at = Instant::now();
        let written = clock.request_written().unwrap_or(ready);
        let first_byte = clock.first_byte().unwrap_or(headers_at);
        phases.request = written.saturating_duration_since(ready);
        phases.wait_response = first_byte.saturating_duration_since(written);

        stats.connected = true;
        stats
            .meta
            .insert("status".to_string(), response.status().as_u16().into());

        let body_start = Instant::now();
        let mut body = response.into_body();
        let mut bytes: u64 = 0;
        let drained = bound
            .run(async {
                while let Some(frame) = body.frame().await {
                    let frame = frame.map_err(ProbeError::BodyRead)?;
                    if let Some(chunk) = frame.data_ref() {
                        bytes += chunk.len() as u64;
                    }
                }
                Ok(())
            })
            .await;
        phases.response_body = body_start.elapsed();
        if bytes > 0 {
            stats.meta.insert("bytes".to_string(), bytes.into());
        }
        drained
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, ctx: &ProbeContext) -> Stats {
        let bound = ctx.bound(self.options.effective_timeout());
        let mut stats = Stats::default();
        let mut phases = PhaseTimings::default();
        let start = Instant::now();

        let result = self.exchange(&bound, &mut stats, &mut phases).await;
        stats.duration = start.elapsed();
        stats.dns_duration = phases.dns;
        if let Err(err) = result {
            stats.connected = false;
            stats.error = Some(err);
        }
        if self.trace {
            stats.extra = Some(Extra::Phases(phases));
        }
        stats
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_native_tls::TlsConnector as TokioTlsConnector;

use super::cert::peer_certificate;
use super::context::{Bound, ProbeContext};
use super::error::ProbeError;
use super::stats::{Extra, Stats};
use super::{BuildError, Probe};
use crate::config::{ProbeOptions, setup_tls_connector};
use crate::dns;

/// Opens one TCP connection per probe, optionally wrapped in TLS.
///
/// The TLS handshake runs without certificate verification: the probe
/// measures reachability, not trust. When the handshake fails the probe
/// falls back to a plain connection and reports the TLS error as detail.
pub struct TcpProbe {
    host: String,
    port: u16,
    options: Arc<ProbeOptions>,
    tls: Option<TokioTlsConnector>,
}

impl TcpProbe {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        options: Arc<ProbeOptions>,
        tls: bool,
    ) -> Result<Self, BuildError> {
        let tls = if tls {
            Some(setup_tls_connector(true).map_err(BuildError::Tls)?)
        } else {
            None
        };
        Ok(Self {
            host: host.into(),
            port,
            options,
            tls,
        })
    }

    async fn connect(&self, bound: &Bound<'_>, stats: &mut Stats) -> Result<TcpStream, ProbeError> {
        let (addrs, dns_duration) = resolve(&self.options, bound, &self.host, self.port).await?;
        stats.dns_duration = dns_duration;

        bound.run(dial(&addrs, stats)).await
    }
}

/// Resolve `host` with the configured resolver and time the lookup.
///
/// IP literals are not looked up and take no DNS time.
pub(crate) async fn resolve(
    options: &ProbeOptions,
    bound: &Bound<'_>,
    host: &str,
    port: u16,
) -> Result<(Vec<SocketAddr>, Duration), ProbeError> {
    if let Some(ip) = dns::ip_literal(host) {
        return Ok((vec![SocketAddr::new(ip, port)], Duration::ZERO));
    }

    let resolver = options.resolver();
    let start = Instant::now();
    let addrs = bound
        .run(async {
            resolver
                .lookup(host, port)
                .await
                .map_err(|source| ProbeError::Dns {
                    host: host.to_string(),
                    source,
                })
        })
        .await?;
    Ok((addrs, start.elapsed()))
}

/// Try each address in order and keep the first connection that succeeds.
pub(crate) async fn dial(addrs: &[SocketAddr], stats: &mut Stats) -> Result<TcpStream, ProbeError> {
    let mut last_err = None;
    for addr in addrs {
        stats.address = addr.to_string();
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                log::debug!("dial {addr} failed: {source}");
                last_err = Some(ProbeError::Connect {
                    addr: *addr,
                    source,
                });
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ProbeError::Connect {
        addr: SocketAddr::from(([0, 0, 0, 0], 0)),
        source: std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses to dial"),
    }))
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, ctx: &ProbeContext) -> Stats {
        let bound = ctx.bound(self.options.effective_timeout());
        let mut stats = Stats::default();
        let start = Instant::now();

        let stream = match self.connect(&bound, &mut stats).await {
            Ok(stream) => stream,
            Err(err) => {
                stats.duration = start.elapsed();
                stats.error = Some(err);
                return stats;
            }
        };

        let Some(connector) = &self.tls else {
            stats.duration = start.elapsed();
            stats.connected = true;
            if let Ok(peer) = stream.peer_addr() {
                stats.address = peer.to_string();
            }
            return stats;
        };

        let peer = stream.peer_addr().ok();
        let handshake = bound
            .run(async {
                connector
                    .connect(&self.host, stream)
                    .await
                    .map_err(ProbeError::Tls)
            })
            .await;

        match handshake {
            Ok(tls_stream) => {
                stats.duration = start.elapsed();
                stats.connected = true;
                if let Some(peer) = peer {
                    stats.address = peer.to_string();
                }
                if let Some(cert) = peer_certificate(&tls_stream, &self.host) {
                    stats.extra = Some(Extra::Certificate(cert));
                }
            }
            Err(ProbeError::Tls(tls_err)) => {
                log::debug!("tls handshake with {} failed, retrying plain: {tls_err}", self.host);
                let plain = self.connect(&bound, &mut stats).await;
                stats.duration = start.elapsed();
                match plain {
                    Ok(stream) => {
                        stats.connected = true;
                        if let Ok(peer) = stream.peer_addr() {
                            stats.address = peer.to_string();
                        }
                        stats.extra = Some(Extra::Text(format!("TLS handshake failed, {tls_err}")));
                    }
                    Err(err) => stats.error = Some(err),
                }
            }
            Err(err) => {
                stats.duration = start.elapsed();
                stats.error = Some(err);
            }
        }
        stats
    }
}

//! The probe capability and the TCP implementation.
//!
//! A [`Probe`] performs one network interaction and reports it as [`Stats`].
//! It never fails outright: every error ends up in [`Stats::error`] so the
//! driver loop keeps running.

pub mod cert;
pub mod context;
pub mod error;
pub mod stats;
pub mod tcp;

use std::sync::Arc;

use async_trait::async_trait;

pub use context::ProbeContext;
pub use error::{ErrorKind, ProbeError};
pub use stats::{Extra, MetaValue, Stats};
pub use tcp::TcpProbe;

use crate::config::{ProbeOptions, Protocol, Target};
use crate::http_probe::HttpProbe;

#[async_trait]
pub trait Probe: Send + Sync {
    /// Run one attempt. Must return promptly once `ctx` is cancelled.
    async fn probe(&self, ctx: &ProbeContext) -> Stats;
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Arc<P> {
    async fn probe(&self, ctx: &ProbeContext) -> Stats {
        (**self).probe(ctx).await
    }
}

/// Errors raised while constructing a probe, before any run starts.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid http method {0:?}")]
    InvalidMethod(String),

    #[error("url or method is invalid, {0}")]
    InvalidRequest(String),

    #[error("unsupported scheme {0}, expected http or https")]
    UnsupportedScheme(String),

    #[error("unsupported proxy {0}, only http:// proxies are supported")]
    UnsupportedProxy(String),

    #[error("failed to build TLS connector: {0}")]
    Tls(#[source] native_tls::Error),
}

/// How a target is probed, beyond the per-request [`ProbeOptions`].
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// HTTP method for http(s) targets.
    pub method: String,
    /// tcp targets: attempt a TLS handshake and attach the peer certificate.
    /// http(s) targets: attach the request phase timings.
    pub meta: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            meta: false,
        }
    }
}

/// Build the probe matching `target.protocol`.
///
/// The target's timeout and proxy take the place of those in `options`.
pub fn build(
    target: &Target,
    mut options: ProbeOptions,
    settings: &ProbeSettings,
) -> Result<Arc<dyn Probe>, BuildError> {
    options.timeout = target.timeout;
    options.proxy = target.proxy.clone();
    log::debug!("probing {target} with {options:?}");
    let options = Arc::new(options);

    let probe: Arc<dyn Probe> = match target.protocol {
        Protocol::Tcp => Arc::new(TcpProbe::new(
            target.host.clone(),
            target.port,
            options,
            settings.meta,
        )?),
        Protocol::Http | Protocol::Https => Arc::new(HttpProbe::new(
            &settings.method,
            target.url.as_str(),
            options,
            settings.meta,
        )?),
    };
    log::debug!("built {} probe for {target}", target.protocol);
    Ok(probe)
}

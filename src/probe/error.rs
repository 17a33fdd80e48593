use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::dns::BoxError;

/// Coarse classification of a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DnsFailure,
    ConnectFailure,
    TlsFailure,
    Timeout,
    HttpProtocolFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::DnsFailure => "dns_failure",
            ErrorKind::ConnectFailure => "connect_failure",
            ErrorKind::TlsFailure => "tls_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::HttpProtocolFailure => "http_protocol_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("lookup {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: BoxError,
    },

    #[error("dial tcp {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("proxy {proxy}: {reason}")]
    Proxy { proxy: String, reason: String },

    #[error("tls handshake: {0}")]
    Tls(#[source] native_tls::Error),

    #[error("i/o timeout after {0:?}")]
    Timeout(Duration),

    #[error("http: {0}")]
    Http(#[source] hyper::Error),

    #[error("read body failed: {0}")]
    BodyRead(#[source] hyper::Error),

    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Dns { .. } => ErrorKind::DnsFailure,
            ProbeError::Connect { .. } | ProbeError::Proxy { .. } => ErrorKind::ConnectFailure,
            ProbeError::Tls(_) => ErrorKind::TlsFailure,
            ProbeError::Timeout(_) => ErrorKind::Timeout,
            ProbeError::Http(_) | ProbeError::BodyRead(_) => ErrorKind::HttpProtocolFailure,
            ProbeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProbeError::Cancelled)
    }

    /// Short human label for the error.
    ///
    /// `timeout` when any error in the chain is a timeout, otherwise the text of
    /// the innermost error without the `(os error N)` suffix.
    pub fn reason(&self) -> String {
        match self {
            ProbeError::Timeout(_) => return "timeout".to_string(),
            ProbeError::Cancelled => return "cancelled".to_string(),
            ProbeError::Proxy { reason, .. } => return reason.clone(),
            _ => {}
        }

        let mut err: &(dyn StdError + 'static) = self;
        loop {
            if is_timeout(err) {
                return "timeout".to_string();
            }
            match err.source() {
                Some(src) => err = src,
                None => break,
            }
        }
        strip_os_error(&err.to_string()).to_string()
    }
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return io_err.kind() == io::ErrorKind::TimedOut;
    }
    if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
        return hyper_err.is_timeout();
    }
    false
}

fn strip_os_error(text: &str) -> &str {
    match text.find(" (os error") {
        Some(idx) => &text[..idx],
        None => text,
    }
}

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_native_tls::TlsStream;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

/// What a TCP probe reports about the certificate a TLS peer presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub server_name: String,
    pub subject: String,
    pub dns_names: Vec<String>,
    /// Unix seconds.
    pub not_before: i64,
    /// Unix seconds.
    pub not_after: i64,
}

impl CertificateSummary {
    pub fn from_der(server_name: &str, der: &[u8]) -> Option<Self> {
        let (_, parsed) = parse_x509_certificate(der).ok()?;

        let dns_names = match parsed.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            server_name: server_name.to_string(),
            subject: parsed.subject().to_string(),
            dns_names,
            not_before: parsed.validity().not_before.timestamp(),
            not_after: parsed.validity().not_after.timestamp(),
        })
    }

    /// Whole days left until `not_after`, negative once expired.
    pub fn validity_days(&self, now: i64) -> i64 {
        (self.not_after - now) / 86400
    }
}

impl fmt::Display for CertificateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        write!(
            f,
            "serverName={} subject={} notBefore={} notAfter={} validityDays={} dnsNames={}",
            self.server_name,
            self.subject,
            format_time(self.not_before),
            format_time(self.not_after),
            self.validity_days(now),
            self.dns_names.join(","),
        )
    }
}

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Summarise the certificate the peer presented on `stream`, if any.
pub fn peer_certificate<S>(stream: &TlsStream<S>, server_name: &str) -> Option<CertificateSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cert = stream.get_ref().peer_certificate().ok().flatten()?;
    let der = cert.to_der().ok()?;
    CertificateSummary::from_der(server_name, &der)
}

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::cert::CertificateSummary;
use super::error::ProbeError;
use crate::http_probe::trace::PhaseTimings;

/// Outcome of exactly one probe attempt.
#[derive(Debug, Default)]
pub struct Stats {
    pub connected: bool,
    pub error: Option<ProbeError>,
    /// Wall time of the whole attempt, measured on failure too.
    pub duration: Duration,
    pub dns_duration: Duration,
    /// Remote endpoint, `ip:port`.
    pub address: String,
    pub meta: BTreeMap<String, MetaValue>,
    pub extra: Option<Extra>,
}

impl Stats {
    /// `key=value` pairs joined by spaces, in key order.
    pub fn format_meta(&self) -> String {
        self.meta
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(ProbeError::is_cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(n) => write!(f, "{n}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MetaValue {
    fn from(n: u64) -> Self {
        MetaValue::Int(n)
    }
}

impl From<u16> for MetaValue {
    fn from(n: u16) -> Self {
        MetaValue::Int(n.into())
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

/// Protocol specific detail attached to a probe result.
#[derive(Debug, Clone, PartialEq)]
pub enum Extra {
    Certificate(CertificateSummary),
    Phases(PhaseTimings),
    Text(String),
}

impl fmt::Display for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extra::Certificate(cert) => fmt::Display::fmt(cert, f),
            Extra::Phases(phases) => fmt::Display::fmt(phases, f),
            Extra::Text(text) => f.write_str(text),
        }
    }
}

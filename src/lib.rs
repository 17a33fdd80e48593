//! Measure TCP, HTTP and HTTPS reachability the way `ping` measures ICMP.
//!
//! A [`pinger::Pinger`] drives one [`probe::Probe`] at a fixed interval, prints
//! one line per attempt and a statistics summary at the end.

pub mod config;
pub mod dns;
pub mod http_probe;
pub mod pinger;
pub mod probe;

pub use http_probe::HttpProbe;
pub use pinger::{Aggregate, Pinger, PingerHandle, PingerState};
pub use probe::{Probe, ProbeContext, Stats, TcpProbe};

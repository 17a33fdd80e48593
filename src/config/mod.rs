pub mod address;
pub mod app_config;
pub mod model;

pub use address::{Address, AddressError, format_ip, host_port, parse_address};
pub use app_config::{AppConfig, ConfigError, load_config, setup_tls_connector};
pub use model::{ProbeOptions, Protocol, Target};

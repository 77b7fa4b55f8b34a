use std::net::Ipv4Addr;

pub mod bootstrap;
pub mod http;

#[cfg(target_os = "espidf")]
pub mod https_session;
#[cfg(target_os = "espidf")]
pub mod wifi_driver;

pub use bootstrap::{AccessPoint, AsyncDelay, BootstrapError};

#[cfg(target_os = "espidf")]
pub use https_session::HttpsSession;
#[cfg(target_os = "espidf")]
pub use wifi_driver::WifiDriver;

/// Error types related to WIFI operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    ConfigurationError,
    ConnectingError,
    InformationError,
    ModemAlreadyTaken,
    StartingError,
}

/// Addressing information assigned to the station once it joined the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Option<Ipv4Addr>,
}

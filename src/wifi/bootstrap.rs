//! One-time network bring-up: initialize the Wi-Fi stack and join the access
//! point, retrying with a fixed pause between attempts.

use log::{error, info, warn};

use super::{LinkInfo, WifiError};
use crate::config::{RetryPolicy, WifiCredentials};

/// Error types related to the network bring-up.
#[derive(Debug, PartialEq, Eq)]
pub enum BootstrapError {
    /// The Wi-Fi stack could not be initialized. No join was attempted.
    Initialization(WifiError),
    /// Every join attempt failed.
    RetriesExhausted {
        attempts: u32,
        last_error: Option<WifiError>,
    },
}

/// A station interface able to join an access point.
#[allow(async_fn_in_trait)]
pub trait AccessPoint {
    /// Configures and starts the Wi-Fi stack. Called once, before any join.
    async fn initialize(&mut self, credentials: &WifiCredentials) -> Result<(), WifiError>;

    /// Tries to join the configured access point once.
    async fn join(&mut self) -> Result<LinkInfo, WifiError>;
}

/// Suspends the calling task without blocking other tasks.
#[allow(async_fn_in_trait)]
pub trait AsyncDelay {
    async fn delay_ms(&mut self, milliseconds: u32);
}

/// Brings the link up.
///
/// Initializes the Wi-Fi stack and then tries to join the access point up to
/// `policy.max_retries` times, waiting `policy.retry_interval_ms` between two
/// consecutive attempts. It stops at the first successful join. The TLS session
/// with the quote server is not opened here.
///
/// # Arguments
///
/// - `access_point`: The station interface.
/// - `delay`: Used to pause between attempts.
/// - `credentials`: SSID, password and security mode of the access point.
/// - `policy`: Retry count and interval.
///
/// # Returns
///
/// A `Result` with the `LinkInfo` assigned to the station, or a `BootstrapError` if it fails.
///
/// # Errors
///
/// - `BootstrapError::Initialization`: If the Wi-Fi stack could not be initialized.
/// - `BootstrapError::RetriesExhausted`: If no attempt succeeded. Carries the last join error.
pub async fn connect<A, D>(
    access_point: &mut A,
    delay: &mut D,
    credentials: &WifiCredentials,
    policy: RetryPolicy,
) -> Result<LinkInfo, BootstrapError>
where
    A: AccessPoint,
    D: AsyncDelay,
{
    access_point.initialize(credentials).await.map_err(|err| {
        error!("Wi-Fi initialization failed: {:?}", err);
        BootstrapError::Initialization(err)
    })?;
    info!("Wi-Fi initialized");

    let mut last_error = None;
    for attempt in 1..=policy.max_retries {
        match access_point.join().await {
            Ok(link) => {
                info!("Successfully connected to Wi-Fi network '{}'", credentials.ssid);
                info!("IP Address Assigned: {}", link.ip);
                return Ok(link);
            }
            Err(err) => {
                warn!(
                    "Connection to Wi-Fi network failed with {:?} (attempt {}/{})",
                    err, attempt, policy.max_retries
                );
                last_error = Some(err);
                if attempt < policy.max_retries {
                    info!("Retrying in {} ms...", policy.retry_interval_ms);
                    delay.delay_ms(policy.retry_interval_ms).await;
                }
            }
        }
    }

    error!("Exceeded maximum Wi-Fi connection attempts");
    Err(BootstrapError::RetriesExhausted {
        attempts: policy.max_retries,
        last_error,
    })
}

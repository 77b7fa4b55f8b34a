use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    timer::EspTaskTimerService,
    wifi::{AsyncWifi, AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

use super::{AccessPoint, LinkInfo, WifiError};
use crate::config::{WifiCredentials, WifiSecurity};

/// Abstraction of the driver that controls the station interface of the ESP.
pub struct WifiDriver<'a> {
    controller: AsyncWifi<EspWifi<'a>>,
}

impl<'a> WifiDriver<'a> {
    /// Creates a new WifiDriver.
    ///
    /// The NVS partition is handed to the driver so calibration data and the
    /// last configuration survive a reboot, which shortens later joins.
    ///
    /// # Arguments
    ///
    /// - `event_loop`: Microcontroller's event loop.
    /// - `modem`: Microcontroller's modem peripheral.
    /// - `nvs`: The default NVS partition.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `WifiDriver` instance, or a `WifiError` if the
    /// initialization fails.
    ///
    /// # Errors
    ///
    /// - `WifiError::StartingError`: If there is an error creating the driver or its timer.
    pub fn new(
        event_loop: EspSystemEventLoop,
        modem: Modem,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self, WifiError> {
        let timer_service = EspTaskTimerService::new().map_err(|_| WifiError::StartingError)?;
        let wifi = EspWifi::new(modem, event_loop.clone(), Some(nvs)).map_err(|_| WifiError::StartingError)?;
        let controller =
            AsyncWifi::wrap(wifi, event_loop, timer_service).map_err(|_| WifiError::StartingError)?;
        Ok(WifiDriver { controller })
    }

    fn link_info(&self) -> Result<LinkInfo, WifiError> {
        let info = self
            .controller
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map_err(|_| WifiError::InformationError)?;
        Ok(LinkInfo { ip: info.ip, gateway: info.subnet.gateway, dns: info.dns })
    }
}

impl AccessPoint for WifiDriver<'_> {
    /// Loads the station configuration and starts the driver.
    ///
    /// # Errors
    ///
    /// - `WifiError::ConfigurationError`: If the SSID or password do not fit the driver
    ///   buffers, or the driver rejects the configuration.
    /// - `WifiError::StartingError`: Error while starting the driver.
    async fn initialize(&mut self, credentials: &WifiCredentials) -> Result<(), WifiError> {
        let configuration = Configuration::Client(ClientConfiguration {
            ssid: credentials.ssid.as_str().try_into().map_err(|_| WifiError::ConfigurationError)?,
            bssid: None,
            auth_method: auth_method(credentials.security),
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::ConfigurationError)?,
            channel: None,
            ..Default::default()
        });

        self.controller
            .set_configuration(&configuration)
            .map_err(|_| WifiError::ConfigurationError)?;

        self.controller.start().await.map_err(|_| WifiError::StartingError)
    }

    /// Associates with the access point and waits for DHCP.
    ///
    /// # Errors
    ///
    /// - `WifiError::ConnectingError`: If the association or the address assignment fails.
    /// - `WifiError::InformationError`: If the assigned address can not be read.
    async fn join(&mut self) -> Result<LinkInfo, WifiError> {
        self.controller.connect().await.map_err(|_| WifiError::ConnectingError)?;
        self.controller.wait_netif_up().await.map_err(|_| WifiError::ConnectingError)?;
        self.link_info()
    }
}

fn auth_method(security: WifiSecurity) -> AuthMethod {
    match security {
        WifiSecurity::Open => AuthMethod::None,
        WifiSecurity::Wep => AuthMethod::WEP,
        WifiSecurity::WpaPersonal => AuthMethod::WPA,
        WifiSecurity::Wpa2Personal => AuthMethod::WPA2Personal,
        WifiSecurity::WpaWpa2Personal => AuthMethod::WPAWPA2Personal,
        WifiSecurity::Wpa3Personal => AuthMethod::WPA3Personal,
        WifiSecurity::Wpa2Wpa3Personal => AuthMethod::WPA2WPA3Personal,
    }
}

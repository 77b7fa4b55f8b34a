use chrono_tz::Tz;
use serde::Deserialize;

const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 64;
const PEM_MARKER: &str = "-----BEGIN";
const PANEL_RAM_LONG: u16 = 320;
const PANEL_RAM_SHORT: u16 = 240;

/// Error types related to the ticker configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    EmptySsid,
    SsidTooLong,
    PasswordTooLong,
    PasswordOnOpenNetwork,
    EmptyHost,
    InvalidPort,
    NoResourcePaths,
    InvalidResourcePath(String),
    InvalidRetryCount,
    InvalidBufferSize,
    IncompleteClientIdentity,
    InvalidPem(&'static str),
    InvalidPanel(&'static str),
    ParseError(String),
}

/// Security mode used to join the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WifiSecurity {
    Open,
    Wep,
    WpaPersonal,
    #[default]
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa3Personal,
    Wpa2Wpa3Personal,
}

/// Access point credentials together with the join retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    pub security: WifiSecurity,
    pub max_retries: u32,
    pub retry_interval_ms: u32,
}

impl Default for WifiCredentials {
    fn default() -> Self {
        WifiCredentials {
            ssid: "SSID".to_string(),
            password: "PSWD".to_string(),
            security: WifiSecurity::default(),
            max_retries: 10,
            retry_interval_ms: 1000,
        }
    }
}

impl WifiCredentials {
    /// Returns the retry policy the bootstrapper uses to join the access point.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_interval_ms: self.retry_interval_ms,
        }
    }
}

/// How many times the access point join is attempted and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval_ms: u32,
}

/// Quote server endpoint and the set of equivalent resource paths to rotate through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub resource_paths: Vec<String>,
    pub timeout_ms: u32,
    pub response_buffer_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "financialmodelingprep.com".to_string(),
            port: 443,
            resource_paths: (0..3)
                .map(|key| format!("/api/v3/quote/AMD?apikey=<APIKEY_{key}>"))
                .collect(),
            timeout_ms: 10_000,
            response_buffer_bytes: 4096,
        }
    }
}

/// PEM encoded TLS material. Every field is optional: without a root CA the
/// certificate bundle shipped with ESP-IDF is used, and the client identity is
/// only sent when both the certificate and the key are present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct TlsCredentials {
    pub root_ca: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

/// Wiring and geometry of an ST7789 panel on the SPI bus. Pins are GPIO numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub sclk: u8,
    pub mosi: u8,
    pub cs: u8,
    pub dc: u8,
    pub reset: Option<u8>,
    pub backlight: Option<u8>,
    pub width: u16,
    pub height: u16,
    pub x_offset: u16,
    pub y_offset: u16,
    pub landscape: bool,
    pub invert_colors: bool,
    pub spi_frequency_hz: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            sclk: 18,
            mosi: 23,
            cs: 5,
            dc: 2,
            reset: Some(4),
            backlight: Some(15),
            width: 320,
            height: 240,
            x_offset: 0,
            y_offset: 0,
            landscape: true,
            invert_colors: true,
            spi_frequency_hz: 40_000_000,
        }
    }
}

impl PanelConfig {
    fn pins(&self) -> Vec<u8> {
        let mut pins = vec![self.sclk, self.mosi, self.cs, self.dc];
        pins.extend(self.reset);
        pins.extend(self.backlight);
        pins
    }
}

/// Complete runtime configuration of the ticker. Without a `panel` quotes are
/// only written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    pub wifi: WifiCredentials,
    pub server: ServerConfig,
    pub tls: TlsCredentials,
    pub cycle_delay_ms: u32,
    /// IANA zone name used to render quote timestamps, e.g. `America/New_York`.
    pub timezone: Tz,
    pub panel: Option<PanelConfig>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        TickerConfig {
            wifi: WifiCredentials::default(),
            server: ServerConfig::default(),
            tls: TlsCredentials::default(),
            cycle_delay_ms: 120_000,
            timezone: Tz::EST5EDT,
            panel: None,
        }
    }
}

impl TickerConfig {
    /// Parses a configuration from its JSON representation. Missing fields take
    /// their default value. The result is validated before being returned.
    ///
    /// # Arguments
    ///
    /// - `json`: The JSON document, usually read from NVS.
    ///
    /// # Returns
    ///
    /// A `Result` with the validated `TickerConfig`, or a `ConfigError` if it fails.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ParseError`: If the document is not valid JSON for this structure.
    /// - Any error returned by [`TickerConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TickerConfig =
            serde_json::from_str(json).map_err(|err| ConfigError::ParseError(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can actually be used to run the ticker.
    ///
    /// # Errors
    ///
    /// - `ConfigError::EmptySsid`, `ConfigError::SsidTooLong`, `ConfigError::PasswordTooLong`,
    ///   `ConfigError::PasswordOnOpenNetwork`: Invalid access point credentials.
    /// - `ConfigError::InvalidRetryCount`: If no join attempt would ever be made.
    /// - `ConfigError::EmptyHost`, `ConfigError::InvalidPort`: Invalid server endpoint.
    /// - `ConfigError::NoResourcePaths`, `ConfigError::InvalidResourcePath`: Invalid resource paths.
    /// - `ConfigError::InvalidBufferSize`: If the response buffer has no room.
    /// - `ConfigError::IncompleteClientIdentity`, `ConfigError::InvalidPem`: Invalid TLS material.
    /// - `ConfigError::InvalidPanel`: If a panel pin is used twice or its geometry does not fit the controller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_wifi()?;
        self.validate_server()?;
        self.validate_tls()?;
        self.validate_panel()
    }

    fn validate_wifi(&self) -> Result<(), ConfigError> {
        let wifi = &self.wifi;
        if wifi.ssid.is_empty() {
            return Err(ConfigError::EmptySsid);
        }
        if wifi.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong);
        }
        if wifi.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong);
        }
        if wifi.security == WifiSecurity::Open && !wifi.password.is_empty() {
            return Err(ConfigError::PasswordOnOpenNetwork);
        }
        if wifi.max_retries == 0 {
            return Err(ConfigError::InvalidRetryCount);
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if server.resource_paths.is_empty() {
            return Err(ConfigError::NoResourcePaths);
        }
        if let Some(path) = server.resource_paths.iter().find(|path| !path.starts_with('/')) {
            return Err(ConfigError::InvalidResourcePath(path.clone()));
        }
        if server.response_buffer_bytes == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        Ok(())
    }

    fn validate_tls(&self) -> Result<(), ConfigError> {
        let tls = &self.tls;
        if tls.client_cert.is_some() != tls.client_key.is_some() {
            return Err(ConfigError::IncompleteClientIdentity);
        }
        check_pem("root_ca", tls.root_ca.as_deref())?;
        check_pem("client_cert", tls.client_cert.as_deref())?;
        check_pem("client_key", tls.client_key.as_deref())
    }

    fn validate_panel(&self) -> Result<(), ConfigError> {
        let Some(panel) = &self.panel else {
            return Ok(());
        };
        let mut pins = panel.pins();
        let count = pins.len();
        pins.sort_unstable();
        pins.dedup();
        if pins.len() != count {
            return Err(ConfigError::InvalidPanel("pins"));
        }
        // the controller RAM is 240 x 320 in either orientation
        let (long, short) = (u32::from(PANEL_RAM_LONG), u32::from(PANEL_RAM_SHORT));
        let (columns, rows) = if panel.landscape { (long, short) } else { (short, long) };
        if panel.width == 0 || u32::from(panel.width) + u32::from(panel.x_offset) > columns {
            return Err(ConfigError::InvalidPanel("width"));
        }
        if panel.height == 0 || u32::from(panel.height) + u32::from(panel.y_offset) > rows {
            return Err(ConfigError::InvalidPanel("height"));
        }
        if panel.spi_frequency_hz == 0 {
            return Err(ConfigError::InvalidPanel("spi_frequency_hz"));
        }
        Ok(())
    }
}

fn check_pem(field: &'static str, pem: Option<&str>) -> Result<(), ConfigError> {
    match pem {
        Some(text) if !text.contains(PEM_MARKER) => Err(ConfigError::InvalidPem(field)),
        _ => Ok(()),
    }
}

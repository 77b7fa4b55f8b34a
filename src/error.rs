use crate::{
    config::ConfigError,
    st7789::PanelError,
    wifi::{http::HttpError, BootstrapError, WifiError},
};

/// Conditions that stop the ticker before the poll loop starts.
#[derive(Debug)]
pub enum TickerError {
    ConfigError(ConfigError),
    BootstrapError(BootstrapError),
    HttpClientError(HttpError),
    NvsError,
    PanelError(PanelError),
    PeripheralsTaken,
    TimerError,
    WifiError(WifiError),
}

impl From<ConfigError> for TickerError {
    fn from(value: ConfigError) -> Self {
        Self::ConfigError(value)
    }
}

impl From<BootstrapError> for TickerError {
    fn from(value: BootstrapError) -> Self {
        Self::BootstrapError(value)
    }
}

impl From<HttpError> for TickerError {
    fn from(value: HttpError) -> Self {
        Self::HttpClientError(value)
    }
}

impl From<PanelError> for TickerError {
    fn from(value: PanelError) -> Self {
        Self::PanelError(value)
    }
}

impl From<WifiError> for TickerError {
    fn from(value: WifiError) -> Self {
        Self::WifiError(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn load(json: &str) -> Result<(), TickerError> {
        crate::config::TickerConfig::from_json(json)?;
        Ok(())
    }

    #[test]
    fn test0_config_errors_convert() {
        let result = load(r#"{"wifi":{"ssid":""}}"#);
        assert!(matches!(result, Err(TickerError::ConfigError(ConfigError::EmptySsid))));
    }

    #[test]
    fn test1_bootstrap_errors_convert() {
        let err: TickerError = BootstrapError::Initialization(WifiError::StartingError).into();
        assert!(matches!(
            err,
            TickerError::BootstrapError(BootstrapError::Initialization(WifiError::StartingError))
        ));
    }
}

use std::time::Duration;

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::FreeRtos,
        gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver},
        modem::Modem,
        peripherals::Peripherals,
        spi::{SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig, SPI2},
        task::block_on,
        units::Hertz,
    },
    nvs::{EspDefaultNvsPartition, EspNvs},
    timer::{EspAsyncTimer, EspTaskTimerService},
};
use futures::Future;
use log::{info, warn};

use crate::{
    config::{PanelConfig, TickerConfig},
    connection::ConnectionState,
    display::{DisplaySurface, DrawTargetSurface, LogDisplay},
    error::TickerError,
    poll_loop::{PollLoop, PollSettings, Sleep},
    st7789::{PanelError, St7789},
    wifi::{bootstrap, AsyncDelay, HttpsSession, WifiDriver, WifiError},
};

const CONFIG_NAMESPACE: &str = "ticker";
const CONFIG_KEY: &str = "config_json";
const CONFIG_BUFFER_BYTES: usize = 4096;

/// ST7789 panel on the SPI2 bus
pub type Panel = St7789<SpiDeviceDriver<'static, SpiDriver<'static>>, PinDriver<'static, AnyOutputPin, Output>>;

/// Owner of the peripherals and system services the ticker needs: the modem,
/// the SPI bus of the panel, the system event loop, the default NVS partition
/// and the task timer service.
pub struct Microcontroller {
    modem: Option<Modem>,
    spi: Option<SPI2>,
    event_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    timer_service: EspTaskTimerService,
}

/// Async delay backed by an ESP task timer.
pub struct TimerDelay {
    timer: EspAsyncTimer,
}

/// Blocks the current FreeRTOS task.
pub struct FreeRtosSleep;

impl Microcontroller {
    /// Creates a new Microcontroller instance
    ///
    /// # Returns
    ///
    /// A `Result` with the new Microcontroller, or a `TickerError` if it fails.
    ///
    /// # Errors
    ///
    /// - `TickerError::PeripheralsTaken`: If the peripherals or the system event loop were already taken.
    /// - `TickerError::NvsError`: If the default NVS partition was already taken.
    /// - `TickerError::TimerError`: If the timer service can not be created.
    pub fn new() -> Result<Self, TickerError> {
        let peripherals = Peripherals::take().map_err(|_| TickerError::PeripheralsTaken)?;
        Ok(Microcontroller {
            modem: Some(peripherals.modem),
            spi: Some(peripherals.spi2),
            event_loop: EspSystemEventLoop::take().map_err(|_| TickerError::PeripheralsTaken)?,
            nvs: EspDefaultNvsPartition::take().map_err(|_| TickerError::NvsError)?,
            timer_service: EspTaskTimerService::new().map_err(|_| TickerError::TimerError)?,
        })
    }

    /// Reads the configuration stored under `ticker/config_json` in NVS. The built-in
    /// defaults are used when nothing is stored.
    ///
    /// # Errors
    ///
    /// - `TickerError::NvsError`: If the namespace can not be opened or read.
    /// - `TickerError::ConfigError`: If the stored document is invalid.
    pub fn load_config(&self) -> Result<TickerConfig, TickerError> {
        let nvs = EspNvs::new(self.nvs.clone(), CONFIG_NAMESPACE, true).map_err(|_| TickerError::NvsError)?;
        let mut buffer = vec![0u8; CONFIG_BUFFER_BYTES];
        let config = match nvs.get_str(CONFIG_KEY, &mut buffer).map_err(|_| TickerError::NvsError)? {
            Some(json) => {
                info!("Loaded configuration from NVS");
                TickerConfig::from_json(json)?
            }
            None => {
                warn!("No configuration stored in NVS, using built-in defaults");
                let config = TickerConfig::default();
                config.validate()?;
                config
            }
        };
        Ok(config)
    }

    /// Creates the WifiDriver. The modem can only be handed out once.
    ///
    /// # Errors
    ///
    /// - `WifiError::ModemAlreadyTaken`: If a driver was already created.
    /// - `WifiError::StartingError`: If the driver can not be created.
    pub fn get_wifi_driver(&mut self) -> Result<WifiDriver<'static>, WifiError> {
        let modem = self.modem.take().ok_or(WifiError::ModemAlreadyTaken)?;
        WifiDriver::new(self.event_loop.clone(), modem, self.nvs.clone())
    }

    pub fn get_timer_delay(&self) -> Result<TimerDelay, TickerError> {
        let timer = self.timer_service.timer_async().map_err(|_| TickerError::TimerError)?;
        Ok(TimerDelay { timer })
    }

    /// Creates and initializes the ST7789 panel described by `config` on the SPI2 bus.
    /// The bus can only be handed out once.
    ///
    /// # Errors
    ///
    /// - `TickerError::PeripheralsTaken`: If the bus was already handed out.
    /// - `TickerError::PanelError`: If a driver can not be created or the panel does not answer.
    pub fn get_panel(&mut self, config: &PanelConfig) -> Result<Panel, TickerError> {
        let spi = self.spi.take().ok_or(TickerError::PeripheralsTaken)?;
        let driver = SpiDriver::new(
            spi,
            output_pin(config.sclk),
            output_pin(config.mosi),
            None::<AnyIOPin>,
            &SpiDriverConfig::new(),
        )
        .map_err(|_| PanelError::Spi)?;
        let spi_config = SpiConfig::new().baudrate(Hertz(config.spi_frequency_hz));
        let device = SpiDeviceDriver::new(driver, Some(output_pin(config.cs)), &spi_config).map_err(|_| PanelError::Spi)?;

        let dc = output_driver(config.dc)?;
        let reset = config.reset.map(output_driver).transpose()?;
        let backlight = config.backlight.map(output_driver).transpose()?;
        let mut panel = St7789::new(device, dc, reset, backlight, config);
        panel.init(&mut FreeRtos)?;
        info!("ST7789 panel {}x{} ready", config.width, config.height);
        Ok(panel)
    }

    /// Drives a future to completion on the current task.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        block_on(fut)
    }
}

/// Only the panel pins are taken by number. They are checked to be distinct
/// by `TickerConfig::validate` and nothing else in the ticker drives GPIOs.
fn output_pin(pin: u8) -> AnyOutputPin {
    unsafe { AnyOutputPin::new(pin.into()) }
}

fn output_driver(pin: u8) -> Result<PinDriver<'static, AnyOutputPin, Output>, PanelError> {
    PinDriver::output(output_pin(pin)).map_err(|_| PanelError::Pin)
}

impl AsyncDelay for TimerDelay {
    async fn delay_ms(&mut self, milliseconds: u32) {
        if self.timer.after(Duration::from_millis(milliseconds.into())).await.is_err() {
            FreeRtos::delay_ms(milliseconds);
        }
    }
}

impl Sleep for FreeRtosSleep {
    fn sleep_ms(&mut self, milliseconds: u32) {
        FreeRtos::delay_ms(milliseconds)
    }
}

/// Brings the ticker up and runs the poll loop.
///
/// Loads the configuration, brings up the panel when one is configured, joins
/// the Wi-Fi network, creates the HTTPS session with the quote server and hands
/// everything to the `PollLoop`. Quotes go to the log when there is no panel or
/// it does not come up.
///
/// # Returns
///
/// Only returns on a fatal initialization error.
///
/// # Errors
///
/// Every `TickerError` variant. Failures after the poll loop started are never fatal.
pub fn run() -> Result<(), TickerError> {
    let mut micro = Microcontroller::new()?;
    let config = micro.load_config()?;
    let display = open_display(&mut micro, config.panel.as_ref());

    let mut wifi = micro.get_wifi_driver()?;
    let mut delay = micro.get_timer_delay()?;
    let link = micro.block_on(bootstrap::connect(
        &mut wifi,
        &mut delay,
        &config.wifi,
        config.wifi.retry_policy(),
    ))?;
    if let Some(dns) = link.dns {
        info!("DNS server: {}", dns);
    }

    let state = ConnectionState::new();
    let session = HttpsSession::new(&config.server, &config.tls, state.notifier())?;
    let mut poll_loop = PollLoop::new(session, display, FreeRtosSleep, state, PollSettings::from(&config));
    poll_loop.run()
}

fn open_display(micro: &mut Microcontroller, panel: Option<&PanelConfig>) -> Box<dyn DisplaySurface> {
    let Some(panel) = panel else {
        info!("No panel configured, quotes are written to the log");
        return Box::new(LogDisplay::new());
    };
    match micro.get_panel(panel) {
        Ok(panel) => Box::new(DrawTargetSurface::new(panel)),
        Err(err) => {
            warn!("Panel unavailable ({:?}), quotes are written to the log", err);
            Box::new(LogDisplay::new())
        }
    }
}

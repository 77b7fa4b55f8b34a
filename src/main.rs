//! On the device this runs the ticker. On a host it reads one quote response
//! body from stdin and prints the screen it would produce.

#[cfg(target_os = "espidf")]
fn main() {
    use esp_idf_svc::hal::delay::FreeRtos;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(err) = stock_ticker::run() {
        log::error!("Ticker stopped: {:?}", err);
    }
    loop {
        FreeRtos::delay_ms(u32::MAX);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> std::process::ExitCode {
    use std::{
        io::{self, Read},
        process::ExitCode,
    };

    use log::error;
    use stock_ticker::{
        display::{LogDisplay, QuoteFrame},
        QuoteRecord, TickerConfig,
    };

    env_logger::Builder::from_env(env_logger::Env::new().filter_or("TICKER_LOG", "info")).init();

    let mut body = Vec::new();
    if let Err(err) = io::stdin().read_to_end(&mut body) {
        error!("Reading stdin failed: {}", err);
        return ExitCode::FAILURE;
    }

    let record = match QuoteRecord::parse(&body) {
        Ok(record) => record,
        Err(err) => {
            error!("Not a quote: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let frame = QuoteFrame::from_record(&record, TickerConfig::default().timezone);
    match frame.render(&mut LogDisplay::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Drawing failed: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

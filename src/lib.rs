//! Firmware for a Wi-Fi stock ticker: joins a network, polls a quote server
//! over HTTPS and draws the latest quote.

pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod poll_loop;
pub mod quote;
pub mod st7789;
pub mod wifi;

#[cfg(target_os = "espidf")]
pub mod microcontroller;

pub use config::TickerConfig;
pub use error::TickerError;
pub use poll_loop::{CycleOutcome, PollLoop};
pub use quote::QuoteRecord;

#[cfg(target_os = "espidf")]
pub use microcontroller::{run, Microcontroller};

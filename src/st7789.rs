//! ST7789 TFT panel driver
//!
//! Drives a 240x320 ST7789 controller over a 4-wire SPI bus (clock, data,
//! chip select and a data/command pin) in 16-bit RGB565 mode. Pixels are
//! streamed straight into the controller RAM, there is no frame buffer.

use embedded_graphics::{pixelcolor::Rgb565, prelude::*, primitives::Rectangle};
use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiDevice};

use crate::config::PanelConfig;

/// Bytes sent to the bus per SPI write while streaming pixels
const STREAM_CHUNK: usize = 512;

/// ST7789 commands
mod cmd {
    pub const SWRESET: u8 = 0x01;
    pub const SLPOUT: u8 = 0x11;
    pub const NORON: u8 = 0x13;
    pub const INVOFF: u8 = 0x20;
    pub const INVON: u8 = 0x21;
    pub const DISPON: u8 = 0x29;
    pub const CASET: u8 = 0x2A;
    pub const RASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const COLMOD: u8 = 0x3A;
}

/// 16 bits per pixel on both the RGB and the MCU interface
const COLMOD_RGB565: u8 = 0x55;
/// Row/column exchange plus column mirror
const MADCTL_LANDSCAPE: u8 = 0x60;
const MADCTL_PORTRAIT: u8 = 0x00;

/// Panel errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelError {
    /// Writing to the SPI bus failed
    Spi,
    /// Driving the data/command, reset or backlight pin failed
    Pin,
}

/// ST7789 driver. `PIN` is used for the data/command line, the optional
/// hardware reset and the optional backlight enable.
pub struct St7789<SPI, PIN> {
    spi: SPI,
    dc: PIN,
    reset: Option<PIN>,
    backlight: Option<PIN>,
    size: Size,
    x_offset: u16,
    y_offset: u16,
    madctl: u8,
    invert_colors: bool,
}

impl<SPI, PIN> St7789<SPI, PIN>
where
    SPI: SpiDevice,
    PIN: OutputPin,
{
    /// Creates the driver. Nothing is sent until [`St7789::init`] is called.
    pub fn new(spi: SPI, dc: PIN, reset: Option<PIN>, backlight: Option<PIN>, config: &PanelConfig) -> Self {
        St7789 {
            spi,
            dc,
            reset,
            backlight,
            size: Size::new(config.width.into(), config.height.into()),
            x_offset: config.x_offset,
            y_offset: config.y_offset,
            madctl: if config.landscape { MADCTL_LANDSCAPE } else { MADCTL_PORTRAIT },
            invert_colors: config.invert_colors,
        }
    }

    /// Resets the controller, wakes it up and turns the display on.
    ///
    /// # Errors
    ///
    /// - `PanelError::Spi`: If a command can not be written.
    /// - `PanelError::Pin`: If a control pin can not be driven.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), PanelError> {
        if let Some(reset) = self.reset.as_mut() {
            reset.set_low().map_err(|_| PanelError::Pin)?;
            delay.delay_ms(10);
            reset.set_high().map_err(|_| PanelError::Pin)?;
            delay.delay_ms(120);
        }
        self.command(cmd::SWRESET, &[])?;
        delay.delay_ms(150);
        self.command(cmd::SLPOUT, &[])?;
        delay.delay_ms(120);
        self.command(cmd::COLMOD, &[COLMOD_RGB565])?;
        self.command(cmd::MADCTL, &[self.madctl])?;
        let inversion = if self.invert_colors { cmd::INVON } else { cmd::INVOFF };
        self.command(inversion, &[])?;
        self.command(cmd::NORON, &[])?;
        self.command(cmd::DISPON, &[])?;
        delay.delay_ms(20);
        if let Some(backlight) = self.backlight.as_mut() {
            backlight.set_high().map_err(|_| PanelError::Pin)?;
        }
        Ok(())
    }

    fn command(&mut self, command: u8, data: &[u8]) -> Result<(), PanelError> {
        self.dc.set_low().map_err(|_| PanelError::Pin)?;
        self.spi.write(&[command]).map_err(|_| PanelError::Spi)?;
        if !data.is_empty() {
            self.dc.set_high().map_err(|_| PanelError::Pin)?;
            self.spi.write(data).map_err(|_| PanelError::Spi)?;
        }
        Ok(())
    }

    /// Selects the RAM window for the following pixels and starts a memory write.
    /// `area` must lie within the panel.
    fn set_window(&mut self, area: &Rectangle) -> Result<(), PanelError> {
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let x0 = area.top_left.x as u16 + self.x_offset;
        let y0 = area.top_left.y as u16 + self.y_offset;
        let x1 = bottom_right.x as u16 + self.x_offset;
        let y1 = bottom_right.y as u16 + self.y_offset;
        self.command(cmd::CASET, &window_bytes(x0, x1))?;
        self.command(cmd::RASET, &window_bytes(y0, y1))?;
        self.command(cmd::RAMWR, &[])
    }

    fn write_pixels(&mut self, colors: impl IntoIterator<Item = Rgb565>) -> Result<(), PanelError> {
        self.dc.set_high().map_err(|_| PanelError::Pin)?;
        let mut chunk = Vec::with_capacity(STREAM_CHUNK);
        for color in colors {
            chunk.extend_from_slice(&color.into_storage().to_be_bytes());
            if chunk.len() >= STREAM_CHUNK {
                self.spi.write(&chunk).map_err(|_| PanelError::Spi)?;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            self.spi.write(&chunk).map_err(|_| PanelError::Spi)?;
        }
        Ok(())
    }
}

fn window_bytes(start: u16, end: u16) -> [u8; 4] {
    let [start_high, start_low] = start.to_be_bytes();
    let [end_high, end_low] = end.to_be_bytes();
    [start_high, start_low, end_high, end_low]
}

impl<SPI, PIN> OriginDimensions for St7789<SPI, PIN> {
    fn size(&self) -> Size {
        self.size
    }
}

impl<SPI, PIN> DrawTarget for St7789<SPI, PIN>
where
    SPI: SpiDevice,
    PIN: OutputPin,
{
    type Color = Rgb565;
    type Error = PanelError;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        for Pixel(point, color) in pixels {
            if bounds.contains(point) {
                self.set_window(&Rectangle::new(point, Size::new(1, 1)))?;
                self.write_pixels([color])?;
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let clipped = area.intersection(&self.bounding_box());
        if clipped == *area {
            if area.is_zero_sized() {
                return Ok(());
            }
            let count = area.size.width as usize * area.size.height as usize;
            self.set_window(area)?;
            self.write_pixels(colors.into_iter().take(count))
        } else {
            self.draw_iter(area.points().zip(colors).map(|(point, color)| Pixel(point, color)))
        }
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let clipped = area.intersection(&self.bounding_box());
        if clipped.is_zero_sized() {
            return Ok(());
        }
        let count = clipped.size.width as usize * clipped.size.height as usize;
        self.set_window(&clipped)?;
        self.write_pixels(core::iter::repeat(color).take(count))
    }
}

//! Display surface abstraction and the quote screen layout.
//!
//! The ticker only needs four primitives from a display: clearing the frame,
//! choosing a text color, choosing a font size and drawing text at a pixel
//! position. Anything implementing [`DisplaySurface`] can show quotes.

use chrono_tz::Tz;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_7X13_BOLD, FONT_9X18_BOLD},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb565,
    prelude::*,
    text::{Baseline, Text},
};
use log::info;

use crate::quote::{format_change, format_price, format_price_pair, is_gain, QuoteRecord};

const LEFT_ALIGNED: i32 = 0;
const PRICE_COLUMN: i32 = 88;
const PERCENT_COLUMN: i32 = 210;
const ROW_ONE: i32 = 0;
const ROW_TWO: i32 = 30;
const ROW_THREE: i32 = 50;
const ROW_FIVE: i32 = 90;

/// Display backend errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    /// Communication error with display
    Communication,
}

/// Text colors used by the quote screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Green,
    Red,
    Black,
}

impl From<Color> for Rgb565 {
    fn from(value: Color) -> Self {
        match value {
            Color::White => Rgb565::WHITE,
            Color::Green => Rgb565::GREEN,
            Color::Red => Rgb565::RED,
            Color::Black => Rgb565::BLACK,
        }
    }
}

/// Font sizes used by the quote screen, from the headline row down to the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    Large,
    Medium,
    Small,
}

impl FontSize {
    fn mono_font(&self) -> &'static MonoFont<'static> {
        match self {
            FontSize::Large => &FONT_10X20,
            FontSize::Medium => &FONT_9X18_BOLD,
            FontSize::Small => &FONT_7X13_BOLD,
        }
    }
}

/// Primitives the ticker needs from a display.
pub trait DisplaySurface {
    /// Clears the whole frame to the background color.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Sets the color used by the following `draw_text_at` calls.
    fn set_color(&mut self, color: Color) -> Result<(), DisplayError>;

    /// Sets the font used by the following `draw_text_at` calls.
    fn set_font(&mut self, font: FontSize) -> Result<(), DisplayError>;

    /// Draws `text` with its top left corner at (`x`, `y`).
    fn draw_text_at(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError>;
}

/// A single piece of text of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub x: i32,
    pub y: i32,
    pub font: FontSize,
    pub color: Color,
    pub text: String,
}

impl TextItem {
    fn new(x: i32, y: i32, font: FontSize, color: Color, text: impl Into<String>) -> Self {
        TextItem { x, y, font, color, text: text.into() }
    }
}

/// Complete contents of the quote screen.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteFrame {
    items: Vec<TextItem>,
}

impl QuoteFrame {
    /// Lays out a quote on the screen.
    ///
    /// # Arguments
    ///
    /// - `record`: The quote to show.
    /// - `zone`: Time zone the quote timestamp is shown in.
    ///
    /// # Returns
    ///
    /// The new `QuoteFrame`. The first row holds the symbol, the price and the
    /// color coded percent change, the second the previous close and open, the
    /// third the day low and high, and the last one the quote time.
    pub fn from_record(record: &QuoteRecord, zone: Tz) -> Self {
        let change_color = if is_gain(record.changes_percentage) {
            Color::Green
        } else {
            Color::Red
        };
        let time = record
            .local_time(zone)
            .unwrap_or_else(|_| format!("unix time {}", record.timestamp));

        let items = vec![
            TextItem::new(LEFT_ALIGNED, ROW_ONE, FontSize::Large, Color::White, record.symbol.as_str()),
            TextItem::new(PRICE_COLUMN, ROW_ONE, FontSize::Large, Color::White, format_price(record.price)),
            TextItem::new(
                PERCENT_COLUMN,
                ROW_ONE,
                FontSize::Large,
                change_color,
                format_change(record.changes_percentage),
            ),
            TextItem::new(LEFT_ALIGNED, ROW_TWO, FontSize::Medium, Color::White, "PC/O"),
            TextItem::new(
                PRICE_COLUMN,
                ROW_TWO,
                FontSize::Medium,
                Color::White,
                format_price_pair(record.previous_close, record.open),
            ),
            TextItem::new(LEFT_ALIGNED, ROW_THREE, FontSize::Medium, Color::White, "DL/DH"),
            TextItem::new(
                PRICE_COLUMN,
                ROW_THREE,
                FontSize::Medium,
                Color::White,
                format_price_pair(record.day_low, record.day_high),
            ),
            TextItem::new(LEFT_ALIGNED, ROW_FIVE, FontSize::Small, Color::White, time),
        ];
        QuoteFrame { items }
    }

    #[cfg(test)]
    pub(crate) fn items(&self) -> &[TextItem] {
        &self.items
    }

    /// Returns the text drawn at the given position, if any.
    #[cfg(test)]
    pub(crate) fn text_at(&self, x: i32, y: i32) -> Option<&TextItem> {
        self.items.iter().find(|item| item.x == x && item.y == y)
    }

    /// Redraws the whole frame: the surface is cleared first, then every item
    /// is drawn. Font and color are only changed when they differ from the
    /// previous item.
    ///
    /// # Errors
    ///
    /// Any `DisplayError` returned by the surface. Drawing stops at the first one.
    pub fn render<D: DisplaySurface + ?Sized>(&self, surface: &mut D) -> Result<(), DisplayError> {
        surface.clear()?;
        let mut font = None;
        let mut color = None;
        for item in &self.items {
            if font != Some(item.font) {
                surface.set_font(item.font)?;
                font = Some(item.font);
            }
            if color != Some(item.color) {
                surface.set_color(item.color)?;
                color = Some(item.color);
            }
            surface.draw_text_at(item.x, item.y, &item.text)?;
        }
        Ok(())
    }
}

impl<D: DisplaySurface + ?Sized> DisplaySurface for Box<D> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        (**self).clear()
    }

    fn set_color(&mut self, color: Color) -> Result<(), DisplayError> {
        (**self).set_color(color)
    }

    fn set_font(&mut self, font: FontSize) -> Result<(), DisplayError> {
        (**self).set_font(font)
    }

    fn draw_text_at(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        (**self).draw_text_at(x, y, text)
    }
}

/// Surface that writes every frame to the log. Used when no panel is attached
/// and by the host binary.
#[derive(Debug)]
pub struct LogDisplay {
    font: FontSize,
    color: Color,
}

impl LogDisplay {
    pub fn new() -> Self {
        LogDisplay { font: FontSize::Large, color: Color::White }
    }
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for LogDisplay {
    fn clear(&mut self) -> Result<(), DisplayError> {
        info!("display: ---- new frame ----");
        Ok(())
    }

    fn set_color(&mut self, color: Color) -> Result<(), DisplayError> {
        self.color = color;
        Ok(())
    }

    fn set_font(&mut self, font: FontSize) -> Result<(), DisplayError> {
        self.font = font;
        Ok(())
    }

    fn draw_text_at(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        info!("display: ({x:>3},{y:>3}) {:?}/{:?} {text}", self.font, self.color);
        Ok(())
    }
}

/// Adapter that renders on any `embedded-graphics` RGB565 draw target, such
/// as the [`St7789`](crate::st7789::St7789) panel driver.
pub struct DrawTargetSurface<D> {
    target: D,
    font: FontSize,
    color: Color,
}

impl<D> DrawTargetSurface<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(target: D) -> Self {
        DrawTargetSurface { target, font: FontSize::Large, color: Color::White }
    }

    #[cfg(test)]
    fn into_inner(self) -> D {
        self.target
    }
}

impl<D> DisplaySurface for DrawTargetSurface<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.target
            .clear(Color::Black.into())
            .map_err(|_| DisplayError::Communication)
    }

    fn set_color(&mut self, color: Color) -> Result<(), DisplayError> {
        self.color = color;
        Ok(())
    }

    fn set_font(&mut self, font: FontSize) -> Result<(), DisplayError> {
        self.font = font;
        Ok(())
    }

    fn draw_text_at(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        let style = MonoTextStyle::new(self.font.mono_font(), self.color.into());
        Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.target)
            .map(|_| ())
            .map_err(|_| DisplayError::Communication)
    }
}


#[cfg(test)]
mod test {
    use embedded_graphics::mock_display::MockDisplay;

    use super::recording::{DisplayCall, RecordingDisplay};
    use super::*;
    use crate::{
        config::PanelConfig,
        st7789::{
            fake::{FakePin, FakeSpi, Role, SharedBus},
            St7789,
        },
    };

    fn record(change: f64) -> QuoteRecord {
        QuoteRecord {
            symbol: "AMD".to_string(),
            price: 100.005,
            changes_percentage: change,
            day_low: 98.0,
            day_high: 102.0,
            open: 99.0,
            previous_close: 101.0,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test0_frame_layout_for_a_loss() {
        let frame = QuoteFrame::from_record(&record(-1.2), Tz::EST5EDT);
        assert_eq!(frame.text_at(LEFT_ALIGNED, ROW_ONE).unwrap().text, "AMD");
        assert_eq!(frame.text_at(PRICE_COLUMN, ROW_ONE).unwrap().text, "$100.00");
        assert_eq!(frame.text_at(PRICE_COLUMN, ROW_ONE).unwrap().color, Color::White);

        let change = frame.text_at(PERCENT_COLUMN, ROW_ONE).unwrap();
        assert_eq!(change.text, "-1.20%");
        assert_eq!(change.color, Color::Red);

        assert_eq!(frame.text_at(PRICE_COLUMN, ROW_TWO).unwrap().text, "$101.00 / $99.00");
        assert_eq!(frame.text_at(PRICE_COLUMN, ROW_THREE).unwrap().text, "$98.00 / $102.00");
        assert_eq!(frame.text_at(LEFT_ALIGNED, ROW_FIVE).unwrap().text, "Tue Nov 14 17:13:20 2023");
    }

    #[test]
    fn test1_gain_is_green_with_plus_sign() {
        let frame = QuoteFrame::from_record(&record(0.0), Tz::UTC);
        let change = frame.text_at(PERCENT_COLUMN, ROW_ONE).unwrap();
        assert_eq!(change.text, "+0.00%");
        assert_eq!(change.color, Color::Green);
    }

    #[test]
    fn test2_render_clears_before_drawing() {
        let frame = QuoteFrame::from_record(&record(3.5), Tz::UTC);
        let mut display = RecordingDisplay::default();
        frame.render(&mut display).unwrap();

        assert_eq!(display.calls[0], DisplayCall::Clear);
        assert_eq!(display.frames(), 1);
        assert_eq!(display.texts().len(), frame.items().len());
        let green = display.calls.iter().position(|c| *c == DisplayCall::Color(Color::Green)).unwrap();
        let percent = display
            .calls
            .iter()
            .position(|c| *c == DisplayCall::Text(PERCENT_COLUMN, ROW_ONE, "+3.50%".to_string()))
            .unwrap();
        assert!(green < percent);
        // color goes back to white for the following rows
        assert_eq!(display.calls[percent + 1], DisplayCall::Font(FontSize::Medium));
        assert_eq!(display.calls[percent + 2], DisplayCall::Color(Color::White));
    }

    #[test]
    fn test3_render_stops_on_display_error() {
        let frame = QuoteFrame::from_record(&record(1.0), Tz::UTC);
        let mut display = RecordingDisplay { fail_on_draw: true, ..Default::default() };
        assert_eq!(frame.render(&mut display), Err(DisplayError::Communication));
        assert!(display.texts().is_empty());
    }

    #[test]
    fn test4_draw_target_surface_draws_colored_text() {
        let mut mock = MockDisplay::<Rgb565>::new();
        mock.set_allow_overdraw(true);
        let mut surface = DrawTargetSurface::new(mock);
        surface.clear().unwrap();
        surface.set_color(Color::Red).unwrap();
        surface.draw_text_at(0, 0, "AMD").unwrap();

        let mock = surface.into_inner();
        let red_pixels = (0..20)
            .flat_map(|y| (0..30).map(move |x| Point::new(x, y)))
            .filter(|point| mock.get_pixel(*point) == Some(Rgb565::RED))
            .count();
        assert!(red_pixels > 0);
        assert_eq!(mock.get_pixel(Point::new(63, 63)), Some(Rgb565::BLACK));
    }

    #[test]
    fn test5_frame_reaches_the_panel() {
        let bus = SharedBus::default();
        let panel = St7789::new(
            FakeSpi(bus.clone()),
            FakePin(Role::DataCommand, bus.clone()),
            None,
            None,
            &PanelConfig::default(),
        );
        let mut surface = DrawTargetSurface::new(panel);
        QuoteFrame::from_record(&record(2.0), Tz::EST5EDT).render(&mut surface).unwrap();

        let bus = bus.borrow();
        // the clear covers the whole panel
        assert_eq!(bus.data_after(0x2A), vec![0x00, 0x00, 0x01, 0x3F]);
        assert_eq!(bus.data_after(0x2B), vec![0x00, 0x00, 0x00, 0xEF]);
        assert_eq!(bus.data_after(0x2C).len(), 320 * 240 * 2);
        // green percent change
        let green = bus.events.iter().any(|event| {
            *event == crate::st7789::fake::BusEvent::Data(Rgb565::GREEN.into_storage().to_be_bytes().to_vec())
        });
        assert!(green);
    }

    #[test]
    fn test6_boxed_surfaces_forward_every_call() {
        let mut boxed = Box::new(RecordingDisplay::default());
        QuoteFrame::from_record(&record(1.0), Tz::UTC).render(&mut boxed).unwrap();
        assert_eq!(boxed.frames(), 1);
        assert_eq!(boxed.texts()[0], "AMD");

        let mut log: Box<dyn DisplaySurface> = Box::new(LogDisplay::new());
        assert_eq!(QuoteFrame::from_record(&record(1.0), Tz::UTC).render(&mut log), Ok(()));
    }
}

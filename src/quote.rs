use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::{Map, Value};

const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Reasons why a response body is not accepted as a quote.
#[derive(Debug, PartialEq)]
pub enum QuoteError {
    EmptyBody,
    InvalidJson(String),
    NotAnObject,
    MissingField(&'static str),
    InvalidField(&'static str),
    InvalidTimestamp(i64),
}

/// Fields extracted from a single quote response. Parsed fresh on every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: f64,
    pub changes_percentage: f64,
    pub day_low: f64,
    pub day_high: f64,
    pub open: f64,
    pub previous_close: f64,
    pub timestamp: i64,
}

impl QuoteRecord {
    /// Parses a response body into a `QuoteRecord`.
    ///
    /// The body is used as-is apart from surrounding whitespace. Quote endpoints
    /// usually wrap the object in a JSON array, in which case the first element
    /// is taken.
    ///
    /// # Arguments
    ///
    /// - `body`: The raw bytes of the HTTP response body.
    ///
    /// # Returns
    ///
    /// A `Result` containing the parsed `QuoteRecord`, or a `QuoteError` if the body
    /// does not contain a valid quote.
    ///
    /// # Errors
    ///
    /// - `QuoteError::EmptyBody`: If there is nothing but whitespace.
    /// - `QuoteError::InvalidJson`: If the body is not JSON.
    /// - `QuoteError::NotAnObject`: If the body is neither an object nor an array starting with one.
    /// - `QuoteError::MissingField`: If a required field is absent. `symbol` is checked first.
    /// - `QuoteError::InvalidField`: If a field has the wrong JSON type.
    pub fn parse(body: &[u8]) -> Result<Self, QuoteError> {
        let body = trim_whitespace(body);
        if body.is_empty() {
            return Err(QuoteError::EmptyBody);
        }
        let root: Value =
            serde_json::from_slice(body).map_err(|err| QuoteError::InvalidJson(err.to_string()))?;
        let object = match &root {
            Value::Object(object) => object,
            Value::Array(items) => items
                .first()
                .and_then(Value::as_object)
                .ok_or(QuoteError::NotAnObject)?,
            _ => return Err(QuoteError::NotAnObject),
        };

        Ok(QuoteRecord {
            symbol: string_field(object, "symbol")?,
            price: number_field(object, "price")?,
            changes_percentage: number_field(object, "changesPercentage")?,
            day_low: number_field(object, "dayLow")?,
            day_high: number_field(object, "dayHigh")?,
            open: number_field(object, "open")?,
            previous_close: number_field(object, "previousClose")?,
            timestamp: integer_field(object, "timestamp")?,
        })
    }

    /// Renders the timestamp in `zone` the way `ctime` does, e.g. `Tue Nov 14 17:13:20 2023`.
    /// Daylight saving time applies whenever the zone observes it at that instant.
    ///
    /// # Errors
    ///
    /// - `QuoteError::InvalidTimestamp`: If the timestamp is out of range.
    pub fn local_time(&self, zone: Tz) -> Result<String, QuoteError> {
        let time = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or(QuoteError::InvalidTimestamp(self.timestamp))?;
        Ok(time.with_timezone(&zone).format(CTIME_FORMAT).to_string())
    }
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |last| last + 1);
    &bytes[start..end]
}

fn field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, QuoteError> {
    object.get(name).ok_or(QuoteError::MissingField(name))
}

fn string_field(object: &Map<String, Value>, name: &'static str) -> Result<String, QuoteError> {
    field(object, name)?
        .as_str()
        .map(str::to_string)
        .ok_or(QuoteError::InvalidField(name))
}

fn number_field(object: &Map<String, Value>, name: &'static str) -> Result<f64, QuoteError> {
    field(object, name)?
        .as_f64()
        .ok_or(QuoteError::InvalidField(name))
}

/// Accepts integers and floats without a fractional part, e.g. `1700000000.0`.
fn integer_field(object: &Map<String, Value>, name: &'static str) -> Result<i64, QuoteError> {
    let value = field(object, name)?;
    if let Some(integer) = value.as_i64() {
        return Ok(integer);
    }
    value
        .as_f64()
        .filter(|float| float.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(float))
        .map(|float| float as i64)
        .ok_or(QuoteError::InvalidField(name))
}

/// Formats a price with a currency prefix and two decimals.
pub fn format_price(value: f64) -> String {
    format!("${value:.2}")
}

/// Formats a pair of prices as `$a / $b`.
pub fn format_price_pair(first: f64, second: f64) -> String {
    format!("{} / {}", format_price(first), format_price(second))
}

/// Formats a percent change with two decimals, a `+` sign when it is not
/// negative and a trailing `%`.
pub fn format_change(value: f64) -> String {
    if is_gain(value) {
        // normalizes -0.0
        format!("+{:.2}%", value.abs())
    } else {
        format!("{value:.2}%")
    }
}

/// Whether a percent change is displayed as a gain.
pub fn is_gain(value: f64) -> bool {
    value >= 0.0
}

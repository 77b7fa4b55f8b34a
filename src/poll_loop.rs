//! The connect, request, validate, render and sleep cycle.

use chrono_tz::Tz;
use log::{debug, info, warn};

use crate::{
    config::TickerConfig,
    connection::ConnectionState,
    display::{DisplayError, DisplaySurface, QuoteFrame},
    quote::{QuoteError, QuoteRecord},
    wifi::http::{HttpError, HttpHeader, HttpHeaderType, HttpResponse, HttpSession},
};

/// Suspends the calling task, letting other tasks run meanwhile.
pub trait Sleep {
    fn sleep_ms(&mut self, milliseconds: u32);
}

/// Index into the configured resource paths. Advanced on every failed
/// validation so the next cycle uses the next API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeySelector {
    current: usize,
    count: usize,
}

impl ApiKeySelector {
    /// Creates a selector over `count` keys, starting at the first one.
    pub fn new(count: usize) -> Self {
        ApiKeySelector { current: 0, count: count.max(1) }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Moves to the next key, wrapping around, and returns it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }
}

/// Why a response was not shown.
#[derive(Debug, PartialEq)]
pub enum ValidationFailure {
    /// The selected key has no resource path configured.
    NoResourcePath(usize),
    NoResponse(HttpError),
    Status(u16),
    Quote(QuoteError),
}

/// What happened during one cycle.
#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    /// No session could be opened. Retried on the next cycle.
    ConnectFailed(HttpError),
    /// The response did not hold a quote. The key selector moved to `next_key`.
    ValidationFailed {
        reason: ValidationFailure,
        next_key: usize,
    },
    /// The quote was drawn.
    Displayed(QuoteRecord),
    /// The quote was valid but drawing it failed.
    DisplayFailed(DisplayError),
}

/// Settings the poll loop takes from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub host: String,
    pub resource_paths: Vec<String>,
    pub cycle_delay_ms: u32,
    pub timezone: Tz,
}

impl From<&TickerConfig> for PollSettings {
    fn from(config: &TickerConfig) -> Self {
        PollSettings {
            host: config.server.host.clone(),
            resource_paths: config.server.resource_paths.clone(),
            cycle_delay_ms: config.cycle_delay_ms,
            timezone: config.timezone,
        }
    }
}

/// Owns the session with the quote server and the display, and runs the
/// poll cycle forever.
///
/// Every cycle opens a session when there is none, sends one GET request,
/// closes the session again, and only redraws the display when the response
/// holds a valid quote. Failures are logged and absorbed; the cycle always
/// ends with the configured delay.
pub struct PollLoop<S, D, T> {
    session: S,
    display: D,
    sleeper: T,
    state: ConnectionState,
    selector: ApiKeySelector,
    settings: PollSettings,
}

impl<S, D, T> PollLoop<S, D, T>
where
    S: HttpSession,
    D: DisplaySurface,
    T: Sleep,
{
    /// Creates a new PollLoop
    ///
    /// # Arguments
    ///
    /// - `session`: The session with the quote server. Must report peer disconnections
    ///   through a notifier taken from `state`.
    /// - `display`: Where quotes are drawn.
    /// - `sleeper`: Used for the delay at the end of every cycle.
    /// - `state`: The connection flag shared with the session.
    /// - `settings`: Host, resource paths and timing.
    pub fn new(session: S, display: D, sleeper: T, state: ConnectionState, settings: PollSettings) -> Self {
        let selector = ApiKeySelector::new(settings.resource_paths.len());
        PollLoop { session, display, sleeper, state, selector, settings }
    }

    /// Runs cycles forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// Runs one cycle followed by the inter-cycle delay.
    pub fn step(&mut self) -> CycleOutcome {
        let outcome = self.run_cycle();
        debug!("Cycle finished: {:?}", outcome);
        info!("Waiting {} ms", self.settings.cycle_delay_ms);
        self.sleeper.sleep_ms(self.settings.cycle_delay_ms);
        outcome
    }

    /// Runs one cycle without the trailing delay.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if !self.state.is_connected() {
            if let Err(err) = self.session.connect() {
                warn!("HTTP client connection failed: {:?}", err);
                return CycleOutcome::ConnectFailed(err);
            }
            info!("Connected to HTTP server successfully");
            self.state.set_connected();
        }

        let response = self.send_request();
        self.close_session();

        let record = match validate(response) {
            Ok(record) => record,
            Err(reason) => {
                let next_key = self.selector.advance();
                warn!("Request failed: {:?}. New key select: {}", reason, next_key);
                return CycleOutcome::ValidationFailed { reason, next_key };
            }
        };

        info!("Drawing quote for {}", record.symbol);
        let frame = QuoteFrame::from_record(&record, self.settings.timezone);
        match frame.render(&mut self.display) {
            Ok(()) => CycleOutcome::Displayed(record),
            Err(err) => {
                warn!("Drawing the quote failed: {:?}", err);
                CycleOutcome::DisplayFailed(err)
            }
        }
    }

    fn send_request(&mut self) -> Result<HttpResponse, ValidationFailure> {
        // the server may have closed the session since it was opened
        if !self.state.is_connected() {
            return Err(ValidationFailure::NoResponse(HttpError::NotConnected));
        }
        let key = self.selector.current();
        let Some(path) = self.settings.resource_paths.get(key) else {
            warn!("No resource path configured for key {}", key);
            return Err(ValidationFailure::NoResourcePath(key));
        };
        info!("Sending HTTP request with key {}", key);

        let host = HttpHeader::new(HttpHeaderType::Host, self.settings.host.as_str());
        match self.session.get(path, vec![host]) {
            Ok(response) => {
                debug!(
                    "Response received ({}): {}",
                    response.status,
                    String::from_utf8_lossy(&response.body)
                );
                Ok(response)
            }
            Err(err) => {
                warn!("HTTP client send failed: {:?}", err);
                Err(ValidationFailure::NoResponse(err))
            }
        }
    }

    /// One request per session: the session is closed after every request and
    /// the flag is cleared even when closing reports an error.
    fn close_session(&mut self) {
        match self.session.disconnect() {
            Ok(()) => info!("Disconnected from HTTP server"),
            Err(err) => warn!("HTTP client disconnect failed: {:?}", err),
        }
        self.state.set_disconnected();
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn selector(&self) -> ApiKeySelector {
        self.selector
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn sleeper(&self) -> &T {
        &self.sleeper
    }
}

fn validate(response: Result<HttpResponse, ValidationFailure>) -> Result<QuoteRecord, ValidationFailure> {
    let response = response?;
    if !response.is_success() {
        return Err(ValidationFailure::Status(response.status));
    }
    QuoteRecord::parse(&response.body).map_err(ValidationFailure::Quote)
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;
    use crate::{
        connection::DisconnectNotifier,
        display::recording::RecordingDisplay,
        wifi::http::HttpRequest,
    };

    const AMD: &str = r#"{"symbol":"AMD","price":100.005,"changesPercentage":-1.2,"dayLow":98.0,"dayHigh":102.0,"open":99.0,"previousClose":101.0,"timestamp":1700000000}"#;
    const NO_SYMBOL: &str = r#"{"Error Message":"Limit Reach . Please upgrade your plan"}"#;

    #[derive(Debug, PartialEq)]
    enum Call {
        Connect,
        Send { path: String, host: Option<String> },
        Disconnect,
    }

    #[derive(Default)]
    struct ScriptedSession {
        connects: VecDeque<Result<(), HttpError>>,
        responses: VecDeque<Result<HttpResponse, HttpError>>,
        disconnects: VecDeque<Result<(), HttpError>>,
        peer_closes_on_send: Option<DisconnectNotifier>,
        open: bool,
        calls: Vec<Call>,
    }

    impl ScriptedSession {
        fn sends(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Send { path, .. } => Some(path.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl HttpSession for ScriptedSession {
        fn connect(&mut self) -> Result<(), HttpError> {
            self.calls.push(Call::Connect);
            let result = self.connects.pop_front().unwrap_or(Ok(()));
            self.open = result.is_ok();
            result
        }

        fn send_request(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            assert!(self.open, "request sent without an open session");
            self.calls.push(Call::Send {
                path: request.path().to_string(),
                host: request.header(HttpHeaderType::Host).map(str::to_string),
            });
            if let Some(notifier) = &self.peer_closes_on_send {
                notifier.notify();
                return Err(HttpError::ConnectionClosed);
            }
            self.responses.pop_front().unwrap_or(Err(HttpError::TimeoutError))
        }

        fn disconnect(&mut self) -> Result<(), HttpError> {
            self.calls.push(Call::Disconnect);
            self.open = false;
            self.disconnects.pop_front().unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct RecordedSleep {
        sleeps: Vec<u32>,
    }

    impl Sleep for RecordedSleep {
        fn sleep_ms(&mut self, milliseconds: u32) {
            self.sleeps.push(milliseconds);
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, HttpError> {
        Ok(HttpResponse { status: 200, body: body.as_bytes().to_vec() })
    }

    fn settings() -> PollSettings {
        PollSettings {
            host: "financialmodelingprep.com".to_string(),
            resource_paths: vec!["/key0".to_string(), "/key1".to_string(), "/key2".to_string()],
            cycle_delay_ms: 120_000,
            timezone: Tz::EST5EDT,
        }
    }

    fn poll_loop(session: ScriptedSession) -> PollLoop<ScriptedSession, RecordingDisplay, RecordedSleep> {
        PollLoop::new(
            session,
            RecordingDisplay::default(),
            RecordedSleep::default(),
            ConnectionState::new(),
            settings(),
        )
    }

    #[test]
    fn test0_key_selector_wraps_around() {
        let mut selector = ApiKeySelector::new(3);
        let visited: Vec<usize> = (0..7).map(|_| selector.advance()).collect();
        assert_eq!(visited, vec![1, 2, 0, 1, 2, 0, 1]);
        assert_eq!(ApiKeySelector::new(0).advance(), 0);
    }

    #[test]
    fn test1_selector_after_k_failures_is_k_mod_n() {
        for k in 0..8 {
            let mut session = ScriptedSession::default();
            session.responses = (0..k).map(|_| ok(NO_SYMBOL)).collect();
            let mut poll = poll_loop(session);
            for _ in 0..k {
                poll.step();
            }
            assert_eq!(poll.selector().current(), k % 3);
        }
    }

    #[test]
    fn test2_successful_cycle_draws_the_quote() {
        let mut session = ScriptedSession::default();
        session.responses.push_back(ok(AMD));
        let mut poll = poll_loop(session);

        let CycleOutcome::Displayed(record) = poll.step() else {
            panic!("expected a drawn quote");
        };
        assert_eq!(record.symbol, "AMD");
        assert_eq!(poll.selector().current(), 0);
        assert!(!poll.is_connected());
        assert_eq!(
            poll.session().calls,
            vec![
                Call::Connect,
                Call::Send {
                    path: "/key0".to_string(),
                    host: Some("financialmodelingprep.com".to_string())
                },
                Call::Disconnect,
            ]
        );
        let texts = poll.display().texts();
        assert_eq!(
            texts,
            vec![
                "AMD",
                "$100.00",
                "-1.20%",
                "PC/O",
                "$101.00 / $99.00",
                "DL/DH",
                "$98.00 / $102.00",
                "Tue Nov 14 17:13:20 2023",
            ]
        );
        assert_eq!(poll.sleeper().sleeps, vec![120_000]);
    }

    #[test]
    fn test3_missing_symbol_rotates_keys_and_keeps_display() {
        let mut session = ScriptedSession::default();
        session.responses = (0..3).map(|_| ok(NO_SYMBOL)).collect();
        let mut poll = poll_loop(session);

        let mut keys = vec![poll.selector().current()];
        for _ in 0..3 {
            match poll.step() {
                CycleOutcome::ValidationFailed { reason, next_key } => {
                    assert_eq!(reason, ValidationFailure::Quote(QuoteError::MissingField("symbol")));
                    keys.push(next_key);
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(keys, vec![0, 1, 2, 0]);
        assert_eq!(poll.session().sends(), vec!["/key0", "/key1", "/key2"]);
        assert_eq!(poll.display().frames(), 0);
        assert_eq!(poll.sleeper().sleeps.len(), 3);
    }

    #[test]
    fn test4_connect_failure_skips_request_and_still_sleeps() {
        let mut session = ScriptedSession::default();
        session.connects.push_back(Err(HttpError::InitializationError));
        session.responses.push_back(ok(AMD));
        let mut poll = poll_loop(session);

        assert_eq!(poll.step(), CycleOutcome::ConnectFailed(HttpError::InitializationError));
        assert!(poll.session().sends().is_empty());
        assert_eq!(poll.selector().current(), 0);
        assert_eq!(poll.sleeper().sleeps, vec![120_000]);

        // retried on the next cycle
        assert!(matches!(poll.step(), CycleOutcome::Displayed(_)));
        assert_eq!(poll.session().sends(), vec!["/key0"]);
    }

    #[test]
    fn test5_send_failure_still_disconnects() {
        let mut session = ScriptedSession::default();
        session.responses.push_back(Err(HttpError::TimeoutError));
        let mut poll = poll_loop(session);

        assert_eq!(
            poll.run_cycle(),
            CycleOutcome::ValidationFailed {
                reason: ValidationFailure::NoResponse(HttpError::TimeoutError),
                next_key: 1,
            }
        );
        assert_eq!(poll.session().calls.last(), Some(&Call::Disconnect));
        assert!(!poll.is_connected());
    }

    #[test]
    fn test6_failed_disconnect_still_clears_flag() {
        let mut session = ScriptedSession::default();
        session.responses.push_back(ok(AMD));
        session.responses.push_back(ok(AMD));
        session.disconnects.push_back(Err(HttpError::InitializationError));
        let mut poll = poll_loop(session);

        assert!(matches!(poll.run_cycle(), CycleOutcome::Displayed(_)));
        assert!(!poll.is_connected());
        poll.run_cycle();
        let connects = poll.session().calls.iter().filter(|call| **call == Call::Connect).count();
        assert_eq!(connects, 2);
    }

    #[test]
    fn test7_error_status_is_a_validation_failure() {
        let mut session = ScriptedSession::default();
        session.responses.push_back(Ok(HttpResponse { status: 429, body: AMD.as_bytes().to_vec() }));
        let mut poll = poll_loop(session);

        assert_eq!(
            poll.run_cycle(),
            CycleOutcome::ValidationFailed { reason: ValidationFailure::Status(429), next_key: 1 }
        );
        assert_eq!(poll.display().frames(), 0);
    }

    #[test]
    fn test8_peer_disconnect_during_request() {
        let state = ConnectionState::new();
        let session = ScriptedSession {
            peer_closes_on_send: Some(state.notifier()),
            ..Default::default()
        };
        let mut poll = PollLoop::new(
            session,
            RecordingDisplay::default(),
            RecordedSleep::default(),
            state,
            settings(),
        );

        assert_eq!(
            poll.run_cycle(),
            CycleOutcome::ValidationFailed {
                reason: ValidationFailure::NoResponse(HttpError::ConnectionClosed),
                next_key: 1,
            }
        );
        assert!(!poll.is_connected());
        assert_eq!(poll.session().calls.last(), Some(&Call::Disconnect));

        // a fresh session is opened for the next request
        poll.run_cycle();
        let connects = poll.session().calls.iter().filter(|call| **call == Call::Connect).count();
        assert_eq!(connects, 2);
        assert_eq!(poll.session().sends(), vec!["/key0", "/key1"]);
    }

    #[test]
    fn test9_display_failure_is_absorbed() {
        let mut session = ScriptedSession::default();
        session.responses.push_back(ok(AMD));
        let display = RecordingDisplay { fail_on_draw: true, ..Default::default() };
        let mut poll = PollLoop::new(
            session,
            display,
            RecordedSleep::default(),
            ConnectionState::new(),
            settings(),
        );

        assert_eq!(poll.step(), CycleOutcome::DisplayFailed(DisplayError::Communication));
        assert_eq!(poll.selector().current(), 0);
        assert_eq!(poll.sleeper().sleeps, vec![120_000]);
    }

    #[test]
    fn test10_empty_resource_paths_never_send() {
        let mut poll = PollLoop::new(
            ScriptedSession::default(),
            RecordingDisplay::default(),
            RecordedSleep::default(),
            ConnectionState::new(),
            PollSettings { resource_paths: vec![], ..settings() },
        );

        assert_eq!(
            poll.step(),
            CycleOutcome::ValidationFailed { reason: ValidationFailure::NoResourcePath(0), next_key: 0 }
        );
        assert!(poll.session().sends().is_empty());
        assert_eq!(poll.session().calls.last(), Some(&Call::Disconnect));
        assert!(!poll.is_connected());
        assert_eq!(poll.sleeper().sleeps, vec![120_000]);
    }
}

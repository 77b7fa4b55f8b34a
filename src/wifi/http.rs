/// Error types related to HTTP operations.
#[derive(Debug, PartialEq, Eq)]
pub enum HttpError {
    InitializationError,
    ConnectionClosed,
    ListeningError,
    NotConnected,
    ReadError,
    RequestError,
    ResponseTooLarge,
    TimeoutError,
}

/// The HttpSession trait gives the implementation on how to hold a session with a
/// single server, send requests through it and wait for their response.
///
/// Every request is answered synchronously, blocking up to the timeout the
/// session was configured with.
pub trait HttpSession {
    /// Opens a session with the server.
    ///
    /// # Errors
    ///
    /// - `HttpError::InitializationError`: If the HTTP client can not be created.
    fn connect(&mut self) -> Result<(), HttpError>;

    /// Sends a request through the open session and blocks until the whole
    /// response was received.
    ///
    /// # Errors
    ///
    /// - `HttpError::NotConnected`: If there is no open session.
    /// - `HttpError::RequestError`: If writing the request fails.
    /// - `HttpError::ListeningError`: If the response headers can not be received.
    /// - `HttpError::ReadError`, `HttpError::TimeoutError`, `HttpError::ConnectionClosed`: If
    ///   reading the body fails.
    /// - `HttpError::ResponseTooLarge`: If the body does not fit the response buffer.
    fn send_request(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// - `HttpError::NotConnected`: If there was no open session.
    fn disconnect(&mut self) -> Result<(), HttpError>;

    /// Does an HTTP GET on the desired path with the designated headers
    ///
    /// # Arguments
    ///
    /// - `path`: The resource path of the target resource, query included.
    /// - `headers`: A vector of HttpHeader structs to be included in the GET request.
    ///
    /// # Returns
    ///
    /// A `Result` with the `HttpResponse`, or an `HttpError` if it fails.
    fn get<'a>(&mut self, path: &'a str, headers: Vec<HttpHeader<'a>>) -> Result<HttpResponse, HttpError> {
        self.send_request(&HttpRequest::new(path, headers))
    }
}

/// Simple abstraction of a header used for HTTP/HTTPS requests. It contains:
/// - `header_type`: The type of header to be used
/// - `value`: The value associated to the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader<'a> {
    header_type: HttpHeaderType,
    value: std::borrow::Cow<'a, str>,
}

impl<'a> HttpHeader<'a> {
    /// Creates a new HttpHeader
    ///
    /// # Arguments
    ///
    /// - `header_type`: The type of header to be used
    /// - `value`: The value associated to the header
    ///
    /// # Returns
    ///
    /// The new HttpHeader instance
    pub fn new(header_type: HttpHeaderType, value: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        HttpHeader { header_type, value: value.into() }
    }
}

/// Request headers the ticker sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpHeaderType {
    Host,
}

impl HttpHeaderType {
    /// Returns the header name as sent on the wire
    fn name(&self) -> &'static str {
        match self {
            HttpHeaderType::Host => "Host",
        }
    }
}

/// A GET request, ready to be sent on an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    path: &'a str,
    headers: Vec<HttpHeader<'a>>,
}

impl<'a> HttpRequest<'a> {
    pub fn new(path: &'a str, headers: Vec<HttpHeader<'a>>) -> Self {
        HttpRequest { path, headers }
    }

    pub fn path(&self) -> &str {
        self.path
    }

    /// Returns the value of the first header of the given type.
    pub fn header(&self, header_type: HttpHeaderType) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.header_type == header_type)
            .map(|header| header.value.as_ref())
    }

    /// Returns the headers as `(name, value)` pairs, the form the ESP HTTP client takes them in.
    pub fn header_pairs(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|header| (header.header_type.name(), header.value.as_ref()))
            .collect()
    }
}

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reads a response body into memory, never holding more than `limit` bytes.
///
/// # Arguments
///
/// - `announced_len`: The `Content-Length` announced by the server, if any.
/// - `limit`: Maximum amount of body bytes accepted.
/// - `read`: Reads the next bytes of the body into the buffer. Returns 0 at the end of the body.
///
/// # Returns
///
/// A `Result` with the body, or an `HttpError` if it fails.
///
/// # Errors
///
/// - `HttpError::ResponseTooLarge`: If the announced or received body is larger than `limit`.
///   An oversized announcement is rejected before anything is read.
/// - Any error returned by `read`.
pub fn read_body<F>(announced_len: Option<u64>, limit: usize, mut read: F) -> Result<Vec<u8>, HttpError>
where
    F: FnMut(&mut [u8]) -> Result<usize, HttpError>,
{
    if announced_len.is_some_and(|len| len > limit as u64) {
        return Err(HttpError::ResponseTooLarge);
    }
    let mut body = Vec::with_capacity(announced_len.map_or(0, |len| len as usize));
    let mut chunk = [0u8; 256];
    loop {
        let read = read(&mut chunk)?;
        if read == 0 {
            return Ok(body);
        }
        if read > limit - body.len() {
            return Err(HttpError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk[..read]);
    }
}

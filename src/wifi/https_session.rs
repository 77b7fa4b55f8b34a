use std::time::Duration;

use esp_idf_svc::{
    http::{
        client::{Configuration, EspHttpConnection},
        Headers, Method,
    },
    tls::X509,
};
use log::{debug, info};

use super::http::{read_body, HttpError, HttpRequest, HttpResponse, HttpSession};
use crate::{
    config::{ServerConfig, TlsCredentials},
    connection::DisconnectNotifier,
};

/// esp-tls code for a read that timed out
const READ_TIMEOUT: i32 = -0x7007;

/// HTTPS client for the quote server. Every `connect` creates a fresh
/// `EspHttpConnection` and `disconnect` drops it, so a session carries
/// exactly one request.
pub struct HttpsSession {
    base_uri: String,
    timeout: Duration,
    response_limit: usize,
    server_certificate: Option<X509<'static>>,
    client_certificate: Option<X509<'static>>,
    private_key: Option<X509<'static>>,
    notifier: DisconnectNotifier,
    connection: Option<EspHttpConnection>,
}

impl HttpsSession {
    /// Creates a new HttpsSession. No connection is opened.
    ///
    /// # Arguments
    ///
    /// - `server`: Host, port, timeout and response size limit.
    /// - `credentials`: PEM encoded root CA and client identity. Without a root CA the
    ///   certificate bundle of the IDF is used to verify the server.
    /// - `notifier`: Called when the server closes the session.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `HttpsSession`, or an `HttpError` if it fails.
    ///
    /// # Errors
    ///
    /// - `HttpError::InitializationError`: If a PEM document contains a NUL byte or the
    ///   client identity is incomplete.
    pub fn new(
        server: &ServerConfig,
        credentials: &TlsCredentials,
        notifier: DisconnectNotifier,
    ) -> Result<Self, HttpError> {
        if credentials.client_cert.is_some() != credentials.client_key.is_some() {
            return Err(HttpError::InitializationError);
        }
        Ok(HttpsSession {
            base_uri: format!("https://{}:{}", server.host, server.port),
            timeout: Duration::from_millis(server.timeout_ms.into()),
            response_limit: server.response_buffer_bytes,
            server_certificate: leak_pem(credentials.root_ca.as_deref())?,
            client_certificate: leak_pem(credentials.client_cert.as_deref())?,
            private_key: leak_pem(credentials.client_key.as_deref())?,
            notifier,
            connection: None,
        })
    }

    fn configuration(&self) -> Configuration {
        Configuration {
            timeout: Some(self.timeout),
            server_certificate: self.server_certificate,
            client_certificate: self.client_certificate,
            private_key: self.private_key,
            crt_bundle_attach: match self.server_certificate {
                Some(_) => None,
                None => Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            },
            ..Default::default()
        }
    }
}

impl HttpSession for HttpsSession {
    fn connect(&mut self) -> Result<(), HttpError> {
        // a previous session is never reused
        self.connection = None;
        let connection = EspHttpConnection::new(&self.configuration()).map_err(|_| HttpError::InitializationError)?;
        info!("HTTPS client for {} created", self.base_uri);
        self.connection = Some(connection);
        Ok(())
    }

    fn send_request(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let connection = self.connection.as_mut().ok_or(HttpError::NotConnected)?;
        let uri = format!("{}{}", self.base_uri, request.path());
        connection
            .initiate_request(Method::Get, &uri, &request.header_pairs())
            .map_err(|_| HttpError::RequestError)?;
        connection.initiate_response().map_err(|_| HttpError::ListeningError)?;

        let status = connection.status();
        let announced = connection.content_len();
        debug!("Response status {}, content length {:?}", status, announced);

        let notifier = &self.notifier;
        let body = read_body(announced, self.response_limit, |buffer| {
            connection.read(buffer).map_err(|err| match err.code() {
                READ_TIMEOUT => HttpError::TimeoutError,
                _ => {
                    notifier.notify();
                    HttpError::ReadError
                }
            })
        })?;
        if announced.is_some_and(|len| (body.len() as u64) < len) {
            self.notifier.notify();
            return Err(HttpError::ConnectionClosed);
        }
        Ok(HttpResponse { status, body })
    }

    fn disconnect(&mut self) -> Result<(), HttpError> {
        match self.connection.take() {
            Some(connection) => {
                drop(connection);
                Ok(())
            }
            None => Err(HttpError::NotConnected),
        }
    }
}

/// The HTTP client keeps certificates for its whole lifetime, so the NUL
/// terminated copy is leaked once at start-up.
fn leak_pem(pem: Option<&str>) -> Result<Option<X509<'static>>, HttpError> {
    let Some(pem) = pem else {
        return Ok(None);
    };
    if pem.as_bytes().contains(&0) {
        return Err(HttpError::InitializationError);
    }
    let mut bytes = Vec::with_capacity(pem.len() + 1);
    bytes.extend_from_slice(pem.as_bytes());
    bytes.push(0);
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    Ok(Some(X509::pem_until_nul(bytes)))
}

//! HTTP(S) transport to a vCenter endpoint.
//!
//! Every remote call of a session goes through a [`RoundTrip`] implementation.
//! [`HttpTransport`] talks to vCenter directly; [`super::retry::RetryTransport`]
//! decorates any transport with bounded retries for transient network errors.
//!
//! Flow Overview:
//! - `create_transport` resolves `scheme://host:port/` from the endpoint settings.
//! - TLS trust is either disabled (`insecure`) or pinned to the configured CA bundle.
//! - Requests carry JSON bodies; responses are decoded into `serde_json::Value`.
//! - Network failures are classified once here, so the retry decorator only has
//!   to ask `TransportError::is_transient`.

use super::{endpoint::Endpoint, Error};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    Certificate, Client, Method, StatusCode,
};
use serde_json::Value;
use std::{
    error::Error as StdError,
    fs,
    future::Future,
    io,
    path::Path,
    pin::Pin,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// Fixed user agent sent on every request.
pub const USER_AGENT: &str = "k8s-csi-useragent";

/// Scheme used when the endpoint does not configure one.
pub const DEFAULT_SCHEME: &str = "https";

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type RoundTripFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;

/// A single request/response exchange with the remote endpoint.
pub trait RoundTrip: Send + Sync {
    fn round_trip<'a>(&'a self, request: &'a ApiRequest) -> RoundTripFuture<'a>;
}

pub type SharedTransport = Arc<dyn RoundTrip>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transient network error calling {url}: {source}")]
    Transient {
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl TransportError {
    /// Whether re-issuing the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Direct HTTP(S) transport backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Request {
                url: format!("{}{path}", self.base_url),
                source: Box::new(e),
            })
    }
}

impl RoundTrip for HttpTransport {
    fn round_trip<'a>(&'a self, request: &'a ApiRequest) -> RoundTripFuture<'a> {
        Box::pin(async move {
            let url = self.url_for(&request.path)?;
            debug!("vcenter request: {} {}", request.method, url);

            let mut builder = self
                .client
                .request(request.method.clone(), url.clone())
                .header(ACCEPT, "application/json")
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| classify(&url, e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.bytes().await.map_err(|e| classify(&url, e))?;

            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?
            };

            Ok(ApiResponse {
                url: url.to_string(),
                status,
                headers,
                body,
            })
        })
    }
}

fn classify(url: &Url, err: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if is_transient(&err) {
        TransportError::Transient {
            url,
            source: Box::new(err),
        }
    } else {
        TransportError::Request {
            url,
            source: Box::new(err),
        }
    }
}

/// Only failures safe to resend verbatim count: timeouts and connections
/// dropped mid-flight. TLS, DNS and refused connections are permanent.
fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<rustls::Error>() {
            return false;
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err
                .get_ref()
                .is_some_and(|inner| inner.is::<rustls::Error>())
            {
                return false;
            }
            return is_transient_io(io_err.kind());
        }
        source = cause.source();
    }
    false
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

/// Build the HTTP transport for an endpoint.
///
/// # Errors
/// Returns [`Error::Address`] if host/port do not form a valid URL and
/// [`Error::TlsConfig`] if the CA bundle cannot be loaded.
pub fn create_transport(endpoint: &Endpoint) -> Result<HttpTransport, Error> {
    let base_url = base_url(endpoint)?;

    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(endpoint.insecure);

    if let Some(ca_file) = endpoint.ca_file.as_deref().filter(|_| !endpoint.insecure) {
        let roots = load_ca_bundle(ca_file).map_err(|reason| {
            error!("Failed to load CA file {}: {reason}", ca_file.display());
            Error::TlsConfig {
                host: endpoint.host.clone(),
                reason,
            }
        })?;
        builder = builder.tls_built_in_root_certs(false);
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }

    let client = builder.build().map_err(|e| Error::TlsConfig {
        host: endpoint.host.clone(),
        reason: e.to_string(),
    })?;

    Ok(HttpTransport { client, base_url })
}

fn base_url(endpoint: &Endpoint) -> Result<Url, Error> {
    let address_error = |reason: String| {
        error!("Failed to parse URL for host {:?}: {reason}", endpoint.host);
        Error::Address {
            host: endpoint.host.clone(),
            reason,
        }
    };

    let host = endpoint.host.trim();
    if host.is_empty() {
        return Err(address_error("host is empty".to_string()));
    }

    let scheme = endpoint.scheme();
    let port = match endpoint.port {
        0 if scheme == "http" => 80,
        0 => 443,
        port => port,
    };

    // IPv6 literals need brackets, same as a host:port join.
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    let url = Url::parse(&format!("{scheme}://{authority}/"))
        .map_err(|e| address_error(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(address_error("no host in URL".to_string()));
    }
    Ok(url)
}

fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>, String> {
    let pem = fs::read(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let roots = Certificate::from_pem_bundle(&pem)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    if roots.is_empty() {
        return Err(format!("no certificates found in {}", path.display()));
    }
    Ok(roots)
}

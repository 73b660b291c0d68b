//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are plain data. `CrmClient` builds `HttpRequest`
//! values and parses `HttpResponse` values without touching the network; the
//! host supplies an [`HttpExecutor`] that performs the round-trip. The batch
//! engine only ever talks to the network through that seam, so every
//! pagination, chunking and retry decision can be tested with a scripted
//! executor.

use crate::error::ApiError;

/// HTTP method for a request. The CRM batch API reads with GET and writes
/// everything, archives included, with POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
///
/// The executor must surface the raw status code: the engine distinguishes
/// 200/201, 207, 400 and 429 from one another.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs one HTTP round-trip on behalf of the engine.
///
/// Non-2xx statuses are data, not errors: implementations return them as
/// `Ok(HttpResponse)` and reserve `Err` for transport failures
/// (`ApiError::Transport`).
pub trait HttpExecutor {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<F> HttpExecutor for F
where
    F: FnMut(&HttpRequest) -> Result<HttpResponse, ApiError>,
{
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self(request)
    }
}

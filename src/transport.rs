//! The HTTPS side of the client.
//!
//! The engine never talks to the network itself. It builds an [`HttpRequest`],
//! hands it to a [`Transport`] and interprets whatever comes back. Resending a
//! request means handing the very same [`HttpRequest`] over again.

use std::future::Future;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;
use thiserror::Error;

/// Transport errors. These reach the caller unchanged.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request URL could not be built.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
    /// Connecting, TLS or the exchange itself failed.
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// The server answered with a non-success status code.
    #[error("HTTP status {0}")]
    Status(u16),
    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully described outbound request. Query parameters for `GET`, form fields for `POST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: Method, host: &str, port: u16, path: &str) -> Self {
        Self {
            method,
            host: host.to_string(),
            port,
            path: path.to_string(),
            headers: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter. `None` values are left out of the request entirely.
    pub fn param(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.params.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Looks up the first parameter with the given name.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn url(&self) -> String {
        if self.port == 443 {
            format!("https://{}{}", self.host, self.path)
        } else {
            format!("https://{}:{}{}", self.host, self.port, self.path)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Sends requests and keeps the cookie jar.
///
/// Completions may arrive concurrently at the network level; the client only
/// ever touches its own state between awaits.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// Reads a cookie the given host has set.
    fn cookie(&self, host: &str, name: &str) -> Option<String>;

    /// Stores name/value cookies for the given host.
    fn set_cookies(&self, host: &str, cookies: &[(&str, &str)]);
}

/// [`Transport`] backed by an async `reqwest` client with a shared cookie jar.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|err| TransportError::RequestFailed(err.to_string()))?;

        Ok(Self { http, jar })
    }

    fn host_url(host: &str) -> Result<Url, TransportError> {
        Url::parse(&format!("https://{host}/")).map_err(|err| TransportError::InvalidUrl(err.to_string()))
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(&request.url()).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;

        let mut builder = match request.method {
            Method::Get => self.http.get(url).query(&request.params),
            Method::Post => self.http.post(url).form(&request.params),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::RequestFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn cookie(&self, host: &str, name: &str) -> Option<String> {
        let url = Self::host_url(host).ok()?;
        let header = self.jar.cookies(&url)?;
        let header = header.to_str().ok()?;

        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    fn set_cookies(&self, host: &str, cookies: &[(&str, &str)]) {
        let Ok(url) = Self::host_url(host) else {
            return;
        };

        let mut headers = Vec::with_capacity(cookies.len());
        for (name, value) in cookies {
            if let Ok(header) = HeaderValue::from_str(&format!("{name}={value}; Path=/")) {
                headers.push(header);
            }
        }

        self.jar.set_cookies(&mut headers.iter(), &url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_params_are_left_out() {
        let request = HttpRequest::new(Method::Post, "example.com", 443, "/x")
            .param("a", Some("1"))
            .param("b", None)
            .param("c", Some("3"));

        assert_eq!(request.params.len(), 2);
        assert_eq!(request.param_value("c"), Some("3"));
        assert_eq!(request.param_value("b"), None);
    }

    #[test]
    fn url_omits_default_port() {
        let request = HttpRequest::new(Method::Get, "example.com", 443, "/a/b");
        assert_eq!(request.url(), "https://example.com/a/b");

        let request = HttpRequest::new(Method::Get, "localhost", 8443, "/a");
        assert_eq!(request.url(), "https://localhost:8443/a");
    }

    #[test]
    fn jar_round_trips_cookies() {
        let transport = ReqwestTransport::new("test-agent").unwrap();
        transport.set_cookies("steamcommunity.com", &[("sessionid", "abc"), ("steamLogin", "x")]);

        assert_eq!(
            transport.cookie("steamcommunity.com", "sessionid").as_deref(),
            Some("abc")
        );
        assert_eq!(transport.cookie("steamcommunity.com", "missing"), None);
    }
}

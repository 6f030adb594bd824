//! Authenticated page fetching over the portal's three domains.
//!
//! The resolution pipeline steers every redirect itself: cross-domain hops
//! carry session handoffs in their `Set-Cookie`/`Location` headers, so the
//! client is built with redirect following disabled and the callers decide
//! what to do with each captured header.
//!
//! All requests share one client policy: connect/read timeouts, gzip, and a
//! single user-agent. The `Cookie` header is always assembled explicitly by
//! the caller from a [`crate::SessionContext`]; no cookie jar is involved.

use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("course-mirror/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching portal pages.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded as text.
    #[error("response body for {url} could not be decoded: {source}")]
    Body {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// A handoff response carried no `Location` header to follow.
    #[error("redirect from {url} carried no Location header")]
    MissingLocation {
        /// The handoff URL.
        url: String,
    },

    /// A reference could not be resolved into an absolute URL.
    #[error("invalid URL reference: {reference}")]
    InvalidReference {
        /// The offending reference.
        reference: String,
    },

    /// HTTP client construction failed.
    #[error("HTTP client construction failed: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn status(url: impl Into<String>, status: StatusCode) -> Self {
        Self::Status {
            url: url.into(),
            status: status.as_u16(),
        }
    }
}

/// A fetched page body together with any cookies the host set.
#[derive(Debug)]
pub struct FetchedPage {
    /// The decoded response body.
    pub body: String,
    /// Raw `Set-Cookie` header values, in response order.
    pub set_cookies: Vec<String>,
}

/// The captured result of a redirect hop that was not followed.
#[derive(Debug)]
pub struct Handoff {
    /// The `Location` header value (possibly relative).
    pub location: String,
    /// Raw `Set-Cookie` header values, in response order.
    pub set_cookies: Vec<String>,
}

/// HTTP fetcher for the portal's server-rendered pages and handoff endpoints.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Creates a fetcher with the shared client policy (redirects disabled).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when client construction fails.
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .gzip(true)
            .redirect(Policy::none())
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Performs an authenticated GET and returns the page body plus any
    /// cookies the host set.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Status`] for any non-success status (redirects
    /// included: a page fetch that redirects means the session is invalid),
    /// [`FetchError::Network`] on transport failure, and [`FetchError::Body`]
    /// when the body cannot be decoded.
    #[instrument(level = "debug", skip(self, cookie_header), fields(url = %url))]
    pub async fn fetch_page(
        &self,
        url: &str,
        cookie_header: Option<&str>,
    ) -> Result<FetchedPage, FetchError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie_header.filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status));
        }

        let set_cookies = set_cookie_values(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body {
                url: url.to_string(),
                source: e,
            })?;
        debug!(bytes = body.len(), "page fetched");

        Ok(FetchedPage { body, set_cookies })
    }

    /// Performs a GET against a handoff endpoint without following the
    /// redirect, capturing the `Location` target and issued cookies.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Status`] on 4xx/5xx, [`FetchError::Network`] on
    /// transport failure, and [`FetchError::MissingLocation`] when the
    /// response carries no `Location` header.
    #[instrument(level = "debug", skip(self, cookie_header), fields(url = %url))]
    pub async fn fetch_handoff(
        &self,
        url: &str,
        cookie_header: Option<&str>,
    ) -> Result<Handoff, FetchError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie_header.filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::status(url, status));
        }

        let set_cookies = set_cookie_values(response.headers());
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| FetchError::MissingLocation {
                url: url.to_string(),
            })?;
        debug!(cookies = set_cookies.len(), "handoff captured");

        Ok(Handoff {
            location,
            set_cookies,
        })
    }

    /// POSTs a form-encoded body without following redirects and returns the
    /// `Set-Cookie` values of the response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Status`] on 4xx/5xx and [`FetchError::Network`]
    /// on transport failure. Redirect statuses are success for this call.
    #[instrument(level = "debug", skip(self, form), fields(url = %url))]
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<Vec<String>, FetchError> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::status(url, status));
        }

        Ok(set_cookie_values(response.headers()))
    }
}

/// Collects all `Set-Cookie` values from a header map, in response order.
fn set_cookie_values(headers: &reqwest::header::HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(ToString::to_string)
        .collect()
}

/// Resolves a possibly relative reference against a base URL.
///
/// Returns the value as-is if it already starts with `http://` or
/// `https://`; normalizes `//...` to `https:...`; otherwise joins with
/// `base`.
#[must_use]
pub fn absolutize_url(value: &str, base: &Url) -> Option<String> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base.join(value).ok().map(|url| url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absolutize_url_absolute_unchanged() {
        let base = Url::parse("https://school.example.com/").unwrap();
        assert_eq!(
            absolutize_url("https://other.example.com/path", &base),
            Some("https://other.example.com/path".to_string())
        );
    }

    #[test]
    fn test_absolutize_url_protocol_relative() {
        let base = Url::parse("https://school.example.com/").unwrap();
        assert_eq!(
            absolutize_url("//cdn.example.com/x", &base),
            Some("https://cdn.example.com/x".to_string())
        );
    }

    #[test]
    fn test_absolutize_url_relative_joins_base() {
        let base = Url::parse("https://school.example.com/").unwrap();
        assert_eq!(
            absolutize_url("/Folder/processfolder.aspx?FolderID=5", &base),
            Some("https://school.example.com/Folder/processfolder.aspx?FolderID=5".to_string())
        );
    }

    #[test]
    fn test_fetch_error_status_display_includes_url_and_code() {
        let error = FetchError::status("https://school.example.com/f", StatusCode::NOT_FOUND);
        let msg = error.to_string();
        assert!(msg.contains("404"), "expected status in: {msg}");
        assert!(
            msg.contains("https://school.example.com/f"),
            "expected URL in: {msg}"
        );
    }

    #[test]
    fn test_fetch_error_missing_location_display() {
        let error = FetchError::MissingLocation {
            url: "https://platform.example.com/h".to_string(),
        };
        assert!(error.to_string().contains("no Location header"));
    }
}

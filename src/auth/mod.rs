//! Portal authentication.
//!
//! Login is a single form-encoded POST against the portal sign-in endpoint.
//! The portal answers with a redirect to the dashboard and a `Set-Cookie`
//! carrying the session id; the redirect itself is never followed, only the
//! cookie matters. A missing session cookie is fatal to the whole run, unlike
//! every per-item failure downstream.

pub mod session;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::MirrorConfig;
use crate::fetch::{FetchError, PageFetcher};

use session::{SESSION_COOKIE_NAME, SessionContext};

/// Path of the portal sign-in form handler.
const LOGIN_PATH: &str = "/index.aspx";

/// Errors that can occur during portal login.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The login request itself failed (network or HTTP status).
    #[error("login request failed: {0}")]
    Fetch(#[from] FetchError),

    /// The portal accepted the request but issued no session cookie,
    /// which means the credentials were rejected.
    #[error("no portal session cookie in login response; check credentials")]
    NoSessionCookie,
}

/// Authenticates against the portal and returns a session context seeded
/// with the portal session cookie.
///
/// # Errors
///
/// Returns [`LoginError::Fetch`] when the login endpoint cannot be reached or
/// answers with a non-success status, and [`LoginError::NoSessionCookie`]
/// when the response carries no session cookie. Both are fatal to the run.
#[instrument(skip(fetcher, config, password), fields(username = %username))]
pub async fn login(
    fetcher: &PageFetcher,
    config: &MirrorConfig,
    username: &str,
    password: &str,
) -> Result<SessionContext, LoginError> {
    let url = config.portal_url(LOGIN_PATH);
    let form = [("username", username), ("password", password)];
    let set_cookies = fetcher.post_form(&url, &form).await?;

    for header in &set_cookies {
        if let Some((name, value)) = header.split_once('=')
            && name.trim() == SESSION_COOKIE_NAME
        {
            let value = value.split(';').next().unwrap_or(value).trim();
            debug!("portal session established");
            return Ok(SessionContext::with_portal_session(
                SESSION_COOKIE_NAME,
                value,
            ));
        }
    }

    Err(LoginError::NoSessionCookie)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_error_no_session_cookie_display() {
        let error = LoginError::NoSessionCookie;
        assert!(error.to_string().contains("no portal session cookie"));
    }
}

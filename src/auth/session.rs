//! Session cookie chain across the portal, resource, and platform domains.
//!
//! A single file resolution crosses up to three authentication domains, each
//! of which issues its own session cookies. [`SessionContext`] tracks them per
//! domain so each hop can present exactly the cookies its target expects.
//!
//! The context is cloned for every file resolution: the portal session is
//! long-lived for the whole run, while resource/platform cookies accumulate
//! independently inside each resolution's call chain. No locking is needed.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

/// Name of the session-id cookie issued by the portal and platform hosts.
pub const SESSION_COOKIE_NAME: &str = "ASP.NET_SessionId";

/// The authentication domains encountered during one file resolution,
/// in the order the pipeline meets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthDomain {
    /// The school's portal host (login, folder pages, element view pages).
    Portal,
    /// The resource host reached through the cross-domain handoff.
    Resource,
    /// The content platform serving the delivery page.
    Platform,
}

impl AuthDomain {
    /// Short label used in log fields.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Portal => "portal",
            Self::Resource => "resource",
            Self::Platform => "platform",
        }
    }
}

/// Per-domain cookie store for one resolution chain.
///
/// Cookies are kept in deterministic (name-sorted) order per domain so the
/// generated `Cookie` header is stable across runs.
#[derive(Clone, Default)]
pub struct SessionContext {
    cookies: BTreeMap<AuthDomain, BTreeMap<String, String>>,
}

impl SessionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the portal session cookie obtained at login.
    #[must_use]
    pub fn with_portal_session(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut context = Self::new();
        context.insert(AuthDomain::Portal, name, value);
        context
    }

    /// Inserts a single cookie under `domain`, replacing any previous value
    /// for the same name (last value wins).
    pub fn insert(&mut self, domain: AuthDomain, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let previous = self
            .cookies
            .entry(domain)
            .or_default()
            .insert(name.clone(), value.into());
        if previous.is_some() {
            // The service is assumed to issue at most one session cookie per
            // domain per hop; an overwrite is worth noticing in debug logs.
            debug!(domain = domain.label(), cookie = %name, "replaced existing cookie value");
        }
    }

    /// Merges `Set-Cookie` header values into `domain`.
    ///
    /// Only the leading `name=value` pair of each header is kept; attributes
    /// after the first `;` (Path, Expires, ...) are ignored. Duplicate names
    /// are deduplicated with last value winning.
    pub fn merge_set_cookies<'a, I>(&mut self, domain: AuthDomain, headers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for header in headers {
            if let Some((name, value)) = parse_set_cookie(header) {
                self.insert(domain, name, value);
            }
        }
    }

    /// Merges `Set-Cookie` header values into `domain`, keeping only the
    /// session-id cookie ([`SESSION_COOKIE_NAME`]).
    ///
    /// The platform hop sets auxiliary cookies (load-balancer affinity,
    /// telemetry) that must not leak into later requests.
    pub fn merge_session_cookie<'a, I>(&mut self, domain: AuthDomain, headers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for header in headers {
            if let Some((name, value)) = parse_set_cookie(header)
                && name == SESSION_COOKIE_NAME
            {
                self.insert(domain, name, value);
            }
        }
    }

    /// Builds a `Cookie` header across `domains`, joining `name=value` pairs
    /// with `; ` in domain order, then name order within a domain.
    #[must_use]
    pub fn cookie_header(&self, domains: &[AuthDomain]) -> String {
        let mut pairs = Vec::new();
        for domain in domains {
            if let Some(cookies) = self.cookies.get(domain) {
                for (name, value) in cookies {
                    pairs.push(format!("{name}={value}"));
                }
            }
        }
        pairs.join("; ")
    }

    /// Returns the stored value of a cookie, if present.
    #[must_use]
    pub fn get(&self, domain: AuthDomain, name: &str) -> Option<&str> {
        self.cookies
            .get(&domain)
            .and_then(|cookies| cookies.get(name))
            .map(String::as_str)
    }
}

// Custom Debug impl that redacts cookie values.
impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (domain, cookies) in &self.cookies {
            let names: Vec<&str> = cookies.keys().map(String::as_str).collect();
            map.entry(&domain.label(), &names);
        }
        map.finish()
    }
}

/// Parses the leading `name=value` pair of a `Set-Cookie` header value.
///
/// Returns `None` for malformed headers (no `=`, empty name).
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next().unwrap_or(header);
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

//! Run configuration, threaded explicitly through every component.
//!
//! Nothing in the pipeline reads configuration from shared global state:
//! the [`MirrorConfig`] is built once in the binary and passed (behind an
//! `Arc`) to the fetcher, traverser, resolver, and materializer.

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Minimum allowed resolution concurrency.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed resolution concurrency.
const MAX_CONCURRENCY: usize = 100;

/// Default bound on outstanding file resolutions.
pub const DEFAULT_RESOLUTION_CONCURRENCY: usize = 8;

/// Domain suffix the portal hosts school tenants under.
const PORTAL_DOMAIN_SUFFIX: &str = ".itslearning.com";

/// Base URL of the resource host file payloads are served from.
const DEFAULT_RESOURCE_BASE: &str = "https://resource.itslearning.com";

/// Errors produced while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The school identifier cannot form a portal hostname.
    #[error("invalid school identifier '{value}': expected letters, digits, or '-'")]
    InvalidSchool {
        /// The offending identifier.
        value: String,
    },

    /// A base URL override did not parse.
    #[error("invalid base URL '{value}': {source}")]
    InvalidBaseUrl {
        /// The offending URL string.
        value: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Explicit configuration for one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    portal_base: Url,
    resource_base: Url,
    /// Root directory course trees are mirrored into.
    pub download_root: PathBuf,
    /// When set, files already present locally are never re-downloaded.
    pub skip_existing: bool,
    /// Bound on outstanding file resolutions.
    pub max_concurrent_resolutions: usize,
}

impl MirrorConfig {
    /// Creates a configuration from explicit base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] when the concurrency
    /// bound is outside `1..=100`.
    pub fn new(
        portal_base: Url,
        resource_base: Url,
        download_root: PathBuf,
        skip_existing: bool,
        max_concurrent_resolutions: usize,
    ) -> Result<Self, ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&max_concurrent_resolutions) {
            return Err(ConfigError::InvalidConcurrency {
                value: max_concurrent_resolutions,
            });
        }
        Ok(Self {
            portal_base,
            resource_base,
            download_root,
            skip_existing,
            max_concurrent_resolutions,
        })
    }

    /// Derives the portal base URL for a school tenant
    /// (`https://<school>.itslearning.com`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSchool`] when the identifier contains
    /// characters that cannot form a hostname label.
    pub fn portal_base_for_school(school: &str) -> Result<Url, ConfigError> {
        let valid = !school.is_empty()
            && school
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ConfigError::InvalidSchool {
                value: school.to_string(),
            });
        }
        let value = format!("https://{school}{PORTAL_DOMAIN_SUFFIX}");
        Url::parse(&value).map_err(|source| ConfigError::InvalidBaseUrl { value, source })
    }

    /// Parses a base URL override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when the value does not parse.
    pub fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
        Url::parse(value).map_err(|source| ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            source,
        })
    }

    /// The default resource-domain base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the built-in constant is
    /// ever malformed (a build-time defect).
    pub fn default_resource_base() -> Result<Url, ConfigError> {
        Self::parse_base_url(DEFAULT_RESOURCE_BASE)
    }

    /// The portal base URL.
    #[must_use]
    pub fn portal_base(&self) -> &Url {
        &self.portal_base
    }

    /// The resource-domain base URL.
    #[must_use]
    pub fn resource_base(&self) -> &Url {
        &self.resource_base
    }

    /// Builds an absolute portal URL from a portal-relative reference.
    #[must_use]
    pub fn portal_url(&self, reference: &str) -> String {
        self.portal_base.join(reference).map_or_else(
            |_| {
                format!(
                    "{}{}",
                    self.portal_base.as_str().trim_end_matches('/'),
                    reference
                )
            },
            |url| url.to_string(),
        )
    }
}

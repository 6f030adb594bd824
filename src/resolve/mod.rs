//! Per-file resource resolution across the portal's three domains.
//!
//! Given one file element id, [`ResourceResolver::resolve`] follows the full
//! handoff sequence to the true binary payload:
//!
//! 1. **View hop** - the element's view page on the portal yields the display
//!    file name and the embedded content frame URL.
//! 2. **Cross-domain handoff hop** - the frame URL, fetched with no cookies,
//!    issues the resource-domain session and a `Location` to follow.
//! 3. **Platform hop** - the captured location, fetched with the resource
//!    cookies, issues the platform session id and the delivery page.
//! 4. **Delivery branch** - the page exposes either a direct-download anchor
//!    or an office preview frame; each resolves into a [`ResolvedDownload`]
//!    handed to the materializer exactly once.
//!
//! Hops are strictly sequential with no retries; any hop failure aborts only
//! this one file. Pages exposing neither delivery marker are an expected,
//! non-fatal outcome (external links, quizzes, ...).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::auth::session::{AuthDomain, SessionContext};
use crate::config::MirrorConfig;
use crate::fetch::{FetchError, PageFetcher, absolutize_url};
use crate::materialize::{MaterializeError, Materialized, Materializer, ResolvedDownload};
use crate::sanitize::sanitize_name;
use crate::scrape::{self, DeliveryPage, ParseError, office};

/// The hop a resolution error occurred in, for log and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// The element view page fetch/parse.
    View,
    /// The cross-domain handoff.
    Handoff,
    /// The platform delivery page fetch/parse.
    Platform,
    /// The office preview page fetch/extraction.
    Preview,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::View => "view hop",
            Self::Handoff => "handoff hop",
            Self::Platform => "platform hop",
            Self::Preview => "preview hop",
        };
        f.write_str(label)
    }
}

/// Errors that abort a single file's resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A fetch failed at one of the hops.
    #[error("fetch failed during {hop}: {source}")]
    Fetch {
        /// The hop the failure occurred in.
        hop: Hop,
        /// The underlying fetch error (carries the URL).
        #[source]
        source: FetchError,
    },

    /// An expected element or pattern was absent at one of the hops.
    #[error("parse failed during {hop}: {source}")]
    Parse {
        /// The hop the failure occurred in.
        hop: Hop,
        /// The underlying parse error.
        #[source]
        source: ParseError,
    },

    /// The materializer failed to persist the payload.
    #[error("materialize failed for '{file_name}': {source}")]
    Materialize {
        /// The target file name.
        file_name: String,
        /// The underlying materialize error.
        #[source]
        source: MaterializeError,
    },
}

impl ResolveError {
    fn fetch(hop: Hop, source: FetchError) -> Self {
        Self::Fetch { hop, source }
    }

    fn parse(hop: Hop, source: ParseError) -> Self {
        Self::Parse { hop, source }
    }
}

/// Outcome of one file's resolution.
#[derive(Debug)]
pub enum Resolution {
    /// The file was handed to the materializer.
    Materialized(Materialized),
    /// The delivery page exposed neither marker; nothing was written.
    Unsupported,
}

/// Resolves file elements to their binary payloads and hands them to the
/// materializer.
pub struct ResourceResolver {
    fetcher: Arc<PageFetcher>,
    config: Arc<MirrorConfig>,
    materializer: Arc<dyn Materializer>,
}

impl fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceResolver {
    /// Creates a resolver over the given fetcher, configuration, and
    /// materializer.
    #[must_use]
    pub fn new(
        fetcher: Arc<PageFetcher>,
        config: Arc<MirrorConfig>,
        materializer: Arc<dyn Materializer>,
    ) -> Self {
        Self {
            fetcher,
            config,
            materializer,
        }
    }

    /// Resolves one file element and materializes its payload into
    /// `target_dir`.
    ///
    /// `session` is this resolution's private cookie chain: the caller hands
    /// over a clone seeded with the portal session, and the hops accumulate
    /// resource/platform cookies into it. With `disambiguate`, the element id
    /// is folded into the file name so same-named siblings stay distinct.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when any hop fails; the error is scoped to
    /// this file only.
    #[instrument(skip(self, session, target_dir), fields(element_id = element_id))]
    pub async fn resolve(
        &self,
        element_id: u64,
        mut session: SessionContext,
        target_dir: &Path,
        disambiguate: bool,
    ) -> Result<Resolution, ResolveError> {
        // View hop: portal session only.
        let view_url = self.config.portal_url(&format!(
            "/LearningToolElement/ViewLearningToolElement.aspx?LearningToolElementId={element_id}"
        ));
        let portal_cookie = session.cookie_header(&[AuthDomain::Portal]);
        let view_page = self
            .fetcher
            .fetch_page(&view_url, Some(&portal_cookie))
            .await
            .map_err(|e| ResolveError::fetch(Hop::View, e))?;
        let view = scrape::parse_view_page(&view_page.body)
            .map_err(|e| ResolveError::parse(Hop::View, e))?;

        let frame_url = absolutize_url(&view.frame_src, self.config.portal_base())
            .ok_or_else(|| {
                ResolveError::fetch(
                    Hop::View,
                    FetchError::InvalidReference {
                        reference: view.frame_src.clone(),
                    },
                )
            })?;

        // Cross-domain handoff: fetched with no cookies; the endpoint
        // issues the resource-domain session itself.
        let handoff = self
            .fetcher
            .fetch_handoff(&frame_url, None)
            .await
            .map_err(|e| ResolveError::fetch(Hop::Handoff, e))?;
        session.merge_set_cookies(
            AuthDomain::Resource,
            handoff.set_cookies.iter().map(String::as_str),
        );

        let platform_url = resolve_location(&frame_url, &handoff.location)
            .map_err(|e| ResolveError::fetch(Hop::Handoff, e))?;

        // Platform hop: present the freshly issued resource cookies; keep
        // only the session-id cookie the platform sets back.
        let resource_cookie = session.cookie_header(&[AuthDomain::Resource]);
        let platform_page = self
            .fetcher
            .fetch_page(&platform_url, Some(&resource_cookie))
            .await
            .map_err(|e| ResolveError::fetch(Hop::Platform, e))?;
        session.merge_session_cookie(
            AuthDomain::Platform,
            platform_page.set_cookies.iter().map(String::as_str),
        );

        let delivery = scrape::parse_delivery_page(&platform_page.body)
            .map_err(|e| ResolveError::parse(Hop::Platform, e))?;

        match delivery {
            DeliveryPage::Download { href, file_name } => {
                self.deliver_direct(&session, target_dir, element_id, disambiguate, &href, &file_name)
                    .await
            }
            DeliveryPage::Preview { frame_src } => {
                self.deliver_preview(
                    &session,
                    target_dir,
                    element_id,
                    disambiguate,
                    &frame_src,
                    &view.title,
                )
                .await
            }
            DeliveryPage::Unsupported => {
                info!(element_id, "resource type unsupported; skipping");
                Ok(Resolution::Unsupported)
            }
        }
    }

    /// Direct-download branch: the anchor's `href` against the resource base,
    /// authenticated with the accumulated resource/platform cookies.
    async fn deliver_direct(
        &self,
        session: &SessionContext,
        target_dir: &Path,
        element_id: u64,
        disambiguate: bool,
        href: &str,
        file_name: &str,
    ) -> Result<Resolution, ResolveError> {
        let url = absolutize_url(href, self.config.resource_base()).ok_or_else(|| {
            ResolveError::fetch(
                Hop::Platform,
                FetchError::InvalidReference {
                    reference: href.to_string(),
                },
            )
        })?;
        let cookie = session.cookie_header(&[AuthDomain::Resource, AuthDomain::Platform]);
        let file_name = target_file_name(file_name, element_id, disambiguate);
        debug!(file_name = %file_name, "direct download resolved");

        self.materialize(ResolvedDownload {
            url,
            cookie_header: Some(cookie),
            folder: target_dir.to_path_buf(),
            file_name,
        })
        .await
    }

    /// Preview branch: fetch the preview page, reassemble the payload URL
    /// from its embedded script values. The access token is the sole
    /// credential; no cookie header is sent for the payload.
    async fn deliver_preview(
        &self,
        session: &SessionContext,
        target_dir: &Path,
        element_id: u64,
        disambiguate: bool,
        frame_src: &str,
        display_name: &str,
    ) -> Result<Resolution, ResolveError> {
        let preview_url = absolutize_url(frame_src, self.config.resource_base()).ok_or_else(|| {
            ResolveError::fetch(
                Hop::Preview,
                FetchError::InvalidReference {
                    reference: frame_src.to_string(),
                },
            )
        })?;
        let cookie = session.cookie_header(&[AuthDomain::Resource, AuthDomain::Platform]);
        let preview_page = self
            .fetcher
            .fetch_page(&preview_url, Some(&cookie))
            .await
            .map_err(|e| ResolveError::fetch(Hop::Preview, e))?;

        let embed = office::extract_office_embed(&preview_page.body)
            .map_err(|e| ResolveError::parse(Hop::Preview, e))?;
        let url = office::download_url(&embed).map_err(|e| ResolveError::parse(Hop::Preview, e))?;

        let file_name = target_file_name(&sanitize_name(display_name), element_id, disambiguate);
        debug!(file_name = %file_name, ttl = embed.token_ttl, "office preview resolved");

        self.materialize(ResolvedDownload {
            url,
            cookie_header: None,
            folder: target_dir.to_path_buf(),
            file_name,
        })
        .await
    }

    async fn materialize(&self, download: ResolvedDownload) -> Result<Resolution, ResolveError> {
        let file_name = download.file_name.clone();
        let materialized = self
            .materializer
            .materialize(&download)
            .await
            .map_err(|source| ResolveError::Materialize { file_name, source })?;
        Ok(Resolution::Materialized(materialized))
    }
}

/// Resolves a handoff `Location` value, which may be relative to the handoff
/// endpoint.
fn resolve_location(handoff_url: &str, location: &str) -> Result<String, FetchError> {
    let base = Url::parse(handoff_url).map_err(|_| FetchError::InvalidReference {
        reference: handoff_url.to_string(),
    })?;
    absolutize_url(location, &base).ok_or_else(|| FetchError::InvalidReference {
        reference: location.to_string(),
    })
}

/// Derives the on-disk file name, folding the element id in ahead of the
/// extension when same-named siblings need to stay distinct.
fn target_file_name(file_name: &str, element_id: u64, disambiguate: bool) -> String {
    let file_name = sanitize_name(file_name);
    if !disambiguate {
        return file_name;
    }
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            format!("{stem} [{element_id}].{extension}")
        }
        _ => format!("{file_name} [{element_id}]"),
    }
}

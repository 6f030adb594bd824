//! Recursive folder traversal and the bounded file-resolution pool.
//!
//! Folders are walked depth-first in document order, one at a time. File
//! entries are not awaited inline: each one is dispatched to a
//! semaphore-bounded tokio task that runs the full resolution pipeline and
//! reports a [`ResolutionOutcome`] over a completion channel. Sibling
//! processing therefore never blocks on a download, and file completion
//! order is explicitly unordered.
//!
//! Every failure inside a folder or a file is contained to that branch:
//! the subtree is logged and abandoned, siblings and the rest of the course
//! list continue.

pub mod entry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use futures_util::future::BoxFuture;

use crate::auth::session::{AuthDomain, SessionContext};
use crate::config::MirrorConfig;
use crate::fetch::{FetchError, PageFetcher, absolutize_url};
use crate::materialize::Materialized;
use crate::portal::Course;
use crate::resolve::{Resolution, ResourceResolver};
use crate::sanitize::sanitize_name;
use crate::scrape::{self, FolderPage, ParseError, RawEntry};

use entry::{EntryKind, ResourceEntry, classify_entry, folder_id_from_url};

/// Outcome of one dispatched file resolution, reported over the completion
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The payload was written to disk.
    Materialized,
    /// The file already existed locally and was skipped.
    SkippedExisting,
    /// The resource kind is not supported; nothing was written.
    Unsupported,
    /// The resolution failed; the error was logged.
    Failed,
}

/// Aggregate counters for a mirror run.
///
/// Uses atomic counters so concurrent resolution tasks and the draining
/// loop never contend on a lock.
#[derive(Debug, Default)]
pub struct MirrorStats {
    materialized: AtomicUsize,
    skipped_existing: AtomicUsize,
    unsupported: AtomicUsize,
    failed: AtomicUsize,
}

impl MirrorStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one resolution outcome.
    pub fn record(&self, outcome: ResolutionOutcome) {
        let counter = match outcome {
            ResolutionOutcome::Materialized => &self.materialized,
            ResolutionOutcome::SkippedExisting => &self.skipped_existing,
            ResolutionOutcome::Unsupported => &self.unsupported,
            ResolutionOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Adds another tracker's counts into this one.
    pub fn absorb(&self, other: &MirrorStats) {
        self.materialized
            .fetch_add(other.materialized(), Ordering::SeqCst);
        self.skipped_existing
            .fetch_add(other.skipped_existing(), Ordering::SeqCst);
        self.unsupported
            .fetch_add(other.unsupported(), Ordering::SeqCst);
        self.failed.fetch_add(other.failed(), Ordering::SeqCst);
    }

    /// Files written to disk.
    #[must_use]
    pub fn materialized(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }

    /// Files skipped because they already existed.
    #[must_use]
    pub fn skipped_existing(&self) -> usize {
        self.skipped_existing.load(Ordering::SeqCst)
    }

    /// Elements whose resource kind is not supported.
    #[must_use]
    pub fn unsupported(&self) -> usize {
        self.unsupported.load(Ordering::SeqCst)
    }

    /// Resolutions that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total resolutions observed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.materialized() + self.skipped_existing() + self.unsupported() + self.failed()
    }
}

/// Errors internal to one folder's processing; always contained.
#[derive(Debug, Error)]
enum FolderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Walks a course's folder tree, dispatching file resolutions as it goes.
pub struct Traverser {
    fetcher: Arc<PageFetcher>,
    resolver: Arc<ResourceResolver>,
    config: Arc<MirrorConfig>,
    limiter: Arc<Semaphore>,
    outcome_tx: mpsc::UnboundedSender<ResolutionOutcome>,
}

impl Traverser {
    /// Creates a traverser reporting resolution outcomes on `outcome_tx`.
    ///
    /// The resolution pool size comes from the configuration; dispatched
    /// tasks queue on the internal semaphore beyond that bound.
    #[must_use]
    pub fn new(
        fetcher: Arc<PageFetcher>,
        resolver: Arc<ResourceResolver>,
        config: Arc<MirrorConfig>,
        outcome_tx: mpsc::UnboundedSender<ResolutionOutcome>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_resolutions));
        Self {
            fetcher,
            resolver,
            config,
            limiter,
            outcome_tx,
        }
    }

    /// Traverses a course's root folder into `root_path`.
    ///
    /// The root's own page title is ignored: the course title (already part
    /// of `root_path`) names the root directory. A fetch/parse failure here
    /// aborts this course only.
    #[instrument(skip(self, session, root_path), fields(folder = %folder_ref))]
    pub async fn mirror_root(
        &self,
        folder_ref: &str,
        session: &SessionContext,
        root_path: &Path,
    ) {
        match self.fetch_folder(folder_ref, session).await {
            Ok(page) => {
                debug!(entries = page.entries.len(), "course root folder listed");
                self.process_entries(page.entries, session, root_path).await;
            }
            Err(error) => {
                warn!(folder = %folder_ref, error = %error, "course root traversal aborted");
            }
        }
    }

    /// Recursively traverses one folder into `parent / <its own name>`.
    ///
    /// Boxed so the async recursion through [`Self::process_entries`] has a
    /// finite future type.
    fn traverse_folder<'a>(
        &'a self,
        folder_ref: String,
        session: &'a SessionContext,
        parent: PathBuf,
        disambiguate: bool,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let page = match self.fetch_folder(&folder_ref, session).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(folder = %folder_ref, error = %error, "folder traversal aborted");
                    return;
                }
            };

            let name = folder_local_name(&page.title, &folder_ref, disambiguate);
            let local_path = parent.join(&name);
            debug!(
                path = %local_path.display(),
                entries = page.entries.len(),
                "entering folder"
            );
            self.process_entries(page.entries, session, &local_path).await;
        })
    }

    /// Fetches and parses one folder page using the portal session.
    async fn fetch_folder(
        &self,
        folder_ref: &str,
        session: &SessionContext,
    ) -> Result<FolderPage, FolderError> {
        let url = absolutize_url(folder_ref, self.config.portal_base()).ok_or_else(|| {
            FetchError::InvalidReference {
                reference: folder_ref.to_string(),
            }
        })?;
        let cookie = session.cookie_header(&[AuthDomain::Portal]);
        let page = self.fetcher.fetch_page(&url, Some(&cookie)).await?;
        Ok(scrape::parse_folder_page(&page.body)?)
    }

    /// Processes a folder's entries in document order: folders recurse
    /// depth-first, files are dispatched to the resolution pool, unknown
    /// kinds are logged and skipped.
    async fn process_entries(
        &self,
        entries: Vec<RawEntry>,
        session: &SessionContext,
        local_path: &Path,
    ) {
        let entries: Vec<ResourceEntry> = entries.into_iter().map(classify_entry).collect();
        let duplicated = mark_duplicates(&entries);

        for (entry, is_duplicate) in entries.iter().zip(duplicated) {
            match entry.kind {
                EntryKind::Folder => {
                    self.traverse_folder(
                        entry.href.clone(),
                        session,
                        local_path.to_path_buf(),
                        is_duplicate,
                    )
                    .await;
                }
                EntryKind::File { element_id } => {
                    self.dispatch_resolution(element_id, session, local_path, is_duplicate);
                }
                EntryKind::Unknown => {
                    warn!(
                        name = %entry.name,
                        href = %entry.href,
                        "unrecognized entry kind; skipping"
                    );
                }
            }
        }
    }

    /// Spawns one file resolution onto the bounded pool without waiting for
    /// it. The task owns a clone of the session context, so sibling
    /// resolutions share nothing mutable.
    fn dispatch_resolution(
        &self,
        element_id: u64,
        session: &SessionContext,
        target_dir: &Path,
        disambiguate: bool,
    ) {
        let resolver = Arc::clone(&self.resolver);
        let limiter = Arc::clone(&self.limiter);
        let outcome_tx = self.outcome_tx.clone();
        let session = session.clone();
        let target_dir = target_dir.to_path_buf();

        tokio::spawn(async move {
            // Closed semaphore means the runtime is shutting down.
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };

            let outcome = match resolver
                .resolve(element_id, session, &target_dir, disambiguate)
                .await
            {
                Ok(Resolution::Materialized(Materialized::Written { path, bytes })) => {
                    info!(path = %path.display(), bytes, "file materialized");
                    ResolutionOutcome::Materialized
                }
                Ok(Resolution::Materialized(Materialized::SkippedExisting { path })) => {
                    debug!(path = %path.display(), "existing file kept");
                    ResolutionOutcome::SkippedExisting
                }
                Ok(Resolution::Unsupported) => ResolutionOutcome::Unsupported,
                Err(error) => {
                    warn!(element_id, error = %error, "file resolution failed");
                    ResolutionOutcome::Failed
                }
            };

            // A dropped receiver only means the run is being torn down.
            let _ = outcome_tx.send(outcome);
        });
    }
}

/// Mirrors one course: traverses its root folder and drains the resolution
/// pool, returning the aggregated outcome counts.
///
/// The completion channel closes once the traversal has returned and every
/// dispatched task has reported, so the drain loop is also the barrier that
/// keeps a course's downloads from outliving its stats.
pub async fn mirror_course(
    fetcher: Arc<PageFetcher>,
    resolver: Arc<ResourceResolver>,
    config: Arc<MirrorConfig>,
    session: &SessionContext,
    course: &Course,
) -> MirrorStats {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let traverser = Traverser::new(fetcher, resolver, Arc::clone(&config), outcome_tx);

    let root_ref = course_root_reference(course.id);
    let root_path = config.download_root.join(sanitize_name(&course.title));
    info!(course = %course.title, path = %root_path.display(), "mirroring course");

    traverser.mirror_root(&root_ref, session, &root_path).await;
    // Dropping the traverser drops the last non-task sender; the channel
    // closes when the final dispatched resolution reports.
    drop(traverser);

    let stats = MirrorStats::new();
    while let Some(outcome) = outcome_rx.recv().await {
        stats.record(outcome);
    }
    stats
}

/// The portal-relative reference of a course's root folder.
fn course_root_reference(course_id: u64) -> String {
    format!("/Folder/processfolder.aspx?FolderID={course_id}")
}

/// Derives a folder's local directory name, appending the folder id when
/// sibling folders share a display name.
fn folder_local_name(title: &str, folder_ref: &str, disambiguate: bool) -> String {
    let name = sanitize_name(title);
    if !disambiguate {
        return name;
    }
    if let Some(folder_id) = folder_id_from_url(folder_ref) {
        return format!("{name} [{folder_id}]");
    }
    warn!(folder = %name, "duplicate folder name without FolderID; keeping plain name");
    name
}

/// Flags every entry whose display name is shared with another sibling.
fn mark_duplicates(entries: &[ResourceEntry]) -> Vec<bool> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.name.as_str()).or_default() += 1;
    }
    entries
        .iter()
        .map(|entry| counts.get(entry.name.as_str()).copied().unwrap_or(0) > 1)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(name: &str, href: &str) -> ResourceEntry {
        classify_entry(RawEntry {
            name: name.to_string(),
            href: href.to_string(),
        })
    }

    #[test]
    fn test_mark_duplicates_flags_shared_names_only() {
        let entries = vec![
            entry("Notes", "/Folder/processfolder.aspx?FolderID=482"),
            entry("Notes", "/Folder/processfolder.aspx?FolderID=483"),
            entry("Syllabus", "/Folder/processfolder.aspx?FolderID=484"),
        ];
        assert_eq!(mark_duplicates(&entries), vec![true, true, false]);
    }

    #[test]
    fn test_mark_duplicates_spans_entry_kinds() {
        // A folder and a file with the same display name still collide on
        // disk, so both are flagged.
        let entries = vec![
            entry("Report", "/Folder/processfolder.aspx?FolderID=1"),
            entry(
                "Report",
                "/LearningToolElement/ViewLearningToolElement.aspx?LearningToolElementId=2",
            ),
        ];
        assert_eq!(mark_duplicates(&entries), vec![true, true]);
    }

    #[test]
    fn test_folder_local_name_plain() {
        assert_eq!(
            folder_local_name("Notes", "/Folder/processfolder.aspx?FolderID=482", false),
            "Notes"
        );
    }

    #[test]
    fn test_folder_local_name_disambiguated_appends_folder_id() {
        assert_eq!(
            folder_local_name("Notes", "/Folder/processfolder.aspx?FolderID=482", true),
            "Notes [482]"
        );
    }

    #[test]
    fn test_folder_local_name_sanitizes_title() {
        assert_eq!(
            folder_local_name("A/B", "/Folder/processfolder.aspx?FolderID=9", false),
            "A_B"
        );
    }

    #[test]
    fn test_course_root_reference_format() {
        assert_eq!(
            course_root_reference(1205),
            "/Folder/processfolder.aspx?FolderID=1205"
        );
    }

    #[test]
    fn test_stats_record_and_total() {
        let stats = MirrorStats::new();
        stats.record(ResolutionOutcome::Materialized);
        stats.record(ResolutionOutcome::Materialized);
        stats.record(ResolutionOutcome::SkippedExisting);
        stats.record(ResolutionOutcome::Unsupported);
        stats.record(ResolutionOutcome::Failed);

        assert_eq!(stats.materialized(), 2);
        assert_eq!(stats.skipped_existing(), 1);
        assert_eq!(stats.unsupported(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_stats_absorb_accumulates() {
        let totals = MirrorStats::new();
        let course = MirrorStats::new();
        course.record(ResolutionOutcome::Materialized);
        course.record(ResolutionOutcome::Failed);

        totals.absorb(&course);
        totals.absorb(&course);
        assert_eq!(totals.materialized(), 2);
        assert_eq!(totals.failed(), 2);
    }
}

//! Resource entry classification.
//!
//! Entry kind is inferred from a URL path prefix convention: folder links
//! live under `/Folder`, file elements under `/LearningToolElement`.
//! Anything else is a resource kind the mirror does not traverse.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::scrape::RawEntry;

/// Path prefix identifying folder references.
pub const FOLDER_PATH_PREFIX: &str = "/Folder";

/// Path prefix identifying file element references.
pub const ELEMENT_PATH_PREFIX: &str = "/LearningToolElement";

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static ELEMENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"LearningToolElementId=(\d+)"));

static FOLDER_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"FolderID=(\d+)"));

/// The kind of a folder entry, inferred from its reference URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A nested folder to recurse into.
    Folder,
    /// A file element with its numeric element id.
    File {
        /// The `LearningToolElementId` extracted from the reference URL.
        element_id: u64,
    },
    /// A resource kind the mirror does not handle (logged and skipped).
    Unknown,
}

/// One classified entry of a folder listing.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// The entry's display text (not yet sanitized).
    pub name: String,
    /// The entry's reference URL.
    pub href: String,
    /// The inferred kind.
    pub kind: EntryKind,
}

/// Classifies a raw folder entry by its reference URL.
#[must_use]
pub fn classify_entry(raw: RawEntry) -> ResourceEntry {
    let kind = classify_reference(&raw.href);
    ResourceEntry {
        name: raw.name,
        href: raw.href,
        kind,
    }
}

fn classify_reference(href: &str) -> EntryKind {
    let path = reference_path(href);
    if path.starts_with(FOLDER_PATH_PREFIX) {
        return EntryKind::Folder;
    }
    if path.starts_with(ELEMENT_PATH_PREFIX) {
        // A file reference without a parseable element id cannot be
        // resolved; treat it as an unknown kind rather than failing.
        return element_id_from_url(href).map_or(EntryKind::Unknown, |element_id| EntryKind::File {
            element_id,
        });
    }
    EntryKind::Unknown
}

/// Extracts the URL path of `href`, which may be absolute or portal-relative.
fn reference_path(href: &str) -> String {
    if let Ok(url) = Url::parse(href) {
        return url.path().to_string();
    }
    href.split(['?', '#']).next().unwrap_or(href).to_string()
}

/// Extracts the numeric `LearningToolElementId` from a file reference URL.
#[must_use]
pub fn element_id_from_url(href: &str) -> Option<u64> {
    ELEMENT_ID_RE
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extracts the numeric `FolderID` from a folder reference URL.
#[must_use]
pub fn folder_id_from_url(href: &str) -> Option<u64> {
    FOLDER_ID_RE
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw(name: &str, href: &str) -> RawEntry {
        RawEntry {
            name: name.to_string(),
            href: href.to_string(),
        }
    }

    #[test]
    fn test_classify_folder_reference() {
        let entry = classify_entry(raw("Notes", "/Folder/processfolder.aspx?FolderID=482"));
        assert_eq!(entry.kind, EntryKind::Folder);
    }

    #[test]
    fn test_classify_file_reference_extracts_element_id() {
        let entry = classify_entry(raw(
            "Slides",
            "/LearningToolElement/ViewLearningToolElement.aspx?LearningToolElementId=9173",
        ));
        assert_eq!(entry.kind, EntryKind::File { element_id: 9173 });
    }

    #[test]
    fn test_classify_absolute_url_uses_path() {
        let entry = classify_entry(raw(
            "Notes",
            "https://school.example.com/Folder/processfolder.aspx?FolderID=5",
        ));
        assert_eq!(entry.kind, EntryKind::Folder);
    }

    #[test]
    fn test_classify_other_prefix_is_unknown() {
        let entry = classify_entry(raw("Quiz", "/Quiz/take.aspx?QuizId=7"));
        assert_eq!(entry.kind, EntryKind::Unknown);
    }

    #[test]
    fn test_classify_file_reference_without_id_is_unknown() {
        let entry = classify_entry(raw("Broken", "/LearningToolElement/ViewLearningToolElement.aspx"));
        assert_eq!(entry.kind, EntryKind::Unknown);
    }

    #[test]
    fn test_folder_id_from_url() {
        assert_eq!(
            folder_id_from_url("/Folder/processfolder.aspx?FolderID=482"),
            Some(482)
        );
        assert_eq!(folder_id_from_url("/Folder/processfolder.aspx"), None);
    }
}

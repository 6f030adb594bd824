//! Filesystem-safe name derivation for portal display text.
//!
//! Folder titles and file names arrive as HTML text content, so they may
//! carry character entities and characters that are illegal (or merely
//! hazardous) in directory and file names. [`sanitize_name`] normalizes both.

/// Characters replaced with `_` in local names.
///
/// Covers the union of Windows-reserved characters and the path separators
/// of every platform the mirror writes to, plus braces (the portal uses them
/// in template placeholders that occasionally leak into display names).
const FORBIDDEN_CHARS: [char; 11] = ['/', '\\', '|', '"', ':', '?', '*', '<', '>', '{', '}'];

/// Derives a filesystem-safe name from raw portal display text.
///
/// Decodes HTML character entities, trims surrounding whitespace, and
/// replaces every character in [`FORBIDDEN_CHARS`] with `_`. The result is
/// never empty: fully-forbidden or blank input maps to `"_"` so a path
/// segment always exists.
///
/// The function is pure and idempotent: `sanitize_name(&sanitize_name(x))`
/// equals `sanitize_name(x)`.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let cleaned: String = decoded
        .trim()
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

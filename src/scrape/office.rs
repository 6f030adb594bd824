//! Script-embedded value extraction for the office-document preview flow.
//!
//! The preview page hosts an auto-submitting form that posts the viewer
//! session to the office frontend. The payload URL is never present as a
//! plain link; it has to be reassembled from three values embedded in the
//! page text:
//!
//! - the form action: `<form id="office_form" ... action="...">`
//! - the access token: `<input ... name="access_token" ... value="...">`
//! - the token TTL: `<input ... name="access_token_ttl" ... value="...">`
//!
//! The form action carries a `WOPISrc` query parameter whose value is the
//! content URL with `:` and `/` escaped as `\x253a` and `\x252f`. These exact
//! literals are the contract with the remote page revision; the fixtures in
//! the tests below pin them down. When the portal upgrades its office
//! integration, this module is the blast radius.

use std::sync::LazyLock;

use regex::Regex;

use super::ParseError;

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static FORM_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<form\s+[^>]*\bid="office_form"[^>]*\baction="([^"]+)""#)
});

static ACCESS_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<input\s+[^>]*\bname="access_token"[^>]*\bvalue="([^"]+)""#)
});

static TOKEN_TTL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<input\s+[^>]*\bname="access_token_ttl"[^>]*\bvalue="(\d+)""#)
});

/// The three values embedded in a preview page.
#[derive(Debug)]
pub struct OfficeEmbed {
    /// The viewer form's action URL, carrying the `WOPISrc` parameter.
    pub form_action: String,
    /// The access token that is the sole credential for the payload fetch.
    pub access_token: String,
    /// Token time-to-live in milliseconds. Captured for completeness;
    /// nothing consumes it yet.
    pub token_ttl: u64,
}

/// Extracts the viewer form action, access token, and token TTL from the raw
/// preview page text.
///
/// # Errors
///
/// Returns [`ParseError::PatternNotFound`] naming whichever pattern missed.
pub fn extract_office_embed(page_text: &str) -> Result<OfficeEmbed, ParseError> {
    let form_action = capture(page_text, &FORM_ACTION_RE, "office_form action")?;
    let access_token = capture(page_text, &ACCESS_TOKEN_RE, "access_token input")?;
    let ttl_text = capture(page_text, &TOKEN_TTL_RE, "access_token_ttl input")?;

    // The TTL regex only admits digits; a parse failure means the value
    // exceeds u64, which is equally a page-schema violation.
    let token_ttl = ttl_text
        .parse::<u64>()
        .map_err(|_| ParseError::PatternNotFound {
            pattern: "access_token_ttl input",
        })?;

    Ok(OfficeEmbed {
        form_action,
        access_token,
        token_ttl,
    })
}

/// Derives the file's content URL from the viewer form action.
///
/// Extracts the `WOPISrc` query parameter and un-escapes the two encoded
/// sequences the page uses: `\x253a` -> `:` and `\x252f` -> `/`.
///
/// # Errors
///
/// Returns [`ParseError::PatternNotFound`] when the action carries no
/// `WOPISrc` parameter.
pub fn content_url(form_action: &str) -> Result<String, ParseError> {
    let raw = form_action
        .split_once("WOPISrc=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
        .ok_or(ParseError::PatternNotFound {
            pattern: "WOPISrc query parameter",
        })?;

    Ok(raw.replace("\\x253a", ":").replace("\\x252f", "/"))
}

/// Constructs the final payload URL for an office preview document.
///
/// # Errors
///
/// Returns [`ParseError::PatternNotFound`] when the form action carries no
/// `WOPISrc` parameter.
pub fn download_url(embed: &OfficeEmbed) -> Result<String, ParseError> {
    let content = content_url(&embed.form_action)?;
    Ok(format!(
        "{content}/contents?access_token={token}",
        token = embed.access_token
    ))
}

fn capture(
    text: &str,
    regex: &Regex,
    pattern: &'static str,
) -> Result<String, ParseError> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or(ParseError::PatternNotFound { pattern })
}

//! Typed accessors over the portal's server-rendered pages.
//!
//! The portal exposes no API for folder contents; everything is scraped from
//! a fixed page schema. Every expected-element lookup returns an explicit
//! [`ParseError`] instead of faulting, so one malformed page aborts one item
//! and never the traversal.
//!
//! Parsing is synchronous over owned HTML strings: `scraper::Html` is not
//! `Send`, so documents are parsed and dropped before the caller's next
//! `await` point.
//!
//! Attribute values come back from the HTML parser with character entities
//! already decoded exactly once (`href="/x&amp;y"` yields `/x&y`); nothing
//! here decodes a second time.

pub mod office;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use thiserror::Error;

/// Title element present on folder and element view pages.
const PAGE_TITLE_SELECTOR: &str = "span#ctl00_PageHeader_TT";

/// Entry anchors inside a folder listing.
const ENTRY_LINK_SELECTOR: &str = "a.ccl-iconlink";

/// Content frame on an element view page.
const VIEW_FRAME_SELECTOR: &str = "iframe#ctl00_ContentPlaceHolder_ExtensionIframe";

/// Direct-download anchor on a delivery page.
const DOWNLOAD_ANCHOR_SELECTOR: &str = "a#ctl00_ctl00_MainFormContent_DownloadLinkForViewType";

/// Office preview frame on a delivery page.
const PREVIEW_FRAME_SELECTOR: &str = "iframe#office_frame";

/// Compiles a selector at static init; panics on an invalid pattern.
fn compile_static_selector(selector: &'static str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

static PAGE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(PAGE_TITLE_SELECTOR));
static ENTRY_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(ENTRY_LINK_SELECTOR));
static VIEW_FRAME: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(VIEW_FRAME_SELECTOR));
static DOWNLOAD_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(DOWNLOAD_ANCHOR_SELECTOR));
static PREVIEW_FRAME: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(PREVIEW_FRAME_SELECTOR));

/// Errors raised when an expected element or pattern is absent from a page.
#[derive(Debug, Error)]
pub enum ParseError {
    /// An element the page schema requires was not found.
    #[error("expected element not found: {selector}")]
    ElementNotFound {
        /// The CSS selector that matched nothing.
        selector: &'static str,
    },

    /// A required attribute was missing from a matched element.
    #[error("element {selector} is missing attribute '{attribute}'")]
    AttributeMissing {
        /// The CSS selector of the element.
        selector: &'static str,
        /// The attribute that was absent.
        attribute: &'static str,
    },

    /// A script-embedded value pattern matched nothing in the page text.
    #[error("pattern not found in page text: {pattern}")]
    PatternNotFound {
        /// Description of the pattern that missed.
        pattern: &'static str,
    },
}

/// A parsed folder listing page.
#[derive(Debug)]
pub struct FolderPage {
    /// The folder's own display name, as raw text (not yet sanitized).
    pub title: String,
    /// Entries in document order.
    pub entries: Vec<RawEntry>,
}

/// One entry anchor from a folder listing, before kind classification.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// The entry's display text.
    pub name: String,
    /// The entry's reference URL (typically portal-relative).
    pub href: String,
}

/// A parsed element view page.
#[derive(Debug)]
pub struct ViewPage {
    /// The file's display name, as raw text (not yet sanitized).
    pub title: String,
    /// The embedded content frame's source URL.
    pub frame_src: String,
}

/// The delivery mechanism a platform page exposes for one file.
#[derive(Debug)]
pub enum DeliveryPage {
    /// A direct-download anchor: resource-relative `href` plus the literal
    /// target file name from the anchor's `Download` attribute.
    Download {
        /// The anchor's `href`, entity-decoded once by the parser.
        href: String,
        /// The literal target file name.
        file_name: String,
    },
    /// An office-document preview frame whose page embeds the payload URL.
    Preview {
        /// The preview frame's source URL.
        frame_src: String,
    },
    /// Neither marker is present: a resource kind the mirror does not
    /// support (external link, quiz, ...). Expected and non-fatal.
    Unsupported,
}

/// Parses a folder listing page into its title and entries.
///
/// # Errors
///
/// Returns [`ParseError::ElementNotFound`] when the title element is absent.
/// Entry anchors without an `href` are skipped rather than fatal; a folder
/// with zero entries is a valid, empty page.
pub fn parse_folder_page(html: &str) -> Result<FolderPage, ParseError> {
    let document = Html::parse_document(html);

    let title = select_text(&document, &PAGE_TITLE, PAGE_TITLE_SELECTOR)?;

    let entries = document
        .select(&ENTRY_LINK)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.to_string();
            let name = element_text(&anchor);
            Some(RawEntry { name, href })
        })
        .collect();

    Ok(FolderPage { title, entries })
}

/// Parses an element view page into the display name and frame source.
///
/// # Errors
///
/// Returns [`ParseError::ElementNotFound`] when the title or frame element is
/// absent, and [`ParseError::AttributeMissing`] when the frame has no `src`.
pub fn parse_view_page(html: &str) -> Result<ViewPage, ParseError> {
    let document = Html::parse_document(html);

    let title = select_text(&document, &PAGE_TITLE, PAGE_TITLE_SELECTOR)?;
    let frame_src = select_attr(&document, &VIEW_FRAME, VIEW_FRAME_SELECTOR, "src")?;

    Ok(ViewPage { title, frame_src })
}

/// Inspects a platform delivery page for exactly one of the two delivery
/// markers.
///
/// The absence of both markers is not an error: it is the
/// [`DeliveryPage::Unsupported`] outcome.
///
/// # Errors
///
/// Returns [`ParseError::AttributeMissing`] when a present marker lacks its
/// required attribute (`href`/`Download` on the anchor, `src` on the frame).
pub fn parse_delivery_page(html: &str) -> Result<DeliveryPage, ParseError> {
    let document = Html::parse_document(html);

    if let Some(anchor) = document.select(&DOWNLOAD_ANCHOR).next() {
        let href = anchor
            .value()
            .attr("href")
            .ok_or(ParseError::AttributeMissing {
                selector: DOWNLOAD_ANCHOR_SELECTOR,
                attribute: "href",
            })?
            .to_string();
        // The HTML parser lowercases attribute names: `Download` arrives as
        // `download`.
        let file_name = anchor
            .value()
            .attr("download")
            .ok_or(ParseError::AttributeMissing {
                selector: DOWNLOAD_ANCHOR_SELECTOR,
                attribute: "Download",
            })?
            .to_string();
        return Ok(DeliveryPage::Download { href, file_name });
    }

    if let Some(frame) = document.select(&PREVIEW_FRAME).next() {
        let frame_src = frame
            .value()
            .attr("src")
            .ok_or(ParseError::AttributeMissing {
                selector: PREVIEW_FRAME_SELECTOR,
                attribute: "src",
            })?
            .to_string();
        return Ok(DeliveryPage::Preview { frame_src });
    }

    Ok(DeliveryPage::Unsupported)
}

/// Returns the trimmed text content of the first element matching `selector`.
fn select_text(
    document: &Html,
    selector: &Selector,
    selector_str: &'static str,
) -> Result<String, ParseError> {
    document
        .select(selector)
        .next()
        .map(|element| element_text(&element))
        .ok_or(ParseError::ElementNotFound {
            selector: selector_str,
        })
}

/// Returns an attribute of the first element matching `selector`.
fn select_attr(
    document: &Html,
    selector: &Selector,
    selector_str: &'static str,
    attribute: &'static str,
) -> Result<String, ParseError> {
    let element = document
        .select(selector)
        .next()
        .ok_or(ParseError::ElementNotFound {
            selector: selector_str,
        })?;
    element
        .value()
        .attr(attribute)
        .map(ToString::to_string)
        .ok_or(ParseError::AttributeMissing {
            selector: selector_str,
            attribute,
        })
}

fn element_text(element: &scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FOLDER_HTML: &str = r#"
        <html><body>
        <span id="ctl00_PageHeader_TT">Week 3 Materials</span>
        <ul>
          <li><a class="ccl-iconlink" href="/Folder/processfolder.aspx?FolderID=482">Notes</a></li>
          <li><a class="ccl-iconlink" href="/LearningToolElement/ViewLearningToolElement.aspx?LearningToolElementId=91">Slides</a></li>
          <li><a class="other" href="/ignored">Decoy</a></li>
        </ul>
        </body></html>"#;

    #[test]
    fn test_parse_folder_page_title_and_entries() {
        let page = parse_folder_page(FOLDER_HTML).unwrap();
        assert_eq!(page.title, "Week 3 Materials");
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].name, "Notes");
        assert_eq!(
            page.entries[0].href,
            "/Folder/processfolder.aspx?FolderID=482"
        );
        assert_eq!(page.entries[1].name, "Slides");
    }

    #[test]
    fn test_parse_folder_page_empty_listing_is_valid() {
        let html = r#"<span id="ctl00_PageHeader_TT">Empty</span>"#;
        let page = parse_folder_page(html).unwrap();
        assert!(page.entries.is_empty());
    }

    #[test]
    fn test_parse_folder_page_missing_title_is_parse_error() {
        let error = parse_folder_page("<html><body></body></html>").unwrap_err();
        assert!(matches!(error, ParseError::ElementNotFound { .. }));
        assert!(error.to_string().contains("ctl00_PageHeader_TT"));
    }

    #[test]
    fn test_parse_view_page_extracts_title_and_frame() {
        let html = r#"
            <span id="ctl00_PageHeader_TT">Lecture 4</span>
            <iframe id="ctl00_ContentPlaceHolder_ExtensionIframe"
                    src="https://platform.example.com/handoff?id=9&amp;v=2"></iframe>"#;
        let page = parse_view_page(html).unwrap();
        assert_eq!(page.title, "Lecture 4");
        // Entities decoded once by the parser, not twice.
        assert_eq!(page.frame_src, "https://platform.example.com/handoff?id=9&v=2");
    }

    #[test]
    fn test_parse_view_page_missing_frame_is_parse_error() {
        let html = r#"<span id="ctl00_PageHeader_TT">Lecture 4</span>"#;
        let error = parse_view_page(html).unwrap_err();
        assert!(matches!(error, ParseError::ElementNotFound { .. }));
    }

    #[test]
    fn test_parse_delivery_page_download_anchor() {
        let html = r#"
            <a id="ctl00_ctl00_MainFormContent_DownloadLinkForViewType"
               href="/x&amp;y" Download="report.pdf">Download</a>"#;
        let delivery = parse_delivery_page(html).unwrap();
        match delivery {
            DeliveryPage::Download { href, file_name } => {
                assert_eq!(href, "/x&y");
                assert_eq!(file_name, "report.pdf");
            }
            other => panic!("expected Download, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_delivery_page_preview_frame() {
        let html = r#"<iframe id="office_frame" src="/preview/42"></iframe>"#;
        let delivery = parse_delivery_page(html).unwrap();
        assert!(matches!(delivery, DeliveryPage::Preview { ref frame_src } if frame_src == "/preview/42"));
    }

    #[test]
    fn test_parse_delivery_page_anchor_takes_precedence_over_frame() {
        let html = r#"
            <a id="ctl00_ctl00_MainFormContent_DownloadLinkForViewType"
               href="/f" Download="f.bin">Download</a>
            <iframe id="office_frame" src="/preview/42"></iframe>"#;
        assert!(matches!(
            parse_delivery_page(html).unwrap(),
            DeliveryPage::Download { .. }
        ));
    }

    #[test]
    fn test_parse_delivery_page_neither_marker_is_unsupported() {
        let delivery = parse_delivery_page("<p>External link content</p>").unwrap();
        assert!(matches!(delivery, DeliveryPage::Unsupported));
    }

    #[test]
    fn test_parse_delivery_page_anchor_without_download_attr_is_parse_error() {
        let html = r#"<a id="ctl00_ctl00_MainFormContent_DownloadLinkForViewType" href="/f">x</a>"#;
        let error = parse_delivery_page(html).unwrap_err();
        assert!(matches!(
            error,
            ParseError::AttributeMissing {
                attribute: "Download",
                ..
            }
        ));
    }
}

//! Course enumeration via the portal's personal-courses REST endpoint.
//!
//! This is the one place the portal offers JSON instead of server-rendered
//! HTML. The endpoint pages its results; listing follows `PageIndex` until a
//! short page.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::auth::session::{AuthDomain, SessionContext};
use crate::config::MirrorConfig;
use crate::fetch::{FetchError, PageFetcher};

const COURSES_PATH: &str = "/restapi/personal/courses/v1";
const PAGE_SIZE: usize = 100;

/// One course the authenticated user is enrolled in.
///
/// The course id doubles as the id of the course's root folder, which is how
/// the traversal seeds itself.
#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    /// The course's display title.
    #[serde(rename = "Title")]
    pub title: String,
    /// The course's numeric identifier.
    #[serde(rename = "CourseId")]
    pub id: u64,
}

#[derive(Debug, Deserialize)]
struct CoursePage {
    #[serde(rename = "EntityArray")]
    entities: Vec<Course>,
}

/// Errors that can occur while listing courses.
#[derive(Debug, Error)]
pub enum CourseListError {
    /// The course endpoint could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The payload did not match the expected shape.
    #[error("course list payload could not be deserialized: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Lists all courses of the authenticated user.
///
/// # Errors
///
/// Returns [`CourseListError`] when the endpoint cannot be fetched or its
/// payload cannot be deserialized. Course listing failure is fatal to the
/// run: without it there is nothing to traverse.
#[instrument(skip(fetcher, config, session))]
pub async fn list_courses(
    fetcher: &PageFetcher,
    config: &MirrorConfig,
    session: &SessionContext,
) -> Result<Vec<Course>, CourseListError> {
    let cookie = session.cookie_header(&[AuthDomain::Portal]);
    let mut courses = Vec::new();

    for page_index in 0.. {
        let url = config.portal_url(&format!(
            "{COURSES_PATH}?PageIndex={page_index}&PageSize={PAGE_SIZE}"
        ));
        let page = fetcher.fetch_page(&url, Some(&cookie)).await?;
        let parsed: CoursePage =
            serde_json::from_str(&page.body).map_err(CourseListError::Payload)?;

        let count = parsed.entities.len();
        courses.extend(parsed.entities);
        debug!(page_index, count, "course page listed");

        if count < PAGE_SIZE {
            break;
        }
    }

    Ok(courses)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_course_page_deserializes_portal_payload() {
        let payload = r#"{
            "EntityArray": [
                { "Title": "Algebra II", "CourseId": 1205 },
                { "Title": "History &amp; Society", "CourseId": 88 }
            ],
            "Total": 2,
            "CurrentPageIndex": 0
        }"#;
        let page: CoursePage = serde_json::from_str(payload).unwrap();
        assert_eq!(page.entities.len(), 2);
        assert_eq!(page.entities[0].title, "Algebra II");
        assert_eq!(page.entities[0].id, 1205);
    }

    #[test]
    fn test_course_page_empty_array() {
        let page: CoursePage = serde_json::from_str(r#"{ "EntityArray": [] }"#).unwrap();
        assert!(page.entities.is_empty());
    }
}

//! Page extraction: turning fetched HTML into the fields the crawl needs.
//!
//! The crawl depends only on the [`PageExtractor`] trait - track URLs from
//! the library index, `{title, description, lesson hrefs}` from a track
//! page, `{title, description, media}` from a lesson page. The selector
//! rules that query the site's markup live behind it in
//! [`HtmlExtractor`], so they can evolve (or be stubbed in tests) without
//! touching the crawl.

use scraper::{Html, Selector};
use thiserror::Error;

use crate::catalog::Track;

/// A media reference as it appears on a lesson page. The href may still be
/// host-relative; resolution to an absolute URL happens during the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub name: String,
    pub href: String,
}

/// Fields extracted from one lesson page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonPage {
    pub title: String,
    pub description: String,
    /// Media references in page order.
    pub media: Vec<MediaRef>,
}

/// Errors from page extraction. Any extraction failure is fatal to the
/// crawl: a page that no longer matches the expected markup means the
/// catalog cannot be trusted.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A required element was not found on the page.
    #[error("{page} page is missing required element `{selector}`")]
    MissingElement {
        /// Which page kind was being extracted.
        page: &'static str,
        /// The selector that matched nothing.
        selector: &'static str,
    },
}

/// Extraction contract between the crawl and the site's markup.
pub trait PageExtractor: Send + Sync {
    /// Extracts track page URLs from the library index, in page order,
    /// first occurrence winning on duplicates.
    fn library_track_hrefs(&self, body: &str) -> Vec<String>;

    /// Extracts title, description, and ordered lesson hrefs from a track
    /// page.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingElement`] when the page lacks a
    /// required element.
    fn track_page(&self, body: &str) -> Result<Track, ExtractError>;

    /// Extracts title, description, and ordered media references from a
    /// lesson page.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingElement`] when the page lacks a
    /// required element.
    fn lesson_page(&self, body: &str) -> Result<LessonPage, ExtractError>;
}

// Markup contract with the site. Kept together so a site redesign is a
// one-screen review.
const LIBRARY_TRACK_LINKS: &str = "ul.tracks a[href]";
const TRACK_TITLE: &str = "h1.track-title";
const TRACK_DESCRIPTION: &str = "div.track-description";
const TRACK_LESSON_LINKS: &str = "ol.lessons a[href]";
const LESSON_TITLE: &str = "h1.lesson-title";
const LESSON_DESCRIPTION: &str = "div.lesson-description";
const LESSON_MEDIA_LINKS: &str = "ul.downloads a[href]";

/// CSS-selector implementation of [`PageExtractor`] for the site's markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    /// Creates the extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PageExtractor for HtmlExtractor {
    fn library_track_hrefs(&self, body: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        let mut seen = std::collections::HashSet::new();
        document
            .select(&selector(LIBRARY_TRACK_LINKS))
            .filter_map(|element| element.value().attr("href"))
            .filter(|href| !href.is_empty())
            .filter(|href| seen.insert((*href).to_string()))
            .map(str::to_string)
            .collect()
    }

    fn track_page(&self, body: &str) -> Result<Track, ExtractError> {
        let document = Html::parse_document(body);

        let title = required_text(&document, "track", TRACK_TITLE)?;
        let description = optional_text(&document, TRACK_DESCRIPTION);
        let lesson_hrefs = document
            .select(&selector(TRACK_LESSON_LINKS))
            .filter_map(|element| element.value().attr("href"))
            .filter(|href| !href.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Track {
            title,
            description,
            lesson_hrefs,
        })
    }

    fn lesson_page(&self, body: &str) -> Result<LessonPage, ExtractError> {
        let document = Html::parse_document(body);

        let title = required_text(&document, "lesson", LESSON_TITLE)?;
        let description = optional_text(&document, LESSON_DESCRIPTION);
        let media = document
            .select(&selector(LESSON_MEDIA_LINKS))
            .filter_map(|element| {
                let href = element.value().attr("href")?;
                if href.is_empty() {
                    return None;
                }
                let text = element.text().collect::<String>();
                let text = text.trim();
                let name = if text.is_empty() { href } else { text };
                Some(MediaRef {
                    name: name.to_string(),
                    href: href.to_string(),
                })
            })
            .collect();

        Ok(LessonPage {
            title,
            description,
            media,
        })
    }
}

/// Parses a compile-time selector.
#[allow(clippy::expect_used)]
fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn required_text(
    document: &Html,
    page: &'static str,
    css: &'static str,
) -> Result<String, ExtractError> {
    document
        .select(&selector(css))
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .ok_or(ExtractError::MissingElement {
            page,
            selector: css,
        })
}

/// Missing descriptions are tolerated as empty, not fatal.
fn optional_text(document: &Html, css: &'static str) -> String {
    document
        .select(&selector(css))
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

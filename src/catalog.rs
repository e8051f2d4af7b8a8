//! Catalog data model and manifest serialization.
//!
//! The crawl phase produces a manifest - an ordered sequence of
//! [`ResolvedTrack`] - and the download phase consumes it. The manifest is
//! the only bridge between the two phases: it is serialized once, read
//! back fresh, and never re-derived from the network, so downloads can be
//! retried, inspected, or edited offline without re-authenticating.
//!
//! Ordering everywhere in this model is load-bearing: track order follows
//! the library index, lesson order follows the track page, media order
//! follows the lesson page. Destination filenames are generated from these
//! positions, so reordering entries changes where files land on disk.

use serde::{Deserialize, Serialize};

/// One downloadable artifact referenced by a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Display name from the lesson page.
    pub name: String,
    /// Absolute URL of the file. Relative hrefs are resolved against the
    /// run's host before they reach the manifest.
    pub href: String,
}

/// A unit of content within a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    pub description: String,
    /// Media in page-of-origin order.
    pub media: Vec<Media>,
}

/// Intermediate form of a track: lesson pages discovered but not yet
/// fetched. Never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub description: String,
    /// Lesson page URLs in track-page order.
    pub lesson_hrefs: Vec<String>,
}

/// Final, persisted form of a track. The manifest is an ordered
/// `Vec<ResolvedTrack>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    pub title: String,
    pub description: String,
    /// Lessons in track-page order.
    pub lessons: Vec<Lesson>,
}

/// Encodes a manifest as pretty-printed JSON.
///
/// Pretty output is deliberate: the manifest is meant to be inspected and
/// hand-edited between the crawl and download phases.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if encoding fails.
pub fn encode_manifest(tracks: &[ResolvedTrack]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(tracks)
}

/// Decodes a manifest previously produced by [`encode_manifest`].
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if the input is not a valid manifest.
pub fn decode_manifest(input: &str) -> Result<Vec<ResolvedTrack>, serde_json::Error> {
    serde_json::from_str(input)
}

//! Download planning: flattening a manifest into destination/source pairs.
//!
//! Planning is a pure function - no I/O, no network. Given the same
//! manifest and destination root it always yields the same task list, so
//! a re-run after a partial download maps every file to the same place
//! and the executor's existence check can skip completed work.
//!
//! Filename scheme: `<NN>__<basename>` inside a per-track directory,
//! where `NN` is the 1-based, zero-padded lesson position. The ordinal
//! makes filenames sort in lesson order on disk and keeps two lessons
//! with identically named media from colliding.

use std::path::{Path, PathBuf};

use url::Url;

use crate::catalog::ResolvedTrack;

/// Fallback directory name for a track whose title sanitizes to nothing.
const UNTITLED_TRACK: &str = "untitled";

/// Fallback filename for a media URL with no usable path segment.
const FALLBACK_BASENAME: &str = "download";

/// One planned download: where to put it and where it comes from.
///
/// Derived, never persisted - recomputable from the manifest at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Final destination path for the file.
    pub destination: PathBuf,
    /// Absolute source URL.
    pub href: String,
}

/// Flattens a manifest into an ordered task list under `destination_root`.
///
/// Order is manifest order: tracks, then lessons within each track, then
/// media within each lesson.
#[must_use]
pub fn plan(manifest: &[ResolvedTrack], destination_root: &Path) -> Vec<DownloadTask> {
    let mut tasks = Vec::new();
    for track in manifest {
        let track_dir = destination_root.join(sanitize_path_component(&track.title));
        for (index, lesson) in track.lessons.iter().enumerate() {
            for media in &lesson.media {
                let filename = format!("{:02}__{}", index + 1, basename_of(&media.href));
                tasks.push(DownloadTask {
                    destination: track_dir.join(filename),
                    href: media.href.clone(),
                });
            }
        }
    }
    tasks
}

/// Makes a title or filename safe as a single path segment.
///
/// Path separators, shell-hostile punctuation, and control characters
/// become `_`; spaces and everything else survive, so titles stay
/// recognizable on disk.
#[must_use]
pub fn sanitize_path_component(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        UNTITLED_TRACK.to_string()
    } else {
        cleaned
    }
}

/// Extracts the percent-decoded basename of a URL's path.
fn basename_of(href: &str) -> String {
    let basename = Url::parse(href)
        .ok()
        .and_then(|url| {
            url.path_segments().and_then(|mut segments| {
                segments
                    .next_back()
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| {
                        urlencoding::decode(segment)
                            .map_or_else(|_| segment.to_string(), |decoded| decoded.into_owned())
                    })
            })
        })
        .unwrap_or_else(|| FALLBACK_BASENAME.to_string());
    sanitize_path_component(&basename)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{Lesson, Media};

    fn media(href: &str) -> Media {
        Media {
            name: "m".to_string(),
            href: href.to_string(),
        }
    }

    fn track(title: &str, lessons: Vec<Lesson>) -> ResolvedTrack {
        ResolvedTrack {
            title: title.to_string(),
            description: String::new(),
            lessons,
        }
    }

    fn lesson(media: Vec<Media>) -> Lesson {
        Lesson {
            title: "l".to_string(),
            description: String::new(),
            media,
        }
    }

    #[test]
    fn test_plan_two_media_in_one_lesson_share_ordinal() {
        // One track, one lesson, two media: both carry ordinal 01 and
        // differ by source basename.
        let manifest = vec![track(
            "Track Title",
            vec![lesson(vec![
                media("https://example.com/files/file1.ext"),
                media("https://example.com/files/file2.ext"),
            ])],
        )];

        let tasks = plan(&manifest, Path::new("/dest"));
        assert_eq!(
            tasks.iter().map(|t| t.destination.clone()).collect::<Vec<_>>(),
            vec![
                PathBuf::from("/dest/Track Title/01__file1.ext"),
                PathBuf::from("/dest/Track Title/01__file2.ext"),
            ]
        );
    }

    #[test]
    fn test_plan_ordinal_follows_lesson_position() {
        let manifest = vec![track(
            "T",
            vec![
                lesson(vec![media("https://example.com/a.mp3")]),
                lesson(vec![media("https://example.com/a.mp3")]),
            ],
        )];

        let tasks = plan(&manifest, Path::new("out"));
        // Same basename in different lessons: the ordinal disambiguates.
        assert_eq!(tasks[0].destination, PathBuf::from("out/T/01__a.mp3"));
        assert_eq!(tasks[1].destination, PathBuf::from("out/T/02__a.mp3"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let manifest = vec![
            track(
                "One",
                vec![lesson(vec![
                    media("https://example.com/x.pdf"),
                    media("https://example.com/y.pdf"),
                ])],
            ),
            track("Two", vec![lesson(vec![media("https://example.com/z.pdf")])]),
        ];

        let first = plan(&manifest, Path::new("/d"));
        let second = plan(&manifest, Path::new("/d"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_destinations_unique_across_whole_plan() {
        let manifest = vec![
            track(
                "Alpha",
                vec![
                    lesson(vec![
                        media("https://example.com/file.pdf"),
                        media("https://example.com/other/file2.pdf"),
                    ]),
                    lesson(vec![media("https://example.com/file.pdf")]),
                ],
            ),
            track("Beta", vec![lesson(vec![media("https://example.com/file.pdf")])]),
        ];

        let tasks = plan(&manifest, Path::new("/d"));
        let mut destinations: Vec<_> = tasks.iter().map(|t| &t.destination).collect();
        destinations.sort();
        destinations.dedup();
        assert_eq!(destinations.len(), tasks.len(), "duplicate destination");
    }

    #[test]
    fn test_plan_empty_manifest_is_empty() {
        assert!(plan(&[], Path::new("/d")).is_empty());
    }

    #[test]
    fn test_sanitize_keeps_spaces_replaces_unsafe() {
        assert_eq!(
            sanitize_path_component("Mixing / Mastering: Vol 1?"),
            "Mixing _ Mastering_ Vol 1_"
        );
        assert_eq!(sanitize_path_component("  Plain Title  "), "Plain Title");
    }

    #[test]
    fn test_sanitize_empty_title_falls_back() {
        assert_eq!(sanitize_path_component(""), "untitled");
        assert_eq!(sanitize_path_component("   "), "untitled");
    }

    #[test]
    fn test_basename_percent_decoded() {
        let manifest = vec![track(
            "T",
            vec![lesson(vec![media("https://example.com/files/My%20Song.mp3")])],
        )];
        let tasks = plan(&manifest, Path::new("d"));
        assert_eq!(tasks[0].destination, PathBuf::from("d/T/01__My Song.mp3"));
    }

    #[test]
    fn test_basename_fallback_for_bare_origin() {
        let manifest = vec![track("T", vec![lesson(vec![media("https://example.com/")])])];
        let tasks = plan(&manifest, Path::new("d"));
        assert_eq!(tasks[0].destination, PathBuf::from("d/T/01__download"));
    }

    #[test]
    fn test_basename_ignores_query_string() {
        let manifest = vec![track(
            "T",
            vec![lesson(vec![media("https://example.com/f.zip?token=abc")])],
        )];
        let tasks = plan(&manifest, Path::new("d"));
        assert_eq!(tasks[0].destination, PathBuf::from("d/T/01__f.zip"));
    }
}

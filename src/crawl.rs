//! Crawl resolver: walks Library → Track → Lesson → Media into a manifest.
//!
//! The crawl is all-or-nothing by design - any fetch or extraction failure
//! aborts the whole run and no partial manifest is emitted, since a
//! partial catalog is not a safe basis for later skip decisions.
//!
//! Fan-out here is deliberately uncapped: every track resolves
//! concurrently, and every lesson within every track resolves
//! concurrently, paced only by the shared rate limiter. This is the
//! opposite of the download phase, which additionally caps its worker
//! pool. Results are reassembled by position (`try_join_all` preserves
//! input order), never by completion order.

use futures_util::future::try_join_all;
use thiserror::Error;
use tracing::{info, instrument};

use crate::catalog::{Lesson, Media, ResolvedTrack};
use crate::extract::{ExtractError, PageExtractor};
use crate::session::{Session, SessionError};

/// Library index pages live under this path.
const LIBRARY_PATH_PREFIX: &str = "/library/";

/// Errors that abort a crawl. Both kinds are fatal to the run.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A page fetch failed.
    #[error("crawl fetch failed: {0}")]
    Fetch(#[from] SessionError),

    /// A fetched page did not match the expected markup.
    #[error("crawl extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Crawls the given library into an ordered sequence of resolved tracks.
///
/// Track order follows the library index; lesson and media order follow
/// their pages of origin. Media hrefs are resolved to absolute URLs
/// against the run's host before entering the result.
///
/// # Errors
///
/// Returns [`CrawlError`] on the first fetch or extraction failure; the
/// remaining in-flight page resolutions are dropped.
#[instrument(skip(session, extractor))]
pub async fn crawl(
    library_id: &str,
    session: &Session,
    extractor: &dyn PageExtractor,
) -> Result<Vec<ResolvedTrack>, CrawlError> {
    let index_path = format!("{LIBRARY_PATH_PREFIX}{library_id}");
    let body = session.fetch_page(&index_path).await?;
    let track_hrefs = extractor.library_track_hrefs(&body);
    info!(library = library_id, tracks = track_hrefs.len(), "library index fetched");

    let tracks = try_join_all(
        track_hrefs
            .iter()
            .map(|href| resolve_track(session, extractor, href)),
    )
    .await?;

    info!(tracks = tracks.len(), "crawl complete");
    Ok(tracks)
}

/// Fetches one track page and resolves all of its lessons concurrently.
async fn resolve_track(
    session: &Session,
    extractor: &dyn PageExtractor,
    href: &str,
) -> Result<ResolvedTrack, CrawlError> {
    let body = session.fetch_page(href).await?;
    let track = extractor.track_page(&body)?;
    info!(
        track = %track.title,
        lessons = track.lesson_hrefs.len(),
        "track discovered"
    );

    let lessons = try_join_all(
        track
            .lesson_hrefs
            .iter()
            .map(|href| resolve_lesson(session, extractor, href)),
    )
    .await?;

    Ok(ResolvedTrack {
        title: track.title,
        description: track.description,
        lessons,
    })
}

/// Fetches one lesson page, resolving each media href to an absolute URL.
async fn resolve_lesson(
    session: &Session,
    extractor: &dyn PageExtractor,
    href: &str,
) -> Result<Lesson, CrawlError> {
    let body = session.fetch_page(href).await?;
    let page = extractor.lesson_page(&body)?;
    info!(lesson = %page.title, media = page.media.len(), "lesson discovered");

    let media = page
        .media
        .into_iter()
        .map(|media_ref| {
            Ok(Media {
                name: media_ref.name,
                href: session.resolve(&media_ref.href)?.to_string(),
            })
        })
        .collect::<Result<Vec<_>, SessionError>>()?;

    Ok(Lesson {
        title: page.title,
        description: page.description,
        media,
    })
}

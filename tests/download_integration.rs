//! End-to-end download-phase tests: manifest in, files on disk out.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coursefetch_core::{
    Credentials, Lesson, Media, Outcome, RateLimiter, ResolvedTrack, RunReport, Session,
    decode_manifest, execute, plan,
};

async fn session_for(server: &MockServer) -> Session {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(server)
        .await;
    let credentials = Credentials::new("alice", "hunter2", server.uri());
    Session::login(&credentials, Arc::new(RateLimiter::new(1000)), "/dashboard")
        .await
        .unwrap()
}

async fn mount_file(server: &MockServer, at: &str, content_type: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", content_type)
                .set_body_bytes(body.to_vec()),
        )
        .mount(server)
        .await;
}

fn manifest_json(host: &str) -> String {
    format!(
        r#"[
          {{
            "title": "Track Title",
            "description": "One track",
            "lessons": [
              {{
                "title": "Intro",
                "description": "",
                "media": [
                  {{"name": "Doc", "href": "{host}/files/file1.ext"}},
                  {{"name": "Audio", "href": "{host}/files/file2.ext"}}
                ]
              }}
            ]
          }}
        ]"#
    )
}

#[tokio::test]
async fn manifest_to_disk_layout_matches_plan() {
    let server = MockServer::start().await;
    let session = session_for(&server).await;
    let dest = TempDir::new().unwrap();

    mount_file(&server, "/files/file1.ext", "application/pdf", b"doc").await;
    mount_file(&server, "/files/file2.ext", "audio/mpeg", b"audio").await;

    let tracks = decode_manifest(&manifest_json(&server.uri())).unwrap();
    let tasks = plan(&tracks, dest.path());

    // Both media share the lesson ordinal and differ by basename.
    assert_eq!(
        tasks
            .iter()
            .map(|t| t.destination.clone())
            .collect::<Vec<_>>(),
        vec![
            dest.path().join("Track Title").join("01__file1.ext"),
            dest.path().join("Track Title").join("01__file2.ext"),
        ]
    );

    let outcomes = execute(&session, &tasks, 5).await;
    assert_eq!(outcomes, vec![Outcome::Succeeded, Outcome::Succeeded]);
    assert_eq!(std::fs::read(&tasks[0].destination).unwrap(), b"doc");
    assert_eq!(std::fs::read(&tasks[1].destination).unwrap(), b"audio");
}

#[tokio::test]
async fn rerun_is_all_skips_with_zero_requests() {
    let server = MockServer::start().await;
    let session = session_for(&server).await;
    let dest = TempDir::new().unwrap();

    // Each file may be fetched exactly once across both runs.
    for name in ["file1.ext", "file2.ext"] {
        Mock::given(method("GET"))
            .and(path(format!("/files/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/octet-stream")
                    .set_body_bytes(b"data".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let tracks = decode_manifest(&manifest_json(&server.uri())).unwrap();
    let tasks = plan(&tracks, dest.path());

    let first = execute(&session, &tasks, 5).await;
    assert_eq!(first, vec![Outcome::Succeeded, Outcome::Succeeded]);

    let second = execute(&session, &tasks, 5).await;
    assert_eq!(second, vec![Outcome::Skipped, Outcome::Skipped]);

    let report = RunReport::from_outcomes(&second);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn mixed_batch_reports_partial_failure_exit() {
    let server = MockServer::start().await;
    let session = session_for(&server).await;
    let dest = TempDir::new().unwrap();

    for name in ["a", "b", "c", "d"] {
        mount_file(
            &server,
            &format!("/files/{name}.mp3"),
            "audio/mpeg",
            b"bytes",
        )
        .await;
    }
    // The fifth response is a page: session expiry stand-in.
    mount_file(
        &server,
        "/files/e.mp3",
        "text/html; charset=utf-8",
        b"<html>Please log in</html>",
    )
    .await;

    let track = ResolvedTrack {
        title: "T".to_string(),
        description: String::new(),
        lessons: ["a", "b", "c", "d", "e"]
            .iter()
            .map(|name| Lesson {
                title: (*name).to_string(),
                description: String::new(),
                media: vec![Media {
                    name: (*name).to_string(),
                    href: format!("{}/files/{name}.mp3", server.uri()),
                }],
            })
            .collect(),
    };

    let tasks = plan(&[track], dest.path());
    assert_eq!(tasks.len(), 5);

    let outcomes = execute(&session, &tasks, 5).await;
    let report = RunReport::from_outcomes(&outcomes);

    assert_eq!(
        (report.succeeded(), report.skipped(), report.failed()),
        (4, 0, 1)
    );
    assert_eq!(report.exit_code(), 2);

    // The anomalous task left nothing on disk; its siblings committed.
    let bad = dest.path().join("T").join("05__e.mp3");
    assert!(!bad.exists());
    assert!(!PathBuf::from(format!("{}.part", bad.display())).exists());
    assert!(dest.path().join("T").join("01__a.mp3").exists());
}

//! Integration tests for resolution against the local index.

mod common;

use common::{episode, movie, TestHarness, MB};
use serde_json::{json, Value};

#[tokio::test]
async fn health_reports_cloud_and_jobs() {
    let h = TestHarness::with_server().await;

    let resp = reqwest::get(h.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cloudEnabled"], false);
    assert_eq!(body["activeJobs"], 0);
}

#[tokio::test]
async fn local_hit_returns_stream_url() {
    let h = TestHarness::with_server().await;
    h.add_file("Inception (2010)/Inception.2010.1080p.BluRay.ENG.mkv", 8000 * MB);

    let resp = h.post("/resolve", movie("tt1375666", "Inception", 2010, Some(148))).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sourceKind"], "localIndex");
    assert_eq!(body["fileName"], "Inception.2010.1080p.BluRay.ENG.mkv");
    assert_eq!(
        body["streamUrl"],
        h.media_url("Inception%20(2010)/Inception.2010.1080p.BluRay.ENG.mkv")
    );
}

#[tokio::test]
async fn sitcom_episode_passes_quality_gate() {
    let h = TestHarness::with_server().await;
    // ~27 MB/min, well above the 720p floor
    h.add_file("The Office/Season 2/The.Office.S02E01.720p.WEB.mkv", 600 * MB);
    h.add_file("The Office/Season 2/The.Office.S02E02.720p.WEB.mkv", 600 * MB);

    let resp = h.post("/resolve", episode("tt0386676", "The Office (US)", 2, 1, Some(22))).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fileName"], "The.Office.S02E01.720p.WEB.mkv");
}

#[tokio::test]
async fn resolved_link_is_served_by_the_library() {
    let h = TestHarness::with_server().await;
    h.add_file_with_content("Big.Buck.Bunny.2008.mkv", b"not really a movie");

    let resp = h.post("/resolve", movie("tt1254207", "Big Buck Bunny", 2008, None)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    let stream = reqwest::get(body["streamUrl"].as_str().unwrap()).await.unwrap();
    assert_eq!(stream.status(), 200);
    assert_eq!(stream.bytes().await.unwrap().as_ref(), b"not really a movie");
}

#[tokio::test]
async fn second_resolve_is_served_from_cache() {
    let h = TestHarness::with_server().await;
    let path = h.add_file("Heat.1995.1080p.ENG.mkv", 9000 * MB);
    let request = movie("tt0113277", "Heat", 1995, Some(170));

    let first: Value = h.post("/resolve", request.clone()).await.json().await.unwrap();

    // the cache answers even though the index no longer has the file
    std::fs::remove_file(path).unwrap();
    let resp = h.post("/resolve", request).await;
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn english_release_ranks_above_foreign() {
    let h = TestHarness::with_server().await;
    h.add_file("Amelie.2001.1080p.FRENCH.mkv", 8000 * MB);
    h.add_file("Amelie.2001.1080p.ENG.SUBS.mkv", 8000 * MB);

    let body: Value = h
        .post("/resolve", movie("tt0211915", "Amelie", 2001, Some(122)))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["fileName"], "Amelie.2001.1080p.ENG.SUBS.mkv");
}

#[tokio::test]
async fn undersized_files_fail_validation() {
    let h = TestHarness::with_server().await;
    // 100 MB for a 2h 1080p film is a fake
    h.add_file("Inception.2010.1080p.ENG.mkv", 100 * MB);

    let resp = h.post("/resolve", movie("tt1375666", "Inception", 2010, Some(148))).await;
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "validation_failure");
}

#[tokio::test]
async fn nothing_found_is_404() {
    let h = TestHarness::with_server().await;
    h.add_file("Heat.1995.1080p.ENG.mkv", 9000 * MB);

    let resp = h.post("/resolve", movie("tt0133093", "The Matrix", 1999, None)).await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn year_outside_tolerance_does_not_match() {
    let h = TestHarness::with_server().await;
    h.add_file("Dune.1984.1080p.ENG.mkv", 8000 * MB);

    let resp = h.post("/resolve", movie("tt1160419", "Dune", 2021, None)).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let h = TestHarness::with_server().await;

    // episode without season/episode
    let resp = h
        .post(
            "/resolve",
            json!({"contentId": "tt1", "mediaType": "episode", "title": "Lost"}),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");

    // missing title entirely
    let resp = h
        .post("/resolve", json!({"contentId": "tt1", "mediaType": "movie"}))
        .await;
    assert_eq!(resp.status(), 400);

    // blank title
    let resp = h.post("/resolve", movie("tt1", "  ", 2000, None)).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn api_client_resolves_locally() {
    let h = TestHarness::with_server().await;
    h.add_file("Heat.1995.1080p.ENG.mkv", 9000 * MB);

    let request = serde_json::from_value(movie("tt0113277", "Heat", 1995, Some(170))).unwrap();
    let source = h
        .client()
        .resolve_and_wait(
            &request,
            std::time::Duration::from_millis(10),
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(source.file_name, "Heat.1995.1080p.ENG.mkv");
    assert_eq!(source.stream_url, h.media_url("Heat.1995.1080p.ENG.mkv"));
}

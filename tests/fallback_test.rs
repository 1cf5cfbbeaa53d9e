//! Integration tests for lower-bitrate fallback.

mod common;

use common::{movie, TestHarness, MB};
use reelhunt::config::PlaybackConfig;
use reelhunt::playback::{FallbackController, NowPlaying, PlaybackSession};
use reelhunt::resolver::{ContentRequest, ResolvedSource};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const HEAT_UHD: &str = "Heat.1995.2160p.ENG.mkv";
const HEAT_FHD: &str = "Heat.1995.1080p.ENG.mkv";
const HEAT_HD: &str = "Heat.1995.720p.ENG.mkv";

fn heat_library(h: &TestHarness) {
    h.add_file(HEAT_UHD, 40_000 * MB);
    h.add_file(HEAT_FHD, 9_000 * MB);
    h.add_file(HEAT_HD, 3_000 * MB);
}

#[tokio::test]
async fn fallback_steps_down_from_current_stream() {
    let h = TestHarness::with_server().await;
    heat_library(&h);

    let resolved: Value = h
        .post("/resolve", movie("tt0113277", "Heat", 1995, Some(170)))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["fileName"], HEAT_UHD);

    // title comes from the earlier resolve
    let resp = h
        .post("/fallback", json!({"contentId": "tt0113277", "mediaType": "movie"}))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fileName"], HEAT_FHD);
    assert_eq!(body["streamUrl"], h.media_url(HEAT_FHD));

    // the cached link is unchanged
    let again: Value = h
        .post("/resolve", movie("tt0113277", "Heat", 1995, Some(170)))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["fileName"], HEAT_UHD);
}

#[tokio::test]
async fn fallback_honours_explicit_bitrate() {
    let h = TestHarness::with_server().await;
    heat_library(&h);

    // 1080p here runs ~7.4 Mbps, 720p ~2.5 Mbps
    let body: Value = h
        .post(
            "/fallback",
            json!({
                "contentId": "tt0113277",
                "mediaType": "movie",
                "title": "Heat",
                "year": 1995,
                "runtimeMinutes": 170,
                "currentBitrate": 3_000_000,
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["fileName"], HEAT_HD);
}

#[tokio::test]
async fn no_alternate_returns_null() {
    let h = TestHarness::with_server().await;
    h.add_file(HEAT_HD, 3_000 * MB);
    h.post("/resolve", movie("tt0113277", "Heat", 1995, Some(170))).await;

    let resp = h
        .post("/fallback", json!({"contentId": "tt0113277", "mediaType": "movie"}))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["streamUrl"].is_null());
}

#[tokio::test]
async fn unknown_content_needs_a_title() {
    let h = TestHarness::with_server().await;

    let resp = h
        .post("/fallback", json!({"contentId": "tt404", "mediaType": "movie"}))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn stuttering_session_switches_once() {
    let h = TestHarness::with_server().await;
    heat_library(&h);
    let client = h.client();

    let request: ContentRequest =
        serde_json::from_value(movie("tt0113277", "Heat", 1995, Some(170))).unwrap();
    let source: ResolvedSource = client
        .resolve_and_wait(&request, Duration::from_millis(10), Duration::from_secs(5))
        .await
        .unwrap();

    let mut session = PlaybackSession::default();
    session.start(NowPlaying::from_source(request.key(), &source));
    let controller = FallbackController::new(client);

    // spaced out so only the event count trips the threshold
    let start = Instant::now();
    let at = |secs| start + Duration::from_secs(secs);
    assert_eq!(controller.on_buffering_at(&mut session, at(0)).await, None);
    assert_eq!(controller.on_buffering_at(&mut session, at(12)).await, None);
    let switched = controller.on_buffering_at(&mut session, at(24)).await;
    assert_eq!(switched.as_deref(), Some(h.media_url(HEAT_FHD).as_str()));
    assert!(session.fallback_active());
    assert_eq!(session.stream_url(), switched.as_deref());

    // already on the fallback: further stutter does nothing
    assert_eq!(controller.trigger(&mut session).await, None);
}

#[tokio::test]
async fn fallback_after_reset_steps_down_again() {
    let h = TestHarness::with_server().await;
    heat_library(&h);
    let client = h.client();

    let request: ContentRequest =
        serde_json::from_value(movie("tt0113277", "Heat", 1995, Some(170))).unwrap();
    let source = client
        .resolve_and_wait(&request, Duration::from_millis(10), Duration::from_secs(5))
        .await
        .unwrap();

    let mut session = PlaybackSession::from_config(&PlaybackConfig::default());
    session.start(NowPlaying::from_source(request.key(), &source));
    let controller = FallbackController::new(client);

    let first = controller.trigger(&mut session).await;
    assert_eq!(first, Some(h.media_url(HEAT_FHD)));

    // still stuttering on 1080p: the next step is 720p, not 1080p again
    session.reset();
    let second = controller.trigger(&mut session).await;
    assert_eq!(second, Some(h.media_url(HEAT_HD)));
    assert_eq!(
        session.now_playing().and_then(|p| p.file_name.as_deref()),
        Some(HEAT_HD)
    );

    // nothing below 720p
    session.reset();
    assert_eq!(controller.trigger(&mut session).await, None);
    assert_eq!(session.stream_url(), Some(h.media_url(HEAT_HD).as_str()));
}

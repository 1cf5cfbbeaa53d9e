//! Playback session state and the fallback controller.

use super::client::ApiClient;
use super::stutter::{StutterConfig, StutterWindow};
use crate::config::PlaybackConfig;
use crate::resolver::{FallbackRequest, FallbackResponse, ResolvedSource, SourceResolver};
use reelhunt_common::{ContentKey, Result};
use std::sync::Arc;
use std::time::Instant;

/// Something that can propose a lower-bitrate stream.
#[async_trait::async_trait]
pub trait FallbackSource: Send + Sync {
    /// A lower-bitrate stream for the request. `stream_url` is `None` when
    /// no alternate exists.
    async fn request_fallback(&self, request: &FallbackRequest) -> Result<FallbackResponse>;
}

#[async_trait::async_trait]
impl FallbackSource for SourceResolver {
    async fn request_fallback(&self, request: &FallbackRequest) -> Result<FallbackResponse> {
        Ok(self.resolve_alternate(request.clone()).await?.into())
    }
}

#[async_trait::async_trait]
impl FallbackSource for ApiClient {
    async fn request_fallback(&self, request: &FallbackRequest) -> Result<FallbackResponse> {
        self.fallback(request).await
    }
}

#[async_trait::async_trait]
impl<T: FallbackSource + ?Sized> FallbackSource for Arc<T> {
    async fn request_fallback(&self, request: &FallbackRequest) -> Result<FallbackResponse> {
        (**self).request_fallback(request).await
    }
}

/// Content currently being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub key: ContentKey,
    pub title: Option<String>,
    pub year: Option<u16>,
    pub runtime_minutes: Option<u32>,
    pub stream_url: String,
    /// File behind `stream_url`, when known.
    pub file_name: Option<String>,
    /// Bitrate of `stream_url` in bits per second, when known.
    pub bitrate: Option<u64>,
}

impl NowPlaying {
    pub fn from_source(key: ContentKey, source: &ResolvedSource) -> Self {
        Self {
            key,
            title: None,
            year: None,
            runtime_minutes: None,
            stream_url: source.stream_url.clone(),
            file_name: Some(source.file_name.clone()),
            bitrate: None,
        }
    }

    fn fallback_request(&self) -> FallbackRequest {
        FallbackRequest {
            content_id: self.key.content_id.clone(),
            media_type: self.key.media_type,
            season: self.key.season,
            episode: self.key.episode,
            current_bitrate: self.bitrate,
            current_file_name: self.file_name.clone(),
            title: self.title.clone(),
            year: self.year,
            runtime_minutes: self.runtime_minutes,
        }
    }
}

/// Per-session playback state. Owned by one player; not shared.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    now_playing: Option<NowPlaying>,
    stutter: StutterWindow,
    fallback_active: bool,
}

impl PlaybackSession {
    pub fn new(config: StutterConfig) -> Self {
        Self {
            now_playing: None,
            stutter: StutterWindow::new(config),
            fallback_active: false,
        }
    }

    /// Session using the `[playback]` stutter thresholds.
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(StutterConfig::from(config))
    }

    /// Begin playing newly resolved content. Clears all stutter state.
    pub fn start(&mut self, now_playing: NowPlaying) {
        self.reset();
        tracing::debug!(key = %now_playing.key, "Playback started");
        self.now_playing = Some(now_playing);
    }

    /// Forget buffering history and re-arm the fallback.
    pub fn reset(&mut self) {
        self.stutter.reset();
        self.fallback_active = false;
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_active
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.now_playing.as_ref().map(|p| p.stream_url.as_str())
    }

    pub fn buffering_events(&self) -> usize {
        self.stutter.event_count()
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new(StutterConfig::default())
    }
}

/// Switches a stuttering session to a lower-bitrate stream, once.
pub struct FallbackController<S> {
    source: S,
}

impl<S: FallbackSource> FallbackController<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Record a buffering event. Returns the new stream URL when a fallback
    /// was triggered and found.
    pub async fn on_buffering(&self, session: &mut PlaybackSession) -> Option<String> {
        self.on_buffering_at(session, Instant::now()).await
    }

    pub async fn on_buffering_at(
        &self,
        session: &mut PlaybackSession,
        now: Instant,
    ) -> Option<String> {
        if session.stutter.record_buffering_at(now) {
            self.trigger(session).await
        } else {
            None
        }
    }

    /// Request an alternate for the session's content.
    ///
    /// No-op while a fallback is already active. The flag is set before the
    /// request and stays set whatever the outcome; only
    /// [`PlaybackSession::reset`] or a new [`PlaybackSession::start`] clears it.
    pub async fn trigger(&self, session: &mut PlaybackSession) -> Option<String> {
        if session.fallback_active {
            return None;
        }
        let request = session.now_playing.as_ref()?.fallback_request();
        session.fallback_active = true;

        match self.source.request_fallback(&request).await {
            Ok(FallbackResponse {
                stream_url: Some(url),
                file_name,
            }) => {
                tracing::info!(
                    content_id = %request.content_id,
                    stream_url = %url,
                    "Switched to fallback stream"
                );
                if let Some(playing) = session.now_playing.as_mut() {
                    playing.stream_url = url.clone();
                    playing.file_name = file_name;
                    playing.bitrate = None;
                }
                Some(url)
            }
            Ok(_) => {
                tracing::info!(
                    content_id = %request.content_id,
                    "No lower-bitrate alternate available"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    content_id = %request.content_id,
                    error = %e,
                    "Fallback request failed"
                );
                None
            }
        }
    }
}

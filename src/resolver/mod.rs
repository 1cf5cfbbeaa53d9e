//! Source resolver.
//!
//! A resolve checks the cache, then the local index, and finally hands the
//! request to the cloud backend as a background job. Callers never wait on
//! the cloud: they get a [`JobId`] back and poll the [`JobManager`].

pub mod cloud;
pub mod local_index;
pub mod ranking;

use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::jobs::{JobContent, JobManager, JobResult, JobStatus, JobTicket, JobUpdate};
use chrono::Utc;
use cloud::{CloudBackend, TransferFile, TransferRequest, TransferState};
use dashmap::DashMap;
use local_index::{IndexedFile, LocalIndex};
use ranking::{gate_and_rank, Candidate, Ranked};
use reelhunt_common::paths::is_video_name;
use reelhunt_common::{ContentKey, Error, JobId, MediaType, ResolutionTier, Result, SourceKind};
use reelhunt_db::models::{NewResolvedLink, ResolvedLink};
use reelhunt_parser::{quality, variants::title_variants, ReleaseName};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Remembered requests beyond this count are pruned by age.
const MAX_RECENT_REQUESTS: usize = 4096;

/// A request for a playable source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub content_id: String,
    pub media_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
}

impl ContentRequest {
    pub fn key(&self) -> ContentKey {
        ContentKey {
            content_id: self.content_id.clone(),
            media_type: self.media_type,
            season: self.season,
            episode: self.episode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(Error::invalid_request("contentId is required"));
        }
        if self.title.trim().is_empty() {
            return Err(Error::invalid_request("title is required"));
        }
        match self.media_type {
            MediaType::Episode if self.season.is_none() || self.episode.is_none() => Err(
                Error::invalid_request("episode requests need season and episode"),
            ),
            MediaType::Movie if self.season.is_some() || self.episode.is_some() => Err(
                Error::invalid_request("movie requests cannot carry season or episode"),
            ),
            _ => Ok(()),
        }
    }
}

/// A playable stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub stream_url: String,
    pub file_name: String,
    pub source_kind: SourceKind,
}

impl From<ResolvedLink> for ResolvedSource {
    fn from(link: ResolvedLink) -> Self {
        Self {
            stream_url: link.stream_url,
            file_name: link.file_name,
            source_kind: link.source_kind,
        }
    }
}

impl From<ResolvedSource> for JobResult {
    fn from(source: ResolvedSource) -> Self {
        Self {
            stream_url: source.stream_url,
            file_name: source.file_name,
            source_kind: source.source_kind,
        }
    }
}

/// Outcome of [`SourceResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A source is available now.
    Resolved(ResolvedSource),
    /// A cloud job was started; poll it.
    Pending(JobId),
}

/// Wire form of a [`Resolution`]: the source itself, or `{jobId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolveResponse {
    Resolved(ResolvedSource),
    Pending {
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
}

impl From<Resolution> for ResolveResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Resolved(source) => Self::Resolved(source),
            Resolution::Pending(job_id) => Self::Pending { job_id },
        }
    }
}

/// Request for a lower-bitrate alternate of the content being played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    pub content_id: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    /// Bitrate of the current stream in bits per second.
    #[serde(default)]
    pub current_bitrate: Option<u64>,
    /// File being played. Defaults to the cached link's file.
    #[serde(default)]
    pub current_file_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
}

impl FallbackRequest {
    pub fn key(&self) -> ContentKey {
        ContentKey {
            content_id: self.content_id.clone(),
            media_type: self.media_type,
            season: self.season,
            episode: self.episode,
        }
    }
}

/// Fallback answer. `stream_url` is `null` when no alternate exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResponse {
    pub stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl From<Option<ResolvedSource>> for FallbackResponse {
    fn from(source: Option<ResolvedSource>) -> Self {
        match source {
            Some(source) => Self {
                stream_url: Some(source.stream_url),
                file_name: Some(source.file_name),
            },
            None => Self::default(),
        }
    }
}

/// Tunables for resolution.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub min_audio_score: i32,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub max_transient_retries: u32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_audio_score: config.local_index.min_audio_score,
            poll_interval: config.cloud.poll_interval(),
            max_poll_attempts: config.cloud.max_poll_attempts,
            max_transient_retries: config.cloud.max_transient_retries,
        }
    }
}

/// Why a job's background work stopped early.
enum Interrupted {
    Cancelled,
    Failed(Error),
}

impl From<Error> for Interrupted {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

/// Await `fut` unless `token` fires first.
async fn checkpoint<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> std::result::Result<T, Interrupted> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupted::Cancelled),
        value = fut => Ok(value),
    }
}

/// Orchestrates cache, local index and cloud backend.
#[derive(Clone)]
pub struct SourceResolver {
    cache: ResolutionCache,
    jobs: JobManager,
    local: Arc<dyn LocalIndex>,
    cloud: Option<Arc<dyn CloudBackend>>,
    settings: ResolverSettings,
    recent: Arc<DashMap<ContentKey, (ContentRequest, chrono::DateTime<Utc>)>>,
}

impl SourceResolver {
    pub fn new(
        cache: ResolutionCache,
        jobs: JobManager,
        local: Arc<dyn LocalIndex>,
        cloud: Option<Arc<dyn CloudBackend>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache,
            jobs,
            local,
            cloud,
            settings,
            recent: Arc::new(DashMap::new()),
        }
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn cloud_enabled(&self) -> bool {
        self.cloud.is_some()
    }

    /// Resolve a request to a source now, or start a cloud job.
    pub async fn resolve(&self, request: ContentRequest) -> Result<Resolution> {
        request.validate()?;
        let key = request.key();
        self.remember(&request);

        if let Some(link) = self.cache.get(&key) {
            tracing::info!(key = %key, file_name = %link.file_name, "Resolved from cache");
            return Ok(Resolution::Resolved(link.into()));
        }

        let variants = title_variants(&request.title, request.year);
        let (files, ranked) = self.probe_local(&variants, &request).await;

        if let Some(best) = ranked.best() {
            if best.audio_score >= self.settings.min_audio_score || self.cloud.is_none() {
                let file = &files[best.discovery_index];
                let stream_url = file.stream_url.clone();
                let source = self.store(&key, stream_url, &best.file_name, SourceKind::LocalIndex);
                tracing::info!(
                    key = %key,
                    file_name = %source.file_name,
                    "Resolved from local index"
                );
                return Ok(Resolution::Resolved(source));
            }
            tracing::debug!(
                key = %key,
                audio_score = best.audio_score,
                min_audio_score = self.settings.min_audio_score,
                "Best local candidate scored too low, trying cloud"
            );
        }

        let Some(cloud) = self.cloud.clone() else {
            return Err(if ranked.accepted.is_empty() && ranked.rejected > 0 {
                Error::ValidationFailure {
                    rejected: ranked.rejected,
                }
            } else {
                Error::not_found(format!("{} ({})", request.title, key))
            });
        };

        let ticket = self.jobs.create(JobContent {
            key: key.clone(),
            title: request.title.clone(),
            year: request.year,
        });
        let job_id = ticket.id;
        let resolver = self.clone();
        tokio::spawn(async move {
            resolver.run_cloud_job(ticket, request, variants, cloud).await;
        });

        tracing::info!(key = %key, job_id = %job_id, "Started cloud resolution");
        Ok(Resolution::Pending(job_id))
    }

    /// Probe the local index. Index failures are logged and treated as no
    /// matches.
    async fn probe_local(
        &self,
        variants: &[String],
        request: &ContentRequest,
    ) -> (Vec<IndexedFile>, Ranked) {
        let files = match self.local.probe(variants, request).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(key = %request.key(), error = %e, "Local index probe failed");
                Vec::new()
            }
        };
        let candidates = files
            .iter()
            .enumerate()
            .map(|(i, f)| {
                Candidate::new(
                    f.identifier(),
                    &f.file_name,
                    f.size_bytes,
                    SourceKind::LocalIndex,
                    i,
                )
            })
            .collect();
        let ranked = gate_and_rank(candidates, request.runtime_minutes);
        (files, ranked)
    }

    fn store(
        &self,
        key: &ContentKey,
        stream_url: String,
        file_name: &str,
        source_kind: SourceKind,
    ) -> ResolvedSource {
        let link = NewResolvedLink {
            key: key.clone(),
            stream_url,
            file_name: file_name.to_string(),
            source_kind,
        };
        self.cache.put(&link);
        ResolvedSource {
            stream_url: link.stream_url,
            file_name: link.file_name,
            source_kind,
        }
    }

    fn remember(&self, request: &ContentRequest) {
        let now = Utc::now();
        self.recent.insert(request.key(), (request.clone(), now));
        if self.recent.len() > MAX_RECENT_REQUESTS {
            let cutoff = now - self.cache.ttl();
            self.recent.retain(|_, (_, seen)| *seen > cutoff);
        }
    }

    async fn run_cloud_job(
        self,
        ticket: JobTicket,
        request: ContentRequest,
        variants: Vec<String>,
        cloud: Arc<dyn CloudBackend>,
    ) {
        let id = ticket.id;
        match self.cloud_resolve(&ticket, &request, variants, cloud.as_ref()).await {
            Ok(source) => {
                tracing::info!(
                    job_id = %id,
                    file_name = %source.file_name,
                    "Cloud resolution completed"
                );
                self.jobs.update(id, JobUpdate::completed(source.into()));
            }
            Err(Interrupted::Cancelled) => {
                tracing::info!(job_id = %id, "Cloud resolution stopped after cancellation");
            }
            Err(Interrupted::Failed(e)) => {
                tracing::warn!(job_id = %id, error = %e, "Cloud resolution failed");
                self.jobs.update(id, JobUpdate::failed(&e));
            }
        }
    }

    async fn cloud_resolve(
        &self,
        ticket: &JobTicket,
        request: &ContentRequest,
        variants: Vec<String>,
        cloud: &dyn CloudBackend,
    ) -> std::result::Result<ResolvedSource, Interrupted> {
        let token = &ticket.cancel;
        let transfer = TransferRequest {
            media_type: request.media_type,
            title: request.title.clone(),
            title_variants: variants,
            year: request.year,
            season: request.season,
            episode: request.episode,
        };

        let transfer_id = self.with_retries(token, "submit", || cloud.submit(&transfer)).await?;
        self.jobs.update(
            ticket.id,
            JobUpdate::status(JobStatus::Searching).with_message("Submitted to cloud backend"),
        );

        let max_retries = self.settings.max_transient_retries;
        let mut transient_failures = 0;
        for attempt in 0..self.settings.max_poll_attempts {
            if attempt > 0 {
                checkpoint(token, tokio::time::sleep(self.settings.poll_interval)).await?;
            }

            let status = match checkpoint(token, cloud.status(&transfer_id)).await? {
                Ok(status) => status,
                Err(e) if e.is_transient() && transient_failures < max_retries => {
                    transient_failures += 1;
                    tracing::warn!(
                        job_id = %ticket.id,
                        attempt = transient_failures,
                        error = %e,
                        "Transient poll failure, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            transient_failures = 0;

            match status.status {
                TransferState::Queued => {
                    self.jobs.update(
                        ticket.id,
                        JobUpdate::status(JobStatus::Searching)
                            .with_progress(status.progress)
                            .with_message(
                                status
                                    .message
                                    .unwrap_or_else(|| "Queued on cloud backend".into()),
                            ),
                    );
                }
                TransferState::Downloading => {
                    self.jobs.update(
                        ticket.id,
                        JobUpdate::status(JobStatus::Downloading)
                            .with_progress(status.progress)
                            .with_message(status.message.unwrap_or_else(|| "Downloading".into())),
                    );
                }
                TransferState::Failed => {
                    return Err(Error::not_found(
                        status.message.unwrap_or_else(|| "cloud transfer failed".into()),
                    )
                    .into());
                }
                TransferState::Ready => {
                    return self
                        .finish_cloud(ticket, request, &transfer_id, status.files, cloud)
                        .await;
                }
            }
        }

        Err(Error::transient(format!(
            "timed out waiting for cloud transfer {} after {} polls",
            transfer_id, self.settings.max_poll_attempts
        ))
        .into())
    }

    async fn finish_cloud(
        &self,
        ticket: &JobTicket,
        request: &ContentRequest,
        transfer_id: &str,
        files: Vec<TransferFile>,
        cloud: &dyn CloudBackend,
    ) -> std::result::Result<ResolvedSource, Interrupted> {
        let candidates = cloud_candidates(files, request);
        if candidates.is_empty() {
            let message = format!("cloud transfer {} has no video files", transfer_id);
            return Err(Error::not_found(message).into());
        }

        let ranked = gate_and_rank(candidates, request.runtime_minutes);
        let Some(best) = ranked.best() else {
            return Err(Error::ValidationFailure {
                rejected: ranked.rejected,
            }
            .into());
        };

        let url = self
            .with_retries(&ticket.cancel, "link", || cloud.link(transfer_id, &best.identifier))
            .await?;
        Ok(self.store(&request.key(), url, &best.file_name, SourceKind::CloudBackend))
    }

    /// Run `op`, retrying transient failures up to the configured limit.
    async fn with_retries<T, F, Fut>(
        &self,
        token: &CancellationToken,
        what: &str,
        mut op: F,
    ) -> std::result::Result<T, Interrupted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0;
        loop {
            match checkpoint(token, op()).await? {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && failures < self.settings.max_transient_retries => {
                    failures += 1;
                    tracing::warn!(
                        operation = what,
                        attempt = failures,
                        error = %e,
                        "Transient cloud failure, retrying"
                    );
                    checkpoint(token, tokio::time::sleep(self.settings.poll_interval)).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Find a lower-bitrate local alternate for the content being played.
    ///
    /// The current file is `current_file_name` when given, else the cached
    /// link's file. Candidates exclude it and must have a lower estimated
    /// bitrate than `current_bitrate` (or the current file's estimate). When
    /// a bitrate cannot be estimated the candidate must be a lower tier than
    /// the current file. Alternates are not written to the cache.
    pub async fn resolve_alternate(
        &self,
        fallback: FallbackRequest,
    ) -> Result<Option<ResolvedSource>> {
        let key = fallback.key();
        let request = match fallback.title.clone() {
            Some(title) => ContentRequest {
                content_id: fallback.content_id.clone(),
                media_type: fallback.media_type,
                title,
                year: fallback.year,
                season: fallback.season,
                episode: fallback.episode,
                runtime_minutes: fallback.runtime_minutes,
            },
            None => match self.recent.get(&key) {
                Some(entry) => {
                    let mut request = entry.value().0.clone();
                    request.runtime_minutes = fallback.runtime_minutes.or(request.runtime_minutes);
                    request
                }
                None => {
                    return Err(Error::invalid_request(format!(
                        "no recent resolution for {}; include title",
                        key
                    )))
                }
            },
        };
        request.validate()?;

        let current = fallback
            .current_file_name
            .clone()
            .or_else(|| self.cache.get(&key).map(|link| link.file_name));
        let variants = title_variants(&request.title, request.year);
        let (files, ranked) = self.probe_local(&variants, &request).await;
        let runtime = request.runtime_minutes;

        let current_candidate = current
            .as_deref()
            .and_then(|name| ranked.accepted.iter().find(|c| c.file_name == name));
        let current_tier = current_candidate
            .map(|c| c.tier)
            .or_else(|| current.as_deref().map(quality::classify_resolution))
            .unwrap_or(ResolutionTier::Unknown);
        let current_bitrate = fallback
            .current_bitrate
            .or_else(|| current_candidate.and_then(|c| c.estimated_bitrate(runtime)));

        let alternate = ranked.accepted.iter().find(|c| {
            if current.as_deref() == Some(c.file_name.as_str()) {
                return false;
            }
            match (current_bitrate, c.estimated_bitrate(runtime)) {
                (Some(limit), Some(estimate)) => estimate < limit,
                _ => c.tier < current_tier,
            }
        });

        match alternate {
            Some(c) => {
                tracing::info!(
                    key = %key,
                    file_name = %c.file_name,
                    tier = %c.tier,
                    current_bitrate = ?current_bitrate,
                    "Found lower-bitrate alternate"
                );
                Ok(Some(ResolvedSource {
                    stream_url: files[c.discovery_index].stream_url.clone(),
                    file_name: c.file_name.clone(),
                    source_kind: SourceKind::LocalIndex,
                }))
            }
            None => {
                tracing::info!(
                    key = %key,
                    current_bitrate = ?current_bitrate,
                    "No lower-bitrate alternate"
                );
                Ok(None)
            }
        }
    }
}

/// Video files of a ready transfer as candidates. For episode requests, files
/// carrying the requested episode marker are preferred over the rest of a
/// season pack.
fn cloud_candidates(files: Vec<TransferFile>, request: &ContentRequest) -> Vec<Candidate> {
    let videos: Vec<TransferFile> = files.into_iter().filter(|f| is_video_name(&f.name)).collect();

    let videos = match (request.media_type, request.season, request.episode) {
        (MediaType::Episode, Some(season), Some(episode)) => {
            let (matching, rest): (Vec<_>, Vec<_>) = videos
                .into_iter()
                .partition(|f| ReleaseName::parse(&f.name).contains_episode(season, episode));
            if matching.is_empty() {
                rest
            } else {
                matching
            }
        }
        _ => videos,
    };

    videos
        .into_iter()
        .enumerate()
        .map(|(i, f)| Candidate::new(f.id, f.name, f.size, SourceKind::CloudBackend, i))
        .collect()
}

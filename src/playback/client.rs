//! HTTP client for a reelhunt server.

use super::meter::{self, Measurement};
use crate::bandwidth::{BandwidthReport, BandwidthStatus, MeasurementTrigger, ReportOutcome};
use crate::jobs::{JobPoll, JobStatus};
use crate::resolver::{
    ContentRequest, FallbackRequest, FallbackResponse, ResolveResponse, ResolvedSource,
};
use reelhunt_common::{Error, ErrorKind, JobId, Result, SourceKind};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Header carrying the user id for bandwidth tracking.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: ErrorKind,
}

/// Typed client for the reelhunt HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    user_id: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: None,
        }
    }

    /// Send `user_id` with bandwidth requests.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_user_header(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user_id {
            Some(user) => request.header(USER_ID_HEADER, user),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        job: Option<JobId>,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::transient(format!("request to {} failed: {}", self.base_url, e)))?;
        let response = check(response, job).await?;
        response
            .json()
            .await
            .map_err(|e| Error::transient(format!("malformed response: {}", e)))
    }

    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| Error::transient(format!("health check failed: {}", e)))?;
        check(response, None).await.map(|_| ())
    }

    pub async fn resolve(&self, request: &ContentRequest) -> Result<ResolveResponse> {
        self.send(self.client.post(self.url("/api/resolve")).json(request), None)
            .await
    }

    pub async fn job(&self, id: JobId) -> Result<JobPoll> {
        self.send(self.client.get(self.url(&format!("/api/jobs/{}", id))), Some(id))
            .await
    }

    /// Cancel a job. Returns whether the server changed anything.
    pub async fn cancel_job(&self, id: JobId) -> Result<bool> {
        #[derive(Deserialize)]
        struct Cancelled {
            cancelled: bool,
        }
        let body: Cancelled = self
            .send(self.client.delete(self.url(&format!("/api/jobs/{}", id))), Some(id))
            .await?;
        Ok(body.cancelled)
    }

    /// Resolve, then poll the job until it finishes or `max_wait` passes.
    ///
    /// A job that disappears (reaped by the server) abandons that attempt;
    /// the request is resolved again from scratch within the same deadline.
    pub async fn resolve_and_wait(
        &self,
        request: &ContentRequest,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<ResolvedSource> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut job_id = match self.resolve(request).await? {
            ResolveResponse::Resolved(source) => return Ok(source),
            ResolveResponse::Pending { job_id } => job_id,
        };

        loop {
            let poll = match self.job(job_id).await {
                Ok(poll) => Some(poll),
                Err(Error::JobNotFound(_)) => None,
                Err(e) => return Err(e),
            };

            match poll {
                None => {
                    tracing::info!(job_id = %job_id, "Job no longer exists, resolving again");
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::transient(format!("gave up waiting for job {}", job_id)));
                    }
                    job_id = match self.resolve(request).await? {
                        ResolveResponse::Resolved(source) => return Ok(source),
                        ResolveResponse::Pending { job_id } => job_id,
                    };
                    continue;
                }
                Some(poll) => {
                    tracing::debug!(
                        job_id = %job_id,
                        status = %poll.status,
                        progress = poll.progress,
                        "Polled job"
                    );
                    if let Some(outcome) = finished(job_id, poll) {
                        return outcome;
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                // best effort, the reaper gets it otherwise
                let _ = self.cancel_job(job_id).await;
                return Err(Error::transient(format!("gave up waiting for job {}", job_id)));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn bandwidth_status(&self) -> Result<BandwidthStatus> {
        let request = self.with_user_header(self.client.get(self.url("/api/bandwidth/status")));
        self.send(request, None).await
    }

    pub async fn report_bandwidth(&self, report: &BandwidthReport) -> Result<ReportOutcome> {
        let request = self
            .with_user_header(self.client.post(self.url("/api/bandwidth/report")))
            .json(report);
        self.send(request, None).await
    }

    /// Measure throughput and report it.
    ///
    /// A failed report is logged and returned as `None`; the measurement
    /// itself still succeeds.
    pub async fn measure_and_report(
        &self,
        duration_secs: u64,
        trigger: MeasurementTrigger,
        min_reliable_bytes: u64,
    ) -> Result<(Measurement, Option<ReportOutcome>)> {
        // separate client: the API client's timeout is shorter than a test
        let measurement =
            meter::measure(&Client::new(), &self.base_url, duration_secs, min_reliable_bytes)
                .await?;
        let outcome = match self.report_bandwidth(&measurement.report(trigger)).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to report bandwidth");
                None
            }
        };
        Ok((measurement, outcome))
    }

    pub async fn fallback(&self, request: &FallbackRequest) -> Result<FallbackResponse> {
        self.send(self.client.post(self.url("/api/fallback")).json(request), None)
            .await
    }
}

/// The outcome of a terminal poll, or `None` while the job is still running.
fn finished(job_id: JobId, poll: JobPoll) -> Option<Result<ResolvedSource>> {
    match poll.status {
        JobStatus::Completed => Some(match (poll.stream_url, poll.file_name) {
            (Some(stream_url), Some(file_name)) => Ok(ResolvedSource {
                stream_url,
                file_name,
                source_kind: poll.source_kind.unwrap_or(SourceKind::CloudBackend),
            }),
            _ => Err(Error::internal("completed job has no stream URL")),
        }),
        JobStatus::Error => Some(Err(match poll.error {
            Some(e) => remote_error(e.code, e.message, Some(job_id)),
            None => Error::internal(poll.message),
        })),
        JobStatus::Cancelled => Some(Err(Error::not_found(format!(
            "job {} was cancelled",
            job_id
        )))),
        JobStatus::Searching | JobStatus::Downloading => None,
    }
}

async fn check(response: Response, job: Option<JobId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(remote_error(body.code, body.error, job)),
        Err(_) if status.is_server_error() => {
            Err(Error::transient(format!("server returned {}", status)))
        }
        Err(_) => Err(Error::internal(format!("server returned {}: {}", status, text))),
    }
}

/// Rebuild an [`Error`] from the code a server sent back.
fn remote_error(code: ErrorKind, message: String, job: Option<JobId>) -> Error {
    match code {
        ErrorKind::NotFound => Error::NotFound(message),
        ErrorKind::ValidationFailure => Error::ValidationFailure {
            rejected: rejected_count(&message),
        },
        ErrorKind::QuotaExceeded => Error::QuotaExceeded(message),
        ErrorKind::AuthFailure => Error::AuthFailure(message),
        ErrorKind::TransientNetwork => Error::TransientNetwork(message),
        ErrorKind::JobNotFound => match job {
            Some(id) => Error::JobNotFound(id),
            None => Error::NotFound(message),
        },
        ErrorKind::CacheUnavailable => Error::CacheUnavailable(message),
        ErrorKind::InvalidRequest => Error::InvalidRequest(message),
        ErrorKind::Database => Error::Database(message),
        ErrorKind::Io | ErrorKind::Internal => Error::Internal(message),
    }
}

fn rejected_count(message: &str) -> usize {
    message
        .split_whitespace()
        .find_map(|word| word.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use reelhunt_common::MediaType;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ContentRequest {
        ContentRequest {
            content_id: "tt1375666".into(),
            media_type: MediaType::Movie,
            title: "Inception".into(),
            year: Some(2010),
            season: None,
            episode: None,
            runtime_minutes: Some(148),
        }
    }

    #[tokio::test]
    async fn test_resolve_pending_then_completed() {
        let server = MockServer::start().await;
        let job_id = JobId::new();
        Mock::given(method("POST"))
            .and(path("/api/resolve"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"jobId": job_id})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{}", job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobId": job_id,
                "status": "completed",
                "progress": 100,
                "message": "Source ready",
                "streamUrl": "https://cdn.example/f.mkv",
                "fileName": "Inception.2010.1080p.mkv",
                "sourceKind": "cloudBackend"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(2));
        let source = client
            .resolve_and_wait(&request(), Duration::from_millis(10), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(source.stream_url, "https://cdn.example/f.mkv");
        assert_eq!(source.source_kind, SourceKind::CloudBackend);
    }

    #[tokio::test]
    async fn test_job_error_surfaces_code() {
        let server = MockServer::start().await;
        let job_id = JobId::new();
        Mock::given(method("POST"))
            .and(path("/api/resolve"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"jobId": job_id})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{}", job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobId": job_id,
                "status": "error",
                "progress": 0,
                "message": "quota",
                "error": {"code": "quota_exceeded", "message": "daily limit"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(2));
        let err = client
            .resolve_and_wait(&request(), Duration::from_millis(10), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_matches!(err, Error::QuotaExceeded(ref m) if m == "daily limit");
    }

    #[tokio::test]
    async fn test_reaped_job_resolves_again() {
        let server = MockServer::start().await;
        let (reaped, fresh) = (JobId::new(), JobId::new());
        Mock::given(method("POST"))
            .and(path("/api/resolve"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"jobId": reaped})))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/resolve"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"jobId": fresh})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{}", reaped)))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "gone", "code": "job_not_found"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{}", fresh)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobId": fresh,
                "status": "completed",
                "progress": 100,
                "message": "Source ready",
                "streamUrl": "https://cdn.example/g.mkv",
                "fileName": "Inception.2010.1080p.ENG.mkv",
                "sourceKind": "cloudBackend"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(2));
        let source = client
            .resolve_and_wait(&request(), Duration::from_millis(10), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(source.stream_url, "https://cdn.example/g.mkv");
    }

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let server = MockServer::start().await;
        let job_id = JobId::new();
        Mock::given(method("GET"))
            .and(path(format!("/api/jobs/{}", job_id)))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": "gone", "code": "job_not_found"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(2));
        assert_matches!(client.job(job_id).await, Err(Error::JobNotFound(id)) if id == job_id);
    }

    #[tokio::test]
    async fn test_bandwidth_requests_carry_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bandwidth/report"))
            .and(header("x-user-id", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "recorded": true, "reliable": true, "needsTest": false, "suggestRetest": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(2)).with_user("alice");
        let outcome = client
            .report_bandwidth(&BandwidthReport {
                measured_mbps: 55.0,
                duration_ms: Some(5000),
                trigger: Some(MeasurementTrigger::Manual),
            })
            .await
            .unwrap();
        assert!(outcome.recorded);
    }

    #[test]
    fn test_rejected_count_from_message() {
        assert_eq!(rejected_count("All 3 candidate(s) failed the quality gate"), 3);
        assert_eq!(rejected_count("nothing numeric"), 0);
    }
}

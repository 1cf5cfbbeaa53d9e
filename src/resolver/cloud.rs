//! Cloud resolution backend.
//!
//! The backend fetches content on demand and exposes it through HTTP links.
//! A resolution is a transfer: submit it, poll until files are listed, then
//! ask for a link to one file.

use reelhunt_common::{Error, MediaType, Result};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of a transfer submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub media_type: MediaType,
    pub title: String,
    pub title_variants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

/// Remote state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Queued,
    Downloading,
    Ready,
    Failed,
}

/// A file offered by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Poll response for a transfer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferStatus {
    pub status: TransferState,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub files: Vec<TransferFile>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Slow, quota-limited resolution service.
///
/// Errors use the common taxonomy: `AuthFailure` and `QuotaExceeded` are
/// terminal, `TransientNetwork` may be retried.
#[async_trait::async_trait]
pub trait CloudBackend: Send + Sync {
    /// Start a transfer and return its id.
    async fn submit(&self, request: &TransferRequest) -> Result<String>;

    /// Current state of a transfer.
    async fn status(&self, transfer_id: &str) -> Result<TransferStatus>;

    /// Final stream URL for one file of a ready transfer.
    async fn link(&self, transfer_id: &str, file_id: &str) -> Result<String>;
}

/// JSON-over-HTTP backend using bearer authentication.
pub struct HttpCloudBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpCloudBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
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
            api_key: api_key.to_string(),
        }
    }

    /// `base_url` with each segment appended, percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let base = &self.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| Error::internal(format!("invalid cloud base URL {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::internal(format!("cloud base URL {} cannot take a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }
}

/// Translate a non-success response into the error taxonomy.
pub fn map_status(status: StatusCode, body: String) -> Error {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthFailure(detail),
        StatusCode::PAYMENT_REQUIRED | StatusCode::TOO_MANY_REQUESTS => {
            Error::QuotaExceeded(detail)
        }
        StatusCode::NOT_FOUND => Error::not_found(detail),
        StatusCode::REQUEST_TIMEOUT => Error::transient(detail),
        s if s.is_server_error() => Error::transient(detail),
        _ => Error::internal(format!("unexpected cloud response {}", detail)),
    }
}

fn map_request_error(context: &str, e: reqwest::Error) -> Error {
    if e.is_decode() {
        Error::transient(format!("{}: malformed response: {}", context, e))
    } else {
        Error::transient(format!("{}: {}", context, e))
    }
}

#[async_trait::async_trait]
impl CloudBackend for HttpCloudBackend {
    async fn submit(&self, request: &TransferRequest) -> Result<String> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        let response = self
            .client
            .post(self.url(&["transfers"])?)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| map_request_error("submit transfer", e))?;
        let created: Created = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| map_request_error("submit transfer", e))?;

        tracing::debug!(
            transfer_id = %created.id,
            title = %request.title,
            "Submitted cloud transfer"
        );
        Ok(created.id)
    }

    async fn status(&self, transfer_id: &str) -> Result<TransferStatus> {
        let response = self
            .client
            .get(self.url(&["transfers", transfer_id])?)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_request_error("poll transfer", e))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| map_request_error("poll transfer", e))
    }

    async fn link(&self, transfer_id: &str, file_id: &str) -> Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct LinkRequest<'a> {
            file_id: &'a str,
        }
        #[derive(Deserialize)]
        struct Link {
            url: String,
        }

        let response = self
            .client
            .post(self.url(&["transfers", transfer_id, "links"])?)
            .bearer_auth(&self.api_key)
            .json(&LinkRequest { file_id })
            .send()
            .await
            .map_err(|e| map_request_error("request link", e))?;
        let link: Link = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| map_request_error("request link", e))?;
        Ok(link.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpCloudBackend {
        HttpCloudBackend::new(&server.uri(), "test-key", Duration::from_secs(2))
    }

    fn request() -> TransferRequest {
        TransferRequest {
            media_type: MediaType::Movie,
            title: "Inception".into(),
            title_variants: vec!["Inception (2010)".into(), "Inception".into()],
            year: Some(2010),
            season: None,
            episode: None,
        }
    }

    #[tokio::test]
    async fn test_transfer_id_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transfers/a%2Fb%3Fc%23d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
            .expect(1)
            .mount(&server)
            .await;

        let status = backend(&server).status("a/b?c#d").await.unwrap();
        assert_eq!(status.status, TransferState::Queued);
    }

    #[test]
    fn test_url_keeps_base_path() {
        let backend =
            HttpCloudBackend::new("https://cloud.example/api/v1/", "k", Duration::from_secs(1));
        let url = backend.url(&["transfers", "tr 1", "links"]).unwrap();
        assert_eq!(url.as_str(), "https://cloud.example/api/v1/transfers/tr%201/links");
    }

    #[tokio::test]
    async fn test_submit_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transfers"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(json!({
                "mediaType": "movie",
                "title": "Inception",
                "titleVariants": ["Inception (2010)", "Inception"],
                "year": 2010
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "tr-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = backend(&server).submit(&request()).await.unwrap();
        assert_eq!(id, "tr-1");
    }

    #[tokio::test]
    async fn test_status_parses_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transfers/tr-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ready",
                "progress": 100,
                "files": [
                    {"id": "f1", "name": "Inception.2010.1080p.ENG.mkv", "size": 4_000_000_000u64},
                    {"id": "f2", "name": "sample.mkv"}
                ]
            })))
            .mount(&server)
            .await;

        let status = backend(&server).status("tr-1").await.unwrap();
        assert_eq!(status.status, TransferState::Ready);
        assert_eq!(status.files.len(), 2);
        assert_eq!(status.files[0].size, Some(4_000_000_000));
        assert_eq!(status.files[1].size, None);
        assert!(status.message.is_none());
    }

    #[tokio::test]
    async fn test_link_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transfers/tr-1/links"))
            .and(body_json(json!({"fileId": "f1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://cdn.example/f1.mkv"})),
            )
            .mount(&server)
            .await;

        let url = backend(&server).link("tr-1", "f1").await.unwrap();
        assert_eq!(url, "https://cdn.example/f1.mkv");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_taxonomy() {
        let cases = [
            (401u16, "auth_failure"),
            (403, "auth_failure"),
            (402, "quota_exceeded"),
            (429, "quota_exceeded"),
            (404, "not_found"),
            (503, "transient_network"),
        ];
        for (code, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/transfers"))
                .respond_with(ResponseTemplate::new(code).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = backend(&server).submit(&request()).await.unwrap_err();
            assert_eq!(err.kind().as_str(), kind, "status {}", code);
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transfers/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "queued"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let backend = HttpCloudBackend::new(&server.uri(), "k", Duration::from_millis(200));
        let err = backend.status("slow").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let backend = HttpCloudBackend::new("http://127.0.0.1:9", "k", Duration::from_secs(1));
        assert_matches!(
            backend.status("x").await,
            Err(Error::TransientNetwork(_))
        );
    }

    #[test]
    fn test_map_status_detail() {
        let err = map_status(StatusCode::TOO_MANY_REQUESTS, "daily limit reached".into());
        assert_matches!(err, Error::QuotaExceeded(ref msg) if msg.contains("daily limit reached"));
    }
}

//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] from config
//! over a temporary library directory and database, then serves it on a
//! random port. Cloud-backed tests point the config at a wiremock server.

#![allow(dead_code)]

use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use reelhunt::config::{Config, LibraryConfig};
use reelhunt::playback::ApiClient;
use reelhunt::server::{self, AppContext};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const MB: u64 = 1024 * 1024;

/// Name of the single library every harness serves.
pub const LIBRARY: &str = "main";

/// A running server over a temporary library.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub dir: TempDir,
    shutdown: CancellationToken,
}

impl TestHarness {
    /// Start a server with default configuration and no cloud backend.
    pub async fn with_server() -> Self {
        Self::with_server_config(Config::default()).await
    }

    /// Start a server whose cloud backend is the service at `cloud_url`.
    pub async fn with_cloud(cloud_url: &str) -> Self {
        let mut config = Config::default();
        config.cloud.enabled = true;
        config.cloud.base_url = cloud_url.to_string();
        config.cloud.api_key = "test-key".to_string();
        config.cloud.poll_interval_secs = 0;
        config.cloud.max_poll_attempts = 20;
        config.cloud.request_timeout_secs = 5;
        Self::with_server_config(config).await
    }

    /// Start a server with a custom configuration. Server address, library
    /// and data directory are filled in by the harness.
    pub async fn with_server_config(mut config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let library_path = dir.path().join("library");
        fs::create_dir_all(&library_path).expect("failed to create library dir");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        config.server.host = "127.0.0.1".to_string();
        config.server.port = addr.port();
        config.server.public_url = format!("http://{addr}");
        config.server.data_dir = Some(dir.path().to_path_buf());
        config.local_index.libraries = vec![LibraryConfig {
            name: LIBRARY.to_string(),
            path: library_path,
        }];

        let ctx = AppContext::from_config(config).expect("failed to build app context");
        let shutdown = CancellationToken::new();
        tokio::spawn(server::serve(listener, ctx.clone(), shutdown.clone()));

        Self {
            ctx,
            addr,
            dir,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&format!("http://{}", self.addr), Duration::from_secs(10))
    }

    pub fn library_path(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Create a sparse file of `size` bytes inside the library.
    pub fn add_file(&self, relative: &str, size: u64) -> PathBuf {
        let path = self.library_path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        let file = File::create(&path).expect("failed to create library file");
        file.set_len(size).expect("failed to size library file");
        path
    }

    /// Create a library file with real content.
    pub fn add_file_with_content(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.library_path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, content).expect("failed to write library file");
        path
    }

    /// The stream URL the local index hands out for a library file.
    pub fn media_url(&self, relative: &str) -> String {
        self.url(&format!("/media/{LIBRARY}/{relative}"))
    }

    /// POST a JSON body to `/api{path}`.
    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url(&format!("/api{path}")))
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }

    /// GET `/api{path}`.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(self.url(&format!("/api{path}")))
            .await
            .expect("request failed")
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        for _ in 0..200 {
            let body: Value = self.get(&format!("/jobs/{job_id}")).await.json().await.unwrap();
            match body["status"].as_str() {
                Some("completed") | Some("error") | Some("cancelled") => return body,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        panic!("job {job_id} did not finish");
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn movie(content_id: &str, title: &str, year: u16, runtime: Option<u32>) -> Value {
    let mut body = json!({
        "contentId": content_id,
        "mediaType": "movie",
        "title": title,
        "year": year,
    });
    if let Some(runtime) = runtime {
        body["runtimeMinutes"] = json!(runtime);
    }
    body
}

pub fn episode(
    content_id: &str,
    title: &str,
    season: u32,
    episode: u32,
    runtime: Option<u32>,
) -> Value {
    let mut body = json!({
        "contentId": content_id,
        "mediaType": "episode",
        "title": title,
        "season": season,
        "episode": episode,
    });
    if let Some(runtime) = runtime {
        body["runtimeMinutes"] = json!(runtime);
    }
    body
}

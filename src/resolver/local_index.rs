//! Local file index.
//!
//! Libraries are directory trees served by this process under
//! `/media/{library}/...`. A probe walks every library, keeps video files, and
//! matches them against the request's title variants.

use super::ContentRequest;
use crate::config::LibraryConfig;
use reelhunt_common::paths::is_video_file;
use reelhunt_common::{Error, MediaType, Result};
use reelhunt_parser::ReleaseName;
use reqwest::Url;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// A video file found in a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub library: String,
    /// Path inside the library, `/`-separated.
    pub relative_path: String,
    pub file_name: String,
    pub size_bytes: Option<u64>,
    pub stream_url: String,
}

impl IndexedFile {
    /// Stable identifier: `library/relative_path`.
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.library, self.relative_path)
    }

    /// First directory below the library root, usually the show or movie
    /// folder.
    fn top_folder(&self) -> Option<&str> {
        let (first, rest) = self.relative_path.split_once('/')?;
        (!rest.is_empty()).then_some(first)
    }
}

/// Fast catalogue of already-available files.
#[async_trait::async_trait]
pub trait LocalIndex: Send + Sync {
    /// Files matching the request, in discovery order.
    ///
    /// Only matches of the first variant that matches anything are returned.
    async fn probe(
        &self,
        variants: &[String],
        request: &ContentRequest,
    ) -> Result<Vec<IndexedFile>>;
}

/// Index over configured library directories.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    libraries: Vec<LibraryConfig>,
    public_url: Url,
}

impl DirectoryIndex {
    pub fn new(libraries: Vec<LibraryConfig>, public_url: &str) -> Result<Self> {
        let public_url = Url::parse(public_url)
            .map_err(|e| {
                Error::invalid_request(format!("invalid public_url '{}': {}", public_url, e))
            })?;
        if public_url.cannot_be_a_base() {
            return Err(Error::invalid_request(format!(
                "public_url '{}' cannot be used as a base URL",
                public_url
            )));
        }
        Ok(Self {
            libraries,
            public_url,
        })
    }

    /// Walk every library and list its video files. Blocking.
    pub fn scan(&self) -> Vec<IndexedFile> {
        let mut files = Vec::new();
        for library in &self.libraries {
            let before = files.len();
            for entry in WalkDir::new(&library.path).follow_links(true).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(library = %library.name, "Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&library.path) else {
                    continue;
                };
                let Some(stream_url) = self.stream_url(&library.name, relative) else {
                    continue;
                };

                files.push(IndexedFile {
                    library: library.name.clone(),
                    relative_path: relative_path_string(relative),
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    size_bytes: entry.metadata().ok().map(|m| m.len()),
                    stream_url,
                });
            }
            tracing::debug!(
                library = %library.name,
                files = files.len() - before,
                "Scanned library"
            );
        }
        files
    }

    fn stream_url(&self, library: &str, relative: &Path) -> Option<String> {
        let mut url = self.public_url.clone();
        {
            let mut segments = url.path_segments_mut().ok()?;
            segments.pop_if_empty().push("media").push(library);
            for component in relative.components() {
                if let Component::Normal(part) = component {
                    segments.push(&part.to_string_lossy());
                }
            }
        }
        Some(url.to_string())
    }
}

#[async_trait::async_trait]
impl LocalIndex for DirectoryIndex {
    async fn probe(
        &self,
        variants: &[String],
        request: &ContentRequest,
    ) -> Result<Vec<IndexedFile>> {
        let index = self.clone();
        let files = tokio::task::spawn_blocking(move || index.scan())
            .await
            .map_err(|e| Error::internal(format!("library scan failed: {}", e)))?;
        Ok(match_files(files, variants, request))
    }
}

fn relative_path_string(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Keep the files matched by the first variant that matches any file.
pub fn match_files(
    files: Vec<IndexedFile>,
    variants: &[String],
    request: &ContentRequest,
) -> Vec<IndexedFile> {
    for variant in variants {
        let matched: Vec<IndexedFile> = files
            .iter()
            .filter(|f| file_matches(f, variant, request))
            .cloned()
            .collect();
        if !matched.is_empty() {
            tracing::debug!(variant = %variant, matches = matched.len(), "Local index match");
            return matched;
        }
    }
    Vec::new()
}

/// Whether `file` satisfies `request` under title `variant`.
///
/// The title may match the file name or, failing that, the top-level folder
/// (`Show Name/Season 1/S01E01.mkv`). Episode constraints always come from the
/// file name.
pub fn file_matches(file: &IndexedFile, variant: &str, request: &ContentRequest) -> bool {
    let release = ReleaseName::parse(&file.file_name);
    let title_match = release.match_title(variant).or_else(|| {
        file.top_folder()
            .and_then(|folder| ReleaseName::parse(folder).match_title(variant))
    });
    let Some(title_match) = title_match else {
        return false;
    };

    if let (Some(wanted), Some(found)) = (request.year, title_match.year) {
        if wanted.abs_diff(found) > 1 {
            return false;
        }
    }

    match request.media_type {
        MediaType::Movie => !release.has_episode_marker(),
        MediaType::Episode => match (request.season, request.episode) {
            (Some(season), Some(episode)) => release.contains_episode(season, episode),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn movie_request(title: &str, year: Option<u16>) -> ContentRequest {
        ContentRequest {
            content_id: "tt1".into(),
            media_type: MediaType::Movie,
            title: title.into(),
            year,
            season: None,
            episode: None,
            runtime_minutes: None,
        }
    }

    fn episode_request(title: &str, season: u32, episode: u32) -> ContentRequest {
        ContentRequest {
            content_id: "tt2".into(),
            media_type: MediaType::Episode,
            title: title.into(),
            year: None,
            season: Some(season),
            episode: Some(episode),
            runtime_minutes: None,
        }
    }

    fn file(relative_path: &str) -> IndexedFile {
        IndexedFile {
            library: "lib".into(),
            relative_path: relative_path.into(),
            file_name: relative_path.rsplit('/').next().unwrap().into(),
            size_bytes: None,
            stream_url: format!("http://localhost/media/lib/{relative_path}"),
        }
    }

    fn touch(root: &Path, relative: &str, size: u64) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::File::create(&path).unwrap().set_len(size).unwrap();
    }

    #[test]
    fn test_movie_rejects_episode_files() {
        let req = movie_request("The Office", None);
        assert!(file_matches(&file("The.Office.2005.1080p.mkv"), "The Office", &req));
        assert!(!file_matches(&file("The.Office.S01E01.1080p.mkv"), "The Office", &req));
    }

    #[test]
    fn test_year_tolerance() {
        let req = movie_request("Dune", Some(2021));
        assert!(file_matches(&file("Dune.2021.2160p.mkv"), "Dune", &req));
        assert!(file_matches(&file("Dune.2022.2160p.mkv"), "Dune", &req));
        assert!(!file_matches(&file("Dune.1984.1080p.mkv"), "Dune", &req));
        // no year in the file is fine
        assert!(file_matches(&file("Dune.1080p.mkv"), "Dune", &req));
    }

    #[test]
    fn test_episode_requires_marker() {
        let req = episode_request("The Office", 2, 5);
        assert!(file_matches(&file("The.Office.S02E05.720p.mkv"), "The Office", &req));
        assert!(!file_matches(&file("The.Office.S02E06.720p.mkv"), "The Office", &req));
        assert!(!file_matches(&file("The.Office.2005.720p.mkv"), "The Office", &req));
    }

    #[test]
    fn test_title_from_show_folder() {
        let req = episode_request("Breaking Bad", 1, 1);
        assert!(file_matches(&file("Breaking Bad/Season 1/S01E01.mkv"), "Breaking Bad", &req));
        assert!(!file_matches(&file("Better Call Saul/Season 1/S01E01.mkv"), "Breaking Bad", &req));
    }

    #[test]
    fn test_first_matching_variant_is_authoritative() {
        let req = episode_request("The Office (US)", 1, 1);
        let variants = reelhunt_parser::variants::title_variants("The Office (US)", None);
        let files = vec![
            file("The.Office.S01E01.mkv"),
            file("The.Office.US.S01E01.mkv"),
        ];
        let matched = match_files(files, &variants, &req);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].file_name, "The.Office.US.S01E01.mkv");
    }

    #[test]
    fn test_scan_lists_videos_with_encoded_urls() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Dune (2021)/Dune.2021.1080p.mkv", 1024);
        touch(dir.path(), "Dune (2021)/Dune.2021.nfo", 10);

        let index = DirectoryIndex::new(
            vec![LibraryConfig {
                name: "movies".into(),
                path: dir.path().to_path_buf(),
            }],
            "http://localhost:8080",
        )
        .unwrap();

        let files = index.scan();
        assert_eq!(files.len(), 1);
        let f = &files[0];
        assert_eq!(f.relative_path, "Dune (2021)/Dune.2021.1080p.mkv");
        assert_eq!(f.size_bytes, Some(1024));
        assert_eq!(
            f.stream_url,
            "http://localhost:8080/media/movies/Dune%20(2021)/Dune.2021.1080p.mkv"
        );
        assert_eq!(f.identifier(), "movies/Dune (2021)/Dune.2021.1080p.mkv");
    }

    #[test]
    fn test_missing_library_is_skipped() {
        let index = DirectoryIndex::new(
            vec![LibraryConfig {
                name: "gone".into(),
                path: "/nonexistent/reelhunt/library".into(),
            }],
            "http://localhost:8080/",
        )
        .unwrap();
        assert!(index.scan().is_empty());
    }

    #[test]
    fn test_invalid_public_url() {
        assert!(DirectoryIndex::new(vec![], "not a url").is_err());
        assert!(DirectoryIndex::new(vec![], "mailto:someone@example.com").is_err());
    }

    #[tokio::test]
    async fn test_probe_matches_episode() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "The Office (US)/Season 2/The.Office.US.S02E05.720p.mkv", 300);
        touch(dir.path(), "The Office (US)/Season 2/The.Office.US.S02E06.720p.mkv", 300);

        let index = DirectoryIndex::new(
            vec![LibraryConfig {
                name: "tv".into(),
                path: dir.path().to_path_buf(),
            }],
            "http://media.local",
        )
        .unwrap();

        let req = episode_request("The Office (US)", 2, 5);
        let variants = reelhunt_parser::variants::title_variants(&req.title, None);
        let files = index.probe(&variants, &req).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].stream_url.starts_with("http://media.local/media/tv/"));
    }
}

//! Path utilities for detecting playable files by extension.

use std::path::Path;

/// List of supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "mov", "wmv", "flv",
];

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use reelhunt_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.mkv")));
/// assert!(is_video_file(Path::new("/path/to/video.MP4")));
/// assert!(!is_video_file(Path::new("subtitle.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check a bare file name (e.g. one reported by a remote service).
pub fn is_video_name(name: &str) -> bool {
    is_video_file(Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file(Path::new("a.mkv")));
        assert!(is_video_file(Path::new("a.WEBM")));
        assert!(!is_video_file(Path::new("a.nfo")));
        assert!(!is_video_file(Path::new("noext")));
    }

    #[test]
    fn test_video_name() {
        assert!(is_video_name("Show.S01E01.1080p.mkv"));
        assert!(!is_video_name("Show.S01E01.1080p.srt"));
    }
}

//! Release-name tokenization and title matching.
//!
//! File names such as `The.Office.US.S02E05.720p.HDTV.x264.mkv` are split into
//! lowercase word tokens. A title variant matches when the file's tokens start
//! with the variant's tokens and the next token is a stop token (year, episode
//! marker, quality marker) or the end of the name. Requiring the stop token
//! keeps "Up" from matching "Upgrade.2018" and "The Office" from matching
//! "The.Office.Christmas.Special".

use regex::Regex;
use reelhunt_common::paths::is_video_name;
use std::path::Path;
use std::sync::LazyLock;

static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^s(\d{1,2})((?:e\d{1,3})+)$").expect("valid season/episode pattern")
});

static CROSS_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})x(\d{2,3})$").expect("valid NxNN pattern")
});

static RESOLUTION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3,4}[pi]\d*$").expect("valid resolution pattern"));

/// Words that never belong to a title when they follow one.
static QUALITY_WORDS: phf::Set<&'static str> = phf::phf_set! {
    "4k", "uhd", "fhd", "sd", "hd",
    "bluray", "bdrip", "brrip", "bdremux", "remux",
    "web", "webdl", "webrip", "hdtv", "dvdrip", "dvd", "hdrip", "cam", "ts",
    "x264", "x265", "h264", "h265", "hevc", "avc", "xvid",
    "hdr", "hdr10", "dv", "10bit", "8bit",
    "proper", "repack", "extended", "unrated", "remastered", "complete",
    "multi", "dual", "subbed", "dubbed",
};

/// Classification of a single release-name token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An ordinary title word.
    Word,
    /// A plausible release year (1900-2099).
    Year(u16),
    /// `SxxEyy[Ezz]` or `NxNN` marker.
    Episode { season: u32, episodes: Vec<u32> },
    /// Resolution, source, codec or edition marker.
    Quality,
}

impl TokenKind {
    /// Whether this token terminates a title.
    pub fn is_stop(&self) -> bool {
        !matches!(self, TokenKind::Word)
    }
}

/// Split text into lowercase word tokens.
///
/// Apostrophes are dropped inside words (`Grey's` -> `greys`), `&` is kept as
/// its own token, every other non-alphanumeric character separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if ch == '&' {
            tokens.push("&".to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Classify a lowercase token.
pub fn classify_token(token: &str) -> TokenKind {
    if let Some(caps) = SEASON_EPISODE.captures(token) {
        let season = caps[1].parse().unwrap_or(0);
        let episodes = caps[2]
            .split('e')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        return TokenKind::Episode { season, episodes };
    }
    if let Some(caps) = CROSS_EPISODE.captures(token) {
        let season = caps[1].parse().unwrap_or(0);
        let episode = caps[2].parse().unwrap_or(0);
        return TokenKind::Episode {
            season,
            episodes: vec![episode],
        };
    }
    if token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(year) = token.parse::<u16>() {
            if (1900..=2099).contains(&year) {
                return TokenKind::Year(year);
            }
        }
    }
    if RESOLUTION_TOKEN.is_match(token) || QUALITY_WORDS.contains(token) {
        return TokenKind::Quality;
    }
    TokenKind::Word
}

/// Result of matching a title variant against a release name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    /// Year token directly after the matched title, if any.
    pub year: Option<u16>,
}

/// A tokenized release name.
#[derive(Debug, Clone)]
pub struct ReleaseName {
    tokens: Vec<String>,
    kinds: Vec<TokenKind>,
}

impl ReleaseName {
    /// Parse a file name or path. Directory components and a video extension
    /// are removed before tokenizing.
    pub fn parse(name: &str) -> Self {
        let path = Path::new(name);
        let base = if is_video_name(name) {
            path.file_stem()
        } else {
            path.file_name()
        }
        .and_then(|s| s.to_str())
        .unwrap_or(name);

        let tokens = tokenize(base);
        let kinds = tokens.iter().map(|t| classify_token(t)).collect();
        Self { tokens, kinds }
    }

    /// The lowercase tokens of the name.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// First episode marker in the name, as `(season, episodes)`.
    pub fn episode_marker(&self) -> Option<(u32, &[u32])> {
        self.kinds.iter().find_map(|k| match k {
            TokenKind::Episode { season, episodes } => Some((*season, episodes.as_slice())),
            _ => None,
        })
    }

    /// Whether the name carries any episode marker.
    pub fn has_episode_marker(&self) -> bool {
        self.episode_marker().is_some()
    }

    /// Whether any episode marker covers the given season and episode.
    pub fn contains_episode(&self, season: u32, episode: u32) -> bool {
        self.kinds.iter().any(|k| match k {
            TokenKind::Episode {
                season: s,
                episodes,
            } => *s == season && episodes.contains(&episode),
            _ => false,
        })
    }

    /// Match a title variant against the start of this name.
    pub fn match_title(&self, variant: &str) -> Option<TitleMatch> {
        let wanted = tokenize(variant);
        if wanted.is_empty() || wanted.len() > self.tokens.len() {
            return None;
        }
        if self.tokens[..wanted.len()] != wanted[..] {
            return None;
        }

        match self.kinds.get(wanted.len()) {
            None => Some(TitleMatch { year: None }),
            Some(TokenKind::Year(year)) => Some(TitleMatch { year: Some(*year) }),
            Some(kind) if kind.is_stop() => Some(TitleMatch { year: None }),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Grey's.Anatomy.S01E01.720p"),
            vec!["greys", "anatomy", "s01e01", "720p"]
        );
        assert_eq!(tokenize("Law & Order"), vec!["law", "&", "order"]);
        assert_eq!(tokenize("ENG+DUAL"), vec!["eng", "dual"]);
        assert!(tokenize("...").is_empty());
    }

    #[test]
    fn test_classify_token() {
        assert_eq!(classify_token("2019"), TokenKind::Year(2019));
        assert_eq!(classify_token("1080p"), TokenKind::Quality);
        assert_eq!(classify_token("x265"), TokenKind::Quality);
        assert_eq!(classify_token("office"), TokenKind::Word);
        assert_eq!(classify_token("12345"), TokenKind::Word);
        assert_eq!(
            classify_token("s02e05"),
            TokenKind::Episode {
                season: 2,
                episodes: vec![5]
            }
        );
        assert_eq!(
            classify_token("s01e01e02"),
            TokenKind::Episode {
                season: 1,
                episodes: vec![1, 2]
            }
        );
        assert_eq!(
            classify_token("3x07"),
            TokenKind::Episode {
                season: 3,
                episodes: vec![7]
            }
        );
    }

    #[test]
    fn test_parse_strips_extension_and_directories() {
        let name = ReleaseName::parse("/media/tv/The.Office.S01E01.mkv");
        assert_eq!(name.tokens(), &["the", "office", "s01e01"]);
    }

    #[test]
    fn test_episode_lookup() {
        let name = ReleaseName::parse("Show.S02E05E06.1080p.mkv");
        assert!(name.contains_episode(2, 5));
        assert!(name.contains_episode(2, 6));
        assert!(!name.contains_episode(2, 7));
        assert!(!name.contains_episode(1, 5));
        assert_eq!(name.episode_marker(), Some((2, &[5u32, 6][..])));
    }

    #[test]
    fn test_match_title_requires_stop_token() {
        let name = ReleaseName::parse("Upgrade.2018.1080p.mkv");
        assert!(name.match_title("Up").is_none());
        assert!(name.match_title("Upgrade").is_some());

        let special = ReleaseName::parse("The.Office.Christmas.Special.mkv");
        assert!(special.match_title("The Office").is_none());
    }

    #[test]
    fn test_match_title_reports_year() {
        let name = ReleaseName::parse("Dune.2021.2160p.WEB-DL.mkv");
        assert_eq!(name.match_title("Dune"), Some(TitleMatch { year: Some(2021) }));
        assert_eq!(name.match_title("Dune (2021)"), Some(TitleMatch { year: None }));
    }

    #[test]
    fn test_match_title_numeric_title() {
        let name = ReleaseName::parse("1917.2019.1080p.BluRay.mkv");
        assert_eq!(name.match_title("1917"), Some(TitleMatch { year: Some(2019) }));
    }

    #[test]
    fn test_match_title_whole_name() {
        let name = ReleaseName::parse("Amelie.avi");
        assert!(name.match_title("Amelie").is_some());
        assert!(name.match_title("Amelie Poulain").is_none());
    }
}

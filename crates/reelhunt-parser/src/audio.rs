//! Audio-track scoring from release name markers.
//!
//! English, dual or multi audio is worth +50, any subtitle marker +20, and a
//! release that only advertises foreign audio loses 30.

use crate::release::tokenize;

/// Score awarded for an English, dual or multi audio marker.
pub const ENGLISH_BONUS: i32 = 50;
/// Score awarded for a subtitle marker.
pub const SUBTITLE_BONUS: i32 = 20;
/// Penalty for foreign-only audio.
pub const FOREIGN_ONLY_PENALTY: i32 = -30;

static ENGLISH_MARKERS: phf::Set<&'static str> = phf::phf_set! {
    "eng", "english", "dual", "multi", "multiaudio", "dualaudio",
};

static SUBTITLE_MARKERS: phf::Set<&'static str> = phf::phf_set! {
    "sub", "subs", "subbed", "subtitle", "subtitles", "subtitled",
    "esub", "esubs", "msub", "msubs", "hardsub", "softsub", "sdh",
};

static FOREIGN_MARKERS: phf::Set<&'static str> = phf::phf_set! {
    "ita", "italian",
    "fre", "fra", "french", "truefrench", "vff", "vfq", "vf",
    "ger", "deu", "german",
    "spa", "esp", "spanish", "castellano", "latino",
    "por", "portuguese",
    "rus", "russian",
    "pol", "polish",
    "tur", "turkish",
    "hin", "hindi", "tam", "tamil", "tel", "telugu", "mal", "malayalam", "kan", "kannada",
    "jpn", "japanese", "kor", "korean", "chi", "chinese", "mandarin", "cantonese",
    "ara", "arabic", "nld", "dutch", "swe", "swedish", "nor", "norwegian",
    "dan", "danish", "fin", "finnish", "cze", "czech", "hun", "hungarian",
};

/// Language and subtitle markers found in a release's descriptive text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioMarkers {
    pub english: bool,
    pub subtitles: bool,
    pub foreign: bool,
}

impl AudioMarkers {
    /// Scan text for markers.
    pub fn detect(text: &str) -> Self {
        let mut markers = Self::default();
        for token in tokenize(text) {
            let token = token.as_str();
            markers.english |= ENGLISH_MARKERS.contains(token);
            markers.subtitles |= SUBTITLE_MARKERS.contains(token);
            markers.foreign |= FOREIGN_MARKERS.contains(token);
        }
        markers
    }

    /// Total score for these markers.
    pub fn score(&self) -> i32 {
        let mut score = 0;
        if self.english {
            score += ENGLISH_BONUS;
        }
        if self.subtitles {
            score += SUBTITLE_BONUS;
        }
        if self.foreign && !self.english {
            score += FOREIGN_ONLY_PENALTY;
        }
        score
    }
}

/// Score a candidate's descriptive text. Higher is better.
pub fn score(text: &str) -> i32 {
    AudioMarkers::detect(text).score()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_dual_beats_italian_only() {
        assert_eq!(score("Movie.2019.1080p.ENG+DUAL.mkv"), 50);
        assert_eq!(score("Movie.2019.1080p.ITA.mkv"), -30);
    }

    #[test]
    fn test_subtitles_add_bonus() {
        assert_eq!(score("Movie.1080p.ESubs.mkv"), 20);
        assert_eq!(score("Movie.1080p.English.Subs.mkv"), 70);
    }

    #[test]
    fn test_foreign_with_english_not_penalised() {
        assert_eq!(score("Movie.1080p.ITA-ENG.mkv"), 50);
        assert_eq!(score("Movie.1080p.Hindi.Multi.Audio.mkv"), 50);
    }

    #[test]
    fn test_foreign_only_with_subs() {
        assert_eq!(score("Film.720p.FRENCH.Subbed.mkv"), -10);
    }

    #[test]
    fn test_no_markers_scores_zero() {
        assert_eq!(score("Movie.2019.1080p.BluRay.x264.mkv"), 0);
    }

    #[test]
    fn test_markers_need_whole_tokens() {
        // "italian" inside a title word must not count
        assert_eq!(score("Italiano.Brothers.1080p.mkv"), 0);
        assert_eq!(AudioMarkers::detect("Suburbicon.2017.mkv"), AudioMarkers::default());
    }
}

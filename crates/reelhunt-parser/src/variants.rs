//! Title variant generation.
//!
//! Produces the ordered list of strings probed against the local index and
//! sent to the cloud backend, most specific first. Callers treat the first
//! variant that matches anything as authoritative, so the order is part of
//! the contract: identical input always yields the identical sequence.
//!
//! Order:
//! 1. title with ` (year)` appended (when a year is given and the title has no
//!    trailing parenthetical of its own)
//! 2. the title as given
//! 3. the title without its trailing parenthetical (`(US)`, `(UK)`, `(2019)`)
//! 4. punctuation-stripped forms of 2 and 3
//! 5. abbreviation-expanded forms of 4
//! 6. forms of 2 and 3 without a leading article
//!
//! Duplicates keep their first position.

use regex::Regex;
use std::sync::LazyLock;

static TRAILING_PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s*\(([^()]*)\)\s*$").expect("valid parenthetical pattern")
});

static ABBREVIATIONS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "&" => "and",
    "vs" => "versus",
    "dr" => "doctor",
    "mr" => "mister",
    "mrs" => "missus",
    "st" => "saint",
    "pt" => "part",
    "vol" => "volume",
    "ep" => "episode",
};

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

/// Generate the ordered probe variants for a title.
///
/// Always returns at least one element: the unmodified title.
///
/// # Examples
///
/// ```
/// use reelhunt_parser::variants::title_variants;
///
/// let v = title_variants("Grey's Anatomy", Some(2005));
/// assert_eq!(v, vec!["Grey's Anatomy (2005)", "Grey's Anatomy", "Greys Anatomy"]);
/// ```
pub fn title_variants(title: &str, year: Option<u16>) -> Vec<String> {
    let base = collapse_whitespace(title);
    if base.is_empty() {
        return vec![title.to_string()];
    }

    let stripped = strip_trailing_parenthetical(&base);
    let mut out = Variants::default();

    if let Some(year) = year {
        if stripped.is_none() {
            out.push(format!("{base} ({year})"));
        }
    }

    out.push(base.clone());
    if let Some(ref s) = stripped {
        out.push(s.clone());
    }

    let mut plain = vec![strip_punctuation(&base)];
    if let Some(ref s) = stripped {
        plain.push(strip_punctuation(s));
    }
    for p in &plain {
        out.push(p.clone());
    }
    for p in &plain {
        out.push(expand_abbreviations(p));
    }

    let mut articleless = vec![drop_leading_article(&base)];
    if let Some(ref s) = stripped {
        articleless.push(drop_leading_article(s));
    }
    for a in articleless.into_iter().flatten() {
        out.push(a);
    }

    out.into_vec()
}

/// Insertion-ordered set of non-empty variants.
#[derive(Default)]
struct Variants(Vec<String>);

impl Variants {
    fn push(&mut self, candidate: String) {
        if candidate.is_empty() || self.0.contains(&candidate) {
            return;
        }
        self.0.push(candidate);
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove a trailing `(...)` group. Returns `None` when there is none or when
/// nothing would be left.
fn strip_trailing_parenthetical(title: &str) -> Option<String> {
    let caps = TRAILING_PARENTHETICAL.captures(title)?;
    let head = caps.get(1)?.as_str().trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Drop apostrophes, turn other punctuation into spaces, keep `&` as a word.
fn strip_punctuation(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        match ch {
            '\'' | '\u{2019}' => {}
            '&' => out.push_str(" & "),
            c if c.is_alphanumeric() || c.is_whitespace() => out.push(c),
            _ => out.push(' '),
        }
    }
    collapse_whitespace(&out)
}

fn expand_abbreviations(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| {
            ABBREVIATIONS
                .get(word.to_lowercase().as_str())
                .copied()
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn drop_leading_article(title: &str) -> Option<String> {
    let (first, rest) = title.split_once(' ')?;
    if LEADING_ARTICLES.contains(&first.to_lowercase().as_str()) && !rest.trim().is_empty() {
        Some(rest.trim().to_string())
    } else {
        None
    }
}

//! Dominant-language detection over extracted text.
//!
//! Heuristic, not a statistical model: each candidate language has a curated
//! function-word list compiled into one case-insensitive word-boundary
//! alternation; the language with the most matches wins. Ties and all-zero
//! counts fall back to a fixed default, so the result is fully reproducible
//! for a given text.

use regex::RegexBuilder;
use std::sync::OnceLock;

/// Candidate languages, each with its two-letter tag and function words.
const CANDIDATES: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "in", "is", "that", "for", "with", "was", "are", "this",
            "have", "from", "not", "been",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "des", "et", "est", "dans", "pour", "avec", "une", "que",
            "qui", "sur", "pas", "sont",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "von", "mit", "für", "auf", "nicht", "ein", "eine",
            "den", "dem", "sich", "auch",
        ],
    ),
];

fn matchers() -> &'static Vec<(&'static str, regex::Regex)> {
    static MATCHERS: OnceLock<Vec<(&'static str, regex::Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        CANDIDATES
            .iter()
            .map(|(tag, words)| {
                let pattern = format!(r"\b(?:{})\b", words.join("|"));
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("language word lists compile");
                (*tag, re)
            })
            .collect()
    })
}

/// Picks the dominant language tag for `text`.
///
/// Returns `fallback` for empty text, all-zero match counts, and ties on the
/// top count.
pub fn detect_language(text: &str, fallback: &str) -> String {
    if text.trim().is_empty() {
        return fallback.to_string();
    }

    let counts: Vec<(&str, usize)> = matchers()
        .iter()
        .map(|(tag, re)| (*tag, re.find_iter(text).count()))
        .collect();

    let best = counts.iter().max_by_key(|(_, n)| *n);
    match best {
        Some((tag, n)) if *n > 0 => {
            let tied = counts.iter().filter(|(_, m)| m == n).count();
            if tied > 1 {
                fallback.to_string()
            } else {
                tag.to_string()
            }
        }
        _ => fallback.to_string(),
    }
}

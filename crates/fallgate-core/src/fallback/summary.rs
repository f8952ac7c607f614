//! Snippet selection and formatting for retrieval-only answers.
//!
//! Everything here is deterministic: the same sources always produce the
//! same text.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::types::SourceRecord;

/// Most snippets quoted in a summary.
pub const MAX_SUMMARY_SNIPPETS: usize = 5;

/// Character limit for a quoted snippet (before the ellipsis).
pub const SNIPPET_CHAR_LIMIT: usize = 200;

/// Most sources listed as references.
pub const MAX_REFERENCES: usize = 10;

/// Most technical phrases extracted for technical queries.
pub const MAX_TECHNICAL_POINTS: usize = 3;

const MIN_POINT_CHARS: usize = 15;
const MAX_POINT_CHARS: usize = 160;

lazy_static! {
    /// Markers of technical content inside a sentence.
    static ref TECHNICAL_MARKERS: Regex = Regex::new(
        r"(?i)(`[^`]+`|\w+\(\)|\w+::\w+|--[a-z][\w-]*|\b(error|exception|install|configure|config|version|command|function|method|api|endpoint|deploy|npm|pip|cargo|docker|kubectl|sudo|import|return|null|timeout|port)\b)"
    ).unwrap();

    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?]+(\s+|$)").unwrap();

    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}_]+").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// A rendered summary plus the facts that went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Summary text ready to drop into a template
    pub text: String,

    /// Distinct domains across the referenced sources, first-seen order
    pub domains: Vec<String>,

    /// Number of snippets quoted
    pub snippet_count: usize,
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Shorten text to at most `max_chars` characters plus an ellipsis,
/// preferring to cut at a word boundary.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = normalize_whitespace(text);
    if text.chars().count() <= max_chars {
        return text;
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];

    // Back off to the last space unless that throws away most of the text
    let head = match head.rfind(' ') {
        Some(space) if head[..space].chars().count() >= max_chars / 2 => &head[..space],
        _ => head,
    };

    let head = head.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'));
    format!("{}...", head)
}

/// Number of distinct words of four or more characters.
fn informativeness(snippet: &str) -> usize {
    WORD.find_iter(snippet)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() >= 4)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Pick the most informative snippets, returning their source indices.
///
/// Ties keep source order; empty snippets are skipped.
pub fn select_snippets(sources: &[SourceRecord], limit: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, usize)> = sources
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.snippet.trim().is_empty())
        .map(|(i, s)| (i, informativeness(&s.snippet)))
        .collect();

    // Stable sort keeps source order on ties
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().take(limit).map(|(i, _)| i).collect()
}

/// Distinct domains in first-seen order.
pub fn distinct_domains(sources: &[SourceRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    sources
        .iter()
        .filter_map(|s| s.effective_domain())
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

/// Build the summary section from already-retrieved sources.
pub fn build_summary(sources: &[SourceRecord]) -> Summary {
    if sources.is_empty() {
        return Summary {
            text: "No sources were found for your query, so there is nothing to summarize \
                   right now. Try rephrasing the question or check back shortly."
                .to_string(),
            domains: Vec::new(),
            snippet_count: 0,
        };
    }

    let domains = distinct_domains(sources);
    let selected = select_snippets(sources, MAX_SUMMARY_SNIPPETS);

    let mut text = if selected.is_empty() {
        format!(
            "Found {} source(s), but none of them included a usable excerpt.",
            sources.len()
        )
    } else {
        let mut lines = vec![format!(
            "Key information from {} of {} source(s):",
            selected.len(),
            sources.len()
        )];
        lines.push(String::new());
        for idx in &selected {
            let snippet = truncate_snippet(&sources[*idx].snippet, SNIPPET_CHAR_LIMIT);
            lines.push(format!("- {} [{}]", snippet, idx + 1));
        }
        lines.join("\n")
    };

    if !domains.is_empty() {
        text.push_str("\n\nSources consulted span: ");
        text.push_str(&domains.join(", "));
    }

    Summary {
        text,
        domains,
        snippet_count: selected.len(),
    }
}

/// Numbered reference list, one source per line.
pub fn format_references(sources: &[SourceRecord]) -> String {
    if sources.is_empty() {
        return "No sources available.".to_string();
    }

    sources
        .iter()
        .take(MAX_REFERENCES)
        .enumerate()
        .map(|(i, s)| {
            let title = match normalize_whitespace(&s.title) {
                t if t.is_empty() => "Untitled source".to_string(),
                t => t,
            };
            match (s.url.trim(), s.effective_domain()) {
                ("", _) => format!("[{}] {}", i + 1, title),
                (url, Some(domain)) => format!("[{}] {} ({}) - {}", i + 1, title, domain, url),
                (url, None) => format!("[{}] {} - {}", i + 1, title, url),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull short sentences that carry technical markers out of the snippets.
pub fn extract_technical_points(sources: &[SourceRecord], limit: usize) -> Vec<String> {
    let mut points: Vec<String> = Vec::new();

    for source in sources {
        let snippet = normalize_whitespace(&source.snippet);
        for sentence in SENTENCE_BREAK.split(&snippet) {
            if points.len() >= limit {
                return points;
            }

            let sentence = sentence.trim();
            let len = sentence.chars().count();
            if !(MIN_POINT_CHARS..=MAX_POINT_CHARS).contains(&len) {
                continue;
            }
            if !TECHNICAL_MARKERS.is_match(sentence) {
                continue;
            }
            if points.iter().any(|p| p.eq_ignore_ascii_case(sentence)) {
                continue;
            }
            points.push(sentence.to_string());
        }
    }

    points
}

/// Render technical points as a bullet list.
pub fn format_technical_points(points: &[String]) -> String {
    if points.is_empty() {
        return "- No specific technical details could be extracted from the sources.".to_string();
    }

    points
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn source(domain: &str, snippet: &str) -> SourceRecord {
        SourceRecord::new(
            format!("About {}", domain),
            format!("https://{}/page", domain),
            domain,
            snippet,
        )
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_snippet("  short   text ", 50), "short text");
    }

    #[test]
    fn test_truncate_cuts_at_word_boundary() {
        let text = "alpha beta gamma delta epsilon";
        assert_eq!(truncate_snippet(text, 14), "alpha beta...");
    }

    #[test]
    fn test_truncate_handles_multibyte() {
        let text = "ééééééééééééééééééééé";
        let out = truncate_snippet(text, 5);
        assert_eq!(out, "ééééé...");
    }

    #[test]
    fn test_selection_prefers_informative_snippets() {
        let sources = vec![
            source("a.com", "ok"),
            source("b.com", "Rust ownership rules prevent data races across threads"),
            source("c.com", ""),
            source("d.com", "Borrow checker"),
        ];

        let picked = select_snippets(&sources, 5);
        assert_eq!(picked, vec![1, 3, 0]);
    }

    #[test]
    fn test_selection_respects_limit_and_order_on_ties() {
        let sources: Vec<_> = (0..8)
            .map(|i| source(&format!("s{}.com", i), "same words here always"))
            .collect();
        assert_eq!(select_snippets(&sources, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_domains_are_distinct_in_order() {
        let sources = vec![
            source("b.com", "x"),
            source("a.com", "y"),
            source("b.com", "z"),
        ];
        assert_eq!(distinct_domains(&sources), vec!["b.com", "a.com"]);
    }

    #[test]
    fn test_empty_summary_says_no_sources() {
        let summary = build_summary(&[]);
        assert!(summary.text.contains("No sources were found"));
        assert_eq!(summary.snippet_count, 0);
        assert_eq!(format_references(&[]), "No sources available.");
    }

    #[test]
    fn test_references_are_numbered_and_capped() {
        let sources: Vec<_> = (0..12)
            .map(|i| source(&format!("s{}.com", i), "text"))
            .collect();
        let refs = format_references(&sources);
        let lines: Vec<_> = refs.lines().collect();

        assert_eq!(lines.len(), MAX_REFERENCES);
        assert_eq!(lines[0], "[1] About s0.com (s0.com) - https://s0.com/page");
        assert!(lines[9].starts_with("[10] "));
    }

    #[test]
    fn test_technical_points_extracted() {
        let sources = vec![source(
            "docs.rs",
            "Run `cargo update` to refresh the lockfile. Nice weather today. \
             The error occurs when the port is already bound by another process.",
        )];

        let points = extract_technical_points(&sources, MAX_TECHNICAL_POINTS);
        assert_eq!(
            points,
            vec![
                "Run `cargo update` to refresh the lockfile",
                "The error occurs when the port is already bound by another process",
            ]
        );
    }

    #[test]
    fn test_technical_points_capped() {
        let sources = vec![source(
            "x.io",
            "Set the timeout value first. Then install the package. \
             Check the version number. Finally restart the docker daemon.",
        )];
        assert_eq!(extract_technical_points(&sources, 3).len(), 3);
    }

    proptest! {
        #[test]
        fn prop_truncation_bounded(text in "\\PC{0,400}", limit in 1usize..250) {
            let out = truncate_snippet(&text, limit);
            prop_assert!(out.chars().count() <= limit + 3);
        }

        #[test]
        fn prop_summary_deterministic(snippets in proptest::collection::vec("[a-z ]{0,80}", 0..12)) {
            let sources: Vec<_> = snippets
                .iter()
                .enumerate()
                .map(|(i, s)| source(&format!("d{}.org", i % 3), s))
                .collect();
            prop_assert_eq!(build_summary(&sources), build_summary(&sources));
            prop_assert!(select_snippets(&sources, MAX_SUMMARY_SNIPPETS).len() <= MAX_SUMMARY_SNIPPETS);
        }
    }
}

//! Lightweight query classification for template selection.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Words that mark a query as technical.
    static ref TECHNICAL_KEYWORDS: Regex = Regex::new(
        r"(?i)\b(errors?|bugs?|fix(es|ed|ing)?|code|coding|apis?|deploy(s|ed|ing|ment)?|debug(ging)?|install(ation|ing)?|config(ure|uration)?|exceptions?|crash(es|ed|ing)?|functions?|compil(e|er|ing)|build(s|ing)?|librar(y|ies)|databases?|servers?|syntax|versions?|scripts?|docker|kubernetes|stack ?trace)\b"
    ).unwrap();
}

/// Which answer template a query gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    General,
    Technical,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::General => "general",
            QueryKind::Technical => "technical",
        }
    }
}

/// Classify a query by keyword match.
pub fn classify_query(query: &str) -> QueryKind {
    if TECHNICAL_KEYWORDS.is_match(query) {
        QueryKind::Technical
    } else {
        QueryKind::General
    }
}

//! Answer templates.
//!
//! Templates are plain text with `{placeholder}` slots. `{{` and `}}` render
//! literal braces. Templates are parsed once; unknown placeholders are
//! rejected at parse time so a bad config fails at startup.

use thiserror::Error;

use super::classifier::QueryKind;

/// Errors from parsing or rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{template}' uses unknown placeholder {{{name}}}")]
    UnknownPlaceholder { template: String, name: String },

    #[error("template '{template}' has an unterminated placeholder at byte {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("template '{template}' needs a value for {{{name}}} that was not provided")]
    MissingValue { template: String, name: String },
}

/// A slot a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Query,
    Summary,
    Domains,
    References,
    TechnicalPoints,
    SourceCount,
    TraceId,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "query" => Placeholder::Query,
            "summary" => Placeholder::Summary,
            "domains" => Placeholder::Domains,
            "references" => Placeholder::References,
            "technical_points" => Placeholder::TechnicalPoints,
            "source_count" => Placeholder::SourceCount,
            "trace_id" => Placeholder::TraceId,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Query => "query",
            Placeholder::Summary => "summary",
            Placeholder::Domains => "domains",
            Placeholder::References => "references",
            Placeholder::TechnicalPoints => "technical_points",
            Placeholder::SourceCount => "source_count",
            Placeholder::TraceId => "trace_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Values available when rendering.
///
/// `technical_points` is only filled for technical queries.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    pub query: String,
    pub summary: String,
    pub domains: String,
    pub references: String,
    pub technical_points: Option<String>,
    pub source_count: usize,
    pub trace_id: String,
}

impl TemplateValues {
    fn get(&self, slot: Placeholder) -> Option<String> {
        match slot {
            Placeholder::Query => Some(self.query.clone()),
            Placeholder::Summary => Some(self.summary.clone()),
            Placeholder::Domains => Some(self.domains.clone()),
            Placeholder::References => Some(self.references.clone()),
            Placeholder::TechnicalPoints => self.technical_points.clone(),
            Placeholder::SourceCount => Some(self.source_count.to_string()),
            Placeholder::TraceId => Some(self.trace_id.clone()),
        }
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text.
    pub fn parse(name: impl Into<String>, body: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = body;
        let mut offset = 0;

        while let Some(pos) = rest.find(['{', '}']) {
            literal.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                literal.push('{');
                rest = &tail[2..];
                offset += pos + 2;
            } else if tail.starts_with("}}") {
                literal.push('}');
                rest = &tail[2..];
                offset += pos + 2;
            } else if tail.starts_with('}') {
                literal.push('}');
                rest = &tail[1..];
                offset += pos + 1;
            } else {
                let close = tail.find('}').ok_or_else(|| TemplateError::Unterminated {
                    template: name.clone(),
                    offset: offset + pos,
                })?;
                let key = &tail[1..close];
                let slot = Placeholder::parse(key).ok_or_else(|| {
                    TemplateError::UnknownPlaceholder {
                        template: name.clone(),
                        name: key.to_string(),
                    }
                })?;

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Slot(slot));
                rest = &tail[close + 1..];
                offset += pos + close + 1;
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { name, segments })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the template references a slot.
    pub fn uses(&self, slot: Placeholder) -> bool {
        self.segments.iter().any(|s| *s == Segment::Slot(slot))
    }

    /// Fill every slot.
    pub fn render(&self, values: &TemplateValues) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => {
                    let value = values.get(*slot).ok_or_else(|| TemplateError::MissingValue {
                        template: self.name.clone(),
                        name: slot.name().to_string(),
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

/// Built-in template for general questions.
pub const GENERAL_TEMPLATE: &str = "\
I'm currently unable to generate a full AI response, so here is a summary assembled \
directly from the sources I found for \"{query}\".

{summary}

Sources:
{references}

This answer was assembled from search results without AI analysis. Please consult \
the sources above for complete and verified information.";

/// Built-in template for technical questions.
pub const TECHNICAL_TEMPLATE: &str = "\
I'm currently unable to generate a full AI response to your technical question \
\"{query}\", so here is what the retrieved documentation and discussions say.

{summary}

Key technical points:
{technical_points}

Sources:
{references}

These points were extracted automatically and have not been verified. Check the \
linked documentation before applying any fix or configuration change.";

/// The pair of templates used by the fallback composer.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    general: Template,
    technical: Template,
}

impl TemplateSet {
    /// Built-in templates with optional replacements.
    pub fn with_overrides(
        general: Option<&str>,
        technical: Option<&str>,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            general: Template::parse("general", general.unwrap_or(GENERAL_TEMPLATE))?,
            technical: Template::parse("technical", technical.unwrap_or(TECHNICAL_TEMPLATE))?,
        })
    }

    /// Template for a query kind.
    pub fn for_kind(&self, kind: QueryKind) -> &Template {
        match kind {
            QueryKind::General => &self.general,
            QueryKind::Technical => &self.technical,
        }
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            general: Template::parse("general", GENERAL_TEMPLATE)
                .unwrap_or_else(|e| unreachable!("built-in general template: {}", e)),
            technical: Template::parse("technical", TECHNICAL_TEMPLATE)
                .unwrap_or_else(|e| unreachable!("built-in technical template: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues {
        TemplateValues {
            query: "why".to_string(),
            summary: "because".to_string(),
            source_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_fills_slots() {
        let t = Template::parse("t", "Q: {query} / S: {summary} ({source_count})").unwrap();
        assert_eq!(t.render(&values()).unwrap(), "Q: why / S: because (2)");
    }

    #[test]
    fn test_escaped_braces() {
        let t = Template::parse("t", "{{literal}} and {query} }").unwrap();
        assert_eq!(t.render(&values()).unwrap(), "{literal} and why }");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = Template::parse("t", "hello {nope}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                template: "t".to_string(),
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_unterminated_rejected() {
        let err = Template::parse("t", "abc {query").unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated { offset: 4, .. }));
    }

    #[test]
    fn test_missing_value_fails_render() {
        let t = Template::parse("t", "{technical_points}").unwrap();
        assert!(t.uses(Placeholder::TechnicalPoints));
        assert!(matches!(
            t.render(&values()),
            Err(TemplateError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_builtins_parse() {
        let set = TemplateSet::default();
        assert!(set.for_kind(QueryKind::Technical).uses(Placeholder::TechnicalPoints));
        assert!(!set.for_kind(QueryKind::General).uses(Placeholder::TechnicalPoints));
        assert_eq!(set.for_kind(QueryKind::General).name(), "general");
    }
}

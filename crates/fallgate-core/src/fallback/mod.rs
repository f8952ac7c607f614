//! Retrieval-only answers for when generative providers are unavailable.
//!
//! Nothing in this module makes a remote call. Answers are assembled from
//! snippets the retrieval collaborator already produced:
//! - `classifier` picks the template (general or technical)
//! - `summary` selects, truncates and formats snippets and references
//! - `template` renders the answer text
//! - `composer` ties them together into a `FallbackResponse`

mod classifier;
mod composer;
pub mod summary;
mod template;

pub use classifier::{classify_query, QueryKind};
pub use composer::FallbackComposer;
pub use template::{
    Placeholder, Template, TemplateError, TemplateSet, TemplateValues, GENERAL_TEMPLATE,
    TECHNICAL_TEMPLATE,
};

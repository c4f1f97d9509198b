//! Graph-level error taxonomy.

use crate::model::path::Context;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by graph queries and mutations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors from graph queries, mutations and view planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Referenced item (or the signifier of a referenced context) is absent.
    NotFound { value: String, context: Context },
    /// Forward and reverse indices disagree. Never user-triggerable.
    InvariantViolation(String),
    /// Focus resolves to a single empty derived context and the configured
    /// redirect policy rejects it.
    EmptyDerivedContext(Context),
    /// No rank sorts after the existing siblings of this context.
    RankExhausted(Context),
}

impl GraphError {
    pub(crate) fn not_found<S: AsRef<str>>(value: &str, context: &[S]) -> Self {
        Self::NotFound {
            value: value.to_string(),
            context: context.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { value, context } => write!(
                f,
                "item not found: `{value}` (context depth {})",
                context.len()
            ),
            Self::InvariantViolation(details) => write!(f, "graph invariant violated: {details}"),
            Self::EmptyDerivedContext(focus) => write!(
                f,
                "focus resolves to an empty derived context (depth {})",
                focus.len()
            ),
            Self::RankExhausted(context) => write!(
                f,
                "no rank left after existing siblings (context depth {})",
                context.len()
            ),
        }
    }
}

impl Error for GraphError {}

//! Error vocabulary shared by the rule model and the wildcard engine.
//!
//! Every variant carries the rule name and source location it was raised
//! against, mirroring how the Snakemake original always threads
//! `lineno`/`snakefile` through its `RuleException`/`IOFileException`
//! types. The core never swallows an error; it is up to the caller (the
//! DSL parser, the DAG builder) to decide whether a failure is fatal.

use std::fmt;

/// `(file, line)` pair identifying where a rule was declared.
pub type SourceLocation = (String, u32);

/// Shared context threaded through every [`EngineError`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub rule_name: String,
    pub location: SourceLocation,
}

impl ErrorContext {
    pub fn new(rule_name: impl Into<String>, location: SourceLocation) -> Self {
        Self { rule_name: rule_name.into(), location: location }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}' ({}:{})", self.rule_name, self.location.0, self.location.1)
    }
}

/// Everything that can go wrong while building or resolving rules.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed `{...}` placeholder or invalid embedded regex.
    #[error("bad pattern in {ctx}: {message}")]
    BadPattern { ctx: ErrorContext, message: String },

    /// A binding is missing a wildcard name the rule requires.
    #[error("unresolved wildcard in {ctx}: {missing:?}")]
    UnresolvedWildcard { ctx: ErrorContext, missing: Vec<String> },

    /// A template referencing a still-dynamic sibling was rendered too early.
    #[error("dynamic output not yet expanded in {ctx}: {template}")]
    DynamicNotExpanded { ctx: ErrorContext, template: String },

    /// Outputs of one rule disagree on their wildcard-name set.
    #[error("outputs of {ctx} do not share the same wildcards")]
    WildcardSetMismatch { ctx: ErrorContext },

    /// A dynamic output coexists with a non-dynamic one in the same rule.
    #[error("rule {ctx} mixes dynamic and non-dynamic outputs")]
    MixedDynamicOutput { ctx: ErrorContext },

    /// `temp`/`protected` used on an input, `dynamic` on a callable, etc.
    #[error("flag misuse in {ctx}: {message}")]
    FlagMisuse { ctx: ErrorContext, message: String },

    /// A callable was supplied as an output.
    #[error("callable output not allowed in {ctx}")]
    CallableOutput { ctx: ErrorContext },

    /// An input callable returned something other than a string or a
    /// finite iterable of strings, or it panicked/errored.
    #[error("input function failed in {ctx}: {message}")]
    BadInputFunction { ctx: ErrorContext, message: String },

    /// More than one rule can produce the same path; the core reports the
    /// candidate set, arbitration is the caller's job.
    #[error("ambiguous producer for '{path}': {candidates:?}")]
    AmbiguousProducer { path: String, candidates: Vec<String> },
}

impl EngineError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            EngineError::BadPattern { ctx, .. }
            | EngineError::UnresolvedWildcard { ctx, .. }
            | EngineError::DynamicNotExpanded { ctx, .. }
            | EngineError::WildcardSetMismatch { ctx }
            | EngineError::MixedDynamicOutput { ctx }
            | EngineError::FlagMisuse { ctx, .. }
            | EngineError::CallableOutput { ctx }
            | EngineError::BadInputFunction { ctx, .. } => Some(ctx),
            EngineError::AmbiguousProducer { .. } => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

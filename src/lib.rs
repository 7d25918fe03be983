//! Rule model and wildcard-pattern resolution engine.
//!
//! This crate is the core of a make-style workflow tool: given a set of
//! declared [`Rule`](rule::Rule)s (each naming input patterns, output
//! patterns, parameters, and a command) and a concrete target path, it
//! decides which rule produces that path, extracts the wildcard bindings
//! the requested path implies, and propagates those bindings to the
//! rule's inputs, parameters, and log path.
//!
//! ## How the parts fit together
//!
//! ```text
//! target path ──────────┐
//!                        v
//!              Registry::producers          (registry.rs)
//!                        │  candidate rules, via PatternFile::match_path
//!                        v
//!              engine::wildcards_of          (engine.rs)
//!                        │  most-specific binding for the chosen rule
//!                        v
//!                 engine::expand             (engine.rs)
//!                        │  concrete inputs / outputs / params / log
//!                        v
//!                   Expansion
//! ```
//!
//! Ambiguity between multiple producer candidates is broken by the
//! caller using [`RuleOrdering::compare`] and match specificity — this
//! crate reports the candidate set; it never picks a winner itself.
//!
//! When a rule's cardinality isn't known until a producing job runs (a
//! *dynamic* output), [`engine::branch`] clones the rule and expands it
//! over the tuple of values discovered at runtime.
//!
//! ## Responsibilities by module
//!
//! - [`pattern`]: [`PatternFile`], the `{name}`/`{name,REGEX}` template
//!   language, and the `temp`/`protected`/`dynamic` flag wrappers.
//! - [`named_list`]: [`NamedList`], the positional-plus-named container
//!   inputs/outputs/params are stored in.
//! - [`rule`]: [`Rule`](rule::Rule) and its construction API.
//! - [`engine`]: the free functions that operate on an immutable `Rule`
//!   — producer testing, binding extraction, expansion, dynamic branch.
//! - [`ordering`]: [`RuleOrdering`].
//! - [`registry`]: [`Registry`].
//! - [`error`]: the shared [`EngineError`] vocabulary.
//!
//! ## Example
//!
//! ```
//! use ruleloom::engine::{expand, wildcards_of};
//! use ruleloom::rule::{NamedArg, Rule};
//!
//! let mut rule = Rule::new("align", ("workflow.rl".to_string(), 12));
//! rule.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
//! rule.set_inputs(vec![NamedArg::positional("{sample}.fq")]).unwrap();
//!
//! let binding = wildcards_of(&rule, "A.bam").unwrap();
//! let expansion = expand(&rule, &binding).unwrap();
//! assert_eq!(expansion.inputs.as_slice(), &["A.fq".to_string()]);
//! ```

pub mod engine;
pub mod error;
pub mod named_list;
pub mod ordering;
pub mod pattern;
pub mod registry;
pub mod rule;

pub use engine::{branch, expand, is_producer, wildcards_of, BranchOutcome, DynamicBinding, Expansion, Side};
pub use error::{EngineError, EngineResult, ErrorContext, SourceLocation};
pub use named_list::NamedList;
pub use ordering::RuleOrdering;
pub use pattern::{dynamic, protected, temp, Binding, FlaggedPattern, OutputFlags, PatternFile, RenderOptions};
pub use registry::Registry;
pub use rule::{
    ActionHandle, Arg, InputFn, InputFnResult, InputItem, InputLeaf, NamedArg, OutputLeaf, ParamFn, ParamItem,
    ParamLeaf, ParamValue, Rule, RuleBody, CORES_KEY,
};

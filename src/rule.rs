//! `Rule`: an immutable-after-construction production relation.
//!
//! Construction goes through [`Rule::set_inputs`]/[`Rule::set_outputs`]/
//! [`Rule::set_params`], which accept the same shape of nested,
//! optionally-named argument the Snakemake original's `set_input`/
//! `set_output` accept (`_set_inoutput_item` flattens recursive lists and
//! reads `temp`/`protected`/`dynamic` wrapper tags off each leaf). Once
//! built, a `Rule` is read-only; [`crate::engine::branch`] clones it
//! rather than mutating it in place.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult, ErrorContext, SourceLocation};
use crate::named_list::NamedList;
use crate::pattern::{Binding, FlaggedPattern, OutputFlags, PatternFile};

/// Distinguished `resources` key reserved for CPU core count.
pub const CORES_KEY: &str = "_cores";

/// Result of an input-function evaluation: a single path or a finite
/// list of them (spec.md §4.4.3 step 3).
#[derive(Debug, Clone)]
pub enum InputFnResult {
    One(String),
    Many(Vec<String>),
}

pub type InputFn = Arc<dyn Fn(&Binding) -> Result<InputFnResult, String> + Send + Sync>;

/// A param value passed through verbatim when produced by a callable
/// (spec.md §4.4.3 step 4: "result may be any value").
#[derive(Debug, Clone)]
pub enum ParamValue {
    Str(String),
    List(Vec<String>),
    Int(i64),
    Float(f64),
}

pub type ParamFn = Arc<dyn Fn(&Binding) -> Result<ParamValue, String> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum InputItem {
    Template(PatternFile),
    Computed(InputFn),
}

#[derive(Debug, Clone)]
pub enum ParamItem {
    Template(PatternFile),
    Computed(ParamFn),
}

/// The rule body: a shell-style command template, or an opaque handle to
/// a user-supplied action function. Evaluating either is out of scope
/// for this crate (spec.md §1 Non-goals); the handle is carried through
/// unexamined for the job runner to dispatch on.
#[derive(Debug, Clone)]
pub enum RuleBody {
    Command(String),
    Action(ActionHandle),
}

impl Default for RuleBody {
    fn default() -> Self {
        RuleBody::Command(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle(pub String);

/// A leaf value accepted in an inputs list: either a (possibly flagged)
/// pattern string, or a function computed from the bound wildcards.
#[derive(Clone)]
pub enum InputLeaf {
    Pattern(FlaggedPattern),
    Computed(InputFn),
}

impl From<&str> for InputLeaf {
    fn from(s: &str) -> Self {
        InputLeaf::Pattern(FlaggedPattern::plain(s))
    }
}
impl From<FlaggedPattern> for InputLeaf {
    fn from(p: FlaggedPattern) -> Self {
        InputLeaf::Pattern(p)
    }
}

/// A leaf value accepted in an outputs list. `Computed` is representable
/// at the type level (an upstream DSL layer building these from untyped
/// tokens can hand one in by mistake) but always rejected with
/// [`EngineError::CallableOutput`] by [`Rule::set_outputs`].
#[derive(Clone)]
pub enum OutputLeaf {
    Pattern(FlaggedPattern),
    Computed(InputFn),
}

impl From<&str> for OutputLeaf {
    fn from(s: &str) -> Self {
        OutputLeaf::Pattern(FlaggedPattern::plain(s))
    }
}
impl From<FlaggedPattern> for OutputLeaf {
    fn from(p: FlaggedPattern) -> Self {
        OutputLeaf::Pattern(p)
    }
}

#[derive(Clone)]
pub enum ParamLeaf {
    Pattern(FlaggedPattern),
    Computed(ParamFn),
}

impl From<&str> for ParamLeaf {
    fn from(s: &str) -> Self {
        ParamLeaf::Pattern(FlaggedPattern::plain(s))
    }
}

/// A (possibly nested) argument value, flattened during construction.
/// Mirrors `_set_inoutput_item`'s recursive handling of lists.
#[derive(Clone)]
pub enum Arg<L> {
    Leaf(L),
    Nested(Vec<Arg<L>>),
}

impl<L> Arg<L> {
    pub fn leaf(l: impl Into<L>) -> Self {
        Arg::Leaf(l.into())
    }
}

fn flatten_arg<L, T>(arg: Arg<L>, convert: &mut dyn FnMut(L) -> EngineResult<T>, out: &mut Vec<T>) -> EngineResult<()> {
    match arg {
        Arg::Leaf(l) => out.push(convert(l)?),
        Arg::Nested(items) => {
            for item in items {
                flatten_arg(item, convert, out)?;
            }
        }
    }
    Ok(())
}

/// Named or positional argument passed to `set_inputs`/`set_outputs`/`set_params`.
pub struct NamedArg<L> {
    pub name: Option<String>,
    pub value: Arg<L>,
}

impl<L> NamedArg<L> {
    pub fn positional(value: impl Into<Arg<L>>) -> Self {
        Self { name: None, value: value.into() }
    }
    pub fn named(name: impl Into<String>, value: impl Into<Arg<L>>) -> Self {
        Self { name: Some(name.into()), value: value.into() }
    }
}

impl<L> From<L> for Arg<L> {
    fn from(l: L) -> Self {
        Arg::Leaf(l)
    }
}

#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub inputs: NamedList<InputItem>,
    pub outputs: NamedList<PatternFile>,
    pub params: NamedList<ParamItem>,
    pub log: Option<PatternFile>,
    pub wildcard_names: HashSet<String>,
    pub dynamic_inputs: HashSet<PatternFile>,
    pub dynamic_outputs: HashSet<PatternFile>,
    pub temp_outputs: HashSet<PatternFile>,
    pub protected_outputs: HashSet<PatternFile>,
    pub priority: i64,
    pub resources: HashMap<String, u64>,
    pub version: Option<String>,
    pub docstring: Option<String>,
    pub message: Option<String>,
    pub body: RuleBody,
    pub source_location: SourceLocation,
}

impl Rule {
    pub fn new(name: impl Into<String>, source_location: SourceLocation) -> Self {
        let mut resources = HashMap::new();
        resources.insert(CORES_KEY.to_string(), 1);
        Self {
            name: name.into(),
            inputs: NamedList::new(),
            outputs: NamedList::new(),
            params: NamedList::new(),
            log: None,
            wildcard_names: HashSet::new(),
            dynamic_inputs: HashSet::new(),
            dynamic_outputs: HashSet::new(),
            temp_outputs: HashSet::new(),
            protected_outputs: HashSet::new(),
            priority: 1,
            resources,
            version: None,
            docstring: None,
            message: None,
            body: RuleBody::default(),
            source_location,
        }
    }

    pub fn ctx(&self) -> ErrorContext {
        ErrorContext::new(self.name.clone(), self.source_location.clone())
    }

    pub fn has_wildcards(&self) -> bool {
        !self.wildcard_names.is_empty()
    }

    pub fn set_inputs(&mut self, items: Vec<NamedArg<InputLeaf>>) -> EngineResult<()> {
        let ctx = self.ctx();
        for NamedArg { name, value } in items {
            let start = self.inputs.len();
            let mut flat: Vec<InputItem> = Vec::new();
            let dynamic_inputs = &mut self.dynamic_inputs;
            let mut convert = |leaf: InputLeaf| -> EngineResult<InputItem> {
                match leaf {
                    InputLeaf::Pattern(fp) => {
                        if fp.flags.intersects(OutputFlags::TEMP | OutputFlags::PROTECTED) {
                            return Err(EngineError::FlagMisuse {
                                ctx: ctx.clone(),
                                message: "temp/protected are only valid on outputs".to_string(),
                            });
                        }
                        let pf = PatternFile::compile(&fp.raw, &ctx)?.with_flags(fp.flags);
                        if fp.flags.contains(OutputFlags::DYNAMIC) {
                            dynamic_inputs.insert(pf.clone());
                        }
                        Ok(InputItem::Template(pf))
                    }
                    InputLeaf::Computed(f) => Ok(InputItem::Computed(f)),
                }
            };
            flatten_arg(value, &mut convert, &mut flat)?;
            for item in flat {
                self.inputs.append(item);
            }
            if let Some(name) = name {
                self.inputs.set_name(name, start, self.inputs.len());
            }
        }
        Ok(())
    }

    pub fn set_outputs(&mut self, items: Vec<NamedArg<OutputLeaf>>) -> EngineResult<()> {
        let ctx = self.ctx();
        for NamedArg { name, value } in items {
            let start = self.outputs.len();
            let mut flat: Vec<PatternFile> = Vec::new();
            let mut convert = |leaf: OutputLeaf| -> EngineResult<PatternFile> {
                match leaf {
                    OutputLeaf::Computed(_) => Err(EngineError::CallableOutput { ctx: ctx.clone() }),
                    OutputLeaf::Pattern(fp) => Ok(PatternFile::compile(&fp.raw, &ctx)?.with_flags(fp.flags)),
                }
            };
            flatten_arg(value, &mut convert, &mut flat)?;
            for pf in flat {
                if pf.flags.contains(OutputFlags::DYNAMIC) {
                    self.dynamic_outputs.insert(pf.clone());
                }
                if pf.flags.contains(OutputFlags::TEMP) {
                    self.temp_outputs.insert(pf.clone());
                }
                if pf.flags.contains(OutputFlags::PROTECTED) {
                    self.protected_outputs.insert(pf.clone());
                }
                self.outputs.append(pf);
            }
            if let Some(name) = name {
                self.outputs.set_name(name, start, self.outputs.len());
            }
        }
        self.check_and_set_wildcard_names()
    }

    fn check_and_set_wildcard_names(&mut self) -> EngineResult<()> {
        let ctx = self.ctx();
        if !self.dynamic_outputs.is_empty() {
            for o in self.outputs.iter() {
                if !self.dynamic_outputs.contains(o) {
                    return Err(EngineError::MixedDynamicOutput { ctx });
                }
            }
        }
        let mut iter = self.outputs.iter().map(|o| o.wildcard_names());
        let Some(first) = iter.next() else {
            return Ok(());
        };
        for other in iter {
            if other != first {
                return Err(EngineError::WildcardSetMismatch { ctx });
            }
        }
        self.wildcard_names = first;
        Ok(())
    }

    pub fn set_params(&mut self, items: Vec<NamedArg<ParamLeaf>>) -> EngineResult<()> {
        let ctx = self.ctx();
        for NamedArg { name, value } in items {
            let start = self.params.len();
            let mut flat: Vec<ParamItem> = Vec::new();
            let mut convert = |leaf: ParamLeaf| -> EngineResult<ParamItem> {
                match leaf {
                    ParamLeaf::Pattern(fp) => Ok(ParamItem::Template(PatternFile::compile(&fp.raw, &ctx)?)),
                    ParamLeaf::Computed(f) => Ok(ParamItem::Computed(f)),
                }
            };
            flatten_arg(value, &mut convert, &mut flat)?;
            for item in flat {
                self.params.append(item);
            }
            if let Some(name) = name {
                self.params.set_name(name, start, self.params.len());
            }
        }
        Ok(())
    }

    pub fn set_log(&mut self, template: &str) -> EngineResult<()> {
        let ctx = self.ctx();
        self.log = Some(PatternFile::compile(template, &ctx)?);
        Ok(())
    }

    pub fn set_command(&mut self, cmd: impl Into<String>) {
        self.body = RuleBody::Command(cmd.into());
    }

    pub fn set_action(&mut self, handle: ActionHandle) {
        self.body = RuleBody::Action(handle);
    }

    pub fn set_resource(&mut self, key: impl Into<String>, value: u64) {
        self.resources.insert(key.into(), value);
    }

    pub fn set_priority(&mut self, priority: i64) {
        self.priority = priority;
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }
}

//! The wildcard resolution engine: producer testing, binding extraction,
//! full expansion, and dynamic-branch cloning.
//!
//! These are free functions over `&Rule` rather than methods, since every
//! one of them is pure with respect to rule state (spec.md §5) and the
//! module boundary should make that obvious: nothing here holds `&mut
//! Rule`, and `branch` returns a new, independent `Rule` rather than
//! mutating its argument.

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult};
use crate::named_list::NamedList;
use crate::pattern::{Binding, OutputFlags, PatternFile, RenderOptions};
use crate::rule::{InputFnResult, InputItem, ParamItem, ParamValue, Rule};

/// A wildcard name bound to a sequence of runtime-discovered values, all
/// the same length across the names of one dynamic group.
pub type DynamicBinding = HashMap<String, Vec<String>>;

/// The concrete result of [`expand`]: rendered inputs/outputs/params/log
/// plus a map from each concrete input/output path back to the template
/// it was rendered from.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub inputs: NamedList<String>,
    pub outputs: NamedList<String>,
    pub params: NamedList<ParamValue>,
    pub log: Option<String>,
    pub provenance: HashMap<String, String>,
}

/// `true` iff some output pattern of `rule` fully (anchored) matches `path`.
pub fn is_producer(rule: &Rule, path: &str) -> bool {
    rule.outputs.iter().any(|o| o.match_path(path).is_some())
}

/// The binding with the smallest aggregate captured length among the
/// rule's outputs that match `path` — the most-specific match (spec.md
/// §4.4.2). Ties go to the earlier declaration, since we only replace
/// the current best on a *strictly* smaller length.
pub fn wildcards_of(rule: &Rule, path: &str) -> Option<Binding> {
    let mut best: Option<(usize, Binding)> = None;
    for output in rule.outputs.iter() {
        let Some(binding) = output.match_path(path) else { continue };
        let length: usize = binding.values().map(|v| v.len()).sum();
        match &best {
            None => best = Some((length, binding)),
            Some((best_len, _)) if length < *best_len => best = Some((length, binding)),
            Some(_) => {}
        }
    }
    best.map(|(_, binding)| binding)
}

/// Expands `rule` fully against `binding`: renders every output, every
/// input (including callables), every param, and the log path.
pub fn expand(rule: &Rule, binding: &Binding) -> EngineResult<Expansion> {
    let ctx = rule.ctx();

    let missing: Vec<String> =
        rule.wildcard_names.iter().filter(|n| !binding.contains_key(n.as_str())).cloned().collect();
    if !missing.is_empty() {
        return Err(EngineError::UnresolvedWildcard { ctx, missing });
    }

    let mut outputs: NamedList<String> = NamedList::new();
    let mut provenance: HashMap<String, String> = HashMap::new();
    for output in rule.outputs.iter() {
        let rendered = output.render(binding, &RenderOptions { strict: true, ..Default::default() }, &ctx)?;
        provenance.insert(rendered.clone(), output.raw().to_string());
        outputs.append(rendered);
    }
    outputs.take_names(&rule.outputs);

    let mut inputs: NamedList<String> = NamedList::new();
    let mut item_counts: Vec<usize> = Vec::with_capacity(rule.inputs.len());
    for item in rule.inputs.iter() {
        match item {
            InputItem::Template(pattern) => {
                let opts = RenderOptions {
                    fill_missing: rule.dynamic_inputs.contains(pattern),
                    fail_dynamic: Some(&rule.dynamic_outputs),
                    strict: false,
                };
                let rendered = pattern.render(binding, &opts, &ctx)?;
                provenance.insert(rendered.clone(), pattern.raw().to_string());
                inputs.append(rendered);
                item_counts.push(1);
            }
            InputItem::Computed(func) => {
                let result = func(binding)
                    .map_err(|message| EngineError::BadInputFunction { ctx: ctx.clone(), message })?;
                let raw_strings = match result {
                    InputFnResult::One(s) => vec![s],
                    InputFnResult::Many(v) => v,
                };
                for raw in &raw_strings {
                    let pattern = PatternFile::compile(raw, &ctx)?;
                    let opts = RenderOptions {
                        fill_missing: false,
                        fail_dynamic: Some(&rule.dynamic_outputs),
                        strict: false,
                    };
                    let rendered = pattern.render(binding, &opts, &ctx)?;
                    provenance.insert(rendered.clone(), raw.clone());
                    inputs.append(rendered);
                }
                item_counts.push(raw_strings.len());
            }
        }
    }
    // Named ranges were captured over un-expanded items; a callable may
    // expand to a different count than 1, so ranges are recomputed from
    // a prefix sum over each item's rendered count rather than copied.
    let mut prefix = vec![0usize; item_counts.len() + 1];
    for (i, count) in item_counts.iter().enumerate() {
        prefix[i + 1] = prefix[i] + count;
    }
    for (name, &(start, end)) in rule.inputs.names() {
        inputs.set_name(name.clone(), prefix[start], prefix[end]);
    }

    let mut params: NamedList<ParamValue> = NamedList::new();
    for item in rule.params.iter() {
        let value = match item {
            ParamItem::Template(pattern) => {
                ParamValue::Str(pattern.render(binding, &RenderOptions::default(), &ctx)?)
            }
            ParamItem::Computed(func) => {
                func(binding).map_err(|message| EngineError::BadInputFunction { ctx: ctx.clone(), message })?
            }
        };
        params.append(value);
    }
    params.take_names(&rule.params);

    let log = match &rule.log {
        Some(pattern) => Some(pattern.render(binding, &RenderOptions { strict: true, ..Default::default() }, &ctx)?),
        None => None,
    };

    Ok(Expansion { inputs, outputs, params, log, provenance })
}

/// Which side of a rule a dynamic branch replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Input,
    Output,
}

/// Result of [`branch`]: the output side fully expands the clone and
/// returns the constant-valued sub-binding alongside it; the input side
/// returns the clone alone — its outputs still carry wildcards, so full
/// expansion waits until the consumer's bindings are known (spec.md
/// §4.4.4 step 5).
#[derive(Debug, Clone)]
pub enum BranchOutcome {
    Expanded(Rule, Binding),
    Unexpanded(Rule),
}

/// Clones `rule`, replacing each dynamic template on `side` with its `k`
/// concrete renderings (`wildcards` zipped positionwise). `k == 0` is a
/// legitimate degenerate case — a producing job that discovered no
/// matching files — and simply removes the dynamic template with zero
/// replacements, matching the original's `zip`-based expansion rather
/// than treating it as a failure. Returns `None` only if any dynamic
/// template needs a wildcard name absent from `wildcards`, or if
/// `wildcards`' value lists disagree on length. Pure: `rule` itself is
/// never mutated.
pub fn branch(rule: &Rule, wildcards: &DynamicBinding, side: Side) -> Option<BranchOutcome> {
    let k = wildcards.values().next().map_or(0, |v| v.len());
    if wildcards.values().any(|v| v.len() != k) {
        return None;
    }

    match side {
        Side::Input => branch_input(rule, wildcards, k),
        Side::Output => branch_output(rule, wildcards, k),
    }
}

fn expand_zip(template: &PatternFile, wildcards: &DynamicBinding, k: usize, ctx: &crate::error::ErrorContext) -> Option<Vec<String>> {
    for name in template.wildcard_names() {
        if !wildcards.contains_key(&name) {
            return None;
        }
    }
    let mut rendered = Vec::with_capacity(k);
    for j in 0..k {
        let mut binding = Binding::new();
        for (name, values) in wildcards {
            binding.insert(name.clone(), values[j].clone());
        }
        rendered.push(template.render(&binding, &RenderOptions::default(), ctx).ok()?);
    }
    Some(rendered)
}

fn branch_input(rule: &Rule, wildcards: &DynamicBinding, k: usize) -> Option<BranchOutcome> {
    let ctx = rule.ctx();
    let mut clone = rule.clone();

    let mut i = 0;
    while i < clone.inputs.len() {
        let dynamic_template = match clone.inputs.by_index(i) {
            Some(InputItem::Template(pattern)) if rule.dynamic_inputs.contains(pattern) => Some(pattern.clone()),
            _ => None,
        };
        let Some(template) = dynamic_template else {
            i += 1;
            continue;
        };
        let rendered = expand_zip(&template, wildcards, k, &ctx)?;
        let expansions: Vec<InputItem> = rendered
            .into_iter()
            .map(|s| PatternFile::compile(&s, &ctx).map(InputItem::Template))
            .collect::<EngineResult<_>>()
            .ok()?;

        clone.dynamic_inputs.remove(&template);
        clone.inputs.remove_at(i);
        let count = expansions.len();
        clone.inputs.insert_range(i, expansions);
        i += count;
    }

    Some(BranchOutcome::Unexpanded(clone))
}

fn branch_output(rule: &Rule, wildcards: &DynamicBinding, k: usize) -> Option<BranchOutcome> {
    let ctx = rule.ctx();
    let mut clone = rule.clone();

    let mut i = 0;
    while i < clone.outputs.len() {
        let template = clone.outputs.by_index(i).filter(|p| rule.dynamic_outputs.contains(*p)).cloned();
        let Some(template) = template else {
            i += 1;
            continue;
        };
        let rendered = expand_zip(&template, wildcards, k, &ctx)?;
        // The expansion inherits the template's temp/protected flags but
        // never its dynamic flag, since it is now a concrete path.
        let carried_flags = template.flags & !OutputFlags::DYNAMIC;
        let expansions: Vec<PatternFile> = rendered
            .into_iter()
            .map(|s| PatternFile::compile(&s, &ctx).map(|p| p.with_flags(carried_flags)))
            .collect::<EngineResult<_>>()
            .ok()?;

        clone.dynamic_outputs.remove(&template);
        clone.temp_outputs.remove(&template);
        clone.protected_outputs.remove(&template);
        for expansion in &expansions {
            if expansion.flags.contains(OutputFlags::TEMP) {
                clone.temp_outputs.insert(expansion.clone());
            }
            if expansion.flags.contains(OutputFlags::PROTECTED) {
                clone.protected_outputs.insert(expansion.clone());
            }
        }

        clone.outputs.remove_at(i);
        let count = expansions.len();
        clone.outputs.insert_range(i, expansions);
        i += count;
    }

    clone.wildcard_names.clear();
    let non_dynamic: Binding = wildcards
        .iter()
        .filter_map(|(name, values)| {
            let unique: HashSet<&String> = values.iter().collect();
            (unique.len() == 1).then(|| (name.clone(), values[0].clone()))
        })
        .collect();

    let expansion = expand(&clone, &non_dynamic).ok()?;

    let mut final_outputs: NamedList<PatternFile> = NamedList::new();
    for rendered in expansion.outputs.iter() {
        final_outputs.append(PatternFile::compile(rendered, &ctx).ok()?);
    }
    final_outputs.take_names(&clone.outputs);
    clone.outputs = final_outputs;

    let mut final_inputs: NamedList<InputItem> = NamedList::new();
    for rendered in expansion.inputs.iter() {
        final_inputs.append(InputItem::Template(PatternFile::compile(rendered, &ctx).ok()?));
    }
    for (name, &(start, end)) in expansion.inputs.names() {
        final_inputs.set_name(name.clone(), start, end);
    }
    clone.inputs = final_inputs;

    clone.log = match &expansion.log {
        Some(rendered) => Some(PatternFile::compile(rendered, &ctx).ok()?),
        None => None,
    };

    Some(BranchOutcome::Expanded(clone, non_dynamic))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pattern::dynamic;
    use crate::rule::{InputFn, InputLeaf, NamedArg, ParamFn, ParamLeaf};

    fn loc() -> crate::error::SourceLocation {
        ("test.rl".to_string(), 1)
    }

    #[test]
    fn s1_basic_wildcard_inversion() {
        let mut rule = Rule::new("r1", loc());
        rule.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
        rule.set_inputs(vec![NamedArg::positional("{sample}.fq")]).unwrap();

        assert!(is_producer(&rule, "A.bam"));
        let binding = wildcards_of(&rule, "A.bam").unwrap();
        assert_eq!(binding.get("sample"), Some(&"A".to_string()));

        let expansion = expand(&rule, &binding).unwrap();
        assert_eq!(expansion.inputs.as_slice(), &["A.fq".to_string()]);
        assert_eq!(expansion.outputs.as_slice(), &["A.bam".to_string()]);
    }

    #[test]
    fn s4_dynamic_branch_output_side() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional(dynamic("{tag}_{i}.out"))]).unwrap();
        rule.set_inputs(vec![NamedArg::positional("{tag}.in")]).unwrap();

        let mut wildcards: DynamicBinding = HashMap::new();
        wildcards.insert("tag".to_string(), vec!["A".to_string(), "A".to_string()]);
        wildcards.insert("i".to_string(), vec!["1".to_string(), "2".to_string()]);

        let outcome = branch(&rule, &wildcards, Side::Output).unwrap();
        let BranchOutcome::Expanded(branched, binding) = outcome else { panic!("expected Expanded") };

        assert_eq!(binding.get("tag"), Some(&"A".to_string()));
        assert!(binding.get("i").is_none());
        assert_eq!(branched.outputs.as_slice().iter().map(|p| p.raw()).collect::<Vec<_>>(), vec!["A_1.out", "A_2.out"]);
        assert_eq!(branched.inputs.len(), 1);
    }

    #[test]
    fn branch_is_pure() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional(dynamic("{tag}_{i}.out"))]).unwrap();
        let before = rule.outputs.len();

        let mut wildcards: DynamicBinding = HashMap::new();
        wildcards.insert("tag".to_string(), vec!["A".to_string(), "A".to_string()]);
        wildcards.insert("i".to_string(), vec!["1".to_string(), "2".to_string()]);
        let _ = branch(&rule, &wildcards, Side::Output);

        assert_eq!(rule.outputs.len(), before);
        assert!(rule.dynamic_outputs.iter().next().is_some());
    }

    #[test]
    fn branch_missing_required_key_returns_none() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional(dynamic("{tag}_{i}.out"))]).unwrap();

        let mut wildcards: DynamicBinding = HashMap::new();
        wildcards.insert("tag".to_string(), vec!["A".to_string(), "A".to_string()]);
        // "i" missing entirely.
        assert!(branch(&rule, &wildcards, Side::Output).is_none());
    }

    #[test]
    fn zero_cardinality_dynamic_branch_removes_template_without_failing() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional(dynamic("{tag}_{i}.out"))]).unwrap();
        rule.set_inputs(vec![NamedArg::positional("{tag}.in")]).unwrap();

        let mut wildcards: DynamicBinding = HashMap::new();
        wildcards.insert("tag".to_string(), vec![]);
        wildcards.insert("i".to_string(), vec![]);

        let outcome = branch(&rule, &wildcards, Side::Output).unwrap();
        let BranchOutcome::Expanded(branched, binding) = outcome else { panic!("expected Expanded") };

        assert!(branched.outputs.is_empty());
        assert!(binding.is_empty());
    }

    #[test]
    fn expand_with_no_wildcards_needs_no_binding() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional("fixed.out")]).unwrap();
        let expansion = expand(&rule, &Binding::new()).unwrap();
        assert_eq!(expansion.outputs.as_slice(), &["fixed.out".to_string()]);
    }

    #[test]
    fn dynamic_input_fills_unbound_marker() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional("{sample}.done")]).unwrap();
        rule.set_inputs(vec![NamedArg::positional(dynamic("{sample}_{chunk}.part"))]).unwrap();

        let mut binding = Binding::new();
        binding.insert("sample".to_string(), "A".to_string());
        let expansion = expand(&rule, &binding).unwrap();
        assert_eq!(expansion.inputs.as_slice(), &["A_{chunk}.part".to_string()]);
    }

    #[test]
    fn rendering_a_dynamic_output_from_an_input_fails() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional(dynamic("{sample}_{chunk}.part"))]).unwrap();
        rule.set_inputs(vec![NamedArg::positional("{sample}_{chunk}.part")]).unwrap();

        let mut binding = Binding::new();
        binding.insert("sample".to_string(), "A".to_string());
        binding.insert("chunk".to_string(), "1".to_string());
        let err = expand(&rule, &binding).unwrap_err();
        assert!(matches!(err, EngineError::DynamicNotExpanded { .. }));
    }

    #[test]
    fn callable_input_and_param_are_evaluated_against_the_binding() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional("{sample}.done")]).unwrap();

        let input_fn: InputFn = Arc::new(|binding: &Binding| {
            let sample = binding.get("sample").cloned().unwrap_or_default();
            Ok(InputFnResult::Many(vec![format!("{sample}_1.chunk"), format!("{sample}_2.chunk")]))
        });
        rule.set_inputs(vec![NamedArg::positional(InputLeaf::Computed(input_fn))]).unwrap();

        let param_fn: ParamFn = Arc::new(|binding: &Binding| {
            let sample = binding.get("sample").cloned().unwrap_or_default();
            Ok(ParamValue::Str(format!("label-{sample}")))
        });
        rule.set_params(vec![NamedArg::positional(ParamLeaf::Computed(param_fn))]).unwrap();

        let mut binding = Binding::new();
        binding.insert("sample".to_string(), "A".to_string());
        let expansion = expand(&rule, &binding).unwrap();

        assert_eq!(expansion.inputs.as_slice(), &["A_1.chunk".to_string(), "A_2.chunk".to_string()]);
        match &expansion.params.as_slice()[0] {
            ParamValue::Str(s) => assert_eq!(s, "label-A"),
            other => panic!("expected ParamValue::Str, got {other:?}"),
        }
    }

    #[test]
    fn callable_input_error_is_reported_as_bad_input_function() {
        let mut rule = Rule::new("r", loc());
        rule.set_outputs(vec![NamedArg::positional("{sample}.done")]).unwrap();

        let input_fn: InputFn = Arc::new(|_binding: &Binding| Err("no such sample".to_string()));
        rule.set_inputs(vec![NamedArg::positional(InputLeaf::Computed(input_fn))]).unwrap();

        let mut binding = Binding::new();
        binding.insert("sample".to_string(), "A".to_string());
        let err = expand(&rule, &binding).unwrap_err();
        assert!(matches!(err, EngineError::BadInputFunction { .. }));
    }
}

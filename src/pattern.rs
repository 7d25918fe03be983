//! `PatternFile`: a path template with `{name}`/`{name,REGEX}` wildcards.
//!
//! Compiles once to an anchored match regex and an ordered list of
//! literal/placeholder segments used for rendering. A name that occurs
//! more than once in a template cannot become two regex capture groups
//! with the same name (the `regex` crate rejects duplicate capture
//! names, unlike PCRE's free reuse), so repeats beyond the first are
//! compiled as plain capturing groups and checked for equality against
//! the first occurrence after a match — the "post-match equality check"
//! spec.md allows as an alternative to engine-level back-references.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use regex::Regex;

use crate::error::{EngineError, EngineResult, ErrorContext};

pub type Binding = HashMap<String, String>;

bitflags! {
    /// Output attribute flags. `temp`/`protected` are only meaningful on
    /// outputs; `dynamic` applies to both inputs and outputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OutputFlags: u8 {
        const TEMP      = 0b001;
        const PROTECTED = 0b010;
        const DYNAMIC   = 0b100;
    }
}

/// A raw template string tagged with the flags its wrapper functions
/// (`temp(...)`, `protected(...)`, `dynamic(...)`) attached. Stacking
/// (`temp(dynamic(s))`) just unions the bits.
#[derive(Debug, Clone)]
pub struct FlaggedPattern {
    pub raw: String,
    pub flags: OutputFlags,
}

impl FlaggedPattern {
    pub fn plain(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), flags: OutputFlags::empty() }
    }
}

impl From<&str> for FlaggedPattern {
    fn from(s: &str) -> Self {
        Self::plain(s)
    }
}

impl From<String> for FlaggedPattern {
    fn from(s: String) -> Self {
        Self::plain(s)
    }
}

pub fn temp(s: impl Into<FlaggedPattern>) -> FlaggedPattern {
    let mut p = s.into();
    p.flags |= OutputFlags::TEMP;
    p
}

pub fn protected(s: impl Into<FlaggedPattern>) -> FlaggedPattern {
    let mut p = s.into();
    p.flags |= OutputFlags::PROTECTED;
    p
}

pub fn dynamic(s: impl Into<FlaggedPattern>) -> FlaggedPattern {
    let mut p = s.into();
    p.flags |= OutputFlags::DYNAMIC;
    p
}

#[derive(Debug, Clone)]
pub struct Placeholder {
    pub name: String,
    pub regex: String,
    pub span: (usize, usize),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// A compiled path template: its match regex plus enough bookkeeping to
/// render it back from a [`Binding`].
#[derive(Debug, Clone)]
pub struct PatternFile {
    raw: String,
    regex: Regex,
    placeholders: Vec<Placeholder>,
    segments: Vec<Segment>,
    name_group_indices: HashMap<String, Vec<usize>>,
    pub flags: OutputFlags,
    pub rule_id: Option<usize>,
}

impl PartialEq for PatternFile {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Eq for PatternFile {}
impl Hash for PatternFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

const DEFAULT_BODY: &str = "[^/]+";

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Counts capturing groups a user-supplied regex fragment opens on its
/// own, so our own group-index bookkeeping stays correct even when
/// `{name,(\d+)-(\d+)}` nests capture groups inside the fragment. Treats
/// `(?...)` as non-capturing (the only non-capturing form the `regex`
/// crate supports) and ignores parens inside `[...]` character classes.
fn count_capturing_groups(fragment: &str) -> usize {
    let chars: Vec<char> = fragment.chars().collect();
    let mut count = 0;
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => {
                if chars.get(i + 1) != Some(&'?') {
                    count += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    count
}

impl PatternFile {
    /// Compiles `raw` into a [`PatternFile`]. Fails with
    /// [`EngineError::BadPattern`] on a malformed placeholder or an
    /// embedded regex fragment that does not compile on its own.
    pub fn compile(raw: &str, ctx: &ErrorContext) -> EngineResult<Self> {
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        let mut literal_buf = String::new();
        let mut regex_pattern = String::from("^");
        let mut segments = Vec::new();
        let mut placeholders = Vec::new();
        let mut occurrence_count: HashMap<String, usize> = HashMap::new();
        let mut name_group_indices: HashMap<String, Vec<usize>> = HashMap::new();
        let mut group_index = 0usize;

        let bad = |message: &str| EngineError::BadPattern { ctx: ctx.clone(), message: message.to_string() };

        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal_buf.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal_buf.push('}');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        regex_pattern.push_str(&regex::escape(&literal_buf));
                        segments.push(Segment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let span_start = i;
                    i += 1;
                    let name_start = i;
                    while i < chars.len() && chars[i] != ',' && chars[i] != '}' {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err(bad("unterminated placeholder"));
                    }
                    let name: String = chars[name_start..i].iter().collect();
                    if name.is_empty() || !is_name_start(name.chars().next().unwrap()) || !name.chars().all(is_name_char)
                    {
                        return Err(bad(&format!("invalid wildcard name '{name}'")));
                    }

                    let regex_body = if chars[i] == ',' {
                        i += 1;
                        let body_start = i;
                        while i < chars.len() && chars[i] != '}' {
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(bad("unterminated placeholder regex"));
                        }
                        let body: String = chars[body_start..i].iter().collect();
                        i += 1;
                        body
                    } else {
                        i += 1;
                        DEFAULT_BODY.to_string()
                    };

                    Regex::new(&regex_body)
                        .map_err(|e| bad(&format!("invalid embedded regex for '{name}': {e}")))?;

                    let occ = occurrence_count.entry(name.clone()).or_insert(0);
                    let first_occurrence = *occ == 0;
                    *occ += 1;

                    group_index += 1;
                    if first_occurrence {
                        regex_pattern.push_str(&format!("(?P<{name}>{regex_body})"));
                    } else {
                        regex_pattern.push_str(&format!("({regex_body})"));
                    }
                    name_group_indices.entry(name.clone()).or_default().push(group_index);
                    group_index += count_capturing_groups(&regex_body);

                    let ph_index = placeholders.len();
                    placeholders.push(Placeholder { name: name.clone(), regex: regex_body, span: (span_start, i) });
                    segments.push(Segment::Placeholder(ph_index));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }
        if !literal_buf.is_empty() {
            regex_pattern.push_str(&regex::escape(&literal_buf));
            segments.push(Segment::Literal(literal_buf));
        }
        regex_pattern.push('$');

        let regex = Regex::new(&regex_pattern).map_err(|e| bad(&format!("compiled regex invalid: {e}")))?;

        Ok(Self {
            raw: raw.to_string(),
            regex,
            placeholders,
            segments,
            name_group_indices,
            flags: OutputFlags::empty(),
            rule_id: None,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn wildcard_names(&self) -> HashSet<String> {
        self.name_group_indices.keys().cloned().collect()
    }

    pub fn is_concrete(&self) -> bool {
        self.placeholders.is_empty()
    }

    pub fn with_flags(mut self, flags: OutputFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_rule_id(mut self, rule_id: usize) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    /// Matches `path` in full (anchored). Occurrences of a repeated
    /// wildcard name must capture equal substrings or the match fails.
    pub fn match_path(&self, path: &str) -> Option<Binding> {
        let caps = self.regex.captures(path)?;
        let mut binding = Binding::new();
        for (name, indices) in &self.name_group_indices {
            let mut agreed: Option<&str> = None;
            for &idx in indices {
                let value = caps.get(idx)?.as_str();
                match agreed {
                    None => agreed = Some(value),
                    Some(existing) if existing != value => return None,
                    Some(_) => {}
                }
            }
            binding.insert(name.clone(), agreed.unwrap_or_default().to_string());
        }
        Some(binding)
    }

    /// Renders this template with `binding`, per [`RenderOptions`].
    pub fn render(&self, binding: &Binding, opts: &RenderOptions<'_>, ctx: &ErrorContext) -> EngineResult<String> {
        if let Some(fail_set) = opts.fail_dynamic {
            if fail_set.contains(self) {
                return Err(EngineError::DynamicNotExpanded { ctx: ctx.clone(), template: self.raw.clone() });
            }
        }

        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(idx) => {
                    let ph = &self.placeholders[*idx];
                    match binding.get(&ph.name) {
                        Some(value) => out.push_str(value),
                        None if opts.strict && !opts.fill_missing => {
                            return Err(EngineError::UnresolvedWildcard {
                                ctx: ctx.clone(),
                                missing: vec![ph.name.clone()],
                            });
                        }
                        None => out.push_str(&format!("{{{}}}", ph.name)),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Options controlling [`PatternFile::render`].
#[derive(Default)]
pub struct RenderOptions<'a> {
    /// Substitute unbound names with a synthetic `{name}` marker instead
    /// of failing — used for dynamic-input templates whose wildcards
    /// aren't known until the producing job completes.
    pub fill_missing: bool,
    /// Templates in this set fail with `DynamicNotExpanded` if rendered.
    pub fail_dynamic: Option<&'a HashSet<PatternFile>>,
    /// Fail with `UnresolvedWildcard` on an unbound, non-filled name.
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::new("r", ("test.rl".into(), 1))
    }

    #[test]
    fn round_trips_a_single_wildcard() {
        let p = PatternFile::compile("{sample}.bam", &ctx()).unwrap();
        let binding = p.match_path("A.bam").unwrap();
        assert_eq!(binding.get("sample"), Some(&"A".to_string()));

        let rendered = p.render(&binding, &RenderOptions { strict: true, ..Default::default() }, &ctx()).unwrap();
        assert_eq!(rendered, "A.bam");
    }

    #[test]
    fn two_wildcard_specificity_s2() {
        let p = PatternFile::compile("{a}_{b}.txt", &ctx()).unwrap();
        let binding = p.match_path("x_y.txt").unwrap();
        assert_eq!(binding.get("a"), Some(&"x".to_string()));
        assert_eq!(binding.get("b"), Some(&"y".to_string()));
    }

    #[test]
    fn custom_regex_s3() {
        let p = PatternFile::compile("{n,[0-9]+}.log", &ctx()).unwrap();
        let binding = p.match_path("42.log").unwrap();
        assert_eq!(binding.get("n"), Some(&"42".to_string()));
        assert!(p.match_path("x.log").is_none());
    }

    #[test]
    fn repeated_name_requires_agreement() {
        let p = PatternFile::compile("{a}/{a}.txt", &ctx()).unwrap();
        assert!(p.match_path("x/x.txt").is_some());
        assert!(p.match_path("x/y.txt").is_none());
    }

    #[test]
    fn repeated_name_with_nested_parens_in_custom_regex() {
        let p = PatternFile::compile("{a,(x|y)}/{a,(x|y)}.txt", &ctx()).unwrap();
        let binding = p.match_path("x/x.txt").unwrap();
        assert_eq!(binding.get("a"), Some(&"x".to_string()));
        assert!(p.match_path("x/y.txt").is_none());
    }

    #[test]
    fn escaped_braces_are_literal() {
        let p = PatternFile::compile("{{literal}}/{name}", &ctx()).unwrap();
        assert!(p.wildcard_names().contains("name"));
        let binding = p.match_path("{literal}/foo").unwrap();
        assert_eq!(binding.get("name"), Some(&"foo".to_string()));
    }

    #[test]
    fn concrete_pattern_has_no_wildcards() {
        let p = PatternFile::compile("static/path.txt", &ctx()).unwrap();
        assert!(p.is_concrete());
        assert!(p.match_path("static/path.txt").is_some());
    }

    #[test]
    fn bad_pattern_on_unterminated_placeholder() {
        let err = PatternFile::compile("{sample", &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::BadPattern { .. }));
    }

    #[test]
    fn fill_missing_emits_marker() {
        let p = PatternFile::compile("{tag}_{i}.out", &ctx()).unwrap();
        let mut binding = Binding::new();
        binding.insert("tag".to_string(), "A".to_string());
        let rendered =
            p.render(&binding, &RenderOptions { fill_missing: true, ..Default::default() }, &ctx()).unwrap();
        assert_eq!(rendered, "A_{i}.out");
    }

    #[test]
    fn strict_without_fill_fails_on_unbound_name() {
        let p = PatternFile::compile("{tag}.out", &ctx()).unwrap();
        let err = p.render(&Binding::new(), &RenderOptions { strict: true, ..Default::default() }, &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedWildcard { .. }));
    }

    #[test]
    fn fail_dynamic_rejects_render_of_listed_template() {
        let p = PatternFile::compile("{tag}.out", &ctx()).unwrap();
        let mut fail_set = HashSet::new();
        fail_set.insert(p.clone());
        let mut binding = Binding::new();
        binding.insert("tag".to_string(), "A".to_string());
        let err = p
            .render(&binding, &RenderOptions { fail_dynamic: Some(&fail_set), ..Default::default() }, &ctx())
            .unwrap_err();
        assert!(matches!(err, EngineError::DynamicNotExpanded { .. }));
    }

    #[test]
    fn flag_wrappers_stack() {
        let p = temp(dynamic("{x}.out"));
        assert!(p.flags.contains(OutputFlags::TEMP));
        assert!(p.flags.contains(OutputFlags::DYNAMIC));
        assert!(!p.flags.contains(OutputFlags::PROTECTED));
    }
}

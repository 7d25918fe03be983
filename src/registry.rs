//! `Registry`: the set of declared rules and the producer query the
//! external DAG builder drives everything else from.

use std::collections::HashMap;

use crate::engine;
use crate::rule::Rule;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    rules: Vec<Rule>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `rule` to the registry. Replaces any prior rule of the same
    /// name in place, so `all()`/`producers()` never see a stale entry
    /// alongside the new one (the DSL parser is expected to reject
    /// duplicate rule names before this is reached; the registry doesn't
    /// enforce it, but doesn't leave a dangling duplicate either). Stamps
    /// every output `PatternFile` with this rule's registry index.
    pub fn add(&mut self, mut rule: Rule) {
        let index = *self.by_name.get(&rule.name).unwrap_or(&self.rules.len());
        for output in rule.outputs.iter_mut() {
            *output = output.clone().with_rule_id(index);
        }
        if index < self.rules.len() {
            self.rules[index] = rule;
        } else {
            self.by_name.insert(rule.name.clone(), index);
            self.rules.push(rule);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.by_name.get(name).map(|&i| &self.rules[i])
    }

    pub fn all(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Every rule for which `is_producer(rule, path)` holds. Ambiguity
    /// between multiple candidates is resolved by the caller via
    /// [`crate::ordering::RuleOrdering`] and match specificity.
    pub fn producers(&self, path: &str) -> Vec<&Rule> {
        self.rules.iter().filter(|rule| engine::is_producer(rule, path)).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::NamedArg;

    #[test]
    fn producers_finds_matching_rules_only() {
        let mut registry = Registry::new();

        let mut bam_rule = Rule::new("align", ("test.rl".to_string(), 1));
        bam_rule.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
        registry.add(bam_rule);

        let mut vcf_rule = Rule::new("call", ("test.rl".to_string(), 2));
        vcf_rule.set_outputs(vec![NamedArg::positional("{sample}.vcf")]).unwrap();
        registry.add(vcf_rule);

        let hits: Vec<&str> = registry.producers("A.bam").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(hits, vec!["align"]);
        assert!(registry.producers("A.unknown").is_empty());
        assert_eq!(registry.get("call").unwrap().name, "call");
    }

    #[test]
    fn re_adding_a_rule_replaces_it_in_place() {
        let mut registry = Registry::new();

        let mut first = Rule::new("align", ("test.rl".to_string(), 1));
        first.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
        registry.add(first);

        let mut second = Rule::new("align", ("test.rl".to_string(), 9));
        second.set_outputs(vec![NamedArg::positional("{sample}.cram")]).unwrap();
        registry.add(second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.producers("A.bam").len(), 0);
        assert_eq!(registry.producers("A.cram").len(), 1);
        assert_eq!(registry.get("align").unwrap().source_location.1, 9);
    }

    #[test]
    fn add_stamps_rule_id_onto_outputs() {
        let mut registry = Registry::new();

        let mut first = Rule::new("align", ("test.rl".to_string(), 1));
        first.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
        registry.add(first);

        let mut second = Rule::new("call", ("test.rl".to_string(), 2));
        second.set_outputs(vec![NamedArg::positional("{sample}.vcf")]).unwrap();
        registry.add(second);

        assert_eq!(registry.get("align").unwrap().outputs.as_slice()[0].rule_id, Some(0));
        assert_eq!(registry.get("call").unwrap().outputs.as_slice()[0].rule_id, Some(1));
    }
}

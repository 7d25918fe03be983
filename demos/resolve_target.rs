//! Standalone illustration of the resolution pipeline: declare a couple
//! of rules, ask for a target path, and print what gets produced.
//!
//! Run with `cargo run --bin resolve_target -- A.calls.vcf`.

use std::env;
use std::process::ExitCode;

use ruleloom::engine::{expand, wildcards_of};
use ruleloom::rule::{NamedArg, Rule};
use ruleloom::Registry;

fn build_registry() -> Registry {
    let mut registry = Registry::new();

    let mut align = Rule::new("align", ("demo.rl".to_string(), 1));
    align.set_outputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
    align.set_inputs(vec![NamedArg::positional("reads/{sample}.fq")]).unwrap();
    align.set_command("bwa mem reads/{sample}.fq > {sample}.bam");
    registry.add(align);

    let mut call = Rule::new("call", ("demo.rl".to_string(), 8));
    call.set_outputs(vec![NamedArg::positional("{sample}.calls.vcf")]).unwrap();
    call.set_inputs(vec![NamedArg::positional("{sample}.bam")]).unwrap();
    call.set_command("bcftools call {sample}.bam > {sample}.calls.vcf");
    registry.add(call);

    registry
}

fn main() -> ExitCode {
    let target = env::args().nth(1).unwrap_or_else(|| "A.calls.vcf".to_string());
    let registry = build_registry();

    let candidates = registry.producers(&target);
    let rule = match candidates.as_slice() {
        [] => {
            eprintln!("no rule produces {target}");
            return ExitCode::FAILURE;
        }
        [only] => only,
        many => {
            eprintln!("ambiguous target {target}: {} candidate rules", many.len());
            return ExitCode::FAILURE;
        }
    };

    let binding = match wildcards_of(rule, &target) {
        Some(b) => b,
        None => {
            eprintln!("rule {} claims to produce {target} but the path didn't match", rule.name);
            return ExitCode::FAILURE;
        }
    };

    match expand(rule, &binding) {
        Ok(expansion) => {
            println!("rule: {}", rule.name);
            println!("wildcards: {binding:?}");
            println!("inputs: {:?}", expansion.inputs.as_slice());
            println!("outputs: {:?}", expansion.outputs.as_slice());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to expand {}: {err}", rule.name);
            ExitCode::FAILURE
        }
    }
}

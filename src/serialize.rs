// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;

use itertools::Itertools;

use crate::alphabet::Alphabet;
use crate::automaton::{Automaton, StateId};
use crate::expr::Expr;
use crate::guarded::GuardedAutomaton;
use crate::modal::{Destinations, ModalAutomaton};
use crate::product::ProductError;
use crate::refine::TraceStep;
use crate::runtime::System;

pub fn serialize_to_string(system: &System) -> std::io::Result<String> {
    let mut out = Vec::new();
    serialize(&mut out, system)?;
    String::from_utf8(out).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn serialize_header(
    out: &mut impl Write,
    alphabet: &Alphabet,
    init: &str,
    errors: impl Iterator<Item = String>,
) -> std::io::Result<()> {
    writeln!(out, "  actions: {}", alphabet.format_io())?;
    if !alphabet.internals().is_empty() {
        writeln!(out, "  internal: {}", alphabet.internals().iter().join(", "))?;
    }
    writeln!(out, "  init: {init}")?;
    let errors = errors.collect_vec();
    if !errors.is_empty() {
        writeln!(out, "  errors: {}", errors.join(", "))?;
    }
    Ok(())
}

pub fn serialize_plain(out: &mut impl Write, a: &Automaton) -> std::io::Result<()> {
    writeln!(out, "plain {} {{", a.name())?;
    let errors = a.states().filter(|(_, s)| s.is_error()).map(|(_, s)| s.name().to_string());
    serialize_header(out, a.alphabet(), a.init_state().name(), errors)?;
    for (_, state) in a.states() {
        for (action, dst) in state.steps() {
            writeln!(out, "  {} --{action}--> {}", state.name(), a[dst].name())?;
        }
    }
    writeln!(out, "}}")
}

fn serialize_destinations(a: &ModalAutomaton, dsts: &Destinations) -> String {
    dsts.states().iter().map(|s: &StateId| a[*s].name()).join(" | ")
}

pub fn serialize_modal(out: &mut impl Write, a: &ModalAutomaton) -> std::io::Result<()> {
    writeln!(out, "modal {} {{", a.name())?;
    let errors = a.states().filter(|(_, s)| s.is_error()).map(|(_, s)| s.name().to_string());
    serialize_header(out, a.alphabet(), a.init_state().name(), errors)?;
    for (_, state) in a.states() {
        for (action, dsts) in state.all_must() {
            writeln!(
                out,
                "  must {} --{action}--> {}",
                state.name(),
                serialize_destinations(a, dsts)
            )?;
        }
        for (action, dst) in state.all_may() {
            writeln!(out, "  may {} --{action}--> {}", state.name(), a[dst].name())?;
        }
    }
    writeln!(out, "}}")
}

fn serialize_condition(label: &str, expr: &Expr) -> String {
    match expr.as_bool() {
        Some(true) => String::new(),
        _ => format!(" [{label}: {expr}]"),
    }
}

pub fn serialize_guarded(out: &mut impl Write, a: &GuardedAutomaton) -> std::io::Result<()> {
    writeln!(out, "guarded {} {{", a.name())?;
    for decl in a.decls() {
        writeln!(out, "  var {}: {}", decl.name, decl.tpe)?;
    }
    let errors = a.states().filter(|(_, s)| s.is_error()).map(|(_, s)| s.name().to_string());
    serialize_header(out, a.alphabet(), a.init_state().name(), errors)?;
    for (_, state) in a.states() {
        for step in state.steps() {
            writeln!(
                out,
                "  {} --{}--> {}{}{}",
                state.name(),
                step.action,
                a[step.dst].name(),
                serialize_condition("pre", &step.pre),
                serialize_condition("post", &step.post)
            )?;
        }
    }
    writeln!(out, "}}")
}

pub fn serialize(out: &mut impl Write, system: &System) -> std::io::Result<()> {
    match system {
        System::Plain(a) => serialize_plain(out, a),
        System::Modal(a) => serialize_modal(out, a),
        System::Guarded(a) => serialize_guarded(out, a),
    }
}

/// One step per line, starting at the initial pair.
pub fn serialize_trace(out: &mut impl Write, concrete: &str, abstraction: &str, trace: &[TraceStep]) -> std::io::Result<()> {
    writeln!(out, "{concrete} does not refine {abstraction}:")?;
    for step in trace {
        writeln!(out, "  {step}")?;
    }
    Ok(())
}

pub fn serialize_product_errors(out: &mut impl Write, errors: &[ProductError]) -> std::io::Result<()> {
    for error in errors {
        writeln!(out, "error state {}: {}", error.state, error.message)?;
        for step in &error.trace {
            writeln!(out, "  {step}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::automaton::tests::build_automaton;
    use crate::expr::{DataType, Decl};
    use crate::guarded::tests::build_guarded;
    use crate::modal::tests::build_modal;
    use crate::parser::Scope;
    use crate::product::product;

    #[test]
    fn serialize_plain_automaton() {
        let a = build_automaton(
            "Receiver",
            &[("r0", "msg?", "r1"), ("r1", "tau", "r2"), ("r2", "ack!", "r0"), ("r1", "msg?", "r3")],
            &["r3"],
        );
        insta::assert_snapshot!(serialize_to_string(&System::Plain(a)).unwrap(), @r"
        plain Receiver {
          actions: ack!, msg?
          internal: τ
          init: r0
          errors: r3
          r0 --msg?--> r1
          r1 --msg?--> r3
          r1 --τ--> r2
          r2 --ack!--> r0
        }
        ");
    }

    #[test]
    fn serialize_modal_automaton() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "a?", &["s1", "s2"])],
            &[("s1", "b!", "s0")],
            &[],
        );
        insta::assert_snapshot!(serialize_to_string(&System::Modal(m)).unwrap(), @r"
        modal M {
          actions: a?, b!
          init: s0
          must s0 --a?--> s1 | s2
          may s1 --b!--> s0
        }
        ");
    }

    #[test]
    fn serialize_guarded_automaton() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let g = build_guarded(
            "G",
            &scope,
            &[("g0", "x > 0", "go?", "x' == x - 1", "g1"), ("g1", "true", "done!", "true", "g0")],
            &[],
        );
        insta::assert_snapshot!(serialize_to_string(&System::Guarded(g)).unwrap(), @r"
        guarded G {
          var x: int
          actions: done!, go?
          init: g0
          g0 --go?--> g1 [pre: x > 0] [post: x' == (x - 1)]
          g1 --done!--> g0
        }
        ");
    }

    #[test]
    fn serialize_trace_and_product_errors() {
        let p = build_automaton("P", &[("p0", "go!", "p1")], &[]);
        let q = build_automaton("Q", &[("q0", "x?", "q1"), ("q1", "go?", "q0")], &[]);
        let result = product(&p, &q).unwrap();
        let mut out = Vec::new();
        serialize_product_errors(&mut out, &result.errors).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @"error state p0_q0: go! is sent by p0 but q0 does not accept it");

        let trace = vec![TraceStep {
            label: "a?".to_string(),
            concrete: "c1".to_string(),
            abstraction: "s1".to_string(),
            failure: None,
        }];
        let mut out = Vec::new();
        serialize_trace(&mut out, "C", "S", &trace).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        C does not refine S:
          --a?--> (c1, s1)
        ");
    }
}

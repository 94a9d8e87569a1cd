// Copyright 2025 Cornell University
// released under MIT License

//! JSON systems files: the automata of one session plus the statements to
//! run on them.

use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::action::Action;
use crate::automaton::AutomatonBuilder;
use crate::errors::{IaError, Result};
use crate::expr::{CustomType, DataType, Decl, Expr};
use crate::guarded::GuardedAutomatonBuilder;
use crate::modal::ModalAutomatonBuilder;
use crate::parser::{parse_guard, Scope};
use crate::runtime::System;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Plain,
    Modal,
    Guarded,
}

/// An enumerated type, e.g. `{"name": "Color", "values": ["red", "green"]}`
#[derive(Debug, Deserialize)]
struct RawType {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawVar {
    name: String,
    #[serde(rename = "type")]
    tpe: String,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    from: String,
    action: String,
    to: String,
    pre: Option<String>,
    post: Option<String>,
}

/// A must-step with a disjunction of destinations.
#[derive(Debug, Deserialize)]
struct RawMust {
    from: String,
    action: String,
    to: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAutomaton {
    name: String,
    init: String,
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    transitions: Vec<RawTransition>,
    #[serde(default)]
    must: Vec<RawMust>,
    #[serde(default)]
    may: Vec<RawTransition>,
}

/// The fields of this struct exactly match the top level of a systems file.
#[derive(Debug, Deserialize)]
struct RawSystemsFile {
    kind: Kind,
    #[serde(default)]
    types: Vec<RawType>,
    #[serde(default)]
    vars: Vec<RawVar>,
    automata: Vec<RawAutomaton>,
    #[serde(default)]
    init: Vec<String>,
}

/// A loaded systems file. Statements stay as text so that parse errors can
/// be reported against them.
#[derive(Debug, Clone)]
pub struct SystemsFile {
    pub kind: Kind,
    pub scope: Scope,
    pub systems: Vec<System>,
    pub init: Vec<String>,
}

fn model_error(automaton: &str, message: impl std::fmt::Display) -> IaError {
    IaError::Model(format!("'{automaton}': {message}"))
}

/// Parses the JSON text of a systems file and builds every automaton in it.
pub fn load(text: &str) -> Result<SystemsFile> {
    let raw: RawSystemsFile = serde_json::from_str(text).map_err(|e| IaError::Model(e.to_string()))?;
    let scope = build_scope(&raw)?;

    let mut names = FxHashSet::default();
    let mut systems = Vec::with_capacity(raw.automata.len());
    for automaton in &raw.automata {
        if !names.insert(automaton.name.as_str()) {
            return Err(model_error(&automaton.name, "defined more than once"));
        }
        let system = match raw.kind {
            Kind::Plain => build_plain(automaton)?,
            Kind::Modal => build_modal(automaton)?,
            Kind::Guarded => build_guarded(automaton, &scope)?,
        };
        systems.push(system);
    }

    Ok(SystemsFile {
        kind: raw.kind,
        scope,
        systems,
        init: raw.init,
    })
}

fn build_scope(raw: &RawSystemsFile) -> Result<Scope> {
    if raw.kind != Kind::Guarded && !(raw.types.is_empty() && raw.vars.is_empty()) {
        return Err(IaError::Model("`types` and `vars` require a guarded systems file".to_string()));
    }
    let mut scope = Scope::new();
    for tpe in &raw.types {
        scope.add_type(CustomType {
            name: tpe.name.clone(),
            values: tpe.values.clone(),
        });
    }
    for var in &raw.vars {
        let tpe = match var.tpe.as_str() {
            "int" => DataType::Int,
            "bool" => DataType::Bool,
            other => DataType::Custom(
                scope
                    .custom_type(other)
                    .ok_or_else(|| IaError::Model(format!("unknown type `{other}` of variable `{}`", var.name)))?,
            ),
        };
        scope.declare(Decl::new(&var.name, tpe));
    }
    Ok(scope)
}

/// The declared inputs and outputs plus tau if any step uses it.
fn alphabet_actions<'a>(raw: &RawAutomaton, labels: impl Iterator<Item = &'a str>) -> Result<Vec<Action>> {
    let mut actions: Vec<Action> = raw
        .inputs
        .iter()
        .map(Action::input)
        .chain(raw.outputs.iter().map(Action::output))
        .collect();
    let mut uses_tau = false;
    for label in labels {
        let action = parse_label(raw, label)?;
        if action.is_internal() {
            uses_tau = true;
        } else if !actions.contains(&action) {
            return Err(model_error(&raw.name, format!("action `{action}` is not declared")));
        }
    }
    if uses_tau {
        actions.push(Action::tau());
    }
    Ok(actions)
}

fn parse_label(raw: &RawAutomaton, label: &str) -> Result<Action> {
    Action::parse_label(label).ok_or_else(|| model_error(&raw.name, format!("invalid action `{label}`")))
}

fn reject_fields(raw: &RawAutomaton, kind: Kind) -> Result<()> {
    let misplaced = match kind {
        Kind::Plain | Kind::Guarded if !raw.must.is_empty() || !raw.may.is_empty() => {
            Some("`must` and `may` are only allowed in modal automata")
        }
        Kind::Modal if !raw.transitions.is_empty() => Some("modal automata use `must` and `may` instead of `transitions`"),
        Kind::Plain | Kind::Modal
            if raw
                .transitions
                .iter()
                .chain(&raw.may)
                .any(|t| t.pre.is_some() || t.post.is_some()) =>
        {
            Some("`pre` and `post` are only allowed in guarded automata")
        }
        _ => None,
    };
    match misplaced {
        Some(message) => Err(model_error(&raw.name, message)),
        None => Ok(()),
    }
}

/// Every state name in order of first mention, the initial state first.
fn state_names(raw: &RawAutomaton) -> Vec<&str> {
    let mut seen = FxHashSet::default();
    let mentioned = std::iter::once(raw.init.as_str())
        .chain(raw.transitions.iter().chain(&raw.may).flat_map(|t| [t.from.as_str(), t.to.as_str()]))
        .chain(
            raw.must
                .iter()
                .flat_map(|m| std::iter::once(m.from.as_str()).chain(m.to.iter().map(|s| s.as_str()))),
        )
        .chain(raw.errors.iter().map(|s| s.as_str()));
    mentioned.filter(|name| seen.insert(*name)).collect()
}

fn build_plain(raw: &RawAutomaton) -> Result<System> {
    reject_fields(raw, Kind::Plain)?;
    let mut builder = AutomatonBuilder::new(&raw.name);
    for action in alphabet_actions(raw, raw.transitions.iter().map(|t| t.action.as_str()))? {
        builder.add_action(action)?;
    }
    builder.add_initial_state(&raw.init);
    for name in state_names(raw) {
        builder.add_state(name);
    }
    for error in &raw.errors {
        builder.mark_error(error);
    }
    for t in &raw.transitions {
        builder.add_transition(&t.from, &parse_label(raw, &t.action)?, &t.to);
    }
    let automaton = builder.build().ok_or_else(|| model_error(&raw.name, "missing initial state"))?;
    Ok(System::Plain(automaton))
}

fn build_modal(raw: &RawAutomaton) -> Result<System> {
    reject_fields(raw, Kind::Modal)?;
    let labels = raw
        .must
        .iter()
        .map(|m| m.action.as_str())
        .chain(raw.may.iter().map(|t| t.action.as_str()));
    let mut builder = ModalAutomatonBuilder::new(&raw.name);
    for action in alphabet_actions(raw, labels)? {
        builder.add_action(action)?;
    }
    builder.add_initial_state(&raw.init);
    for name in state_names(raw) {
        builder.add_state(name);
    }
    for error in &raw.errors {
        builder.mark_error(error);
    }
    for m in &raw.must {
        if m.to.is_empty() {
            return Err(model_error(&raw.name, format!("must-step {} --{}--> has no destination", m.from, m.action)));
        }
        let dsts: Vec<&str> = m.to.iter().map(|s| s.as_str()).collect();
        builder.add_must_transition(&m.from, &parse_label(raw, &m.action)?, &dsts);
    }
    for t in &raw.may {
        builder.add_may_transition(&t.from, &parse_label(raw, &t.action)?, &t.to);
    }
    let automaton = builder.build().ok_or_else(|| model_error(&raw.name, "missing initial state"))?;
    Ok(System::Modal(automaton))
}

fn parse_condition(raw: &RawAutomaton, text: Option<&String>, scope: &Scope) -> Result<Expr> {
    match text {
        None => Ok(Expr::Bool(true)),
        Some(text) => parse_guard(text, scope).map_err(|e| model_error(&raw.name, format!("invalid guard `{text}`: {e}"))),
    }
}

fn build_guarded(raw: &RawAutomaton, scope: &Scope) -> Result<System> {
    reject_fields(raw, Kind::Guarded)?;
    let mut builder = GuardedAutomatonBuilder::new(&raw.name);
    for decl in scope.decls() {
        builder.add_decl(decl);
    }
    for action in alphabet_actions(raw, raw.transitions.iter().map(|t| t.action.as_str()))? {
        builder.add_action(action)?;
    }
    builder.add_initial_state(&raw.init);
    for name in state_names(raw) {
        builder.add_state(name);
    }
    for error in &raw.errors {
        builder.mark_error(error);
    }
    for t in &raw.transitions {
        let pre = parse_condition(raw, t.pre.as_ref(), scope)?;
        let post = parse_condition(raw, t.post.as_ref(), scope)?;
        builder.add_transition(&t.from, pre, &parse_label(raw, &t.action)?, post, &t.to);
    }
    let automaton = builder.build().ok_or_else(|| model_error(&raw.name, "missing initial state"))?;
    Ok(System::Guarded(automaton))
}

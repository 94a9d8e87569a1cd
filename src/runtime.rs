// Copyright 2025 Cornell University
// released under MIT License

//! Named systems and the statements that combine them.

use std::collections::BTreeSet;

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::alphabet::Alphabet;
use crate::automaton::Automaton;
use crate::bes::FixpointSolver;
use crate::errors::{IaError, Result};
use crate::guarded::GuardedAutomaton;
use crate::modal::ModalAutomaton;
use crate::operators;
use crate::parser::parse_statement;
use crate::product::{guarded_product, modal_product, product, ProductError};
use crate::prune::prune;
use crate::refine::{verify, verify_guarded, verify_modal, Verdict};
use crate::smt::SmtChecker;
use crate::solver::Solver;

/// An expression over named systems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysExpr {
    Ref(String),
    Product(Box<SysExpr>, Box<SysExpr>),
    Prune(Box<SysExpr>),
    Copy(Box<SysExpr>),
    Refine(Box<SysExpr>, Box<SysExpr>),
    Restrict(Box<SysExpr>, Vec<String>),
    Scope(Box<SysExpr>, Vec<String>),
}

/// `target = expr` or a bare `expr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub target: Option<String>,
    pub expr: SysExpr,
}

/// One automaton of any variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum System {
    Plain(Automaton),
    Modal(ModalAutomaton),
    Guarded(GuardedAutomaton),
}

impl System {
    pub fn name(&self) -> &str {
        match self {
            System::Plain(a) => a.name(),
            System::Modal(a) => a.name(),
            System::Guarded(a) => a.name(),
        }
    }

    pub fn variant(&self) -> &'static str {
        match self {
            System::Plain(_) => "plain",
            System::Modal(_) => "modal",
            System::Guarded(_) => "guarded",
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        match self {
            System::Plain(a) => a.alphabet(),
            System::Modal(a) => a.alphabet(),
            System::Guarded(a) => a.alphabet(),
        }
    }

    pub fn num_states(&self) -> usize {
        match self {
            System::Plain(a) => a.num_states(),
            System::Modal(a) => a.num_states(),
            System::Guarded(a) => a.num_states(),
        }
    }

    pub fn with_name(self, name: impl ToString) -> Self {
        match self {
            System::Plain(a) => System::Plain(a.with_name(name)),
            System::Modal(a) => System::Modal(a.with_name(name)),
            System::Guarded(a) => System::Guarded(a.with_name(name)),
        }
    }

    pub fn is_init_error(&self) -> bool {
        match self {
            System::Plain(a) => a.init_state().is_error(),
            System::Modal(a) => a.init_state().is_error(),
            System::Guarded(a) => a.init_state().is_error(),
        }
    }

    pub fn pruned(&self) -> System {
        match self {
            System::Plain(a) => System::Plain(prune(a)),
            System::Modal(a) => System::Modal(prune(a)),
            System::Guarded(a) => System::Guarded(prune(a)),
        }
    }
}

/// What a statement produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Defined {
        name: String,
        /// error states found while composing, before pruning
        errors: Vec<ProductError>,
    },
    Refinement {
        concrete: String,
        abstraction: String,
        verdict: Verdict,
    },
}

fn usable(system: System) -> Result<System> {
    if system.is_init_error() {
        Err(IaError::InitialStatePruned(system.name().to_string()))
    } else {
        Ok(system)
    }
}

fn mismatch(operation: &'static str, first: &System, second: &System) -> IaError {
    IaError::VariantMismatch {
        operation,
        first: first.variant(),
        second: second.variant(),
    }
}

/// Owns the named systems of one session and the solvers used on them.
pub struct Runtime<'s> {
    systems: FxHashMap<String, System>,
    order: Vec<String>,
    fresh: usize,
    smt: &'s dyn Solver,
    fixpoint: &'s dyn FixpointSolver,
}

impl<'s> Runtime<'s> {
    pub fn new(smt: &'s dyn Solver, fixpoint: &'s dyn FixpointSolver) -> Self {
        Self {
            systems: FxHashMap::default(),
            order: vec![],
            fresh: 0,
            smt,
            fixpoint,
        }
    }

    /// Adds or replaces the system under its own name.
    pub fn define(&mut self, system: System) {
        let name = system.name().to_string();
        if !self.systems.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.systems.insert(name, system);
    }

    pub fn get(&self, name: &str) -> Result<&System> {
        self.systems
            .get(name)
            .ok_or_else(|| IaError::UndefinedSystem(name.to_string()))
    }

    /// Systems in the order they were first defined.
    pub fn systems(&self) -> impl Iterator<Item = &System> {
        self.order.iter().filter_map(|n| self.systems.get(n))
    }

    fn fresh_name(&mut self) -> String {
        loop {
            let name = format!("__runtime_{}", self.fresh);
            self.fresh += 1;
            if !self.systems.contains_key(&name) {
                return name;
            }
        }
    }

    /// Parses and executes one statement.
    pub fn run(&mut self, text: &str) -> Result<Outcome> {
        let stmt = parse_statement(text)?;
        self.execute(&stmt)
    }

    pub fn execute(&mut self, stmt: &Stmt) -> Result<Outcome> {
        let mut errors = vec![];
        if let SysExpr::Refine(concrete, abstraction) = &stmt.expr {
            if stmt.target.is_some() {
                return Err(IaError::NotASystem("refine"));
            }
            let concrete = self.eval(concrete, &mut errors)?;
            let abstraction = self.eval(abstraction, &mut errors)?;
            let verdict = self.refine(&concrete, &abstraction)?;
            return Ok(Outcome::Refinement {
                concrete: concrete.name().to_string(),
                abstraction: abstraction.name().to_string(),
                verdict,
            });
        }

        let system = self.eval(&stmt.expr, &mut errors)?;
        let name = match &stmt.target {
            Some(name) => name.clone(),
            None => self.fresh_name(),
        };
        info!("{name}: {} automaton with {} states", system.variant(), system.num_states());
        self.define(system.with_name(&name));
        Ok(Outcome::Defined { name, errors })
    }

    fn eval(&self, expr: &SysExpr, errors: &mut Vec<ProductError>) -> Result<System> {
        match expr {
            SysExpr::Ref(name) => self.get(name).cloned(),
            SysExpr::Product(first, second) => {
                let first = self.eval(first, errors)?;
                let second = self.eval(second, errors)?;
                let composed = match (&first, &second) {
                    (System::Plain(a), System::Plain(b)) => {
                        let result = product(a, b)?;
                        errors.extend(result.errors);
                        System::Plain(result.automaton)
                    }
                    (System::Modal(a), System::Modal(b)) => {
                        let result = modal_product(a, b)?;
                        errors.extend(result.errors);
                        System::Modal(result.automaton)
                    }
                    (System::Guarded(a), System::Guarded(b)) => {
                        self.smt.ensure_available()?;
                        let result = guarded_product(a, b, &SmtChecker::new(self.smt))?;
                        errors.extend(result.errors);
                        System::Guarded(result.automaton)
                    }
                    _ => return Err(mismatch("product", &first, &second)),
                };
                usable(composed.pruned())
            }
            SysExpr::Prune(inner) => usable(self.eval(inner, errors)?.pruned()),
            SysExpr::Copy(inner) => {
                let system = self.eval(inner, errors)?;
                let name = format!("Copy_{}", system.name());
                Ok(operators::copy(&system, &name))
            }
            SysExpr::Restrict(inner, names) => {
                let names: BTreeSet<String> = names.iter().cloned().collect();
                operators::restrict(&self.eval(inner, errors)?, &names)
            }
            SysExpr::Scope(inner, names) => {
                let names: BTreeSet<String> = names.iter().cloned().collect();
                operators::scope(&self.eval(inner, errors)?, &names)
            }
            SysExpr::Refine(..) => Err(IaError::NotASystem("refine")),
        }
    }

    fn refine(&self, concrete: &System, abstraction: &System) -> Result<Verdict> {
        debug!("refine {} against {}", concrete.name(), abstraction.name());
        match (concrete, abstraction) {
            (System::Plain(c), System::Plain(a)) => verify(c, a, self.fixpoint),
            (System::Modal(c), System::Modal(a)) => verify_modal(c, a, self.fixpoint),
            (System::Guarded(c), System::Guarded(a)) => {
                self.smt.ensure_available()?;
                verify_guarded(c, a, &SmtChecker::new(self.smt), self.fixpoint)
            }
            _ => Err(mismatch("refine", concrete, abstraction)),
        }
    }
}

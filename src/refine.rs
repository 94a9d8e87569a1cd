// Copyright 2025 Cornell University
// released under MIT License

//! Refinement checking. A simulation graph pairs concrete with abstract
//! states; every pair owns one variable of a greatest-fixpoint boolean
//! equation system whose root decides the verdict.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use itertools::Itertools;
use log::{debug, info};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::automaton::{Automaton, StateId};
use crate::bes::{Bes, BesFormula, BesVar, FixpointSolver};
use crate::errors::{IaError, Result};
use crate::expr::Expr;
use crate::guarded::{GuardedAutomaton, GuardedStep};
use crate::modal::ModalAutomaton;
use crate::smt::SmtChecker;
use crate::weak::{Observable, WeakTransitionResolver};

/// A pair of the simulation graph, or the failure an incomplete pair ran
/// into. Failure nodes repeat the names of the pair that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimNode {
    pub concrete: String,
    pub abstraction: String,
    pub failure: Option<String>,
    var: BesVar,
}

impl SimNode {
    pub fn var(&self) -> BesVar {
        self.var
    }
}

/// One step of a counterexample: the action taken and the pair it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub label: String,
    pub concrete: String,
    pub abstraction: String,
    pub failure: Option<String>,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "--{}--> ({}, {})", self.label, self.concrete, self.abstraction),
            Some(reason) => write!(
                f,
                "--{}--> ({}, {}) fails: {reason}",
                self.label, self.concrete, self.abstraction
            ),
        }
    }
}

/// Explored pairs with labelled edges and the equation system built over
/// them.
#[derive(Debug, Clone)]
pub struct SimGraph {
    graph: DiGraph<SimNode, String>,
    root: NodeIndex,
    bes: Bes,
}

impl SimGraph {
    fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            root: NodeIndex::new(0),
            bes: Bes::new(),
        }
    }

    fn add_node(&mut self, concrete: String, abstraction: String, failure: Option<String>) -> NodeIndex {
        let var = if self.graph.node_count() == 0 {
            self.bes.root()
        } else {
            self.bes.add_var()
        };
        if failure.is_some() {
            self.bes.set_formula(var, BesFormula::False);
        }
        self.graph.add_node(SimNode {
            concrete,
            abstraction,
            failure,
            var,
        })
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, label: &str) {
        if !self.graph.edges_connecting(from, to).any(|e| e.weight() == label) {
            self.graph.add_edge(from, to, label.to_string());
        }
    }

    pub fn bes(&self) -> &Bes {
        &self.bes
    }

    pub fn root(&self) -> &SimNode {
        &self.graph[self.root]
    }

    pub fn pairs(&self) -> impl Iterator<Item = &SimNode> {
        self.graph.node_weights().filter(|n| n.failure.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SimNode> {
        self.graph.node_weights().filter(|n| n.failure.is_some())
    }

    /// Shortest path from the initial pair to a failure, moving only through
    /// pairs that are false in the greatest solution. `None` if the initial
    /// pair holds.
    pub fn counterexample(&self) -> Option<Vec<TraceStep>> {
        let solution = self.bes.greatest_solution();
        let holds = |node: NodeIndex| solution[self.graph[node].var];
        if holds(self.root) {
            return None;
        }
        let mut parents: FxHashMap<NodeIndex, EdgeIndex> = FxHashMap::default();
        let mut seen = FxHashSet::from_iter([self.root]);
        let mut queue = VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            if self.graph[node].failure.is_some() {
                return Some(self.trace_to(node, &parents));
            }
            for edge in self.graph.edges(node) {
                if !holds(edge.target()) && seen.insert(edge.target()) {
                    parents.insert(edge.target(), edge.id());
                    queue.push_back(edge.target());
                }
            }
        }
        None
    }

    fn trace_to(&self, node: NodeIndex, parents: &FxHashMap<NodeIndex, EdgeIndex>) -> Vec<TraceStep> {
        let mut steps = vec![];
        let mut current = node;
        while let Some(edge) = parents.get(&current) {
            let target = &self.graph[current];
            steps.push(TraceStep {
                label: self.graph[*edge].clone(),
                concrete: target.concrete.clone(),
                abstraction: target.abstraction.clone(),
                failure: target.failure.clone(),
            });
            let Some((src, _)) = self.graph.edge_endpoints(*edge) else {
                break;
            };
            current = src;
        }
        steps.reverse();
        steps
    }
}

/// Outcome of a refinement check.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub holds: bool,
    pub graph: SimGraph,
}

impl Verdict {
    pub fn counterexample(&self) -> Option<Vec<TraceStep>> {
        if self.holds {
            None
        } else {
            self.graph.counterexample()
        }
    }
}

/// What a pair has to satisfy for one action. `Fail` makes the pair
/// incomplete.
#[derive(Debug, Clone)]
enum Obligation {
    Move {
        label: String,
        concrete: StateId,
        abstraction: StateId,
    },
    All(Vec<Obligation>),
    Any(Vec<Obligation>),
    Fail {
        label: String,
        reason: String,
    },
}

fn step(action: &Action, concrete: StateId, abstraction: StateId) -> Obligation {
    Obligation::Move {
        label: action.to_string(),
        concrete,
        abstraction,
    }
}

fn fail(action: &Action, reason: String) -> Obligation {
    Obligation::Fail {
        label: action.to_string(),
        reason,
    }
}

/// Breadth-first construction of a [`SimGraph`].
struct Explorer<'n> {
    graph: SimGraph,
    nodes: FxHashMap<(StateId, StateId), NodeIndex>,
    queue: VecDeque<(StateId, StateId)>,
    names: &'n dyn Fn(StateId, StateId) -> (String, String),
}

impl Explorer<'_> {
    fn pair(&mut self, concrete: StateId, abstraction: StateId) -> NodeIndex {
        if let Some(node) = self.nodes.get(&(concrete, abstraction)) {
            return *node;
        }
        let (c, a) = (self.names)(concrete, abstraction);
        let node = self.graph.add_node(c, a, None);
        self.nodes.insert((concrete, abstraction), node);
        self.queue.push_back((concrete, abstraction));
        node
    }

    fn lower(&mut self, from: NodeIndex, obligation: &Obligation) -> BesFormula {
        match obligation {
            Obligation::Move {
                label,
                concrete,
                abstraction,
            } => {
                let node = self.pair(*concrete, *abstraction);
                self.graph.add_edge(from, node, label);
                BesFormula::Var(self.graph.graph[node].var)
            }
            Obligation::All(items) => {
                let items: Vec<BesFormula> = items.iter().map(|o| self.lower(from, o)).collect();
                BesFormula::and(items)
            }
            Obligation::Any(items) => {
                let items: Vec<BesFormula> = items.iter().map(|o| self.lower(from, o)).collect();
                BesFormula::or(items)
            }
            Obligation::Fail { label, reason } => {
                let source = &self.graph.graph[from];
                let (c, a) = (source.concrete.clone(), source.abstraction.clone());
                let node = self.graph.add_node(c, a, Some(reason.clone()));
                self.graph.add_edge(from, node, label);
                BesFormula::Var(self.graph.graph[node].var)
            }
        }
    }
}

fn explore(
    init: (StateId, StateId),
    names: &dyn Fn(StateId, StateId) -> (String, String),
    mut rules: impl FnMut(StateId, StateId) -> Result<Vec<Obligation>>,
) -> Result<SimGraph> {
    let mut explorer = Explorer {
        graph: SimGraph::new(),
        nodes: FxHashMap::default(),
        queue: VecDeque::new(),
        names,
    };
    explorer.graph.root = explorer.pair(init.0, init.1);

    while let Some((concrete, abstraction)) = explorer.queue.pop_front() {
        let node = explorer.nodes[&(concrete, abstraction)];
        let obligations = rules(concrete, abstraction)?;
        // an incomplete pair is false and not explored any further
        let formula = match obligations.iter().find(|o| matches!(o, Obligation::Fail { .. })) {
            Some(failure) => explorer.lower(node, failure),
            None => {
                let items: Vec<BesFormula> = obligations.iter().map(|o| explorer.lower(node, o)).collect();
                BesFormula::and(items)
            }
        };
        let var = explorer.graph.graph[node].var;
        explorer.graph.bes.set_formula(var, formula);
    }
    debug!(
        "simulation graph: {} pairs, {} failures",
        explorer.graph.pairs().count(),
        explorer.graph.failures().count()
    );
    Ok(explorer.graph)
}

fn io_mismatch(concrete: &str, c: &Alphabet, abstraction: &str, a: &Alphabet) -> IaError {
    IaError::IoMismatch {
        concrete: concrete.to_string(),
        abstract_name: abstraction.to_string(),
        concrete_actions: c.format_io(),
        abstract_actions: a.format_io(),
    }
}

fn ensure_solver(solver: &dyn FixpointSolver) -> Result<()> {
    let missing = solver.missing_tools();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IaError::SolverUnavailable(missing))
    }
}

fn decide(concrete: &str, abstraction: &str, graph: SimGraph, solver: &dyn FixpointSolver) -> Result<Verdict> {
    debug!("solving {} equations", graph.bes().len());
    let holds = solver.solve_bes(graph.bes())?;
    info!("{concrete} refines {abstraction}: {holds}");
    Ok(Verdict { holds, graph })
}

/// States reachable over internal steps, `start` included.
fn internal_closure(start: StateId, successors: impl Fn(StateId) -> Vec<StateId>) -> BTreeSet<StateId> {
    let mut seen = BTreeSet::new();
    let mut todo = vec![start];
    while let Some(state) = todo.pop() {
        if seen.insert(state) {
            todo.extend(successors(state));
        }
    }
    seen
}

/// Plain refinement. Both automata must have the same inputs and outputs.
pub fn verify(concrete: &Automaton, abstraction: &Automaton, solver: &dyn FixpointSolver) -> Result<Verdict> {
    if !concrete.alphabet().is_io_equal(abstraction.alphabet()) {
        return Err(io_mismatch(
            concrete.name(),
            concrete.alphabet(),
            abstraction.name(),
            abstraction.alphabet(),
        ));
    }
    ensure_solver(solver)?;
    info!("checking {} against {}", concrete.name(), abstraction.name());

    let names = |c: StateId, a: StateId| (concrete[c].name().to_string(), abstraction[a].name().to_string());
    let tau = Action::tau();
    let rules = |c: StateId, a: StateId| -> Result<Vec<Obligation>> {
        let (cs, as_) = (&concrete[c], &abstraction[a]);
        let mut out = vec![];

        // every input the abstraction accepts must be accepted as well
        for input in as_.inputs() {
            if !cs.has_action(input) {
                out.push(fail(input, format!("{} does not accept {input}", cs.name())));
                continue;
            }
            let clauses = cs
                .successors(input)
                .iter()
                .map(|cd| {
                    let choices = as_.successors(input).iter().map(|ad| step(input, *cd, *ad));
                    Obligation::Any(choices.collect())
                })
                .collect();
            out.push(Obligation::All(clauses));
        }

        let closure = internal_closure(a, |s| abstraction[s].successors(&tau).to_vec());
        for internal in cs.internals() {
            let choices = cs
                .successors(internal)
                .iter()
                .cartesian_product(closure.iter())
                .map(|(cd, ad)| step(internal, *cd, *ad))
                .collect();
            out.push(Obligation::Any(choices));
        }

        for output in cs.outputs() {
            let matched: Vec<StateId> = closure
                .iter()
                .flat_map(|s| abstraction[*s].successors(output).iter().copied())
                .collect();
            if matched.is_empty() {
                out.push(fail(output, format!("{output} is not allowed by {}", as_.name())));
                continue;
            }
            let choices = cs
                .successors(output)
                .iter()
                .cartesian_product(matched.iter())
                .map(|(cd, ad)| step(output, *cd, *ad))
                .collect();
            out.push(Obligation::Any(choices));
        }
        Ok(out)
    };

    let graph = explore((concrete.init(), abstraction.init()), &names, rules)?;
    decide(concrete.name(), abstraction.name(), graph, solver)
}

/// Modal refinement: every must-step of the abstraction is matched by a weak
/// must-step of the concrete automaton and every concrete step by a weak
/// may-step of the abstraction.
pub fn verify_modal(
    concrete: &ModalAutomaton,
    abstraction: &ModalAutomaton,
    solver: &dyn FixpointSolver,
) -> Result<Verdict> {
    if !concrete.alphabet().is_io_refinable(abstraction.alphabet()) {
        return Err(io_mismatch(
            concrete.name(),
            concrete.alphabet(),
            abstraction.name(),
            abstraction.alphabet(),
        ));
    }
    ensure_solver(solver)?;
    info!("checking {} against {} (modal)", concrete.name(), abstraction.name());

    let names = |c: StateId, a: StateId| (concrete[c].name().to_string(), abstraction[a].name().to_string());
    let mut concrete_weak = WeakTransitionResolver::new(concrete);
    let mut abstract_weak = WeakTransitionResolver::new(abstraction);
    let rules = |c: StateId, a: StateId| -> Result<Vec<Obligation>> {
        let (cs, as_) = (&concrete[c], &abstraction[a]);
        let mut out = vec![];

        for action in as_.must_actions() {
            let answers = concrete_weak.must(c, &Observable::of(action));
            if answers.is_empty() {
                out.push(fail(action, format!("{} has no mandatory {action}", cs.name())));
                continue;
            }
            let obligations = as_
                .must_steps(action)
                .iter()
                .map(|dsts| {
                    let options = answers.iter().map(|answer| {
                        let each = answer.iter().map(|cd| {
                            Obligation::Any(dsts.states().iter().map(|ad| step(action, *cd, *ad)).collect())
                        });
                        Obligation::All(each.collect())
                    });
                    Obligation::Any(options.collect())
                })
                .collect();
            out.push(Obligation::All(obligations));
        }

        for action in cs.actions() {
            // inputs the abstraction never mentions are unconstrained
            if action.is_input() && !abstraction.alphabet().contains(action) {
                continue;
            }
            let allowed = abstract_weak.may(a, &Observable::of(action));
            if allowed.is_empty() {
                out.push(fail(action, format!("{action} is not allowed by {}", as_.name())));
                continue;
            }
            let obligations = cs
                .successors(action)
                .into_iter()
                .map(|cd| Obligation::Any(allowed.iter().map(|ad| step(action, cd, *ad)).collect()))
                .collect();
            out.push(Obligation::All(obligations));
        }
        Ok(out)
    };

    let graph = explore((concrete.init(), abstraction.init()), &names, rules)?;
    decide(concrete.name(), abstraction.name(), graph, solver)
}

/// Smallest groups of `members` that together refine `reference`: the
/// reference precondition implies the disjunction of the member
/// preconditions and no member breaks the reference postcondition. Groups
/// are tried by increasing size; supersets of a valid group are skipped.
fn families(smt: &SmtChecker, reference: &GuardedStep, members: &[&GuardedStep]) -> Result<Vec<Vec<usize>>> {
    let mut valid: Vec<Vec<usize>> = vec![];
    for size in 1..=members.len() {
        for group in (0..members.len()).combinations(size) {
            if valid.iter().any(|v| v.iter().all(|i| group.contains(i))) {
                continue;
            }
            if is_family(smt, reference, group.iter().map(|i| members[*i]))? {
                debug!("family {group:?} refines {}", reference.action);
                valid.push(group);
            }
        }
    }
    Ok(valid)
}

fn is_family<'s>(
    smt: &SmtChecker,
    reference: &GuardedStep,
    group: impl Iterator<Item = &'s GuardedStep> + Clone,
) -> Result<bool> {
    let pres = Expr::or_all(group.clone().map(|m| m.pre.clone()));
    if !smt.implies_for_all(&reference.pre, &pres)? {
        return Ok(false);
    }
    for member in group {
        let lhs = Expr::and_all([reference.pre.clone(), member.pre.clone(), member.post.clone()]);
        if !smt.implies_for_all(&lhs, &reference.post)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Data-guarded refinement. Concrete inputs must include the abstract ones
/// and concrete outputs must be among the abstract ones.
pub fn verify_guarded(
    concrete: &GuardedAutomaton,
    abstraction: &GuardedAutomaton,
    smt: &SmtChecker,
    solver: &dyn FixpointSolver,
) -> Result<Verdict> {
    if !concrete.alphabet().is_io_refinable(abstraction.alphabet()) {
        return Err(io_mismatch(
            concrete.name(),
            concrete.alphabet(),
            abstraction.name(),
            abstraction.alphabet(),
        ));
    }
    ensure_solver(solver)?;
    info!("checking {} against {} (guarded)", concrete.name(), abstraction.name());

    let names = |c: StateId, a: StateId| (concrete[c].name().to_string(), abstraction[a].name().to_string());
    let tau = Action::tau();
    let rules = |c: StateId, a: StateId| -> Result<Vec<Obligation>> {
        let (cs, as_) = (&concrete[c], &abstraction[a]);
        let mut out = vec![];

        for input in as_.actions().filter(|x| x.is_input()) {
            if !cs.has_action(input) {
                out.push(fail(input, format!("{} does not accept {input}", cs.name())));
                continue;
            }
            let members: Vec<&GuardedStep> = cs.steps_for(input).iter().collect();
            let mut per_step = vec![];
            for reference in as_.steps_for(input) {
                let found = families(smt, reference, &members)?;
                if found.is_empty() {
                    per_step.push(fail(
                        input,
                        format!("no steps of {} refine {input} with guard `{}`", cs.name(), reference.pre),
                    ));
                    break;
                }
                let options = found.iter().map(|family| {
                    Obligation::All(family.iter().map(|i| step(input, members[*i].dst, reference.dst)).collect())
                });
                per_step.push(Obligation::Any(options.collect()));
            }
            match per_step.iter().position(|o| matches!(o, Obligation::Fail { .. })) {
                Some(index) => out.push(per_step.swap_remove(index)),
                None => out.push(Obligation::All(per_step)),
            }
        }

        let closure = internal_closure(a, |s| abstraction[s].steps_for(&tau).iter().map(|st| st.dst).collect());
        for internal in cs.actions().filter(|x| x.is_internal()) {
            let choices = cs
                .steps_for(internal)
                .iter()
                .cartesian_product(closure.iter())
                .map(|(cd, ad)| step(internal, cd.dst, *ad))
                .collect();
            out.push(Obligation::Any(choices));
        }

        for output in cs.actions().filter(|x| x.is_output()) {
            let members: Vec<&GuardedStep> = closure
                .iter()
                .flat_map(|s| abstraction[*s].steps_for(output))
                .collect();
            if members.is_empty() {
                out.push(fail(output, format!("{output} is not allowed by {}", as_.name())));
                continue;
            }
            let mut per_step = vec![];
            for reference in cs.steps_for(output) {
                let found = families(smt, reference, &members)?;
                if found.is_empty() {
                    per_step.push(fail(
                        output,
                        format!("{output} with guard `{}` is not allowed by {}", reference.pre, as_.name()),
                    ));
                    break;
                }
                let options = found.iter().map(|family| {
                    Obligation::All(family.iter().map(|i| step(output, reference.dst, members[*i].dst)).collect())
                });
                per_step.push(Obligation::Any(options.collect()));
            }
            match per_step.iter().position(|o| matches!(o, Obligation::Fail { .. })) {
                Some(index) => out.push(per_step.swap_remove(index)),
                None => out.push(Obligation::All(per_step)),
            }
        }
        Ok(out)
    };

    let graph = explore((concrete.init(), abstraction.init()), &names, rules)?;
    decide(concrete.name(), abstraction.name(), graph, solver)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::automaton::tests::build_automaton;
    use crate::bes::LocalFixpointSolver;
    use crate::expr::{DataType, Decl};
    use crate::guarded::tests::build_guarded;
    use crate::modal::tests::build_modal;
    use crate::parser::Scope;
    use crate::solver::{FnSolver, Solver};

    fn trace_text(verdict: &Verdict) -> String {
        verdict
            .counterexample()
            .unwrap_or_default()
            .iter()
            .map(|s| s.to_string())
            .join("\n")
    }

    #[test]
    fn test_plain_refinement_is_reflexive() {
        let a = build_automaton(
            "A",
            &[("s0", "a?", "s1"), ("s1", "tau", "s2"), ("s2", "b!", "s0"), ("s1", "b!", "s0")],
            &[],
        );
        let verdict = verify(&a, &a, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);
        assert!(verdict.counterexample().is_none());
        assert_eq!(verdict.graph.failures().count(), 0);
        assert_eq!(verdict.graph.root().concrete, "s0");
    }

    #[test]
    fn test_io_gate_builds_nothing() {
        let a = build_automaton("A", &[("s0", "a?", "s0")], &[]);
        let b = build_automaton("B", &[("s0", "a?", "s0"), ("s0", "b!", "s0")], &[]);
        let err = verify(&a, &b, &LocalFixpointSolver).unwrap_err();
        assert!(matches!(err, IaError::IoMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "input/output actions of 'A' and 'B' do not match (a? -- a?, b!)"
        );
    }

    #[test]
    fn test_missing_solver_is_reported_up_front() {
        struct Missing;
        impl FixpointSolver for Missing {
            fn missing_tools(&self) -> Vec<String> {
                vec!["pbessolve".to_string()]
            }
            fn solve_bes(&self, _: &Bes) -> Result<bool> {
                unreachable!()
            }
        }
        let a = build_automaton("A", &[("s0", "a?", "s0")], &[]);
        assert!(matches!(verify(&a, &a, &Missing), Err(IaError::SolverUnavailable(_))));
    }

    #[test]
    fn test_unexpected_output_fails_with_trace() {
        let concrete = build_automaton("C", &[("c0", "a?", "c1"), ("c1", "b!", "c0"), ("c1", "x!", "c0")], &[]);
        let abstraction = build_automaton("S", &[("s0", "a?", "s1"), ("s1", "b!", "s0"), ("s0", "x!", "s0")], &[]);
        let verdict = verify(&concrete, &abstraction, &LocalFixpointSolver).unwrap();
        assert!(!verdict.holds);
        insta::assert_snapshot!(trace_text(&verdict), @r"
--a?--> (c1, s1)
--x!--> (c1, s1) fails: x! is not allowed by s1
");
    }

    #[test]
    fn test_missing_input_makes_pair_incomplete() {
        let concrete = build_automaton("C", &[("c0", "a?", "c0"), ("c0", "b?", "c1")], &[]);
        let abstraction = build_automaton("S", &[("s0", "a?", "s1"), ("s1", "b?", "s0"), ("s0", "b?", "s0")], &[]);
        let verdict = verify(&concrete, &abstraction, &LocalFixpointSolver).unwrap();
        assert!(!verdict.holds);
        let trace = verdict.counterexample().unwrap();
        let last = trace.last().unwrap();
        assert_eq!(last.failure.as_deref(), Some("c1 does not accept a?"));
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_internal_steps_are_matched_by_staying() {
        let concrete = build_automaton("C", &[("c0", "tau", "c1"), ("c1", "o!", "c0")], &[]);
        let abstraction = build_automaton("S", &[("s0", "o!", "s0")], &[]);
        let verdict = verify(&concrete, &abstraction, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);
        insta::assert_snapshot!(verdict.graph.bes().to_string(), @r"
pbes
  nu X0 = X1;
  nu X1 = X0;
init X0;
");
    }

    #[test]
    fn test_modal_refinement() {
        let abstraction = build_modal("S", "s0", &[("s0", "a?", &["s1"])], &[("s1", "o!", "s0")], &[]);
        let good = build_modal(
            "C",
            "c0",
            &[("c0", "a?", &["c1"]), ("c1", "tau", &["c2"]), ("c2", "o!", &["c0"])],
            &[],
            &[],
        );
        assert!(verify_modal(&good, &abstraction, &LocalFixpointSolver).unwrap().holds);
        assert!(verify_modal(&abstraction, &abstraction, &LocalFixpointSolver).unwrap().holds);

        // the mandatory input became optional
        let lax = build_modal("C", "c0", &[], &[("c0", "a?", "c1")], &[]);
        let verdict = verify_modal(&lax, &abstraction, &LocalFixpointSolver).unwrap();
        assert!(!verdict.holds);
        let trace = verdict.counterexample().unwrap();
        assert_eq!(trace[0].failure.as_deref(), Some("c0 has no mandatory a?"));
    }

    #[test]
    fn test_modal_io_gate_allows_extra_inputs() {
        let abstraction = build_modal("S", "s0", &[("s0", "a?", &["s0"])], &[], &[]);
        let concrete = build_modal("C", "c0", &[("c0", "a?", &["c0"])], &[("c0", "b?", "c0")], &[]);
        assert!(verify_modal(&concrete, &abstraction, &LocalFixpointSolver).unwrap().holds);
        assert!(matches!(
            verify_modal(&abstraction, &concrete, &LocalFixpointSolver),
            Err(IaError::IoMismatch { .. })
        ));
    }

    #[test]
    fn test_guarded_family_covers_reference_guard() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let abstraction = build_guarded("S", &scope, &[("s0", "true", "a?", "true", "s1")], &[]);
        let concrete = build_guarded(
            "C",
            &scope,
            &[("c0", "x > 0", "a?", "true", "c1"), ("c0", "x <= 0", "a?", "true", "c2")],
            &[],
        );
        // only the pair of both guards covers `true`
        let solver = FnSolver(|script: &str| script.contains("(or"));
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);
        let pairs: Vec<_> = verdict.graph.pairs().map(|p| p.concrete.as_str()).sorted().collect();
        assert_eq!(pairs, ["c0", "c1", "c2"]);
    }

    fn recording<'a>(scripts: &'a RefCell<Vec<String>>, answer: impl Fn(&str) -> bool + 'a) -> impl Solver + 'a {
        FnSolver(move |script: &str| {
            scripts.borrow_mut().push(script.to_string());
            answer(script)
        })
    }

    #[test]
    fn test_guarded_input_family_queries() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let abstraction = build_guarded("S", &scope, &[("s0", "x > 0", "a?", "x' > 1", "s1")], &[]);
        let concrete = build_guarded("C", &scope, &[("c0", "x >= 0", "a?", "x' == x + 1", "c1")], &[]);
        let scripts = RefCell::new(vec![]);
        let solver = recording(&scripts, |_| true);
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);
        insta::assert_snapshot!(scripts.borrow().concat(), @r"
(assert (forall ((x Int)) (=> (> x 0) (>= x 0))))
(check-sat)
(assert (forall ((x Int) (__z_t0 Int)) (=> (and (and (> x 0) (>= x 0)) (= __z_t0 (+ x 1))) (> __z_t0 1))))
(check-sat)
");
    }

    #[test]
    fn test_guarded_output_family_after_internal_steps() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let abstraction = build_guarded(
            "S",
            &scope,
            &[("s0", "true", "tau", "true", "s1"), ("s1", "x > 0", "o!", "x' == x", "s2")],
            &[],
        );
        let concrete = build_guarded("C", &scope, &[("c0", "x > 5", "o!", "x' > 0", "c1")], &[]);

        let scripts = RefCell::new(vec![]);
        let solver = recording(&scripts, |_| true);
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);
        let pairs: Vec<_> = verdict.graph.pairs().map(|p| (p.concrete.as_str(), p.abstraction.as_str())).collect();
        assert!(pairs.contains(&("c1", "s2")));
        insta::assert_snapshot!(scripts.borrow().concat(), @r"
(assert (forall ((x Int)) (=> (> x 5) (> x 0))))
(check-sat)
(assert (forall ((x Int) (__z_t0 Int)) (=> (and (and (> x 5) (> x 0)) (= __z_t0 x)) (> __z_t0 0))))
(check-sat)
");

        // the guards overlap but the postcondition is not established
        let scripts = RefCell::new(vec![]);
        let solver = recording(&scripts, |script| !script.contains("__z_t0"));
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(!verdict.holds);
        let trace = verdict.counterexample().unwrap();
        assert_eq!(
            trace[0].failure.as_deref(),
            Some("o! with guard `x > 5` is not allowed by s0")
        );
    }

    #[test]
    fn test_guarded_supersets_of_a_family_are_skipped() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let abstraction = build_guarded("S", &scope, &[("s0", "true", "a?", "true", "s1")], &[]);
        let concrete = build_guarded(
            "C",
            &scope,
            &[
                ("c0", "x > 0", "a?", "true", "c1"),
                ("c0", "x <= 0", "a?", "true", "c2"),
                ("c0", "x == 7", "a?", "true", "c3"),
            ],
            &[],
        );
        let scripts = RefCell::new(vec![]);
        let solver = recording(&scripts, |script| script.contains("(or (> x 0) (<= x 0))"));
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(verdict.holds);

        // three single members and three pairs, never the triple
        assert_eq!(scripts.borrow().len(), 6);
        assert!(scripts.borrow().iter().all(|s| !s.contains("(or (or")));
        let pairs: Vec<_> = verdict.graph.pairs().map(|p| p.concrete.as_str()).sorted().collect();
        assert_eq!(pairs, ["c0", "c1", "c2"]);
    }

    #[test]
    fn test_guarded_without_family_fails() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let abstraction = build_guarded("S", &scope, &[("s0", "true", "a?", "true", "s1")], &[]);
        let concrete = build_guarded("C", &scope, &[("c0", "x > 0", "a?", "true", "c1")], &[]);
        let solver = FnSolver(|_: &str| false);
        let smt = SmtChecker::new(&solver);
        let verdict = verify_guarded(&concrete, &abstraction, &smt, &LocalFixpointSolver).unwrap();
        assert!(!verdict.holds);
        let trace = verdict.counterexample().unwrap();
        assert_eq!(
            trace[0].failure.as_deref(),
            Some("no steps of c0 refine a? with guard `true`")
        );
    }
}

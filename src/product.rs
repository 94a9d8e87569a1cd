// Copyright 2025 Cornell University
// released under MIT License

use std::collections::{BTreeSet, VecDeque};

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::automaton::{Automaton, AutomatonBuilder, StateId};
use crate::errors::{IaError, Result};
use crate::expr::Expr;
use crate::guarded::{GuardedAutomaton, GuardedAutomatonBuilder, GuardedState};
use crate::modal::{ModalAutomaton, ModalAutomatonBuilder, ModalState};
use crate::smt::SmtChecker;

/// Two components may be composed if they do not share inputs or outputs and
/// neither internal action clashes with the other's I/O.
pub fn is_composable(a: &Alphabet, b: &Alphabet) -> bool {
    let shared_inputs = a.inputs().iter().any(|i| b.inputs().contains(i));
    let shared_outputs = a.outputs().iter().any(|o| b.outputs().contains(o));
    let internal_clash = a.internals().iter().any(|t| b.has_io_name(t.name()))
        || b.internals().iter().any(|t| a.has_io_name(t.name()));
    !(shared_inputs || shared_outputs || internal_clash)
}

/// Names that are an input of one component and an output of the other.
pub fn shared_io_actions(a: &Alphabet, b: &Alphabet) -> BTreeSet<String> {
    let a_in = a.input_names();
    let a_out = a.output_names();
    let b_in = b.input_names();
    let b_out = b.output_names();
    a_out
        .intersection(&b_in)
        .chain(a_in.intersection(&b_out))
        .map(|n| n.to_string())
        .collect()
}

fn check_composable(first: &str, a: &Alphabet, second: &str, b: &Alphabet) -> Result<()> {
    if is_composable(a, b) {
        Ok(())
    } else {
        Err(IaError::NotComposable {
            first: first.to_string(),
            second: second.to_string(),
            first_actions: a.format_io(),
            second_actions: b.format_io(),
        })
    }
}

fn product_alphabet(a: &Alphabet, b: &Alphabet, shared: &BTreeSet<String>) -> Result<Alphabet> {
    let mut out = Alphabet::new();
    for action in a.all().chain(b.all()) {
        if action.is_internal() || !shared.contains(action.name()) {
            out.add(action.clone())?;
        }
    }
    if !shared.is_empty() {
        out.add(Action::tau())?;
    }
    Ok(out)
}

fn is_shared(action: &Action, shared: &BTreeSet<String>) -> bool {
    !action.is_internal() && shared.contains(action.name())
}

/// A composite state that became an error during composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductError {
    pub state: String,
    pub message: String,
    /// shortest sequence of product steps from the initial state
    pub trace: Vec<String>,
}

/// Result of a composition; errors are kept as error states in `automaton`.
#[derive(Debug, Clone)]
pub struct Product<A> {
    pub automaton: A,
    pub errors: Vec<ProductError>,
}

enum Expansion<T> {
    Moves(Vec<T>),
    Error(String),
}

/// Breadth-first worklist over pairs of component states.
#[derive(Default)]
struct PairSpace {
    names: FxHashMap<(StateId, StateId), String>,
    used: FxHashSet<String>,
    parents: FxHashMap<String, (String, String)>,
    queue: VecDeque<(StateId, StateId)>,
    order: Vec<String>,
}

impl PairSpace {
    /// Name of the composite state; enqueued on its first visit.
    fn visit(&mut self, pair: (StateId, StateId), n1: &str, n2: &str, from: Option<(&str, String)>) -> String {
        if let Some(name) = self.names.get(&pair) {
            return name.clone();
        }
        let mut name = format!("{n1}_{n2}");
        while !self.used.insert(name.clone()) {
            name.push('\'');
        }
        self.names.insert(pair, name.clone());
        if let Some((src, label)) = from {
            self.parents.insert(name.clone(), (src.to_string(), label));
        }
        self.queue.push_back(pair);
        self.order.push(name.clone());
        name
    }

    fn next(&mut self) -> Option<((StateId, StateId), String)> {
        let pair = self.queue.pop_front()?;
        Some((pair, self.names[&pair].clone()))
    }

    fn trace(&self, name: &str) -> Vec<String> {
        let mut steps = vec![];
        let mut current = name;
        while let Some((src, label)) = self.parents.get(current) {
            steps.push(format!("{src} --{label}--> {current}"));
            current = src.as_str();
        }
        steps.reverse();
        steps
    }

    fn error(&self, state: &str, message: String) -> ProductError {
        debug!("product error in {state}: {message}");
        ProductError {
            state: state.to_string(),
            message,
            trace: self.trace(state),
        }
    }
}

fn component_error(first: (&str, bool), second: (&str, bool)) -> Option<String> {
    [first, second]
        .into_iter()
        .find(|(_, is_error)| *is_error)
        .map(|(name, _)| format!("component state {name} is an error state"))
}

fn unmatched_output(output: &Action, sender: &str, receiver: &str) -> String {
    format!("{output} is sent by {sender} but {receiver} does not accept it")
}

/// Synchronized product of two plain automata. A composite state is an
/// error if either component state is an error or a shared output is not
/// accepted by the partner.
pub fn product(a: &Automaton, b: &Automaton) -> Result<Product<Automaton>> {
    check_composable(a.name(), a.alphabet(), b.name(), b.alphabet())?;
    let shared = shared_io_actions(a.alphabet(), b.alphabet());
    let name = format!("Product_{}_{}", a.name(), b.name());

    let mut space = PairSpace::default();
    let init = space.visit((a.init(), b.init()), a.init_state().name(), b.init_state().name(), None);
    let mut steps: Vec<(String, Action, String)> = vec![];
    let mut errors: Vec<ProductError> = vec![];

    while let Some(((s1, s2), src)) = space.next() {
        match expand_plain(a, s1, b, s2, &shared) {
            Expansion::Error(message) => errors.push(space.error(&src, message)),
            Expansion::Moves(moves) => {
                for (action, d1, d2) in moves {
                    let from = Some((src.as_str(), action.to_string()));
                    let dst = space.visit((d1, d2), a[d1].name(), b[d2].name(), from);
                    steps.push((src.clone(), action, dst));
                }
            }
        }
    }

    let mut builder = AutomatonBuilder::new(&name);
    for action in product_alphabet(a.alphabet(), b.alphabet(), &shared)?.all() {
        builder.add_action(action.clone())?;
    }
    for state in &space.order {
        builder.add_state(state);
    }
    builder.add_initial_state(&init);
    for error in &errors {
        builder.mark_error(&error.state);
    }
    for (src, action, dst) in &steps {
        builder.add_transition(src, action, dst);
    }
    let automaton = builder.build().ok_or_else(|| IaError::InitialStatePruned(name.clone()))?;
    info!(
        "{name}: {} states, {} transitions, {} error states",
        automaton.num_states(),
        automaton.num_transitions(),
        errors.len()
    );
    Ok(Product { automaton, errors })
}

fn expand_plain(
    a: &Automaton,
    s1: StateId,
    b: &Automaton,
    s2: StateId,
    shared: &BTreeSet<String>,
) -> Expansion<(Action, StateId, StateId)> {
    let (st1, st2) = (&a[s1], &b[s2]);
    if let Some(message) = component_error((st1.name(), st1.is_error()), (st2.name(), st2.is_error())) {
        return Expansion::Error(message);
    }
    let mut moves = vec![];

    // synchronization on shared actions, either side may be the sender
    for output in st1.outputs().filter(|o| is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st2.has_action(i)) else {
            return Expansion::Error(unmatched_output(output, st1.name(), st2.name()));
        };
        for d1 in st1.successors(output) {
            for d2 in st2.successors(&input) {
                moves.push((Action::tau(), *d1, *d2));
            }
        }
    }
    for output in st2.outputs().filter(|o| is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st1.has_action(i)) else {
            return Expansion::Error(unmatched_output(output, st2.name(), st1.name()));
        };
        for d1 in st1.successors(&input) {
            for d2 in st2.successors(output) {
                moves.push((Action::tau(), *d1, *d2));
            }
        }
    }

    // interleaving
    for (action, d1) in st1.steps().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push((action.clone(), d1, s2));
    }
    for (action, d2) in st2.steps().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push((action.clone(), s1, d2));
    }
    Expansion::Moves(moves)
}

struct ModalMove {
    action: Action,
    must: bool,
    dsts: Vec<(StateId, StateId)>,
}

/// Synchronized product of two modal automata. Error states arise as in
/// [`product`].
pub fn modal_product(a: &ModalAutomaton, b: &ModalAutomaton) -> Result<Product<ModalAutomaton>> {
    check_composable(a.name(), a.alphabet(), b.name(), b.alphabet())?;
    let shared = shared_io_actions(a.alphabet(), b.alphabet());
    let name = format!("Product_{}_{}", a.name(), b.name());

    let mut space = PairSpace::default();
    let init = space.visit((a.init(), b.init()), a.init_state().name(), b.init_state().name(), None);
    let mut must_steps: Vec<(String, Action, Vec<String>)> = vec![];
    let mut may_steps: Vec<(String, Action, String)> = vec![];
    let mut errors: Vec<ProductError> = vec![];

    while let Some(((s1, s2), src)) = space.next() {
        match expand_modal(a, s1, b, s2, &shared) {
            Expansion::Error(message) => errors.push(space.error(&src, message)),
            Expansion::Moves(moves) => {
                for m in moves {
                    let dsts: Vec<String> = m
                        .dsts
                        .iter()
                        .map(|(d1, d2)| {
                            let from = Some((src.as_str(), m.action.to_string()));
                            space.visit((*d1, *d2), a[*d1].name(), b[*d2].name(), from)
                        })
                        .collect();
                    if m.must {
                        must_steps.push((src.clone(), m.action, dsts));
                    } else {
                        for dst in dsts {
                            may_steps.push((src.clone(), m.action.clone(), dst));
                        }
                    }
                }
            }
        }
    }

    let mut builder = ModalAutomatonBuilder::new(&name);
    for action in product_alphabet(a.alphabet(), b.alphabet(), &shared)?.all() {
        builder.add_action(action.clone())?;
    }
    for state in &space.order {
        builder.add_state(state);
    }
    builder.add_initial_state(&init);
    for error in &errors {
        builder.mark_error(&error.state);
    }
    for (src, action, dsts) in &must_steps {
        let dsts: Vec<&str> = dsts.iter().map(String::as_str).collect();
        builder.add_must_transition(src, action, &dsts);
    }
    for (src, action, dst) in &may_steps {
        builder.add_may_transition(src, action, dst);
    }
    let automaton = builder.build().ok_or_else(|| IaError::InitialStatePruned(name.clone()))?;
    info!("{name}: {} states, {} error states", automaton.num_states(), errors.len());
    Ok(Product { automaton, errors })
}

/// Synchronizes `output` of `sender` with the matching input of `receiver`.
/// Pairs are oriented `(sender, receiver)`.
fn sync_modal(sender: &ModalState, output: &Action, receiver: &ModalState, input: &Action) -> Vec<ModalMove> {
    let mut moves = vec![];
    let cross = |d1: &[StateId], d2: &[StateId]| -> Vec<(StateId, StateId)> {
        d1.iter().flat_map(|x| d2.iter().map(move |y| (*x, *y))).collect()
    };
    let may = |dsts: Vec<(StateId, StateId)>| ModalMove {
        action: Action::tau(),
        must: false,
        dsts,
    };
    if sender.has_must(output) && receiver.has_must(input) {
        for out_dsts in sender.must_steps(output) {
            for in_dsts in receiver.must_steps(input) {
                moves.push(ModalMove {
                    action: Action::tau(),
                    must: true,
                    dsts: cross(out_dsts.states(), in_dsts.states()),
                });
            }
        }
        // combinations that involve at least one may-step
        moves.push(may(cross(sender.may_steps(output), &receiver.successors(input))));
        moves.push(may(cross(&sender.successors(output), receiver.may_steps(input))));
    } else {
        moves.push(may(cross(&sender.successors(output), &receiver.successors(input))));
    }
    moves.retain(|m| !m.dsts.is_empty());
    moves
}

fn expand_modal(
    a: &ModalAutomaton,
    s1: StateId,
    b: &ModalAutomaton,
    s2: StateId,
    shared: &BTreeSet<String>,
) -> Expansion<ModalMove> {
    let (st1, st2) = (&a[s1], &b[s2]);
    if let Some(message) = component_error((st1.name(), st1.is_error()), (st2.name(), st2.is_error())) {
        return Expansion::Error(message);
    }
    let mut moves = vec![];

    for output in st1.actions().into_iter().filter(|o| o.is_output() && is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st2.has_action(i)) else {
            return Expansion::Error(unmatched_output(output, st1.name(), st2.name()));
        };
        moves.extend(sync_modal(st1, output, st2, &input));
    }
    for output in st2.actions().into_iter().filter(|o| o.is_output() && is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st1.has_action(i)) else {
            return Expansion::Error(unmatched_output(output, st2.name(), st1.name()));
        };
        for mut m in sync_modal(st2, output, st1, &input) {
            m.dsts = m.dsts.into_iter().map(|(d2, d1)| (d1, d2)).collect();
            moves.push(m);
        }
    }

    for (action, dsts) in st1.all_must().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push(ModalMove {
            action: action.clone(),
            must: true,
            dsts: dsts.states().iter().map(|d1| (*d1, s2)).collect(),
        });
    }
    for (action, d1) in st1.all_may().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push(ModalMove {
            action: action.clone(),
            must: false,
            dsts: vec![(d1, s2)],
        });
    }
    for (action, dsts) in st2.all_must().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push(ModalMove {
            action: action.clone(),
            must: true,
            dsts: dsts.states().iter().map(|d2| (s1, *d2)).collect(),
        });
    }
    for (action, d2) in st2.all_may().filter(|(a, _)| !is_shared(a, shared)) {
        moves.push(ModalMove {
            action: action.clone(),
            must: false,
            dsts: vec![(s1, d2)],
        });
    }
    Expansion::Moves(moves)
}

struct GuardedMove {
    pre: Expr,
    action: Action,
    post: Expr,
    dst: (StateId, StateId),
}

/// Synchronized product of two guarded automata. A synchronization is only
/// possible where the input and output preconditions overlap, and the
/// receiver's postcondition must establish the sender's.
pub fn guarded_product(
    a: &GuardedAutomaton,
    b: &GuardedAutomaton,
    smt: &SmtChecker,
) -> Result<Product<GuardedAutomaton>> {
    check_composable(a.name(), a.alphabet(), b.name(), b.alphabet())?;
    let shared = shared_io_actions(a.alphabet(), b.alphabet());
    let name = format!("Product_{}_{}", a.name(), b.name());

    let mut space = PairSpace::default();
    let init = space.visit((a.init(), b.init()), a.init_state().name(), b.init_state().name(), None);
    let mut steps: Vec<(String, GuardedMove, String)> = vec![];
    let mut errors: Vec<ProductError> = vec![];

    while let Some(((s1, s2), src)) = space.next() {
        match expand_guarded(a, s1, b, s2, &shared, smt)? {
            Expansion::Error(message) => errors.push(space.error(&src, message)),
            Expansion::Moves(moves) => {
                for m in moves {
                    let (d1, d2) = m.dst;
                    let from = Some((src.as_str(), m.action.to_string()));
                    let dst = space.visit((d1, d2), a[d1].name(), b[d2].name(), from);
                    steps.push((src.clone(), m, dst));
                }
            }
        }
    }

    let mut builder = GuardedAutomatonBuilder::new(&name);
    for decl in a.decls().iter().chain(b.decls()) {
        builder.add_decl(decl.clone());
    }
    for action in product_alphabet(a.alphabet(), b.alphabet(), &shared)?.all() {
        builder.add_action(action.clone())?;
    }
    for state in &space.order {
        builder.add_state(state);
    }
    builder.add_initial_state(&init);
    for error in &errors {
        builder.mark_error(&error.state);
    }
    for (src, m, dst) in steps {
        builder.add_transition(&src, m.pre, &m.action, m.post, &dst);
    }
    let automaton = builder.build().ok_or_else(|| IaError::InitialStatePruned(name.clone()))?;
    info!("{name}: {} states, {} error states", automaton.num_states(), errors.len());
    Ok(Product { automaton, errors })
}

/// Pairs are oriented `(sender, receiver)`.
fn sync_guarded(
    sender: &GuardedState,
    output: &Action,
    receiver: &GuardedState,
    input: &Action,
    smt: &SmtChecker,
) -> Result<Expansion<GuardedMove>> {
    let mut moves = vec![];
    for out_step in sender.steps_for(output) {
        let mut accepted = false;
        for in_step in receiver.steps_for(input) {
            if !smt.is_satisfiable_all(&[&in_step.pre, &out_step.pre])? {
                continue;
            }
            accepted = true;
            let pre = Expr::and(in_step.pre.clone(), out_step.pre.clone());
            let established = Expr::and(pre.clone(), in_step.post.clone());
            if !smt.implies_for_all(&established, &out_step.post)? {
                return Ok(Expansion::Error(format!(
                    "postcondition `{}` of {output} in {} is not guaranteed by `{}` in {}",
                    out_step.post,
                    sender.name(),
                    in_step.post,
                    receiver.name()
                )));
            }
            moves.push(GuardedMove {
                pre,
                action: Action::tau(),
                post: in_step.post.clone(),
                dst: (out_step.dst, in_step.dst),
            });
        }
        if !accepted {
            return Ok(Expansion::Error(format!(
                "no guard of {input} in {} accepts {output} from {} under `{}`",
                receiver.name(),
                sender.name(),
                out_step.pre
            )));
        }
    }
    Ok(Expansion::Moves(moves))
}

fn expand_guarded(
    a: &GuardedAutomaton,
    s1: StateId,
    b: &GuardedAutomaton,
    s2: StateId,
    shared: &BTreeSet<String>,
    smt: &SmtChecker,
) -> Result<Expansion<GuardedMove>> {
    let (st1, st2) = (&a[s1], &b[s2]);
    if let Some(message) = component_error((st1.name(), st1.is_error()), (st2.name(), st2.is_error())) {
        return Ok(Expansion::Error(message));
    }
    let mut moves = vec![];

    for output in st1.actions().filter(|o| o.is_output() && is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st2.has_action(i)) else {
            return Ok(Expansion::Error(unmatched_output(output, st1.name(), st2.name())));
        };
        match sync_guarded(st1, output, st2, &input, smt)? {
            Expansion::Moves(synced) => moves.extend(synced),
            error => return Ok(error),
        }
    }
    for output in st2.actions().filter(|o| o.is_output() && is_shared(o, shared)) {
        let Some(input) = output.complement().filter(|i| st1.has_action(i)) else {
            return Ok(Expansion::Error(unmatched_output(output, st2.name(), st1.name())));
        };
        match sync_guarded(st2, output, st1, &input, smt)? {
            Expansion::Moves(synced) => moves.extend(synced.into_iter().map(|mut m| {
                m.dst = (m.dst.1, m.dst.0);
                m
            })),
            error => return Ok(error),
        }
    }

    for step in st1.steps().filter(|s| !is_shared(&s.action, shared)) {
        moves.push(GuardedMove {
            pre: step.pre.clone(),
            action: step.action.clone(),
            post: step.post.clone(),
            dst: (step.dst, s2),
        });
    }
    for step in st2.steps().filter(|s| !is_shared(&s.action, shared)) {
        moves.push(GuardedMove {
            pre: step.pre.clone(),
            action: step.action.clone(),
            post: step.post.clone(),
            dst: (s1, step.dst),
        });
    }
    Ok(Expansion::Moves(moves))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::automaton::tests::build_automaton;
    use crate::expr::{DataType, Decl};
    use crate::guarded::tests::build_guarded;
    use crate::modal::tests::build_modal;
    use crate::parser::Scope;
    use crate::solver::FnSolver;

    #[test]
    fn test_synchronization_hides_shared_actions() {
        let p = build_automaton("P", &[("p0", "a!", "p1")], &[]);
        let q = build_automaton("Q", &[("q0", "a?", "q1")], &[]);
        let product = product(&p, &q).unwrap();
        let pq = product.automaton;

        assert_eq!(pq.name(), "Product_P_Q");
        let init_actions: Vec<_> = pq.init_state().actions().collect();
        assert_eq!(init_actions, vec![&Action::tau()]);
        assert!(pq.alphabet().inputs().is_empty());
        assert!(pq.alphabet().outputs().is_empty());
        let dst = pq.init_state().successors(&Action::tau());
        assert_eq!(pq[dst[0]].name(), "p1_q1");
        assert!(product.errors.is_empty());
    }

    #[test]
    fn test_composability_is_symmetric() {
        let p = build_automaton("P", &[("p0", "a?", "p1")], &[]);
        let q = build_automaton("Q", &[("q0", "a?", "q1")], &[]);
        let r = build_automaton("R", &[("r0", "a!", "r1"), ("r1", "tau", "r0")], &[]);
        let s = build_automaton("S", &[("s0", "b!", "s1")], &[]);
        let all = [&p, &q, &r, &s];
        for x in all {
            for y in all {
                assert_eq!(
                    is_composable(x.alphabet(), y.alphabet()),
                    is_composable(y.alphabet(), x.alphabet())
                );
            }
        }
        assert!(!is_composable(p.alphabet(), q.alphabet()));
        assert!(is_composable(p.alphabet(), r.alphabet()));
        assert!(!is_composable(r.alphabet(), r.alphabet()));

        let err = product(&p, &q).unwrap_err();
        assert_eq!(
            err.to_string(),
            "automata are not composable: 'P' and 'Q' (a? -- a?)"
        );
    }

    #[test]
    fn test_unreceived_output_is_an_error() {
        let p = build_automaton("P", &[("p0", "a!", "p1")], &[]);
        let q = build_automaton("Q", &[("q0", "b?", "q1"), ("q1", "a?", "q2")], &[]);
        let product = product(&p, &q).unwrap();
        let pq = product.automaton;
        assert!(pq.init_state().is_error());
        assert_eq!(pq.init_state().actions().count(), 0);
        assert_eq!(product.errors.len(), 1);
        assert_eq!(product.errors[0].message, "a! is sent by p0 but q0 does not accept it");
    }

    #[test]
    fn test_interleaving() {
        let p = build_automaton("P", &[("p0", "x!", "p1")], &[]);
        let q = build_automaton("Q", &[("q0", "y?", "q1")], &[]);
        let pq = product(&p, &q).unwrap().automaton;
        assert_eq!(pq.num_states(), 4);
        assert_eq!(pq.num_transitions(), 4);
        assert_eq!(pq.alphabet().format_io(), "x!, y?");
    }

    #[test]
    fn test_error_trace() {
        let p = build_automaton("P", &[("p0", "go?", "p1"), ("p1", "a!", "p2")], &[]);
        let q = build_automaton("Q", &[("q0", "b?", "q1"), ("q1", "a?", "q0")], &[]);
        let product = product(&p, &q).unwrap();
        let error = product.errors.iter().find(|e| e.state == "p1_q0").unwrap();
        assert_eq!(error.trace, vec!["p0_q0 --go?--> p1_q0".to_string()]);
    }

    #[test]
    fn test_component_errors_carry_over() {
        let p = build_automaton("P", &[("p0", "x?", "p1")], &["p1"]);
        let q = build_automaton("Q", &[("q0", "y!", "q1")], &[]);
        let product = product(&p, &q).unwrap();
        let states: Vec<_> = product.errors.iter().map(|e| e.state.as_str()).collect();
        assert_eq!(states, vec!["p1_q0", "p1_q1"]);
        assert_eq!(product.errors[0].message, "component state p1 is an error state");
        assert_eq!(product.errors[1].trace.len(), 2);
    }

    #[test]
    fn test_modal_unreceived_output_is_an_error() {
        let p = build_modal("P", "p0", &[("p0", "a!", &["p1"])], &[], &[]);
        let q = build_modal("Q", "q0", &[("q0", "b?", &["q1"]), ("q1", "a?", &["q0"])], &[], &[]);
        let product = modal_product(&p, &q).unwrap();
        let pq = product.automaton;
        assert!(pq.init_state().is_error());
        assert!(pq.init_state().all_must().next().is_none());
        assert!(pq.init_state().all_may().next().is_none());
        assert_eq!(product.errors.len(), 1);
        assert_eq!(product.errors[0].state, "p0_q0");
        assert_eq!(product.errors[0].message, "a! is sent by p0 but q0 does not accept it");
    }

    #[test]
    fn test_modal_component_errors_carry_over() {
        let p = build_modal("P", "p0", &[("p0", "x?", &["p1"])], &[], &["p1"]);
        let q = build_modal("Q", "q0", &[], &[("q0", "y!", "q0")], &[]);
        let product = modal_product(&p, &q).unwrap();
        assert_eq!(product.errors.len(), 1);
        let error = &product.errors[0];
        assert_eq!(error.state, "p1_q0");
        assert_eq!(error.message, "component state p1 is an error state");
        assert_eq!(error.trace, vec!["p0_q0 --x?--> p1_q0".to_string()]);
        assert!(!product.automaton.init_state().is_error());
    }

    #[test]
    fn test_modal_must_synchronization() {
        let p = build_modal("P", "p0", &[("p0", "a!", &["p1"])], &[], &[]);
        let q = build_modal("Q", "q0", &[("q0", "a?", &["q1", "q2"])], &[], &[]);
        let pq = modal_product(&p, &q).unwrap().automaton;
        let init = pq.init_state();
        let must = init.must_steps(&Action::tau());
        assert_eq!(must.len(), 1);
        let names: Vec<_> = must[0].states().iter().map(|s| pq[*s].name()).collect();
        assert_eq!(names, vec!["p1_q1", "p1_q2"]);
        assert!(init.may_steps(&Action::tau()).is_empty());
    }

    #[test]
    fn test_modal_may_synchronization() {
        let p = build_modal("P", "p0", &[], &[("p0", "a!", "p1")], &[]);
        let q = build_modal("Q", "q0", &[("q0", "a?", &["q1"])], &[("q0", "b!", "q0")], &[]);
        let pq = modal_product(&p, &q).unwrap().automaton;
        let init = pq.init_state();
        assert!(!init.has_must(&Action::tau()));
        let may: Vec<_> = init.may_steps(&Action::tau()).iter().map(|s| pq[*s].name()).collect();
        assert_eq!(may, vec!["p1_q1"]);
        assert_eq!(init.may_steps(&Action::output("b")).len(), 1);
    }

    #[test]
    fn test_guarded_synchronization() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let p = build_guarded("P", &scope, &[("p0", "true", "a!", "true", "p1")], &[]);
        let q = build_guarded("Q", &scope, &[("q0", "x > 0", "a?", "x' == x", "q1")], &[]);
        let solver = FnSolver(|_: &str| true);
        let smt = SmtChecker::new(&solver);
        let product = guarded_product(&p, &q, &smt).unwrap();
        let pq = product.automaton;
        let steps = pq.init_state().steps_for(&Action::tau());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].pre.to_string(), "x > 0");
        assert_eq!(steps[0].post.to_string(), "x' == x");
        assert_eq!(pq.decls().len(), 1);
        assert!(product.errors.is_empty());
    }

    #[test]
    fn test_guarded_precondition_overlap_query() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let q = build_guarded("Q", &scope, &[("q0", "x > 0", "a?", "true", "q1")], &[]);
        let scripts = RefCell::new(vec![]);
        let solver = FnSolver(|script: &str| {
            scripts.borrow_mut().push(script.to_string());
            true
        });
        let smt = SmtChecker::new(&solver);

        let p = build_guarded("P", &scope, &[("p0", "x < 5", "a!", "true", "p1")], &[]);
        let product = guarded_product(&p, &q, &smt).unwrap();
        assert!(product.errors.is_empty());
        assert_eq!(scripts.borrow().len(), 1);
        insta::assert_snapshot!(scripts.borrow()[0], @r"
(declare-const x Int)
(assert (and (> x 0) (< x 5)))
(check-sat)
");

        // a constant false precondition never reaches the solver
        scripts.borrow_mut().clear();
        let p = build_guarded("P", &scope, &[("p0", "1 > 2", "a!", "true", "p1")], &[]);
        let product = guarded_product(&p, &q, &smt).unwrap();
        assert!(scripts.borrow().is_empty());
        assert!(product.automaton.init_state().is_error());
        assert!(product.errors[0].message.starts_with("no guard of a? in q0 accepts a! from p0"));
    }

    #[test]
    fn test_guarded_postcondition_violation() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let p = build_guarded("P", &scope, &[("p0", "true", "a!", "x' > 5", "p1")], &[]);
        let q = build_guarded("Q", &scope, &[("q0", "x > 0", "a?", "x' == x", "q1")], &[]);
        // satisfiable, but no universally valid implication
        let solver = FnSolver(|script: &str| !script.contains("forall"));
        let smt = SmtChecker::new(&solver);
        let product = guarded_product(&p, &q, &smt).unwrap();
        assert!(product.automaton.init_state().is_error());
        assert_eq!(product.errors.len(), 1);
        assert!(product.errors[0].message.starts_with("postcondition `x' > 5`"));
    }

    #[test]
    fn test_guarded_disjoint_guards_are_an_error() {
        let mut scope = Scope::new();
        scope.declare(Decl::new("x", DataType::Int));
        let p = build_guarded("P", &scope, &[("p0", "x < 0", "a!", "true", "p1")], &[]);
        let q = build_guarded("Q", &scope, &[("q0", "x > 0", "a?", "true", "q1")], &[]);
        let solver = FnSolver(|_: &str| false);
        let smt = SmtChecker::new(&solver);
        let product = guarded_product(&p, &q, &smt).unwrap();
        assert!(product.automaton.init_state().is_error());
    }
}

// Copyright 2025 Cornell University
// released under MIT License

//! Backward removal of states that can reach an error state without help
//! from the environment.

use cranelift_entity::SecondaryMap;
use log::{debug, info};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use rustc_hash::FxHashSet;

use crate::automaton::{Automaton, StateId};
use crate::guarded::GuardedAutomaton;
use crate::modal::ModalAutomaton;

/// The view of an automaton that pruning needs.
pub trait Prunable: Sized {
    fn name(&self) -> &str;
    fn init(&self) -> StateId;
    fn state_ids(&self) -> Vec<StateId>;
    fn is_error_state(&self, state: StateId) -> bool;
    /// Destinations of output and internal steps out of `state`.
    fn autonomous_successors(&self, state: StateId) -> Vec<StateId>;
    fn without_states(&self, removed: &FxHashSet<StateId>) -> Self;
}

impl Prunable for Automaton {
    fn name(&self) -> &str {
        self.name()
    }

    fn init(&self) -> StateId {
        self.init()
    }

    fn state_ids(&self) -> Vec<StateId> {
        self.states().map(|(id, _)| id).collect()
    }

    fn is_error_state(&self, state: StateId) -> bool {
        self[state].is_error()
    }

    fn autonomous_successors(&self, state: StateId) -> Vec<StateId> {
        self[state]
            .steps()
            .filter(|(action, _)| action.is_autonomous())
            .map(|(_, dst)| dst)
            .collect()
    }

    fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        Automaton::without_states(self, removed)
    }
}

impl Prunable for ModalAutomaton {
    fn name(&self) -> &str {
        self.name()
    }

    fn init(&self) -> StateId {
        self.init()
    }

    fn state_ids(&self) -> Vec<StateId> {
        self.states().map(|(id, _)| id).collect()
    }

    fn is_error_state(&self, state: StateId) -> bool {
        self[state].is_error()
    }

    fn autonomous_successors(&self, state: StateId) -> Vec<StateId> {
        let state = &self[state];
        state
            .actions()
            .into_iter()
            .filter(|action| action.is_autonomous())
            .flat_map(|action| state.successors(action))
            .collect()
    }

    fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        ModalAutomaton::without_states(self, removed)
    }
}

impl Prunable for GuardedAutomaton {
    fn name(&self) -> &str {
        self.name()
    }

    fn init(&self) -> StateId {
        self.init()
    }

    fn state_ids(&self) -> Vec<StateId> {
        self.states().map(|(id, _)| id).collect()
    }

    fn is_error_state(&self, state: StateId) -> bool {
        self[state].is_error()
    }

    fn autonomous_successors(&self, state: StateId) -> Vec<StateId> {
        self[state]
            .steps()
            .filter(|step| step.action.is_autonomous())
            .map(|step| step.dst)
            .collect()
    }

    fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        GuardedAutomaton::without_states(self, removed)
    }
}

/// Every state that reaches an error state over output and internal steps,
/// including the error states themselves.
pub fn error_states<A: Prunable>(automaton: &A) -> FxHashSet<StateId> {
    let ids = automaton.state_ids();
    let mut graph: DiGraph<Option<StateId>, ()> = DiGraph::new();
    let sink = graph.add_node(None);
    let mut nodes: SecondaryMap<StateId, NodeIndex> = SecondaryMap::new();
    for id in &ids {
        nodes[*id] = graph.add_node(Some(*id));
    }

    for id in &ids {
        if automaton.is_error_state(*id) {
            graph.add_edge(nodes[*id], sink, ());
        }
        for dst in automaton.autonomous_successors(*id) {
            graph.add_edge(nodes[*id], nodes[dst], ());
        }
    }

    let reversed = Reversed(&graph);
    let mut bfs = Bfs::new(reversed, sink);
    let mut errors = FxHashSet::default();
    while let Some(node) = bfs.next(reversed) {
        if let Some(id) = graph[node] {
            errors.insert(id);
        }
    }
    errors
}

/// Removes every state in [`error_states`]. If the initial state is among
/// them it is kept, flagged as an error and stripped of its transitions.
pub fn prune<A: Prunable>(automaton: &A) -> A {
    let errors = error_states(automaton);
    debug!("{}: {} error states", automaton.name(), errors.len());
    let pruned = automaton.without_states(&errors);
    if errors.contains(&automaton.init()) {
        info!("{}: initial state was pruned", automaton.name());
    } else {
        info!(
            "{}: pruned {} of {} states",
            automaton.name(),
            errors.len(),
            automaton.state_ids().len()
        );
    }
    pruned
}

// Copyright 2025 Cornell University
// released under MIT License

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use cranelift_entity::{PrimaryMap, SecondaryMap};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::automaton::StateId;
use crate::errors::Result;

/// Destinations of a must-step. A disjunctive set stems from a single
/// branching construct and is resolved nondeterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destinations {
    Single(StateId),
    /// sorted, at least two members
    Disjunctive(Vec<StateId>),
}

impl Destinations {
    /// `None` for an empty set.
    pub fn from_states(states: impl IntoIterator<Item = StateId>) -> Option<Self> {
        let states: BTreeSet<StateId> = states.into_iter().collect();
        let mut states: Vec<StateId> = states.into_iter().collect();
        match states.len() {
            0 => None,
            1 => states.pop().map(Destinations::Single),
            _ => Some(Destinations::Disjunctive(states)),
        }
    }

    pub fn states(&self) -> &[StateId] {
        match self {
            Destinations::Single(state) => std::slice::from_ref(state),
            Destinations::Disjunctive(states) => states,
        }
    }

    pub fn retain(&self, keep: impl Fn(StateId) -> bool) -> Option<Self> {
        Self::from_states(self.states().iter().copied().filter(|s| keep(*s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalState {
    name: String,
    is_error: bool,
    must: BTreeMap<Action, Vec<Destinations>>,
    may: BTreeMap<Action, Vec<StateId>>,
}

impl ModalState {
    fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            is_error: false,
            must: BTreeMap::new(),
            may: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn must_actions(&self) -> impl Iterator<Item = &Action> {
        self.must.keys()
    }

    pub fn may_actions(&self) -> impl Iterator<Item = &Action> {
        self.may.keys()
    }

    /// Actions enabled by a must- or a may-step.
    pub fn actions(&self) -> BTreeSet<&Action> {
        self.must_actions().chain(self.may_actions()).collect()
    }

    pub fn must_steps(&self, action: &Action) -> &[Destinations] {
        self.must.get(action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn may_steps(&self, action: &Action) -> &[StateId] {
        self.may.get(action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_must(&self, action: &Action) -> bool {
        self.must.contains_key(action)
    }

    pub fn has_action(&self, action: &Action) -> bool {
        self.must.contains_key(action) || self.may.contains_key(action)
    }

    pub fn all_must(&self) -> impl Iterator<Item = (&Action, &Destinations)> {
        self.must
            .iter()
            .flat_map(|(action, steps)| steps.iter().map(move |d| (action, d)))
    }

    pub fn all_may(&self) -> impl Iterator<Item = (&Action, StateId)> {
        self.may
            .iter()
            .flat_map(|(action, dsts)| dsts.iter().map(move |d| (action, *d)))
    }

    /// Every state reachable by one must- or may-step on `action`.
    pub fn successors(&self, action: &Action) -> Vec<StateId> {
        let mut out: Vec<StateId> = self
            .must_steps(action)
            .iter()
            .flat_map(|d| d.states().iter().copied())
            .collect();
        for dst in self.may_steps(action) {
            if !out.contains(dst) {
                out.push(*dst);
            }
        }
        out
    }
}

/// An interface automaton whose transitions are either mandatory (must) or
/// optional (may).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalAutomaton {
    name: String,
    alphabet: Alphabet,
    states: PrimaryMap<StateId, ModalState>,
    names: FxHashMap<String, StateId>,
    init: StateId,
}

impl ModalAutomaton {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn init(&self) -> StateId {
        self.init
    }

    pub fn init_state(&self) -> &ModalState {
        &self.states[self.init]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &ModalState)> {
        self.states.iter()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.names.get(name).copied()
    }

    /// Drops the `removed` states. Must-steps lose removed destinations and
    /// disappear once none is left; may-steps into removed states are
    /// dropped. A removed initial state survives as an error state without
    /// transitions and the initial state becomes the first state.
    pub(crate) fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        let mut states = PrimaryMap::new();
        let mut ids: SecondaryMap<StateId, Option<StateId>> = SecondaryMap::new();
        let mut init = ModalState::new(&self.init_state().name);
        init.is_error = self.init_state().is_error || removed.contains(&self.init);
        ids[self.init] = Some(states.push(init));
        for (id, state) in self.states.iter() {
            if id != self.init && !removed.contains(&id) {
                ids[id] = Some(states.push(ModalState::new(&state.name)));
            }
        }
        let keep = |s: StateId| !removed.contains(&s);
        for (id, state) in self.states.iter().filter(|(id, _)| keep(*id)) {
            let Some(src) = ids[id] else { continue };
            for (action, dsts) in state.all_must() {
                let mapped = dsts.states().iter().filter(|d| keep(**d)).filter_map(|d| ids[*d]);
                if let Some(dsts) = Destinations::from_states(mapped) {
                    let steps = states[src].must.entry(action.clone()).or_default();
                    if !steps.contains(&dsts) {
                        steps.push(dsts);
                    }
                }
            }
            for (action, dst) in state.all_may() {
                if let Some(dst) = ids[dst].filter(|_| keep(dst)) {
                    states[src].may.entry(action.clone()).or_default().push(dst);
                }
            }
        }
        let names = states.iter().map(|(id, s)| (s.name.clone(), id)).collect();
        Self {
            name: self.name.clone(),
            alphabet: self.alphabet.clone(),
            states,
            names,
            init: StateId::from_u32(0),
        }
    }

    /// Relabels every must- and may-step; `None` deletes it.
    pub(crate) fn map_steps(&self, alphabet: Alphabet, relabel: impl Fn(&Action) -> Option<Action>) -> Self {
        let mut states = self.states.clone();
        for state in states.values_mut() {
            let must = std::mem::take(&mut state.must);
            for (action, steps) in must {
                let Some(action) = relabel(&action) else { continue };
                let entry = state.must.entry(action).or_default();
                for dsts in steps {
                    if !entry.contains(&dsts) {
                        entry.push(dsts);
                    }
                }
            }
            let may = std::mem::take(&mut state.may);
            for (action, dsts) in may {
                let Some(action) = relabel(&action) else { continue };
                let entry = state.may.entry(action).or_default();
                for dst in dsts {
                    if !entry.contains(&dst) {
                        entry.push(dst);
                    }
                }
            }
        }
        Self {
            name: self.name.clone(),
            alphabet,
            states,
            names: self.names.clone(),
            init: self.init,
        }
    }
}

impl Index<StateId> for ModalAutomaton {
    type Output = ModalState;

    fn index(&self, index: StateId) -> &Self::Output {
        &self.states[index]
    }
}

pub struct ModalAutomatonBuilder {
    name: String,
    alphabet: Alphabet,
    states: PrimaryMap<StateId, ModalState>,
    names: FxHashMap<String, StateId>,
    init: Option<StateId>,
}

impl ModalAutomatonBuilder {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            alphabet: Alphabet::new(),
            states: PrimaryMap::new(),
            names: FxHashMap::default(),
            init: None,
        }
    }

    pub fn add_state(&mut self, name: impl ToString) -> StateId {
        let name = name.to_string();
        if let Some(id) = self.names.get(&name) {
            return *id;
        }
        let id = self.states.push(ModalState::new(&name));
        self.names.insert(name, id);
        id
    }

    pub fn add_initial_state(&mut self, name: impl ToString) -> StateId {
        let id = self.add_state(name);
        self.init = Some(id);
        id
    }

    pub fn mark_error(&mut self, name: &str) {
        if let Some(id) = self.names.get(name) {
            self.states[*id].is_error = true;
        }
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn add_action(&mut self, action: Action) -> Result<()> {
        self.alphabet.add(action)
    }

    fn resolve(&self, src: &str, action: &Action, dsts: &[&str]) -> Option<(StateId, Vec<StateId>)> {
        let src_id = self.names.get(src).copied();
        let dst_ids: Option<Vec<StateId>> = dsts.iter().map(|d| self.names.get(*d).copied()).collect();
        match (src_id, dst_ids) {
            (Some(src_id), Some(dst_ids)) if self.alphabet.contains(action) => Some((src_id, dst_ids)),
            _ => {
                warn!(
                    "{}: ignoring step {src} --{action}--> {{{}}}",
                    self.name,
                    dsts.join(", ")
                );
                None
            }
        }
    }

    /// Ignored unless all states and the action are registered and at least
    /// one destination is given.
    pub fn add_must_transition(&mut self, src: &str, action: &Action, dsts: &[&str]) {
        let Some((src_id, dst_ids)) = self.resolve(src, action, dsts) else {
            return;
        };
        let Some(destinations) = Destinations::from_states(dst_ids) else {
            return;
        };
        let steps = self.states[src_id].must.entry(action.clone()).or_default();
        if !steps.contains(&destinations) {
            steps.push(destinations);
        }
    }

    pub fn add_may_transition(&mut self, src: &str, action: &Action, dst: &str) {
        let Some((src_id, dst_ids)) = self.resolve(src, action, &[dst]) else {
            return;
        };
        let dsts = self.states[src_id].may.entry(action.clone()).or_default();
        for dst in dst_ids {
            if !dsts.contains(&dst) {
                dsts.push(dst);
            }
        }
    }

    pub fn build(self) -> Option<ModalAutomaton> {
        let init = self.init?;
        Some(ModalAutomaton {
            name: self.name,
            alphabet: self.alphabet,
            states: self.states,
            names: self.names,
            init,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn build_modal(
        name: &str,
        init: &str,
        must: &[(&str, &str, &[&str])],
        may: &[(&str, &str, &str)],
        errors: &[&str],
    ) -> ModalAutomaton {
        let mut builder = ModalAutomatonBuilder::new(name);
        builder.add_initial_state(init);
        for (src, label, dsts) in must {
            builder.add_state(src);
            for dst in dsts.iter() {
                builder.add_state(dst);
            }
            builder.add_action(Action::parse_label(label).unwrap()).unwrap();
        }
        for (src, label, dst) in may {
            builder.add_state(src);
            builder.add_state(dst);
            builder.add_action(Action::parse_label(label).unwrap()).unwrap();
        }
        for error in errors {
            builder.mark_error(error);
        }
        for (src, label, dsts) in must {
            builder.add_must_transition(src, &Action::parse_label(label).unwrap(), dsts);
        }
        for (src, label, dst) in may {
            builder.add_may_transition(src, &Action::parse_label(label).unwrap(), dst);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_destinations() {
        let a = StateId::from_u32(0);
        let b = StateId::from_u32(1);
        assert_eq!(Destinations::from_states([]), None);
        assert_eq!(Destinations::from_states([a, a]), Some(Destinations::Single(a)));
        let both = Destinations::from_states([b, a]).unwrap();
        assert_eq!(both, Destinations::Disjunctive(vec![a, b]));
        assert_eq!(both.retain(|s| s != a), Some(Destinations::Single(b)));
        assert_eq!(both.retain(|_| false), None);
    }

    #[test]
    fn test_must_and_may_steps() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "a?", &["s1", "s2"]), ("s0", "a?", &["s1", "s2"])],
            &[("s0", "b!", "s1"), ("s1", "tau", "s2")],
            &[],
        );
        let s0 = m.init_state();
        assert_eq!(s0.must_steps(&Action::input("a")).len(), 1);
        assert_eq!(s0.successors(&Action::input("a")).len(), 2);
        assert!(!s0.has_must(&Action::output("b")));
        assert!(s0.has_action(&Action::output("b")));
        assert_eq!(s0.actions().len(), 2);
    }

    #[test]
    fn test_must_without_destinations_is_ignored() {
        let mut builder = ModalAutomatonBuilder::new("M");
        builder.add_initial_state("s0");
        builder.add_action(Action::output("o")).unwrap();
        builder.add_must_transition("s0", &Action::output("o"), &[]);
        builder.add_must_transition("s0", &Action::output("o"), &["nowhere"]);
        let m = builder.build().unwrap();
        assert_eq!(m.init_state().all_must().count(), 0);
    }
}

// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeMap;
use std::ops::Index;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::errors::Result;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct StateId(u32);
entity_impl!(StateId, "state");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    name: String,
    is_error: bool,
    /// successors per enabled action, in insertion order without duplicates
    steps: BTreeMap<Action, Vec<StateId>>,
}

impl State {
    fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            is_error: false,
            steps: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.steps.keys()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Action> {
        self.actions().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Action> {
        self.actions().filter(|a| a.is_output())
    }

    pub fn internals(&self) -> impl Iterator<Item = &Action> {
        self.actions().filter(|a| a.is_internal())
    }

    pub fn has_action(&self, action: &Action) -> bool {
        self.steps.contains_key(action)
    }

    pub fn successors(&self, action: &Action) -> &[StateId] {
        self.steps.get(action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn steps(&self) -> impl Iterator<Item = (&Action, StateId)> {
        self.steps
            .iter()
            .flat_map(|(action, dsts)| dsts.iter().map(move |dst| (action, *dst)))
    }
}

/// A plain interface automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    name: String,
    alphabet: Alphabet,
    states: PrimaryMap<StateId, State>,
    names: FxHashMap<String, StateId>,
    init: StateId,
}

impl Automaton {
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

    pub fn init_state(&self) -> &State {
        &self.states[self.init]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states.iter()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.names.get(name).copied()
    }

    pub fn num_transitions(&self) -> usize {
        self.states.values().map(|s| s.steps().count()).sum()
    }

    /// Drops the `removed` states and every transition touching them. A
    /// removed initial state survives as an error state without transitions.
    /// The initial state becomes the first state of the result.
    pub(crate) fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        let mut states = PrimaryMap::new();
        let mut ids: SecondaryMap<StateId, Option<StateId>> = SecondaryMap::new();
        let mut init = State::new(&self.init_state().name);
        init.is_error = self.init_state().is_error || removed.contains(&self.init);
        ids[self.init] = Some(states.push(init));
        for (id, state) in self.states.iter() {
            if id != self.init && !removed.contains(&id) {
                ids[id] = Some(states.push(State::new(&state.name)));
            }
        }
        for (id, state) in self.states.iter().filter(|(id, _)| !removed.contains(id)) {
            let Some(src) = ids[id] else { continue };
            for (action, dst) in state.steps() {
                if let Some(dst) = ids[dst].filter(|_| !removed.contains(&dst)) {
                    states[src].steps.entry(action.clone()).or_default().push(dst);
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

    /// Relabels every transition; `None` deletes it.
    pub(crate) fn map_steps(&self, alphabet: Alphabet, relabel: impl Fn(&Action) -> Option<Action>) -> Self {
        let mut states = self.states.clone();
        for state in states.values_mut() {
            let steps = std::mem::take(&mut state.steps);
            for (action, dsts) in steps {
                let Some(action) = relabel(&action) else { continue };
                let entry = state.steps.entry(action).or_default();
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

impl Index<StateId> for Automaton {
    type Output = State;

    fn index(&self, index: StateId) -> &Self::Output {
        &self.states[index]
    }
}

pub struct AutomatonBuilder {
    name: String,
    alphabet: Alphabet,
    states: PrimaryMap<StateId, State>,
    names: FxHashMap<String, StateId>,
    init: Option<StateId>,
}

impl AutomatonBuilder {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            alphabet: Alphabet::new(),
            states: PrimaryMap::new(),
            names: FxHashMap::default(),
            init: None,
        }
    }

    /// Returns the existing state if the name is already registered.
    pub fn add_state(&mut self, name: impl ToString) -> StateId {
        let name = name.to_string();
        if let Some(id) = self.names.get(&name) {
            return *id;
        }
        let id = self.states.push(State::new(&name));
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

    /// Ignored unless both states and the action are registered.
    pub fn add_transition(&mut self, src: &str, action: &Action, dst: &str) {
        let (Some(src_id), Some(dst_id)) = (self.names.get(src), self.names.get(dst)) else {
            warn!("{}: ignoring step {src} --{action}--> {dst} with unknown state", self.name);
            return;
        };
        if !self.alphabet.contains(action) {
            warn!("{}: ignoring step {src} --{action}--> {dst} with unknown action", self.name);
            return;
        }
        let dsts = self.states[*src_id].steps.entry(action.clone()).or_default();
        if !dsts.contains(dst_id) {
            dsts.push(*dst_id);
        }
    }

    pub fn build(self) -> Option<Automaton> {
        let init = self.init?;
        Some(Automaton {
            name: self.name,
            alphabet: self.alphabet,
            states: self.states,
            names: self.names,
            init,
        })
    }
}

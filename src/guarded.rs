// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeMap;
use std::ops::Index;

use cranelift_entity::{PrimaryMap, SecondaryMap};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::automaton::StateId;
use crate::errors::Result;
use crate::expr::{Decl, Expr};

/// A transition guarded by a precondition over the current values and a
/// postcondition that may also mention primed (next) values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardedStep {
    pub pre: Expr,
    pub action: Action,
    pub post: Expr,
    pub dst: StateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedState {
    name: String,
    is_error: bool,
    steps: BTreeMap<Action, Vec<GuardedStep>>,
}

impl GuardedState {
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

    pub fn has_action(&self, action: &Action) -> bool {
        self.steps.contains_key(action)
    }

    pub fn steps_for(&self, action: &Action) -> &[GuardedStep] {
        self.steps.get(action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn steps(&self) -> impl Iterator<Item = &GuardedStep> {
        self.steps.values().flatten()
    }
}

/// An interface automaton whose transitions carry data guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedAutomaton {
    name: String,
    alphabet: Alphabet,
    decls: Vec<Decl>,
    states: PrimaryMap<StateId, GuardedState>,
    names: FxHashMap<String, StateId>,
    init: StateId,
}

impl GuardedAutomaton {
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

    pub fn decls(&self) -> &[Decl] {
        &self.decls
    }

    pub fn init(&self) -> StateId {
        self.init
    }

    pub fn init_state(&self) -> &GuardedState {
        &self.states[self.init]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &GuardedState)> {
        self.states.iter()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.names.get(name).copied()
    }

    /// Drops the `removed` states and every step touching them. A removed
    /// initial state survives as an error state without steps and the
    /// initial state becomes the first state.
    pub(crate) fn without_states(&self, removed: &FxHashSet<StateId>) -> Self {
        let mut states = PrimaryMap::new();
        let mut ids: SecondaryMap<StateId, Option<StateId>> = SecondaryMap::new();
        let mut init = GuardedState::new(&self.init_state().name);
        init.is_error = self.init_state().is_error || removed.contains(&self.init);
        ids[self.init] = Some(states.push(init));
        for (id, state) in self.states.iter() {
            if id != self.init && !removed.contains(&id) {
                ids[id] = Some(states.push(GuardedState::new(&state.name)));
            }
        }
        for (id, state) in self.states.iter().filter(|(id, _)| !removed.contains(id)) {
            let Some(src) = ids[id] else { continue };
            for step in state.steps() {
                if let Some(dst) = ids[step.dst].filter(|_| !removed.contains(&step.dst)) {
                    let step = GuardedStep { dst, ..step.clone() };
                    states[src].steps.entry(step.action.clone()).or_default().push(step);
                }
            }
        }
        let names = states.iter().map(|(id, s)| (s.name.clone(), id)).collect();
        Self {
            name: self.name.clone(),
            alphabet: self.alphabet.clone(),
            decls: self.decls.clone(),
            states,
            names,
            init: StateId::from_u32(0),
        }
    }

    /// Relabels every step; `None` deletes it.
    pub(crate) fn map_steps(&self, alphabet: Alphabet, relabel: impl Fn(&Action) -> Option<Action>) -> Self {
        let mut states = self.states.clone();
        for state in states.values_mut() {
            let steps = std::mem::take(&mut state.steps);
            for step in steps.into_values().flatten() {
                let Some(action) = relabel(&step.action) else { continue };
                let step = GuardedStep { action, ..step };
                let entry = state.steps.entry(step.action.clone()).or_default();
                if !entry.contains(&step) {
                    entry.push(step);
                }
            }
        }
        Self {
            name: self.name.clone(),
            alphabet,
            decls: self.decls.clone(),
            states,
            names: self.names.clone(),
            init: self.init,
        }
    }
}

impl Index<StateId> for GuardedAutomaton {
    type Output = GuardedState;

    fn index(&self, index: StateId) -> &Self::Output {
        &self.states[index]
    }
}

pub struct GuardedAutomatonBuilder {
    name: String,
    alphabet: Alphabet,
    decls: Vec<Decl>,
    states: PrimaryMap<StateId, GuardedState>,
    names: FxHashMap<String, StateId>,
    init: Option<StateId>,
}

impl GuardedAutomatonBuilder {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            alphabet: Alphabet::new(),
            decls: vec![],
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
        let id = self.states.push(GuardedState::new(&name));
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

    /// Later declarations with the same name are ignored.
    pub fn add_decl(&mut self, decl: Decl) {
        if !self.decls.iter().any(|d| d.name == decl.name) {
            self.decls.push(decl);
        }
    }

    /// Ignored unless both states and the action are registered.
    pub fn add_transition(&mut self, src: &str, pre: Expr, action: &Action, post: Expr, dst: &str) {
        let (Some(src_id), Some(dst_id)) = (self.names.get(src), self.names.get(dst)) else {
            warn!("{}: ignoring step {src} --{action}--> {dst} with unknown state", self.name);
            return;
        };
        if !self.alphabet.contains(action) {
            warn!("{}: ignoring step {src} --{action}--> {dst} with unknown action", self.name);
            return;
        }
        let step = GuardedStep {
            pre,
            action: action.clone(),
            post,
            dst: *dst_id,
        };
        let steps = self.states[*src_id].steps.entry(action.clone()).or_default();
        if !steps.contains(&step) {
            steps.push(step);
        }
    }

    pub fn build(self) -> Option<GuardedAutomaton> {
        let init = self.init?;
        Some(GuardedAutomaton {
            name: self.name,
            alphabet: self.alphabet,
            decls: self.decls,
            states: self.states,
            names: self.names,
            init,
        })
    }
}

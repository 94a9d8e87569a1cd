// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::action::{Action, ActionKind};
use crate::errors::{IaError, Result};

/// The declared input, output and internal actions of an automaton.
/// Names are unique across the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alphabet {
    inputs: BTreeSet<Action>,
    outputs: BTreeSet<Action>,
    internals: BTreeSet<Action>,
}

impl Alphabet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Action) -> Result<()> {
        if let Some(existing) = self.kind_of(action.name()) {
            if existing != action.kind() {
                return Err(IaError::ActionKindConflict {
                    name: action.name().to_string(),
                    existing,
                    requested: action.kind(),
                });
            }
            return Ok(());
        }
        match action.kind() {
            ActionKind::Input => self.inputs.insert(action),
            ActionKind::Output => self.outputs.insert(action),
            ActionKind::Internal => self.internals.insert(action),
        };
        Ok(())
    }

    pub fn remove(&mut self, action: &Action) {
        self.inputs.remove(action);
        self.outputs.remove(action);
        self.internals.remove(action);
    }

    pub fn contains(&self, action: &Action) -> bool {
        match action.kind() {
            ActionKind::Input => self.inputs.contains(action),
            ActionKind::Output => self.outputs.contains(action),
            ActionKind::Internal => self.internals.contains(action),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<ActionKind> {
        self.all().find(|a| a.name() == name).map(|a| a.kind())
    }

    pub fn inputs(&self) -> &BTreeSet<Action> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeSet<Action> {
        &self.outputs
    }

    pub fn internals(&self) -> &BTreeSet<Action> {
        &self.internals
    }

    pub fn io_actions(&self) -> impl Iterator<Item = &Action> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn all(&self) -> impl Iterator<Item = &Action> {
        self.io_actions().chain(self.internals.iter())
    }

    pub fn input_names(&self) -> BTreeSet<&str> {
        self.inputs.iter().map(|a| a.name()).collect()
    }

    pub fn output_names(&self) -> BTreeSet<&str> {
        self.outputs.iter().map(|a| a.name()).collect()
    }

    pub fn has_io_name(&self, name: &str) -> bool {
        self.io_actions().any(|a| a.name() == name)
    }

    /// Exact equality of the input and output sets.
    pub fn is_io_equal(&self, other: &Alphabet) -> bool {
        self.inputs == other.inputs && self.outputs == other.outputs
    }

    /// `self` may refine `abstract_alphabet`: it accepts at least the abstract
    /// inputs and produces at most the abstract outputs.
    pub fn is_io_refinable(&self, abstract_alphabet: &Alphabet) -> bool {
        self.inputs.is_superset(&abstract_alphabet.inputs)
            && self.outputs.is_subset(&abstract_alphabet.outputs)
    }

    /// Sorted `a?, b!` rendering of the I/O actions, used in error messages.
    pub fn format_io(&self) -> String {
        self.io_actions().sorted().join(", ")
    }
}

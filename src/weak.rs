// Copyright 2025 Cornell University
// released under MIT License

//! Weak transitions of modal automata: an observable step that may be
//! preceded and followed by any number of internal steps.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::action::Action;
use crate::automaton::StateId;
use crate::modal::ModalAutomaton;

/// What an observer sees of a weak step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observable {
    /// internal steps only
    Epsilon,
    Input(String),
    Output(String),
}

impl Observable {
    pub fn of(action: &Action) -> Self {
        if action.is_input() {
            Observable::Input(action.name().to_string())
        } else if action.is_output() {
            Observable::Output(action.name().to_string())
        } else {
            Observable::Epsilon
        }
    }

    fn action(&self) -> Option<Action> {
        match self {
            Observable::Epsilon => None,
            Observable::Input(name) => Some(Action::input(name)),
            Observable::Output(name) => Some(Action::output(name)),
        }
    }
}

pub type StateSet = BTreeSet<StateId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Modality {
    Must,
    May,
}

/// Memoizing weak-transition lookup for one automaton.
pub struct WeakTransitionResolver<'a> {
    automaton: &'a ModalAutomaton,
    closures: FxHashMap<(StateId, Modality), StateSet>,
    must: FxHashMap<(StateId, Observable), Vec<StateSet>>,
    may: FxHashMap<(StateId, Observable), StateSet>,
}

impl<'a> WeakTransitionResolver<'a> {
    pub fn new(automaton: &'a ModalAutomaton) -> Self {
        Self {
            automaton,
            closures: FxHashMap::default(),
            must: FxHashMap::default(),
            may: FxHashMap::default(),
        }
    }

    pub fn automaton(&self) -> &'a ModalAutomaton {
        self.automaton
    }

    /// Every state reachable over internal must-steps, `state` included.
    pub fn epsilon_closure(&mut self, state: StateId) -> StateSet {
        self.closure(state, Modality::Must)
    }

    /// Every state reachable over internal must- or may-steps.
    pub fn may_epsilon_closure(&mut self, state: StateId) -> StateSet {
        self.closure(state, Modality::May)
    }

    fn closure(&mut self, state: StateId, modality: Modality) -> StateSet {
        if let Some(set) = self.closures.get(&(state, modality)) {
            return set.clone();
        }
        let tau = Action::tau();
        let mut seen = StateSet::new();
        let mut todo = vec![state];
        while let Some(current) = todo.pop() {
            if !seen.insert(current) {
                continue;
            }
            let current = &self.automaton[current];
            match modality {
                Modality::Must => todo.extend(
                    current
                        .must_steps(&tau)
                        .iter()
                        .flat_map(|d| d.states().iter().copied()),
                ),
                Modality::May => todo.extend(current.successors(&tau)),
            }
        }
        self.closures.insert((state, modality), seen.clone());
        seen
    }

    fn trailing(&mut self, states: impl IntoIterator<Item = StateId>, modality: Modality) -> StateSet {
        let mut out = StateSet::new();
        for state in states {
            out.extend(match modality {
                Modality::Must => self.epsilon_closure(state),
                Modality::May => self.may_epsilon_closure(state),
            });
        }
        out
    }

    /// Destination sets of the weak must-transitions on `observable`. Each
    /// set stems from one must-step and is closed under trailing internal
    /// must-steps. For `Epsilon` the first set is `{state}`.
    pub fn must(&mut self, state: StateId, observable: &Observable) -> Vec<StateSet> {
        let key = (state, observable.clone());
        if let Some(sets) = self.must.get(&key) {
            return sets.clone();
        }
        let sets = self.compute_must(state, observable);
        self.must.insert(key, sets.clone());
        sets
    }

    fn compute_must(&mut self, state: StateId, observable: &Observable) -> Vec<StateSet> {
        let automaton = self.automaton;
        let tau = Action::tau();
        // one set per internal must-step, closed under further internal steps
        let mut leading: Vec<StateSet> = vec![];
        for dsts in automaton[state].must_steps(&tau) {
            let set = self.trailing(dsts.states().iter().copied(), Modality::Must);
            if !leading.contains(&set) {
                leading.push(set);
            }
        }

        let Some(action) = observable.action() else {
            let mut sets = vec![StateSet::from([state])];
            for set in leading {
                if !sets.contains(&set) {
                    sets.push(set);
                }
            }
            return sets;
        };

        let mut direct: Vec<Vec<StateId>> = automaton[state]
            .must_steps(&action)
            .iter()
            .map(|d| d.states().to_vec())
            .collect();
        for set in &leading {
            let reached: Vec<StateId> = set
                .iter()
                .flat_map(|s| automaton[*s].must_steps(&action))
                .flat_map(|d| d.states().iter().copied())
                .collect();
            if !reached.is_empty() {
                direct.push(reached);
            }
        }

        let mut sets: Vec<StateSet> = vec![];
        for states in direct {
            let set = self.trailing(states, Modality::Must);
            if !sets.contains(&set) {
                sets.push(set);
            }
        }
        sets
    }

    /// All states reachable by a weak may-step on `observable`, treating
    /// must-steps as may-steps.
    pub fn may(&mut self, state: StateId, observable: &Observable) -> StateSet {
        let key = (state, observable.clone());
        if let Some(set) = self.may.get(&key) {
            return set.clone();
        }
        let leading = self.may_epsilon_closure(state);
        let set = match observable.action() {
            None => leading,
            Some(action) => {
                let automaton = self.automaton;
                let reached: Vec<StateId> = leading
                    .iter()
                    .flat_map(|s| automaton[*s].successors(&action))
                    .collect();
                self.trailing(reached, Modality::May)
            }
        };
        self.may.insert(key, set.clone());
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modal::tests::build_modal;

    fn names(m: &ModalAutomaton, set: &StateSet) -> Vec<String> {
        set.iter().map(|s| m[*s].name().to_string()).collect()
    }

    #[test]
    fn test_closure_without_internal_steps() {
        let m = build_modal("M", "s0", &[("s0", "a?", &["s1"])], &[("s0", "b!", "s1")], &[]);
        let mut weak = WeakTransitionResolver::new(&m);
        let s0 = m.init();
        assert_eq!(weak.epsilon_closure(s0), StateSet::from([s0]));
        assert_eq!(weak.may_epsilon_closure(s0), StateSet::from([s0]));
        assert_eq!(weak.must(s0, &Observable::Epsilon), vec![StateSet::from([s0])]);
    }

    #[test]
    fn test_closure_survives_cycles() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "tau", &["s1"]), ("s1", "tau", &["s0"]), ("s1", "a!", &["s2"])],
            &[("s2", "tau", "s3")],
            &[],
        );
        let mut weak = WeakTransitionResolver::new(&m);
        let s0 = m.init();
        assert_eq!(names(&m, &weak.epsilon_closure(s0)), ["s0", "s1"]);

        let out = weak.must(s0, &Observable::Output("a".to_string()));
        assert_eq!(out.len(), 1);
        assert_eq!(names(&m, &out[0]), ["s2"]);

        let may = weak.may(s0, &Observable::Output("a".to_string()));
        assert_eq!(names(&m, &may), ["s2", "s3"]);
    }

    #[test]
    fn test_may_closure_follows_may_steps() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "tau", &["s1"])],
            &[("s1", "tau", "s2"), ("s2", "b!", "s3"), ("s3", "tau", "s4")],
            &[],
        );
        let mut weak = WeakTransitionResolver::new(&m);
        let s0 = m.init();
        assert_eq!(names(&m, &weak.epsilon_closure(s0)), ["s0", "s1"]);
        assert_eq!(names(&m, &weak.may_epsilon_closure(s0)), ["s0", "s1", "s2"]);
        assert_eq!(weak.may(s0, &Observable::Epsilon), weak.may_epsilon_closure(s0));

        let out = weak.may(s0, &Observable::Output("b".to_string()));
        assert_eq!(names(&m, &out), ["s3", "s4"]);
        assert!(weak.must(s0, &Observable::Output("b".to_string())).is_empty());
    }

    #[test]
    fn test_must_keeps_disjunctions_apart() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "a?", &["s1", "s2"]), ("s0", "a?", &["s3"]), ("s3", "tau", &["s4"])],
            &[],
            &[],
        );
        let mut weak = WeakTransitionResolver::new(&m);
        let sets = weak.must(m.init(), &Observable::Input("a".to_string()));
        let sets: Vec<Vec<String>> = sets.iter().map(|s| names(&m, s)).collect();
        assert_eq!(sets, vec![vec!["s1", "s2"], vec!["s3", "s4"]]);
        assert!(weak.must(m.init(), &Observable::Output("a".to_string())).is_empty());
    }
}

// Copyright 2025 Cornell University
// released under MIT License

use std::collections::BTreeSet;

use itertools::Itertools;
use log::info;

use crate::action::Action;
use crate::alphabet::Alphabet;
use crate::errors::{IaError, Result};
use crate::runtime::System;

fn check_known(automaton: &str, alphabet: &Alphabet, names: &BTreeSet<String>) -> Result<()> {
    let unknown: Vec<String> = names
        .iter()
        .filter(|n| !alphabet.has_io_name(n))
        .cloned()
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(IaError::UnknownActions {
            automaton: automaton.to_string(),
            actions: unknown,
        })
    }
}

fn is_named(action: &Action, names: &BTreeSet<String>) -> bool {
    !action.is_internal() && names.contains(action.name())
}

fn without_names(alphabet: &Alphabet, names: &BTreeSet<String>) -> Alphabet {
    let mut out = alphabet.clone();
    for action in alphabet.all().filter(|a| is_named(a, names)) {
        out.remove(action);
    }
    out
}

/// Deletes every input and output transition on `names` and drops those
/// actions from the alphabet. Defined for plain and guarded automata.
pub fn restrict(system: &System, names: &BTreeSet<String>) -> Result<System> {
    check_known(system.name(), system.alphabet(), names)?;
    let alphabet = without_names(system.alphabet(), names);
    let relabel = |action: &Action| (!is_named(action, names)).then(|| action.clone());
    let out = match system {
        System::Plain(a) => System::Plain(a.map_steps(alphabet, relabel)),
        System::Guarded(a) => System::Guarded(a.map_steps(alphabet, relabel)),
        System::Modal(_) => {
            return Err(IaError::UnsupportedOperation {
                operation: "restrict",
                variant: system.variant(),
            })
        }
    };
    info!("{}: restricted {}", system.name(), names.iter().join(", "));
    Ok(out)
}

/// Hides `names` in a modal automaton: hidden inputs are deleted and hidden
/// outputs become internal steps.
pub fn scope(system: &System, names: &BTreeSet<String>) -> Result<System> {
    let System::Modal(m) = system else {
        return Err(IaError::UnsupportedOperation {
            operation: "scope",
            variant: system.variant(),
        });
    };
    check_known(m.name(), m.alphabet(), names)?;
    let mut alphabet = without_names(m.alphabet(), names);
    if m.alphabet().outputs().iter().any(|o| names.contains(o.name())) {
        alphabet.add(Action::tau())?;
    }
    let relabel = |action: &Action| {
        if !is_named(action, names) {
            Some(action.clone())
        } else if action.is_output() {
            Some(Action::tau())
        } else {
            None
        }
    };
    info!("{}: hid {}", m.name(), names.iter().join(", "));
    Ok(System::Modal(m.map_steps(alphabet, relabel)))
}

/// A copy of `system` named `name`.
pub fn copy(system: &System, name: &str) -> System {
    system.clone().with_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::tests::build_automaton;
    use crate::modal::tests::build_modal;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_restrict_drops_transitions_and_actions() {
        let a = build_automaton(
            "A",
            &[("s0", "a?", "s1"), ("s1", "b!", "s0"), ("s1", "tau", "s0")],
            &[],
        );
        let System::Plain(r) = restrict(&System::Plain(a), &names(&["b"])).unwrap() else {
            panic!("expected a plain automaton");
        };
        assert_eq!(r.alphabet().format_io(), "a?");
        assert_eq!(r.num_transitions(), 2);
        assert_eq!(r.num_states(), 2);
    }

    #[test]
    fn test_restrict_rejects_unknown_and_modal() {
        let a = build_automaton("A", &[("s0", "a?", "s0")], &[]);
        let err = restrict(&System::Plain(a), &names(&["a", "zz"])).unwrap_err();
        assert_eq!(err.to_string(), "actions are not defined in 'A': zz");

        let m = build_modal("M", "s0", &[("s0", "a?", &["s0"])], &[], &[]);
        let err = restrict(&System::Modal(m), &names(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "`restrict` is not supported on modal automata");
    }

    #[test]
    fn test_scope_hides_outputs_and_deletes_inputs() {
        let m = build_modal(
            "M",
            "s0",
            &[("s0", "a?", &["s1"]), ("s1", "o!", &["s0"])],
            &[("s1", "p!", "s1")],
            &[],
        );
        let System::Modal(h) = scope(&System::Modal(m), &names(&["a", "o"])).unwrap() else {
            panic!("expected a modal automaton");
        };
        assert_eq!(h.alphabet().format_io(), "p!");
        assert!(h.alphabet().contains(&Action::tau()));
        let s1 = &h[h.state_id("s1").unwrap()];
        assert!(h.init_state().actions().is_empty());
        assert!(s1.has_must(&Action::tau()));
        assert!(s1.has_action(&Action::output("p")));

        let plain = System::Plain(build_automaton("A", &[("s0", "a?", "s0")], &[]));
        assert!(matches!(
            scope(&plain, &names(&["a"])),
            Err(IaError::UnsupportedOperation { operation: "scope", .. })
        ));
    }

    #[test]
    fn test_copy_renames() {
        let a = System::Plain(build_automaton("A", &[("s0", "a?", "s0")], &[]));
        let b = copy(&a, "B");
        assert_eq!(b.name(), "B");
        assert_eq!(a.name(), "A");
    }
}

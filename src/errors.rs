// Copyright 2025 Cornell University
// released under MIT License

use thiserror::Error;

use crate::action::ActionKind;

#[derive(Error, Debug)]
pub enum IaError {
    #[error("automata are not composable: '{first}' and '{second}' ({first_actions} -- {second_actions})")]
    NotComposable {
        first: String,
        second: String,
        first_actions: String,
        second_actions: String,
    },
    #[error("input/output actions of '{concrete}' and '{abstract_name}' do not match ({concrete_actions} -- {abstract_actions})")]
    IoMismatch {
        concrete: String,
        abstract_name: String,
        concrete_actions: String,
        abstract_actions: String,
    },
    #[error("initial state of '{0}' is pruned")]
    InitialStatePruned(String),
    #[error("`{operation}` is not supported on {variant} automata")]
    UnsupportedOperation {
        operation: &'static str,
        variant: &'static str,
    },
    #[error("failed to find {}, make sure it is on your path!", .0.join(", "))]
    SolverUnavailable(Vec<String>),
    #[error("failed to execute command: `{command}`\n{stdout}\n{stderr}")]
    SolverFailed {
        command: String,
        stdout: String,
        stderr: String,
    },
    #[error("action `{name}` is already declared as {existing}, cannot redeclare it as {requested}")]
    ActionKindConflict {
        name: String,
        existing: ActionKind,
        requested: ActionKind,
    },
    #[error("actions are not defined in '{automaton}': {}", .actions.join(", "))]
    UnknownActions {
        automaton: String,
        actions: Vec<String>,
    },
    #[error("undefined system `{0}`")]
    UndefinedSystem(String),
    #[error("`{0}` does not produce a system")]
    NotASystem(&'static str),
    #[error("`{operation}` cannot combine {first} and {second} automata")]
    VariantMismatch {
        operation: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("{message}")]
    Parse {
        message: String,
        range: (usize, usize),
    },
    #[error("invalid systems file: {0}")]
    Model(String),
    #[error("failed to perform i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IaError>;

// Copyright 2025 Cornell University
// released under MIT License

use std::cmp::Ordering;
use std::fmt;

/// Name used by the canonical internal action.
pub const TAU_NAME: &str = "tau";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Input,
    Output,
    Internal,
}

impl ActionKind {
    pub fn suffix(self) -> &'static str {
        match self {
            ActionKind::Input => "?",
            ActionKind::Output => "!",
            ActionKind::Internal => "",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Input => write!(f, "input"),
            ActionKind::Output => write!(f, "output"),
            ActionKind::Internal => write!(f, "internal"),
        }
    }
}

/// An action is identified by its name and kind. All internal actions share
/// the single canonical `tau` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    name: String,
    kind: ActionKind,
}

impl Action {
    pub fn new(name: impl ToString, kind: ActionKind) -> Self {
        match kind {
            ActionKind::Internal => Self::tau(),
            _ => Self {
                name: name.to_string(),
                kind,
            },
        }
    }

    pub fn input(name: impl ToString) -> Self {
        Self::new(name, ActionKind::Input)
    }

    pub fn output(name: impl ToString) -> Self {
        Self::new(name, ActionKind::Output)
    }

    pub fn tau() -> Self {
        Self {
            name: TAU_NAME.to_string(),
            kind: ActionKind::Internal,
        }
    }

    /// Parses the label notation `a?`, `a!` and `tau`.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label == TAU_NAME || label == "τ" {
            return Some(Self::tau());
        }
        let (name, kind) = if let Some(name) = label.strip_suffix('?') {
            (name, ActionKind::Input)
        } else if let Some(name) = label.strip_suffix('!') {
            (name, ActionKind::Output)
        } else {
            return None;
        };
        let valid = !name.is_empty()
            && name != TAU_NAME
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        valid.then(|| Self::new(name, kind))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn is_input(&self) -> bool {
        self.kind == ActionKind::Input
    }

    pub fn is_output(&self) -> bool {
        self.kind == ActionKind::Output
    }

    pub fn is_internal(&self) -> bool {
        self.kind == ActionKind::Internal
    }

    /// Output and internal actions are under the control of the component
    /// itself.
    pub fn is_autonomous(&self) -> bool {
        !self.is_input()
    }

    /// Same name, kind flipped between input and output.
    pub fn complement(&self) -> Option<Self> {
        match self.kind {
            ActionKind::Input => Some(Self::output(&self.name)),
            ActionKind::Output => Some(Self::input(&self.name)),
            ActionKind::Internal => None,
        }
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Internal => write!(f, "τ"),
            kind => write!(f, "{}{}", self.name, kind.suffix()),
        }
    }
}

// Copyright 2025 Cornell University
// released under MIT License

use std::fmt;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use log::debug;

use crate::errors::Result;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct BesVar(u32);
entity_impl!(BesVar, "X");

/// Right-hand side of a boolean equation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BesFormula {
    True,
    False,
    Var(BesVar),
    And(Vec<BesFormula>),
    Or(Vec<BesFormula>),
}

impl BesFormula {
    pub fn and(items: impl IntoIterator<Item = BesFormula>) -> Self {
        let mut out: Vec<BesFormula> = vec![];
        for item in items {
            match item {
                BesFormula::True => {}
                BesFormula::False => return BesFormula::False,
                BesFormula::And(inner) => out.extend(inner),
                item => out.push(item),
            }
        }
        Self::collect(out, BesFormula::True, BesFormula::And)
    }

    pub fn or(items: impl IntoIterator<Item = BesFormula>) -> Self {
        let mut out: Vec<BesFormula> = vec![];
        for item in items {
            match item {
                BesFormula::False => {}
                BesFormula::True => return BesFormula::True,
                BesFormula::Or(inner) => out.extend(inner),
                item => out.push(item),
            }
        }
        Self::collect(out, BesFormula::False, BesFormula::Or)
    }

    fn collect(mut items: Vec<BesFormula>, empty: BesFormula, wrap: fn(Vec<BesFormula>) -> BesFormula) -> Self {
        let mut seen = rustc_hash::FxHashSet::default();
        items.retain(|item| seen.insert(item.clone()));
        match items.len() {
            0 => empty,
            1 => items.remove(0),
            _ => wrap(items),
        }
    }

    pub fn eval(&self, env: &SecondaryMap<BesVar, bool>) -> bool {
        match self {
            BesFormula::True => true,
            BesFormula::False => false,
            BesFormula::Var(var) => env[*var],
            BesFormula::And(items) => items.iter().all(|f| f.eval(env)),
            BesFormula::Or(items) => items.iter().any(|f| f.eval(env)),
        }
    }
}

impl fmt::Display for BesFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (items, sep) = match self {
            BesFormula::True => return write!(f, "true"),
            BesFormula::False => return write!(f, "false"),
            BesFormula::Var(var) => return write!(f, "{var}"),
            BesFormula::And(items) => (items, " && "),
            BesFormula::Or(items) => (items, " || "),
        };
        // operands are sorted so the output does not depend on construction order
        let mut parts: Vec<String> = items
            .iter()
            .map(|item| match item {
                BesFormula::And(_) | BesFormula::Or(_) => format!("({item})"),
                item => item.to_string(),
            })
            .collect();
        parts.sort();
        write!(f, "{}", parts.join(sep))
    }
}

/// A boolean equation system under one greatest fixpoint block. The first
/// variable is the root.
#[derive(Debug, Clone)]
pub struct Bes {
    equations: PrimaryMap<BesVar, BesFormula>,
}

impl Default for Bes {
    fn default() -> Self {
        Self::new()
    }
}

impl Bes {
    pub fn new() -> Self {
        let mut equations = PrimaryMap::new();
        equations.push(BesFormula::True);
        Self { equations }
    }

    pub fn root(&self) -> BesVar {
        BesVar::from_u32(0)
    }

    /// New variable bound to `true` until its formula is set.
    pub fn add_var(&mut self) -> BesVar {
        self.equations.push(BesFormula::True)
    }

    pub fn set_formula(&mut self, var: BesVar, formula: BesFormula) {
        self.equations[var] = formula;
    }

    pub fn formula(&self, var: BesVar) -> &BesFormula {
        &self.equations[var]
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// Greatest solution by downward iteration from all-`true`.
    pub fn greatest_solution(&self) -> SecondaryMap<BesVar, bool> {
        let mut solution = SecondaryMap::with_default(true);
        for var in self.equations.keys() {
            solution[var] = true;
        }
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (var, formula) in self.equations.iter() {
                if solution[var] && !formula.eval(&solution) {
                    solution[var] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!("solved {} equations in {rounds} rounds", self.len());
        solution
    }
}

impl fmt::Display for Bes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pbes")?;
        for (var, formula) in self.equations.iter() {
            writeln!(f, "  nu {var} = {formula};")?;
        }
        writeln!(f, "init {};", self.root())
    }
}

/// Solves the root variable of a [`Bes`].
pub trait FixpointSolver {
    fn missing_tools(&self) -> Vec<String> {
        vec![]
    }

    fn solve_bes(&self, bes: &Bes) -> Result<bool>;
}

/// In-process solver.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFixpointSolver;

impl FixpointSolver for LocalFixpointSolver {
    fn solve_bes(&self, bes: &Bes) -> Result<bool> {
        Ok(bes.greatest_solution()[bes.root()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_simplification() {
        let x = BesFormula::Var(BesVar::from_u32(1));
        assert_eq!(BesFormula::and([]), BesFormula::True);
        assert_eq!(BesFormula::or([]), BesFormula::False);
        assert_eq!(BesFormula::and([BesFormula::True, x.clone()]), x);
        assert_eq!(BesFormula::and([x.clone(), BesFormula::False]), BesFormula::False);
        assert_eq!(BesFormula::or([x.clone(), BesFormula::True]), BesFormula::True);
        assert_eq!(BesFormula::or([x.clone(), x.clone()]), x);
    }

    #[test]
    fn test_text_is_sorted_and_parenthesized() {
        let mut bes = Bes::new();
        let x1 = bes.add_var();
        let x2 = bes.add_var();
        bes.set_formula(
            bes.root(),
            BesFormula::and([
                BesFormula::or([BesFormula::Var(x2), BesFormula::Var(x1)]),
                BesFormula::Var(x2),
            ]),
        );
        bes.set_formula(x1, BesFormula::False);
        insta::assert_snapshot!(bes.to_string(), @r"
pbes
  nu X0 = (X1 || X2) && X2;
  nu X1 = false;
  nu X2 = true;
init X0;
");
    }

    #[test]
    fn test_greatest_fixpoint() {
        // X0 = X1, X1 = X0: both true under nu
        let mut bes = Bes::new();
        let x1 = bes.add_var();
        bes.set_formula(bes.root(), BesFormula::Var(x1));
        bes.set_formula(x1, BesFormula::Var(bes.root()));
        assert!(LocalFixpointSolver.solve_bes(&bes).unwrap());

        // X0 = X1 && X2, X1 = X0, X2 = false
        let x2 = bes.add_var();
        bes.set_formula(bes.root(), BesFormula::and([BesFormula::Var(x1), BesFormula::Var(x2)]));
        bes.set_formula(x2, BesFormula::False);
        let solution = bes.greatest_solution();
        assert!(!solution[bes.root()]);
        assert!(!solution[x1]);
    }
}

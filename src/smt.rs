// Copyright 2025 Cornell University
// released under MIT License

use std::fmt::Write;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::expr::{BinOp, DataType, Decl, Expr};
use crate::solver::Solver;

/// SMT-LIB symbols for the variables of one query. Primed variables are
/// renamed to fresh temporaries.
#[derive(Default)]
struct SmtContext {
    symbols: FxHashMap<(String, bool), String>,
    decls: Vec<(String, &'static str)>,
    temps: usize,
}

impl SmtContext {
    fn symbol(&mut self, decl: &Decl, primed: bool) -> String {
        let key = (decl.name.clone(), primed);
        if let Some(symbol) = self.symbols.get(&key) {
            return symbol.clone();
        }
        let symbol = if primed {
            let temp = format!("__z_t{}", self.temps);
            self.temps += 1;
            temp
        } else {
            decl.name.clone()
        };
        let sort = match decl.tpe {
            DataType::Bool => "Bool",
            DataType::Int | DataType::Custom(_) => "Int",
        };
        self.decls.push((symbol.clone(), sort));
        self.symbols.insert(key, symbol.clone());
        symbol
    }

    fn translate(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Bool(value) => value.to_string(),
            Expr::Int(value) if *value < 0 => format!("(- {})", value.unsigned_abs()),
            Expr::Int(value) => value.to_string(),
            Expr::EnumValue(_, index) => index.to_string(),
            Expr::Var { decl, primed } => self.symbol(decl, *primed),
            Expr::Not(arg) => format!("(not {})", self.translate(arg)),
            Expr::Binary(BinOp::NotEqual, lhs, rhs) => {
                format!("(not (= {} {}))", self.translate(lhs), self.translate(rhs))
            }
            Expr::Binary(op, lhs, rhs) => {
                let op = match op {
                    BinOp::And => "and",
                    BinOp::Or => "or",
                    BinOp::Implies => "=>",
                    BinOp::Equal => "=",
                    BinOp::Less => "<",
                    BinOp::LessEqual => "<=",
                    BinOp::Greater => ">",
                    BinOp::GreaterEqual => ">=",
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "div",
                    BinOp::Mod => "mod",
                    BinOp::NotEqual => unreachable!("handled above"),
                };
                format!("({op} {} {})", self.translate(lhs), self.translate(rhs))
            }
        }
    }
}

/// `declare-const` headers, one `assert` and `check-sat`.
pub fn satisfiability_script(expr: &Expr) -> String {
    let mut ctx = SmtContext::default();
    let body = ctx.translate(expr);
    let mut out = String::new();
    for (name, sort) in &ctx.decls {
        let _ = writeln!(out, "(declare-const {name} {sort})");
    }
    let _ = writeln!(out, "(assert {body})");
    out.push_str("(check-sat)\n");
    out
}

/// Asserts the universal closure of `lhs => rhs`; `sat` means valid.
pub fn validity_script(lhs: &Expr, rhs: &Expr) -> String {
    let mut ctx = SmtContext::default();
    let body = format!("(=> {} {})", ctx.translate(lhs), ctx.translate(rhs));
    let body = if ctx.decls.is_empty() {
        body
    } else {
        let bound: Vec<String> = ctx
            .decls
            .iter()
            .map(|(name, sort)| format!("({name} {sort})"))
            .collect();
        format!("(forall ({}) {body})", bound.join(" "))
    };
    format!("(assert {body})\n(check-sat)\n")
}

/// Guard queries that answer constant expressions without calling the solver.
pub struct SmtChecker<'a> {
    solver: &'a dyn Solver,
}

impl<'a> SmtChecker<'a> {
    pub fn new(solver: &'a dyn Solver) -> Self {
        Self { solver }
    }

    pub fn is_satisfiable(&self, expr: &Expr) -> Result<bool> {
        if let Some(value) = expr.as_bool() {
            return Ok(value);
        }
        self.solver.solve(&satisfiability_script(expr))
    }

    /// Satisfiability of the conjunction; a literal `false` member decides it.
    pub fn is_satisfiable_all(&self, exprs: &[&Expr]) -> Result<bool> {
        let mut open = vec![];
        for expr in exprs {
            match expr.as_bool() {
                Some(false) => return Ok(false),
                Some(true) => {}
                None => open.push((*expr).clone()),
            }
        }
        if open.is_empty() {
            return Ok(true);
        }
        self.is_satisfiable(&Expr::and_all(open))
    }

    /// Whether `lhs => rhs` holds for every assignment.
    pub fn implies_for_all(&self, lhs: &Expr, rhs: &Expr) -> Result<bool> {
        if lhs.as_bool() == Some(false) || rhs.as_bool() == Some(true) {
            return Ok(true);
        }
        if let Some(value) = Expr::implies(lhs.clone(), rhs.clone()).as_bool() {
            return Ok(value);
        }
        self.solver.solve(&validity_script(lhs, rhs))
    }
}

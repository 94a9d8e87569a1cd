// Copyright 2025 Cornell University
// released under MIT License

use std::fmt;
use std::sync::Arc;

/// An enumerated type; values are encoded by their index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomType {
    pub name: String,
    pub values: Vec<String>,
}

impl CustomType {
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Bool,
    Custom(Arc<CustomType>),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Bool => write!(f, "bool"),
            DataType::Custom(tpe) => write!(f, "{}", tpe.name),
        }
    }
}

/// A typed variable declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decl {
    pub name: String,
    pub tpe: DataType,
}

impl Decl {
    pub fn new(name: impl ToString, tpe: DataType) -> Self {
        Self {
            name: name.to_string(),
            tpe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    And,
    Or,
    Implies,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "=>",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::Less => "<",
            BinOp::LessEqual => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEqual => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

/// Guard expression over declared variables. A primed variable refers to the
/// value after the transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    EnumValue(Arc<CustomType>, usize),
    Var { decl: Decl, primed: bool },
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Bool(true)
    }
}

impl Expr {
    pub fn var(decl: &Decl) -> Self {
        Expr::Var {
            decl: decl.clone(),
            primed: false,
        }
    }

    pub fn primed(decl: &Decl) -> Self {
        Expr::Var {
            decl: decl.clone(),
            primed: true,
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(arg: Expr) -> Self {
        match arg {
            Expr::Bool(value) => Expr::Bool(!value),
            arg => Expr::Not(Box::new(arg)),
        }
    }

    /// Conjunction that drops literal `true` operands.
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        match (lhs, rhs) {
            (Expr::Bool(true), e) | (e, Expr::Bool(true)) => e,
            (Expr::Bool(false), _) | (_, Expr::Bool(false)) => Expr::Bool(false),
            (lhs, rhs) => Expr::binary(BinOp::And, lhs, rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        match (lhs, rhs) {
            (Expr::Bool(false), e) | (e, Expr::Bool(false)) => e,
            (Expr::Bool(true), _) | (_, Expr::Bool(true)) => Expr::Bool(true),
            (lhs, rhs) => Expr::binary(BinOp::Or, lhs, rhs),
        }
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Implies, lhs, rhs)
    }

    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs.into_iter().fold(Expr::Bool(true), Expr::and)
    }

    pub fn or_all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs.into_iter().fold(Expr::Bool(false), Expr::or)
    }

    /// Folds the expression if it does not mention any variable.
    /// Division by zero and overflow do not fold.
    pub fn const_value(&self) -> Option<Value> {
        match self {
            Expr::Bool(value) => Some(Value::Bool(*value)),
            Expr::Int(value) => Some(Value::Int(*value)),
            Expr::EnumValue(_, index) => Some(Value::Int(*index as i64)),
            Expr::Var { .. } => None,
            Expr::Not(arg) => match arg.const_value()? {
                Value::Bool(value) => Some(Value::Bool(!value)),
                Value::Int(_) => None,
            },
            Expr::Binary(op, lhs, rhs) => fold_binary(*op, lhs.const_value()?, rhs.const_value()?),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.const_value()? {
            Value::Bool(value) => Some(value),
            Value::Int(_) => None,
        }
    }

    /// Visits every variable occurrence in left-to-right order.
    pub fn visit_vars<'a>(&'a self, visit: &mut impl FnMut(&'a Decl, bool)) {
        match self {
            Expr::Var { decl, primed } => visit(decl, *primed),
            Expr::Not(arg) => arg.visit_vars(visit),
            Expr::Binary(_, lhs, rhs) => {
                lhs.visit_vars(visit);
                rhs.visit_vars(visit);
            }
            Expr::Bool(_) | Expr::Int(_) | Expr::EnumValue(..) => {}
        }
    }
}

fn fold_binary(op: BinOp, lhs: Value, rhs: Value) -> Option<Value> {
    use Value::*;
    let value = match (op, lhs, rhs) {
        (BinOp::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(a || b),
        (BinOp::Implies, Bool(a), Bool(b)) => Bool(!a || b),
        (BinOp::Equal, a, b) => Bool(a == b),
        (BinOp::NotEqual, a, b) => Bool(a != b),
        (BinOp::Less, Int(a), Int(b)) => Bool(a < b),
        (BinOp::LessEqual, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::Greater, Int(a), Int(b)) => Bool(a > b),
        (BinOp::GreaterEqual, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Add, Int(a), Int(b)) => Int(a.checked_add(b)?),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.checked_sub(b)?),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.checked_mul(b)?),
        (BinOp::Div, Int(a), Int(b)) => Int(a.checked_div(b)?),
        (BinOp::Mod, Int(a), Int(b)) => Int(a.checked_rem(b)?),
        _ => return None,
    };
    Some(value)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
            match e {
                Expr::Binary(..) => write!(f, "({e})"),
                e => write!(f, "{e}"),
            }
        }
        match self {
            Expr::Bool(value) => write!(f, "{value}"),
            Expr::Int(value) => write!(f, "{value}"),
            Expr::EnumValue(tpe, index) => match tpe.values.get(*index) {
                Some(value) => write!(f, "{value}"),
                None => write!(f, "{}#{index}", tpe.name),
            },
            Expr::Var { decl, primed } => {
                write!(f, "{}", decl.name)?;
                if *primed {
                    write!(f, "'")?;
                }
                Ok(())
            }
            Expr::Not(arg) => {
                write!(f, "!")?;
                operand(f, arg)
            }
            Expr::Binary(op, lhs, rhs) => {
                operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                operand(f, rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::binary(
            BinOp::Less,
            Expr::binary(BinOp::Add, Expr::Int(2), Expr::Int(3)),
            Expr::Int(6),
        );
        assert_eq!(e.as_bool(), Some(true));
        let div = Expr::binary(BinOp::Div, Expr::Int(1), Expr::Int(0));
        assert_eq!(div.const_value(), None);
        let x = Decl::new("x", DataType::Int);
        let open = Expr::binary(BinOp::Equal, Expr::var(&x), Expr::Int(0));
        assert_eq!(open.as_bool(), None);
    }

    #[test]
    fn test_enum_values_fold_to_index() {
        let coin = Arc::new(CustomType {
            name: "Coin".to_string(),
            values: vec!["Small".to_string(), "Large".to_string()],
        });
        let e = Expr::binary(
            BinOp::NotEqual,
            Expr::EnumValue(coin.clone(), 1),
            Expr::EnumValue(coin, 0),
        );
        assert_eq!(e.as_bool(), Some(true));
    }

    #[test]
    fn test_and_or_simplify_literals() {
        let x = Decl::new("x", DataType::Bool);
        assert_eq!(Expr::and(Expr::Bool(true), Expr::var(&x)), Expr::var(&x));
        assert_eq!(Expr::or(Expr::var(&x), Expr::Bool(true)), Expr::Bool(true));
        assert_eq!(Expr::and_all([]), Expr::Bool(true));
        assert_eq!(Expr::or_all([]), Expr::Bool(false));
    }

    #[test]
    fn test_display() {
        let x = Decl::new("x", DataType::Int);
        let e = Expr::and(
            Expr::binary(BinOp::Greater, Expr::var(&x), Expr::Int(0)),
            Expr::not(Expr::binary(
                BinOp::Equal,
                Expr::primed(&x),
                Expr::binary(BinOp::Add, Expr::var(&x), Expr::Int(1)),
            )),
        );
        assert_eq!(e.to_string(), "(x > 0) && !(x' == (x + 1))");
    }
}

// Copyright 2025 Cornell University
// released under MIT License

use std::sync::Arc;

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::PrattParser;
use pest::{Parser, Span};
use pest_derive::Parser;
use rustc_hash::FxHashMap;

use crate::errors::{IaError, Result};
use crate::expr::{BinOp, CustomType, Decl, Expr};
use crate::runtime::{Stmt, SysExpr};

#[derive(Parser)]
#[grammar = "guard.pest"]
struct GuardParser;

lazy_static::lazy_static! {
    static ref PRATT_PARSER: PrattParser<Rule> = {
        use pest::pratt_parser::{Assoc::*, Op};
        use Rule::*;

        // Precedence is defined lowest to highest
        PrattParser::new()
            .op(Op::infix(implies, Right))
            .op(Op::infix(log_or, Left))
            .op(Op::infix(log_and, Left))
            .op(Op::infix(eq, Left) | Op::infix(neq, Left))
            .op(Op::infix(lt, Left) | Op::infix(le, Left) | Op::infix(gt, Left) | Op::infix(ge, Left))
            .op(Op::infix(add, Left) | Op::infix(sub, Left))
            .op(Op::infix(mul, Left) | Op::infix(div, Left) | Op::infix(rem, Left))
            .op(Op::prefix(not) | Op::prefix(neg))
    };
}

/// Variables and custom types visible to guard expressions.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    decls: FxHashMap<String, Decl>,
    types: FxHashMap<String, Arc<CustomType>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, tpe: CustomType) -> Arc<CustomType> {
        let tpe = Arc::new(tpe);
        self.types.insert(tpe.name.clone(), tpe.clone());
        tpe
    }

    pub fn custom_type(&self, name: &str) -> Option<Arc<CustomType>> {
        self.types.get(name).cloned()
    }

    pub fn declare(&mut self, decl: Decl) {
        self.decls.insert(decl.name.clone(), decl);
    }

    pub fn decl(&self, name: &str) -> Option<&Decl> {
        self.decls.get(name)
    }

    /// Declarations sorted by name.
    pub fn decls(&self) -> Vec<Decl> {
        let mut decls: Vec<Decl> = self.decls.values().cloned().collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    /// Resolves an unqualified enum value; the first type by name wins.
    fn enum_value(&self, value: &str) -> Option<Expr> {
        let mut types: Vec<&Arc<CustomType>> = self.types.values().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
            .into_iter()
            .find_map(|tpe| tpe.index_of(value).map(|i| Expr::EnumValue(tpe.clone(), i)))
    }
}

fn parse_error(message: impl ToString, span: Span) -> IaError {
    IaError::Parse {
        message: message.to_string(),
        range: (span.start(), span.end()),
    }
}

fn end_of_input(range: (usize, usize)) -> IaError {
    IaError::Parse {
        message: "unexpected end of input".to_string(),
        range,
    }
}

fn from_pest(err: pest::error::Error<Rule>) -> IaError {
    let range = match err.location {
        pest::error::InputLocation::Pos(pos) => (pos, pos),
        pest::error::InputLocation::Span(span) => span,
    };
    IaError::Parse {
        message: err.variant.message().to_string(),
        range,
    }
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, parent: Span<'i>) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| end_of_input((parent.start(), parent.end())))
}

struct GuardContext<'a> {
    scope: &'a Scope,
}

impl GuardContext<'_> {
    fn parse_expr(&self, pairs: Pairs<Rule>) -> Result<Expr> {
        PRATT_PARSER
            .map_primary(|primary| self.parse_primary(primary))
            .map_infix(|lhs, op, rhs| {
                let op = match op.as_rule() {
                    Rule::implies => BinOp::Implies,
                    Rule::log_or => BinOp::Or,
                    Rule::log_and => BinOp::And,
                    Rule::eq => BinOp::Equal,
                    Rule::neq => BinOp::NotEqual,
                    Rule::lt => BinOp::Less,
                    Rule::le => BinOp::LessEqual,
                    Rule::gt => BinOp::Greater,
                    Rule::ge => BinOp::GreaterEqual,
                    Rule::add => BinOp::Add,
                    Rule::sub => BinOp::Sub,
                    Rule::mul => BinOp::Mul,
                    Rule::div => BinOp::Div,
                    Rule::rem => BinOp::Mod,
                    rule => unreachable!("Expr::parse expected infix operation, found {:?}", rule),
                };
                Ok(Expr::binary(op, lhs?, rhs?))
            })
            .map_prefix(|op, arg| match op.as_rule() {
                Rule::not => Ok(Expr::Not(Box::new(arg?))),
                Rule::neg => Ok(match arg? {
                    Expr::Int(value) => Expr::Int(-value),
                    arg => Expr::binary(BinOp::Sub, Expr::Int(0), arg),
                }),
                rule => unreachable!("Expr::parse expected prefix operation, found {:?}", rule),
            })
            .parse(pairs)
    }

    fn parse_primary(&self, primary: Pair<Rule>) -> Result<Expr> {
        let span = primary.as_span();
        match primary.as_rule() {
            Rule::bool_lit => Ok(Expr::Bool(primary.as_str() == "true")),
            Rule::integer => primary
                .as_str()
                .parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| parse_error("integer literal is out of range", span)),
            Rule::ident => {
                let name = primary.as_str();
                if let Some(decl) = self.scope.decl(name) {
                    Ok(Expr::var(decl))
                } else {
                    self.scope
                        .enum_value(name)
                        .ok_or_else(|| parse_error(format!("referencing undefined symbol: {name}"), span))
                }
            }
            Rule::primed => {
                let name = primary.as_str().trim_end_matches('\'');
                self.scope
                    .decl(name)
                    .map(Expr::primed)
                    .ok_or_else(|| parse_error(format!("referencing undefined symbol: {name}"), span))
            }
            Rule::scoped => {
                let mut inner = primary.into_inner();
                let tpe_name = next_pair(&mut inner, span)?.as_str();
                let value = next_pair(&mut inner, span)?.as_str();
                let tpe = self
                    .scope
                    .custom_type(tpe_name)
                    .ok_or_else(|| parse_error(format!("undefined type: {tpe_name}"), span))?;
                let index = tpe
                    .index_of(value)
                    .ok_or_else(|| parse_error(format!("`{value}` is not a value of {tpe_name}"), span))?;
                Ok(Expr::EnumValue(tpe, index))
            }
            // parenthesized expression
            Rule::expr => self.parse_expr(primary.into_inner()),
            rule => unreachable!("Expr::parse expected atom, found {:?}", rule),
        }
    }
}

/// Parses a guard such as `x > 0 && x' == x - 1`.
pub fn parse_guard(text: &str, scope: &Scope) -> Result<Expr> {
    let mut pairs = GuardParser::parse(Rule::guard, text).map_err(from_pest)?;
    let expr = pairs.next().ok_or_else(|| end_of_input((0, text.len())))?;
    GuardContext { scope }.parse_expr(expr.into_inner())
}

/// Parses a runtime statement such as `C = product(P, Q)`.
pub fn parse_statement(text: &str) -> Result<Stmt> {
    let mut pairs = GuardParser::parse(Rule::statement, text).map_err(from_pest)?;
    let pair = pairs.next().ok_or_else(|| end_of_input((0, text.len())))?;
    match pair.as_rule() {
        Rule::assignment => {
            let span = pair.as_span();
            let mut inner = pair.into_inner();
            let target = next_pair(&mut inner, span)?.as_str().to_string();
            let expr = parse_sys_expr(next_pair(&mut inner, span)?)?;
            Ok(Stmt {
                target: Some(target),
                expr,
            })
        }
        _ => Ok(Stmt {
            target: None,
            expr: parse_sys_expr(pair)?,
        }),
    }
}

fn parse_sys_expr(pair: Pair<Rule>) -> Result<SysExpr> {
    let span = pair.as_span();
    let call = next_pair(&mut pair.into_inner(), span)?;
    let rule = call.as_rule();
    if rule == Rule::ident {
        return Ok(SysExpr::Ref(call.as_str().to_string()));
    }
    let mut args = call.into_inner();
    let first = Box::new(parse_sys_expr(next_pair(&mut args, span)?)?);
    let expr = match rule {
        Rule::product_call => SysExpr::Product(first, Box::new(parse_sys_expr(next_pair(&mut args, span)?)?)),
        Rule::refine_call => SysExpr::Refine(first, Box::new(parse_sys_expr(next_pair(&mut args, span)?)?)),
        Rule::prune_call => SysExpr::Prune(first),
        Rule::copy_call => SysExpr::Copy(first),
        Rule::restrict_call => SysExpr::Restrict(first, parse_action_set(next_pair(&mut args, span)?)),
        Rule::scope_call => SysExpr::Scope(first, parse_action_set(next_pair(&mut args, span)?)),
        rule => unreachable!("SysExpr::parse expected operator, found {:?}", rule),
    };
    Ok(expr)
}

fn parse_action_set(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner().map(|p| p.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        let coin = scope.add_type(CustomType {
            name: "Coin".to_string(),
            values: vec!["Small".to_string(), "Large".to_string()],
        });
        scope.declare(Decl::new("x", DataType::Int));
        scope.declare(Decl::new("ok", DataType::Bool));
        scope.declare(Decl::new("c", DataType::Custom(coin)));
        scope
    }

    #[test]
    fn test_precedence() {
        let e = parse_guard("x > 0 && x' == x - 1 || ok", &scope()).unwrap();
        assert_eq!(e.to_string(), "((x > 0) && (x' == (x - 1))) || ok");
        let e = parse_guard("1 + 2 * 3 == 7", &scope()).unwrap();
        assert_eq!(e.as_bool(), Some(true));
        let e = parse_guard("ok => ok => false", &scope()).unwrap();
        assert_eq!(e.to_string(), "ok => (ok => false)");
    }

    #[test]
    fn test_prefix_and_literals() {
        let e = parse_guard("!(x >= -2) && true", &scope()).unwrap();
        assert_eq!(e.to_string(), "!(x >= -2) && true");
        let e = parse_guard("c == Coin.Large && c' != Small", &scope()).unwrap();
        assert_eq!(e.to_string(), "(c == Large) && (c' != Small)");
    }

    #[test]
    fn test_undefined_symbol() {
        let err = parse_guard("y > 1", &scope()).unwrap_err();
        match err {
            IaError::Parse { message, range } => {
                assert_eq!(message, "referencing undefined symbol: y");
                assert_eq!(range, (0, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_guard("x >", &scope()).is_err());
        assert!(parse_guard("Coin.Medium == c", &scope()).is_err());
    }

    #[test]
    fn test_statements() {
        let stmt = parse_statement("C = prune(product(P, Q));").unwrap();
        assert_eq!(stmt.target.as_deref(), Some("C"));
        assert_eq!(
            stmt.expr,
            SysExpr::Prune(Box::new(SysExpr::Product(
                Box::new(SysExpr::Ref("P".to_string())),
                Box::new(SysExpr::Ref("Q".to_string())),
            )))
        );

        let stmt = parse_statement("scope(M, {a, b})").unwrap();
        assert_eq!(stmt.target, None);
        assert_eq!(
            stmt.expr,
            SysExpr::Scope(
                Box::new(SysExpr::Ref("M".to_string())),
                vec!["a".to_string(), "b".to_string()]
            )
        );

        let stmt = parse_statement("product_line").unwrap();
        assert_eq!(stmt.expr, SysExpr::Ref("product_line".to_string()));
        assert!(parse_statement("restrict(M)").is_err());
    }
}

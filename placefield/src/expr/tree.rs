//! Syntax trees produced by the parser
use super::op::{BinaryOpcode, UnaryOpcode};

/// Untyped syntax tree for an expression
///
/// Names are kept as written; they are only bound to variables, constants, or
/// builtins when the tree is lowered into a [`Function`](super::Function).
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Const(f64),
    /// Identifier, possibly with a `Math.` prefix
    Var(String),
    /// Prefix operator (`-` or `!`)
    Unary(UnaryOpcode, Box<Expr>),
    /// Infix operator
    Binary(BinaryOpcode, Box<Expr>, Box<Expr>),
    /// `cond ? a : b`
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `name(args...)`
    Call(String, Vec<Expr>),
}

#[allow(missing_docs)]
impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_owned())
    }
    pub fn unary(op: UnaryOpcode, a: Expr) -> Self {
        Expr::Unary(op, Box::new(a))
    }
    pub fn binary(op: BinaryOpcode, a: Expr, b: Expr) -> Self {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }
    pub fn select(cond: Expr, a: Expr, b: Expr) -> Self {
        Expr::Select(Box::new(cond), Box::new(a), Box::new(b))
    }

    /// Returns the number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + match self {
            Expr::Const(..) | Expr::Var(..) => 0,
            Expr::Unary(_, a) => a.size(),
            Expr::Binary(_, a, b) => a.size() + b.size(),
            Expr::Select(c, a, b) => c.size() + a.size() + b.size(),
            Expr::Call(_, args) => args.iter().map(Expr::size).sum(),
        }
    }
}

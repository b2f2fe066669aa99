//! Sandboxed expression language
//!
//! User text is tokenized and parsed into an [`Expr`] syntax tree, then
//! lowered into a [`Function`] with every name bound to a free variable, a
//! constant, or a builtin.  Nothing in the language can reach host
//! capabilities; the only looping construct is `sum(i, from, to, body)`.
//!
//! ```
//! use placefield::expr::compile;
//!
//! let f = compile("x * x * y * y", ["x", "y"])?;
//! assert_eq!(f.eval(2.0, 3.0)?, 36.0);
//! # Ok::<(), placefield::Error>(())
//! ```
mod function;
mod op;
mod parse;
mod tree;

pub use function::Function;
pub use op::{BinaryOpcode, UnaryOpcode};
pub use parse::{MAX_CHAIN, MAX_DEPTH, parse};
pub use tree::Expr;

use crate::Error;

/// Expression used before the user types anything
pub const DEFAULT_EXPRESSION: &str = "x * x * y * y";

/// Compiles expression text into a callable [`Function`]
///
/// Only the grammar is checked here.  Unknown names and wrong argument
/// counts compile successfully and fault when evaluated.
pub fn compile(source: &str, vars: [&str; 2]) -> Result<Function, Error> {
    let [a, b] = vars;
    let valid = |v: &str| {
        v.bytes().next().is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
            && v.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_')
    };
    if !valid(a) || !valid(b) || a == b {
        return Err(Error::BadFreeVars(a.to_owned(), b.to_owned()));
    }
    let expr = parse(source)?;
    Ok(Function::from_expr(source, vars, &expr))
}

/// Expression text together with the names of its two free variables
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    text: String,
    vars: [String; 2],
}

impl Default for Expression {
    fn default() -> Self {
        Self::new(DEFAULT_EXPRESSION)
    }
}

impl Expression {
    /// Builds an expression over `x` and `y`
    pub fn new(text: &str) -> Self {
        Self::with_vars(text, "x", "y")
    }

    /// Builds an expression over custom variable names
    pub fn with_vars(text: &str, x: &str, y: &str) -> Self {
        Self {
            text: text.to_owned(),
            vars: [x.to_owned(), y.to_owned()],
        }
    }

    /// Returns the expression text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the free variable names
    pub fn vars(&self) -> [&str; 2] {
        [&self.vars[0], &self.vars[1]]
    }

    /// Compiles this expression
    pub fn compile(&self) -> Result<Function, Error> {
        compile(&self.text, self.vars())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_syntax_error_kind() {
        for s in ["x +* y", "", "sin(", "x ? y", "1 2", "@"] {
            let e = compile(s, ["x", "y"]).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Syntax, "{s:?} gave {e:?}");
            let Error::Syntax { expr, .. } = e else {
                panic!("not a syntax error");
            };
            assert_eq!(expr, s);
        }
    }

    #[test]
    fn test_bad_vars() {
        assert!(matches!(
            compile("x", ["x", "x"]),
            Err(Error::BadFreeVars(..))
        ));
        assert!(matches!(
            compile("x", ["1x", "y"]),
            Err(Error::BadFreeVars(..))
        ));
        assert!(matches!(compile("x", ["", "y"]), Err(Error::BadFreeVars(..))));
    }

    #[test]
    fn test_expression() {
        let e = Expression::default();
        assert_eq!(e.text(), "x * x * y * y");
        assert_eq!(e.vars(), ["x", "y"]);
        assert_eq!(e.compile().unwrap().eval(1.0, 2.0), Ok(4.0));

        let e = Expression::with_vars("u - v", "u", "v");
        assert_eq!(e.compile().unwrap().eval(1.0, 2.0), Ok(-1.0));
    }
}

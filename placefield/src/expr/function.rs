//! Resolved evaluation trees and the compiled [`Function`] type
use super::{
    op::{BinaryOpcode, UnaryOpcode, is_truthy, truth},
    tree::Expr,
};
use crate::{Error, exec::Watchdog};

/// Tree with every name resolved to a slot, constant, or builtin
#[derive(Clone, Debug)]
enum Node {
    Const(f64),
    /// Index into the evaluation environment (0 and 1 are the free vars)
    Slot(usize),
    Unary(UnaryOpcode, Box<Node>),
    Binary(BinaryOpcode, Box<Node>, Box<Node>),
    Select(Box<Node>, Box<Node>, Box<Node>),
    Sum {
        slot: usize,
        from: Box<Node>,
        to: Box<Node>,
        body: Box<Node>,
    },
    /// Unresolvable name or bad call, reported only if evaluated
    Fault(Error),
}

impl Node {
    fn eval(&self, env: &mut [f64], dog: &Watchdog) -> Result<f64, Error> {
        let v = match self {
            Node::Const(c) => *c,
            Node::Slot(i) => env[*i],
            Node::Unary(op, a) => op.apply(a.eval(env, dog)?),
            Node::Binary(BinaryOpcode::And, a, b) => {
                if is_truthy(a.eval(env, dog)?) {
                    truth(is_truthy(b.eval(env, dog)?))
                } else {
                    0.0
                }
            }
            Node::Binary(BinaryOpcode::Or, a, b) => {
                if is_truthy(a.eval(env, dog)?) {
                    1.0
                } else {
                    truth(is_truthy(b.eval(env, dog)?))
                }
            }
            Node::Binary(op, a, b) => {
                let a = a.eval(env, dog)?;
                let b = b.eval(env, dog)?;
                op.apply(a, b)
            }
            Node::Select(c, a, b) => {
                if is_truthy(c.eval(env, dog)?) {
                    a.eval(env, dog)?
                } else {
                    b.eval(env, dog)?
                }
            }
            Node::Sum {
                slot,
                from,
                to,
                body,
            } => {
                let from = from.eval(env, dog)?;
                let to = to.eval(env, dog)?;
                let mut acc = 0.0;
                let mut i = from;
                while i <= to {
                    dog.check()?;
                    env[*slot] = i;
                    acc += body.eval(env, dog)?;
                    i += 1.0;
                }
                acc
            }
            Node::Fault(e) => return Err(e.clone()),
        };
        Ok(v)
    }
}

/// Name resolution state while lowering an [`Expr`]
struct Lowering {
    /// Names in scope; position is the slot index
    scope: Vec<String>,
    /// High-water mark of `scope.len()`
    slots: usize,
}

impl Lowering {
    fn lower(&mut self, e: &Expr) -> Node {
        match e {
            Expr::Const(c) => Node::Const(*c),
            Expr::Var(name) => self.lookup(name),
            Expr::Unary(op, a) => Node::Unary(*op, Box::new(self.lower(a))),
            Expr::Binary(op, a, b) => Node::Binary(
                *op,
                Box::new(self.lower(a)),
                Box::new(self.lower(b)),
            ),
            Expr::Select(c, a, b) => Node::Select(
                Box::new(self.lower(c)),
                Box::new(self.lower(a)),
                Box::new(self.lower(b)),
            ),
            Expr::Call(name, args) => self.lower_call(name, args),
        }
    }

    fn lookup(&self, name: &str) -> Node {
        if let Some(i) = self.scope.iter().rposition(|s| s == name) {
            return Node::Slot(i);
        }
        match name.strip_prefix("Math.").unwrap_or(name) {
            "pi" | "PI" => Node::Const(std::f64::consts::PI),
            "e" | "E" => Node::Const(std::f64::consts::E),
            "tau" | "TAU" => Node::Const(std::f64::consts::TAU),
            _ => Node::Fault(Error::UnknownVariable(name.to_owned())),
        }
    }

    fn lower_call(&mut self, name: &str, args: &[Expr]) -> Node {
        let base = name.strip_prefix("Math.").unwrap_or(name);
        if base == "sum" {
            return self.lower_sum(args);
        }
        if let Ok(op) = base.parse::<UnaryOpcode>() {
            return match args {
                [a] => Node::Unary(op, Box::new(self.lower(a))),
                _ => Node::Fault(Error::BadArity {
                    name: op.into(),
                    expected: "1",
                    actual: args.len(),
                }),
            };
        }
        if let Ok(op) = base.parse::<BinaryOpcode>() {
            if op.is_variadic() {
                let mut iter = args.iter();
                let Some(first) = iter.next() else {
                    return Node::Fault(Error::BadArity {
                        name: op.into(),
                        expected: "at least 1",
                        actual: 0,
                    });
                };
                let first = self.lower(first);
                return iter.fold(first, |acc, a| {
                    Node::Binary(op, Box::new(acc), Box::new(self.lower(a)))
                });
            }
            return match args {
                [a, b] => Node::Binary(
                    op,
                    Box::new(self.lower(a)),
                    Box::new(self.lower(b)),
                ),
                _ => Node::Fault(Error::BadArity {
                    name: op.into(),
                    expected: "2",
                    actual: args.len(),
                }),
            };
        }
        Node::Fault(Error::UnknownFunction(name.to_owned()))
    }

    /// Lowers `sum(i, from, to, body)`
    fn lower_sum(&mut self, args: &[Expr]) -> Node {
        let [binding, from, to, body] = args else {
            return Node::Fault(Error::BadArity {
                name: "sum",
                expected: "4",
                actual: args.len(),
            });
        };
        let Expr::Var(var) = binding else {
            return Node::Fault(Error::BadSumBinding);
        };
        let from = Box::new(self.lower(from));
        let to = Box::new(self.lower(to));

        self.scope.push(var.clone());
        self.slots = self.slots.max(self.scope.len());
        let slot = self.scope.len() - 1;
        let body = Box::new(self.lower(body));
        self.scope.pop();

        Node::Sum {
            slot,
            from,
            to,
            body,
        }
    }
}

/// A compiled expression `f(x, y) -> f64`
///
/// Building a `Function` never evaluates anything; names are bound lazily, so
/// an unknown identifier only produces an error when evaluation reaches it.
#[derive(Clone, Debug)]
pub struct Function {
    source: String,
    vars: [String; 2],
    root: Node,
    slots: usize,
}

impl Function {
    /// Lowers a parsed tree, binding `vars` as the two free variables
    pub fn from_expr(source: &str, vars: [&str; 2], expr: &Expr) -> Self {
        let mut lowering = Lowering {
            scope: vars.iter().map(|v| v.to_string()).collect(),
            slots: 2,
        };
        let root = lowering.lower(expr);
        Self {
            source: source.to_owned(),
            vars: vars.map(str::to_owned),
            root,
            slots: lowering.slots,
        }
    }

    /// Returns the text this function was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the names of the two free variables
    pub fn vars(&self) -> [&str; 2] {
        [&self.vars[0], &self.vars[1]]
    }

    /// Evaluates the function at a single point
    ///
    /// Undefined numeric results (e.g. `1 / 0`, `sqrt(-1)`) are returned as
    /// `inf` or `NaN`, not as errors.
    pub fn eval(&self, x: f64, y: f64) -> Result<f64, Error> {
        self.eval_with(x, y, &Watchdog::unbounded())
    }

    /// Evaluates the function, checking `dog` for cancellation as it goes
    pub(crate) fn eval_with(
        &self,
        x: f64,
        y: f64,
        dog: &Watchdog,
    ) -> Result<f64, Error> {
        dog.check()?;
        let mut env = vec![0.0; self.slots];
        env[0] = x;
        env[1] = y;
        self.root.eval(&mut env, dog)
    }
}

//! Opcodes shared by the syntax tree and the evaluation tree
use strum::{EnumString, IntoStaticStr};

/// A one-argument math operation
///
/// Everything except `Neg` and `Not` can also be called by name, e.g.
/// `"sqrt".parse::<UnaryOpcode>()`.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum UnaryOpcode {
    #[strum(disabled)]
    Neg,
    #[strum(disabled)]
    Not,
    Abs,
    Sqrt,
    Cbrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    #[strum(to_string = "ln", serialize = "log")]
    Ln,
    Log10,
    Log2,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
}

/// A two-argument math operation
///
/// The named operations (`atan2`, `pow`, `hypot`, `min`, `max`) can be parsed
/// from their function names; the rest are only reachable through operators.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum BinaryOpcode {
    #[strum(disabled)]
    Add,
    #[strum(disabled)]
    Sub,
    #[strum(disabled)]
    Mul,
    #[strum(disabled)]
    Div,
    #[strum(disabled)]
    Mod,
    #[strum(disabled)]
    Lt,
    #[strum(disabled)]
    Le,
    #[strum(disabled)]
    Gt,
    #[strum(disabled)]
    Ge,
    #[strum(disabled)]
    Eq,
    #[strum(disabled)]
    Ne,
    #[strum(disabled)]
    And,
    #[strum(disabled)]
    Or,
    Pow,
    Atan2,
    Hypot,
    Min,
    Max,
}

/// Converts a boolean into the numeric truth values used by comparisons
pub(crate) fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Truthiness of a value: non-zero and not NaN
pub(crate) fn is_truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

impl UnaryOpcode {
    /// Applies the operation to a value
    pub fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOpcode::Neg => -a,
            UnaryOpcode::Not => truth(!is_truthy(a)),
            UnaryOpcode::Abs => a.abs(),
            UnaryOpcode::Sqrt => a.sqrt(),
            UnaryOpcode::Cbrt => a.cbrt(),
            UnaryOpcode::Sin => a.sin(),
            UnaryOpcode::Cos => a.cos(),
            UnaryOpcode::Tan => a.tan(),
            UnaryOpcode::Asin => a.asin(),
            UnaryOpcode::Acos => a.acos(),
            UnaryOpcode::Atan => a.atan(),
            UnaryOpcode::Sinh => a.sinh(),
            UnaryOpcode::Cosh => a.cosh(),
            UnaryOpcode::Tanh => a.tanh(),
            UnaryOpcode::Exp => a.exp(),
            UnaryOpcode::Ln => a.ln(),
            UnaryOpcode::Log10 => a.log10(),
            UnaryOpcode::Log2 => a.log2(),
            UnaryOpcode::Floor => a.floor(),
            UnaryOpcode::Ceil => a.ceil(),
            // Rounds half-way cases towards +inf, like `Math.round`
            UnaryOpcode::Round => (a + 0.5).floor(),
            UnaryOpcode::Trunc => a.trunc(),
            UnaryOpcode::Sign => {
                if a.is_nan() || a == 0.0 {
                    a
                } else {
                    a.signum()
                }
            }
        }
    }
}

impl BinaryOpcode {
    /// Applies the operation to a pair of values
    ///
    /// `And` and `Or` are short-circuited by the evaluator; this is only used
    /// once both sides are known.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOpcode::Add => a + b,
            BinaryOpcode::Sub => a - b,
            BinaryOpcode::Mul => a * b,
            BinaryOpcode::Div => a / b,
            // Truncated remainder, matching `%` on f64 (and in JavaScript)
            BinaryOpcode::Mod => a % b,
            BinaryOpcode::Lt => truth(a < b),
            BinaryOpcode::Le => truth(a <= b),
            BinaryOpcode::Gt => truth(a > b),
            BinaryOpcode::Ge => truth(a >= b),
            BinaryOpcode::Eq => truth(a == b),
            BinaryOpcode::Ne => truth(a != b),
            BinaryOpcode::And => truth(is_truthy(a) && is_truthy(b)),
            BinaryOpcode::Or => truth(is_truthy(a) || is_truthy(b)),
            BinaryOpcode::Pow => a.powf(b),
            BinaryOpcode::Atan2 => a.atan2(b),
            BinaryOpcode::Hypot => a.hypot(b),
            // NaN-propagating, unlike `f64::min`
            BinaryOpcode::Min => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.min(b)
                }
            }
            BinaryOpcode::Max => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.max(b)
                }
            }
        }
    }

    /// Checks whether this named operation accepts any number of arguments
    pub fn is_variadic(self) -> bool {
        matches!(self, BinaryOpcode::Min | BinaryOpcode::Max)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!("sqrt".parse::<UnaryOpcode>(), Ok(UnaryOpcode::Sqrt));
        assert_eq!("log".parse::<UnaryOpcode>(), Ok(UnaryOpcode::Ln));
        assert_eq!("ln".parse::<UnaryOpcode>(), Ok(UnaryOpcode::Ln));
        assert_eq!("log10".parse::<UnaryOpcode>(), Ok(UnaryOpcode::Log10));
        assert!("neg".parse::<UnaryOpcode>().is_err());
        assert!("not".parse::<UnaryOpcode>().is_err());

        assert_eq!("atan2".parse::<BinaryOpcode>(), Ok(BinaryOpcode::Atan2));
        assert!("add".parse::<BinaryOpcode>().is_err());

        let name: &'static str = UnaryOpcode::Ln.into();
        assert_eq!(name, "ln");
    }

    #[test]
    fn test_nan_handling() {
        assert!(BinaryOpcode::Min.apply(f64::NAN, 1.0).is_nan());
        assert!(BinaryOpcode::Max.apply(1.0, f64::NAN).is_nan());
        assert_eq!(UnaryOpcode::Not.apply(f64::NAN), 1.0);
        assert!(UnaryOpcode::Sign.apply(f64::NAN).is_nan());
        assert_eq!(BinaryOpcode::Div.apply(1.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_round() {
        assert_eq!(UnaryOpcode::Round.apply(2.5), 3.0);
        assert_eq!(UnaryOpcode::Round.apply(-2.5), -2.0);
        assert_eq!(UnaryOpcode::Round.apply(-2.6), -3.0);
    }
}

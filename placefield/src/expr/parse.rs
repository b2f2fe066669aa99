//! Tokenizer and recursive-descent parser for expression text
use super::{
    op::{BinaryOpcode, UnaryOpcode},
    tree::Expr,
};
use crate::Error;

/// Maximum nesting depth accepted by the parser
pub const MAX_DEPTH: usize = 64;

/// Maximum number of operators chained at one level, plus enclosing nesting
///
/// Chains like `x + x + … + x` and argument lists like `max(x, x, …)` build
/// trees whose depth grows with their length, so they share this budget.
pub const MAX_CHAIN: usize = 256;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Caret,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Token::Number(n) => return write!(f, "number `{n}`"),
            Token::Ident(s) => return write!(f, "identifier `{s}`"),
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Bang => "!",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::Ne => "!=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Question => "?",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
        };
        write!(f, "`{s}`")
    }
}

/// Token with its byte offset in the source text
#[derive(Clone, Debug)]
struct Spanned {
    token: Token,
    offset: usize,
}

/// Failure location and message, turned into [`Error::Syntax`] at the end
struct Failure {
    offset: usize,
    message: String,
}

type ParseResult<T> = Result<T, Failure>;

fn fail<T>(offset: usize, message: impl Into<String>) -> ParseResult<T> {
    Err(Failure {
        offset,
        message: message.into(),
    })
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn tokenize(source: &str) -> ParseResult<Vec<Spanned>> {
    let bytes = source.as_bytes();
    let mut out = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let next = bytes.get(i + 1).copied();
        let after = bytes.get(i + 2).copied();

        let token = if c.is_ascii_digit()
            || (c == b'.' && next.is_some_and(|d| d.is_ascii_digit()))
        {
            while bytes.get(i).is_some_and(|d| d.is_ascii_digit()) {
                i += 1;
            }
            if bytes.get(i) == Some(&b'.') {
                i += 1;
                while bytes.get(i).is_some_and(|d| d.is_ascii_digit()) {
                    i += 1;
                }
            }
            if matches!(bytes.get(i), Some(b'e' | b'E')) {
                let mut j = i + 1;
                if matches!(bytes.get(j), Some(b'+' | b'-')) {
                    j += 1;
                }
                if !bytes.get(j).is_some_and(|d| d.is_ascii_digit()) {
                    return fail(j, "malformed exponent");
                }
                while bytes.get(j).is_some_and(|d| d.is_ascii_digit()) {
                    j += 1;
                }
                i = j;
            }
            if bytes.get(i).is_some_and(|&d| is_ident_start(d)) {
                return fail(i, "identifier directly after number");
            }
            let text = &source[start..i];
            match text.parse::<f64>() {
                Ok(v) => Token::Number(v),
                Err(e) => return fail(start, format!("bad number: {e}")),
            }
        } else if is_ident_start(c) {
            loop {
                while bytes.get(i).is_some_and(|&d| is_ident_char(d)) {
                    i += 1;
                }
                // Dotted names are only used for `Math.sin` and friends
                if bytes.get(i) == Some(&b'.')
                    && bytes.get(i + 1).is_some_and(|&d| is_ident_start(d))
                {
                    i += 1;
                } else {
                    break;
                }
            }
            Token::Ident(source[start..i].to_owned())
        } else {
            let (token, len) = match (c, next, after) {
                (b'*', Some(b'*'), _) => (Token::StarStar, 2),
                (b'*', ..) => (Token::Star, 1),
                (b'+', ..) => (Token::Plus, 1),
                (b'-', ..) => (Token::Minus, 1),
                (b'/', ..) => (Token::Slash, 1),
                (b'%', ..) => (Token::Percent, 1),
                (b'^', ..) => (Token::Caret, 1),
                (b'!', Some(b'='), Some(b'=')) => (Token::Ne, 3),
                (b'!', Some(b'='), _) => (Token::Ne, 2),
                (b'!', ..) => (Token::Bang, 1),
                (b'<', Some(b'='), _) => (Token::Le, 2),
                (b'<', ..) => (Token::Lt, 1),
                (b'>', Some(b'='), _) => (Token::Ge, 2),
                (b'>', ..) => (Token::Gt, 1),
                (b'=', Some(b'='), Some(b'=')) => (Token::EqEq, 3),
                (b'=', Some(b'='), _) => (Token::EqEq, 2),
                (b'&', Some(b'&'), _) => (Token::AndAnd, 2),
                (b'|', Some(b'|'), _) => (Token::OrOr, 2),
                (b'?', ..) => (Token::Question, 1),
                (b':', ..) => (Token::Colon, 1),
                (b'(', ..) => (Token::LParen, 1),
                (b')', ..) => (Token::RParen, 1),
                (b',', ..) => (Token::Comma, 1),
                _ => {
                    let ch = source[start..].chars().next().unwrap_or('?');
                    return fail(start, format!("unexpected character `{ch}`"));
                }
            };
            i += len;
            token
        };
        out.push(Spanned {
            token,
            offset: start,
        });
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    /// Current nesting plus operators in the chains being parsed
    weight: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.offset).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            self.unexpected(&format!("expected {token}"))
        }
    }

    fn unexpected<T>(&self, context: &str) -> ParseResult<T> {
        match self.peek() {
            Some(t) => fail(self.offset(), format!("{context}, found {t}")),
            None => fail(self.end, format!("{context}, found end of input")),
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return fail(
                self.offset(),
                format!("nesting exceeds {MAX_DEPTH} levels"),
            );
        }
        self.chain()
    }

    fn leave(&mut self) {
        self.depth -= 1;
        self.weight -= 1;
    }

    /// Accounts for one more link in an operator chain or argument list
    fn chain(&mut self) -> ParseResult<()> {
        self.weight += 1;
        if self.weight > MAX_CHAIN {
            fail(
                self.offset(),
                format!("expression exceeds {MAX_CHAIN} chained terms"),
            )
        } else {
            Ok(())
        }
    }

    /// `ternary := or ('?' ternary ':' ternary)?`
    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let cond = self.parse_binary(0)?;
        let out = if self.eat(&Token::Question) {
            let a = self.parse_ternary()?;
            self.expect(Token::Colon)?;
            let b = self.parse_ternary()?;
            Expr::select(cond, a, b)
        } else {
            cond
        };
        self.leave();
        Ok(out)
    }

    /// Left-associative binary operators, lowest precedence level first
    fn parse_binary(&mut self, level: usize) -> ParseResult<Expr> {
        const LEVELS: &[&[(Token, BinaryOpcode)]] = &[
            &[(Token::OrOr, BinaryOpcode::Or)],
            &[(Token::AndAnd, BinaryOpcode::And)],
            &[(Token::EqEq, BinaryOpcode::Eq), (Token::Ne, BinaryOpcode::Ne)],
            &[
                (Token::Lt, BinaryOpcode::Lt),
                (Token::Le, BinaryOpcode::Le),
                (Token::Gt, BinaryOpcode::Gt),
                (Token::Ge, BinaryOpcode::Ge),
            ],
            &[
                (Token::Plus, BinaryOpcode::Add),
                (Token::Minus, BinaryOpcode::Sub),
            ],
            &[
                (Token::Star, BinaryOpcode::Mul),
                (Token::Slash, BinaryOpcode::Div),
                (Token::Percent, BinaryOpcode::Mod),
            ],
        ];
        let Some(ops) = LEVELS.get(level) else {
            return self.parse_unary();
        };
        let mut lhs = self.parse_binary(level + 1)?;
        let mut links = 0;
        'outer: loop {
            for (token, op) in ops.iter() {
                if self.eat(token) {
                    self.chain()?;
                    links += 1;
                    let rhs = self.parse_binary(level + 1)?;
                    lhs = Expr::binary(*op, lhs, rhs);
                    continue 'outer;
                }
            }
            self.weight -= links;
            return Ok(lhs);
        }
    }

    /// `unary := ('-' | '+' | '!') unary | power`
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOpcode::Neg),
            Some(Token::Bang) => Some(UnaryOpcode::Not),
            Some(Token::Plus) => None,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        self.enter()?;
        let a = self.parse_unary()?;
        self.leave();
        Ok(match op {
            Some(op) => Expr::unary(op, a),
            None => a,
        })
    }

    /// `power := primary (('**' | '^') unary)?`, right-associative
    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_primary()?;
        if self.eat(&Token::StarStar) || self.eat(&Token::Caret) {
            self.enter()?;
            let exp = self.parse_unary()?;
            self.leave();
            Ok(Expr::binary(BinaryOpcode::Pow, base, exp))
        } else {
            Ok(base)
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::Number(v)) => Ok(Expr::Const(v)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let e = self.parse_ternary()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(t) => fail(offset, format!("unexpected {t}")),
            None => fail(self.end, "unexpected end of input"),
        }
    }

    /// Parses a comma-separated argument list after the opening paren
    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = vec![];
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        // Variadic builtins fold their arguments into a chain
        loop {
            args.push(self.parse_ternary()?);
            if self.eat(&Token::RParen) {
                self.weight -= args.len() - 1;
                return Ok(args);
            }
            self.expect(Token::Comma)?;
            self.chain()?;
        }
    }
}

/// Parses expression text into a syntax tree
///
/// This only checks the grammar; names are not resolved.
///
/// ```
/// # use placefield::expr::{parse, Expr};
/// let e = parse("x * x * y * y")?;
/// assert_eq!(e.size(), 7);
/// assert!(parse("x +* y").is_err());
/// # Ok::<(), placefield::Error>(())
/// ```
pub fn parse(source: &str) -> Result<Expr, Error> {
    let to_error = |f: Failure| Error::Syntax {
        expr: source.to_owned(),
        offset: f.offset,
        message: f.message,
    };
    let tokens = tokenize(source).map_err(to_error)?;
    if tokens.is_empty() {
        return Err(to_error(Failure {
            offset: 0,
            message: "empty expression".to_owned(),
        }));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        weight: 0,
        end: source.len(),
    };
    let expr = parser.parse_ternary().map_err(to_error)?;
    if parser.peek().is_some() {
        return parser.unexpected("expected end of input").map_err(to_error);
    }
    Ok(expr)
}

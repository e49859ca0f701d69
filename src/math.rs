use serde::{Deserialize, Serialize};

/// Default tolerance for numeric comparisons across the whole engine.
pub const EPSILON: f64 = 1e-6;

pub fn approx_eq(a: f64, b: f64) -> bool {
    approx_eq_eps(a, b, EPSILON)
}

pub fn approx_eq_eps(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MathError {
    #[error("invalid expression: {0}")]
    Parse(String),
    #[error("expression is not a quadratic polynomial")]
    NotQuadratic,
    #[error("leading coefficient is zero, expression is not quadratic")]
    Degenerate,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    X,
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::X => x,
            Expr::Neg(e) => -e.eval(x),
            Expr::Add(l, r) => l.eval(x) + r.eval(x),
            Expr::Sub(l, r) => l.eval(x) - r.eval(x),
            Expr::Mul(l, r) => l.eval(x) * r.eval(x),
            Expr::Div(l, r) => l.eval(x) / r.eval(x),
            Expr::Pow(l, r) => l.eval(x).powf(r.eval(x)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    X,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, MathError> {
    // Accept the unicode square from mission text and normalize case up front.
    let input = input.to_lowercase().replace('²', "^2");
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut lit = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        lit.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = lit
                    .parse()
                    .map_err(|_| MathError::Parse(format!("bad number literal '{lit}'")))?;
                tokens.push(Token::Num(n));
            }
            'x' => {
                chars.next();
                tokens.push(Token::X);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' | '−' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => {
                return Err(MathError::Parse(format!("unexpected character '{other}'")));
            }
        }
    }
    if tokens.is_empty() {
        return Err(MathError::Parse("empty expression".into()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self) -> Result<Expr, MathError> {
        let mut lhs = self.term()?;
        while let Some(tok) = self.peek() {
            match tok {
                Token::Plus => {
                    self.bump();
                    let rhs = self.term()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Token::Minus => {
                    self.bump();
                    let rhs = self.term()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, MathError> {
        let mut lhs = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    let rhs = self.factor()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.bump();
                    let rhs = self.factor()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                // Implicit multiplication: 2x, 2(x-1), (x-1)(x-3), x(x+2).
                Some(Token::Num(_)) | Some(Token::X) | Some(Token::LParen) => {
                    let rhs = self.factor()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, MathError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.bump();
                Ok(Expr::Neg(Box::new(self.factor()?)))
            }
            Some(Token::Plus) => {
                self.bump();
                self.factor()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, MathError> {
        let base = self.atom()?;
        if let Some(Token::Caret) = self.peek() {
            self.bump();
            let exp = self.factor()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, MathError> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::X) => Ok(Expr::X),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(MathError::Parse("missing closing parenthesis".into())),
                }
            }
            other => Err(MathError::Parse(format!("unexpected token {other:?}"))),
        }
    }
}

fn parse_expr(input: &str) -> Result<Expr, MathError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(MathError::Parse("trailing input after expression".into()));
    }
    Ok(expr)
}

/// Evaluate an arbitrary single-variable expression at `x`.
///
/// Used by the equivalence checker, which needs point evaluation without
/// committing to the expression being quadratic.
pub fn eval_expression(input: &str, x: f64) -> Result<f64, MathError> {
    let expr = parse_expr(input)?;
    let v = expr.eval(x);
    if !v.is_finite() {
        return Err(MathError::Parse("expression does not evaluate".into()));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Concavity {
    Up,
    Down,
}

impl Concavity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Concavity::Up => "up",
            Concavity::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RootNature {
    TwoDistinctReal,
    OneRealDouble,
    NoRealRoots,
}

/// A quadratic `a*x^2 + b*x + c` with `a != 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    /// Extract coefficients from a free-form expression by evaluation:
    /// `c = f(0)`, `a = (f(1) + f(-1) - 2c) / 2`, `b = f(1) - c - a`.
    ///
    /// Evaluation makes the extraction independent of surface form
    /// (factored, expanded, spaced, implicit coefficients). The fit is
    /// re-checked at x = 2 and x = 3 so cubics and other impostors are
    /// rejected rather than silently truncated.
    pub fn parse(input: &str) -> Result<Self, MathError> {
        let expr = parse_expr(input)?;
        let f0 = expr.eval(0.0);
        let f1 = expr.eval(1.0);
        let f_1 = expr.eval(-1.0);
        if !f0.is_finite() || !f1.is_finite() || !f_1.is_finite() {
            return Err(MathError::Parse("expression does not evaluate".into()));
        }

        let c = f0;
        let a = (f1 + f_1 - 2.0 * c) / 2.0;
        let b = f1 - c - a;
        let q = Quadratic { a, b, c };

        for x in [2.0, 3.0] {
            let actual = expr.eval(x);
            let scale = actual.abs().max(1.0);
            if !actual.is_finite() || (actual - q.eval(x)).abs() > EPSILON * scale {
                return Err(MathError::NotQuadratic);
            }
        }
        if a.abs() < EPSILON {
            return Err(MathError::Degenerate);
        }
        Ok(q)
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }

    pub fn vertex(&self) -> Vertex {
        let x = -self.b / (2.0 * self.a);
        Vertex { x, y: self.eval(x) }
    }

    pub fn discriminant(&self) -> f64 {
        self.b * self.b - 4.0 * self.a * self.c
    }

    /// Real roots in ascending order: empty, single (double root) or pair.
    pub fn roots(&self) -> Vec<f64> {
        let d = self.discriminant();
        if d < -EPSILON {
            Vec::new()
        } else if d.abs() <= EPSILON {
            vec![-self.b / (2.0 * self.a)]
        } else {
            let sqrt_d = d.sqrt();
            let r1 = (-self.b + sqrt_d) / (2.0 * self.a);
            let r2 = (-self.b - sqrt_d) / (2.0 * self.a);
            let mut out = vec![r1, r2];
            out.sort_by(|x, y| x.partial_cmp(y).unwrap());
            out
        }
    }

    pub fn y_intercept(&self) -> f64 {
        self.c
    }

    pub fn axis_of_symmetry(&self) -> f64 {
        -self.b / (2.0 * self.a)
    }

    pub fn concavity(&self) -> Concavity {
        if self.a > 0.0 {
            Concavity::Up
        } else {
            Concavity::Down
        }
    }

    /// `(lower, upper)` with `None` marking an unbounded endpoint.
    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        let v = self.vertex();
        if self.a > 0.0 {
            (Some(v.y), None)
        } else {
            (None, Some(v.y))
        }
    }

    pub fn root_nature(&self) -> RootNature {
        let d = self.discriminant();
        if d > EPSILON {
            RootNature::TwoDistinctReal
        } else if d >= -EPSILON {
            RootNature::OneRealDouble
        } else {
            RootNature::NoRealRoots
        }
    }

    /// Standard spelling `ax^2+bx+c`, signs folded in, unit coefficients
    /// implicit. This is the canonical target for lexical comparisons.
    pub fn standard_form(&self) -> String {
        let mut out = String::new();
        if approx_eq(self.a, 1.0) {
            out.push_str("x^2");
        } else if approx_eq(self.a, -1.0) {
            out.push_str("-x^2");
        } else {
            out.push_str(&format!("{}x^2", fmt_num(self.a)));
        }
        if !approx_eq(self.b, 0.0) {
            let mag = self.b.abs();
            out.push(if self.b < 0.0 { '-' } else { '+' });
            if approx_eq(mag, 1.0) {
                out.push('x');
            } else {
                out.push_str(&format!("{}x", fmt_num(mag)));
            }
        }
        if !approx_eq(self.c, 0.0) {
            out.push(if self.c < 0.0 { '-' } else { '+' });
            out.push_str(&fmt_num(self.c.abs()));
        }
        out
    }

    /// Factored spelling matching the mission content tables:
    /// `2(x-1)(x-3)`, `-(x-1)(x-3)`, `(x-2)^2`. Falls back to the
    /// standard form when there are no real factors.
    pub fn factored_form(&self) -> String {
        let roots = self.roots();
        match roots.len() {
            0 => self.standard_form(),
            1 => format!("{}{}^2", lead_coeff(self.a), factor_term(roots[0])),
            _ => format!(
                "{}{}{}",
                lead_coeff(self.a),
                factor_term(roots[0]),
                factor_term(roots[1])
            ),
        }
    }

    /// Vertex (canonical) spelling `a(x-h)^2+k`.
    pub fn canonical_form(&self) -> String {
        let v = self.vertex();
        let square = if approx_eq(v.x, 0.0) {
            "x^2".to_string()
        } else {
            format!("{}^2", factor_term(v.x))
        };
        let mut out = format!("{}{}", lead_coeff(self.a), square);
        if !approx_eq(v.y, 0.0) {
            out.push(if v.y < 0.0 { '-' } else { '+' });
            out.push_str(&fmt_num(v.y.abs()));
        }
        out
    }
}

fn fmt_num(n: f64) -> String {
    // Avoid "-0" in rendered forms.
    if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

fn factor_term(r: f64) -> String {
    if approx_eq(r, 0.0) {
        "x".to_string()
    } else if r < 0.0 {
        format!("(x+{})", fmt_num(-r))
    } else {
        format!("(x-{})", fmt_num(r))
    }
}

fn lead_coeff(a: f64) -> String {
    if approx_eq(a, 1.0) {
        String::new()
    } else if approx_eq(a, -1.0) {
        "-".to_string()
    } else {
        fmt_num(a)
    }
}

use crate::math::{self, approx_eq, MathError};
use once_cell::sync::Lazy;
use regex::Regex;

/// A polynomial of degree at most two in normal form, obtained by
/// point evaluation rather than string manipulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyNormal {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl PolyNormal {
    fn eval(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }
}

/// Lexical normalization: strip whitespace and explicit multiplication
/// signs, lowercase, fold the unicode square into `^2`.
pub fn normalize(expr: &str) -> String {
    expr.chars()
        .filter(|c| !c.is_whitespace() && *c != '*')
        .collect::<String>()
        .to_lowercase()
        .replace('²', "^2")
        .replace('−', "-")
}

/// Algebraic tier: expand the expression into polynomial normal form by
/// evaluating at sample points. Fails (so the caller can fall back) when
/// the input does not parse or is not a polynomial of degree <= 2.
pub fn try_algebraic(expr: &str) -> Result<PolyNormal, MathError> {
    let normalized = normalize(expr);
    let f0 = math::eval_expression(&normalized, 0.0)?;
    let f1 = math::eval_expression(&normalized, 1.0)?;
    let f_1 = math::eval_expression(&normalized, -1.0)?;

    let c = f0;
    let a = (f1 + f_1 - 2.0 * c) / 2.0;
    let b = f1 - c - a;
    let poly = PolyNormal { a, b, c };

    for x in [2.0, 3.0, -2.0] {
        let actual = math::eval_expression(&normalized, x)?;
        let scale = actual.abs().max(1.0);
        if (actual - poly.eval(x)).abs() > math::EPSILON * scale {
            return Err(MathError::NotQuadratic);
        }
    }
    Ok(poly)
}

static SQUARED_BINOMIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(x([+-])(\d+(?:\.\d+)?)\)\^2$").unwrap());

/// Lexical tier: normalized spelling, with a still-factored single square
/// `(x-a)^2` expanded through the identity `(x-a)^2 = x^2 - 2ax + a^2`.
pub fn fallback_lexical(expr: &str) -> String {
    let normalized = normalize(expr);
    if let Some(caps) = SQUARED_BINOMIAL.captures(&normalized) {
        let sign = &caps[1];
        if let Ok(k) = caps[2].parse::<f64>() {
            // (x-k)^2 => root at +k; (x+k)^2 => root at -k.
            let root = if sign == "-" { k } else { -k };
            let expanded = crate::math::Quadratic { a: 1.0, b: -2.0 * root, c: root * root };
            return expanded.standard_form();
        }
    }
    normalized
}

/// Whether two algebraic strings denote the same polynomial, independent
/// of surface form. Never fails: when either side resists the algebraic
/// tier, the comparison degrades to normalized string equality. That
/// trades false negatives on exotic equivalent spellings for a checker
/// that cannot take a session down.
pub fn equivalent(lhs: &str, rhs: &str) -> bool {
    match (try_algebraic(lhs), try_algebraic(rhs)) {
        (Ok(l), Ok(r)) => {
            approx_eq(l.a, r.a) && approx_eq(l.b, r.b) && approx_eq(l.c, r.c)
        }
        _ => fallback_lexical(lhs) == fallback_lexical(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factored_equals_expanded() {
        assert!(equivalent("(x-2)^2", "x^2-4x+4"));
        assert!(equivalent("(x-1)(x-3)", "x^2-4x+3"));
        assert!(equivalent("2(x-1)(x-3)", "2x^2-8x+6"));
    }

    #[test]
    fn distinct_polynomials_differ() {
        assert!(!equivalent("x^2+1", "x^2-1"));
        assert!(!equivalent("x^2-4x+4", "x^2-4x+3"));
    }

    #[test]
    fn spacing_case_and_stars_are_irrelevant() {
        assert!(equivalent("X^2 - 4*X + 4", "x^2-4x+4"));
        assert!(equivalent("x² - 4x + 4", "x^2-4x+4"));
    }

    #[test]
    fn reflexive_and_symmetric() {
        for e in ["x^2-4x+4", "(x-2)^2", "-x^2+4x-3", "2(x-1)(x-3)"] {
            assert!(equivalent(e, e));
        }
        assert_eq!(equivalent("(x-2)^2", "x^2-4x+4"), equivalent("x^2-4x+4", "(x-2)^2"));
    }

    #[test]
    fn unparseable_input_degrades_to_string_equality() {
        assert!(equivalent("not math", "NOT MATH"));
        assert!(!equivalent("not math", "x^2-4x+4"));
    }

    #[test]
    fn square_residue_expands_in_lexical_tier() {
        assert_eq!(fallback_lexical("(x-2)^2"), "x^2-4x+4");
        assert_eq!(fallback_lexical("(x+1)^2"), "x^2+2x+1");
        assert_eq!(fallback_lexical("garbage("), "garbage(");
    }

    #[test]
    fn algebraic_tier_rejects_higher_degree() {
        assert!(try_algebraic("x^3").is_err());
        assert!(try_algebraic("x^2+x").is_ok());
        assert!(try_algebraic("3").is_ok());
    }
}

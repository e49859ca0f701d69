use crate::equivalence;
use crate::math::{approx_eq, MathError, Quadratic};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Sparse structured answer for a mission. Every field is kept as raw
/// JSON and coerced by its own rule, so a malformed value fails that one
/// check instead of the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionAnswer {
    pub vertex: Option<Value>,
    pub y_intercept: Option<Value>,
    pub roots: Option<Value>,
    pub concavity: Option<Value>,
    pub axis: Option<Value>,
    pub axis_of_symmetry: Option<Value>,
    pub range: Option<Value>,
    pub factored_form: Option<Value>,
    pub canonical_form: Option<Value>,
    pub max_min_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldCheck {
    pub ok: bool,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionCheck {
    pub ok: bool,
    pub details: BTreeMap<String, FieldCheck>,
}

fn as_num(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn num_matches(v: &Value, expected: f64) -> bool {
    as_num(v).map(|n| approx_eq(n, expected)).unwrap_or(false)
}

/// Case-insensitive infinity tokens accepted in range bounds; `null` and
/// the empty string also count as unbounded.
fn is_infinite(v: &Value, negative: bool) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if s.is_empty() {
                return true;
            }
            let (neg, rest) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.strip_prefix('+').unwrap_or(&s)),
            };
            neg == negative && matches!(rest, "∞" | "inf" | "infinito" | "infinity")
        }
        _ => false,
    }
}

fn check_roots(v: &Value, expected: &[f64]) -> bool {
    let user: Option<Vec<f64>> = match v {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items.iter().map(as_num).collect(),
        _ => None,
    };
    let Some(mut user) = user else {
        return false;
    };
    match expected.len() {
        0 => user.is_empty(),
        1 => user.iter().any(|x| approx_eq(*x, expected[0])),
        _ => {
            if user.len() != 2 {
                return false;
            }
            user.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
            approx_eq(user[0], expected[0]) && approx_eq(user[1], expected[1])
        }
    }
}

fn check_range(v: &Value, q: &Quadratic) -> bool {
    let Value::Array(bounds) = v else {
        return false;
    };
    if bounds.len() != 2 {
        return false;
    }
    let vertex_y = q.vertex().y;
    if q.a > 0.0 {
        num_matches(&bounds[0], vertex_y) && is_infinite(&bounds[1], false)
    } else {
        is_infinite(&bounds[0], true) && num_matches(&bounds[1], vertex_y)
    }
}

/// Literal comparison after lexical normalization. Deliberately strict:
/// the pedagogical goal of these fields is the specific spelling, not
/// algebraic equivalence.
fn check_literal(v: &Value, expected: &str) -> bool {
    v.as_str()
        .map(|s| equivalence::normalize(s) == equivalence::normalize(expected))
        .unwrap_or(false)
}

/// Score one structured submission against the mission's function. Only
/// fields present in the payload are checked; the aggregate is correct
/// iff every present field matches and at least one recognised field was
/// supplied.
pub fn validate_mission(func: &str, payload: &Value) -> Result<MissionCheck, MathError> {
    let q = Quadratic::parse(func)?;
    let answer: MissionAnswer = serde_json::from_value(payload.clone()).unwrap_or_default();
    let mut details = BTreeMap::new();

    if let Some(v) = &answer.vertex {
        let expected = q.vertex();
        let ok = v
            .get("x")
            .zip(v.get("y"))
            .map(|(x, y)| num_matches(x, expected.x) && num_matches(y, expected.y))
            .unwrap_or(false);
        details.insert(
            "vertex".to_string(),
            FieldCheck { ok, expected: json!({ "x": expected.x, "y": expected.y }), user: None },
        );
    }

    if let Some(v) = &answer.y_intercept {
        let expected = q.y_intercept();
        details.insert(
            "yIntercept".to_string(),
            FieldCheck { ok: num_matches(v, expected), expected: json!(expected), user: None },
        );
    }

    if let Some(v) = &answer.roots {
        let expected = q.roots();
        details.insert(
            "roots".to_string(),
            FieldCheck { ok: check_roots(v, &expected), expected: json!(expected), user: None },
        );
    }

    if let Some(v) = &answer.concavity {
        let expected = q.concavity();
        let ok = v.as_str().map(|s| s == expected.as_str()).unwrap_or(false);
        details.insert(
            "concavity".to_string(),
            FieldCheck { ok, expected: json!(expected), user: None },
        );
    }

    let expected_axis = q.axis_of_symmetry();
    if let Some(v) = &answer.axis {
        details.insert(
            "axis".to_string(),
            FieldCheck { ok: num_matches(v, expected_axis), expected: json!(expected_axis), user: None },
        );
    }
    if let Some(v) = &answer.axis_of_symmetry {
        details.insert(
            "axisOfSymmetry".to_string(),
            FieldCheck { ok: num_matches(v, expected_axis), expected: json!(expected_axis), user: None },
        );
    }

    if let Some(v) = &answer.range {
        let (lo, hi) = q.range();
        details.insert(
            "range".to_string(),
            FieldCheck { ok: check_range(v, &q), expected: json!([lo, hi]), user: None },
        );
    }

    if let Some(v) = &answer.factored_form {
        let expected = q.factored_form();
        details.insert(
            "factoredForm".to_string(),
            FieldCheck {
                ok: check_literal(v, &expected),
                expected: json!(expected),
                user: v.as_str().map(|s| json!(equivalence::normalize(s))),
            },
        );
    }

    if let Some(v) = &answer.canonical_form {
        let expected = q.canonical_form();
        details.insert(
            "canonicalForm".to_string(),
            FieldCheck {
                ok: check_literal(v, &expected),
                expected: json!(expected),
                user: v.as_str().map(|s| json!(equivalence::normalize(s))),
            },
        );
    }

    if let Some(v) = &answer.max_min_value {
        let expected = q.vertex().y;
        details.insert(
            "maxMinValue".to_string(),
            FieldCheck { ok: num_matches(v, expected), expected: json!(expected), user: None },
        );
    }

    // An empty or unrecognised payload must not clear a mission.
    let ok = !details.is_empty() && details.values().all(|d| d.ok);
    Ok(MissionCheck { ok, details })
}

/// Pedagogical keywords accepted as a valid justification of the final
/// answer (perfect-square factorization vocabulary).
const JUSTIFICATION_KEYWORDS: [&str; 5] =
    ["cuadrado perfecto", "raíz doble", "multiplicidad", "trinomio", "perfecto"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalCheck {
    pub ok: bool,
    pub eq_ok: bool,
    pub justification_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate the final free-response phase. Equivalence failures never
/// propagate: an unusable equation degrades to a negative result.
pub fn validate_final(
    target_polynomial: &str,
    equation: &str,
    justification: &str,
    require_justification: bool,
) -> FinalCheck {
    let justification_ok = if require_justification {
        let lowered = justification.to_lowercase();
        JUSTIFICATION_KEYWORDS.iter().any(|k| lowered.contains(k))
    } else {
        true
    };

    if equation.trim().is_empty() {
        return FinalCheck {
            ok: false,
            eq_ok: false,
            justification_ok,
            error: Some("empty equation".to_string()),
        };
    }

    let eq_ok = equivalence::equivalent(equation, target_polynomial);
    FinalCheck { ok: eq_ok && justification_ok, eq_ok, justification_ok, error: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_check_against_analytic_vertex() {
        let result =
            validate_mission("x^2+4x+3", &json!({ "vertex": { "x": -2, "y": -1 } })).unwrap();
        assert!(result.ok);
        assert!(result.details["vertex"].ok);

        let wrong =
            validate_mission("x^2+4x+3", &json!({ "vertex": { "x": -2, "y": 0 } })).unwrap();
        assert!(!wrong.ok);
    }

    #[test]
    fn only_present_fields_are_checked() {
        let result = validate_mission(
            "x^2-6x+8",
            &json!({ "roots": [4, 2], "concavity": "up" }),
        )
        .unwrap();
        assert!(result.ok);
        assert_eq!(result.details.len(), 2);
        assert!(!result.details.contains_key("vertex"));
    }

    #[test]
    fn empty_payload_is_not_correct() {
        let result = validate_mission("x^2-6x+8", &json!({})).unwrap();
        assert!(!result.ok);
        assert!(result.details.is_empty());
    }

    #[test]
    fn root_policies_by_discriminant() {
        // Two roots: order-independent, both required.
        let ok = validate_mission("x^2-6x+8", &json!({ "roots": [4, 2] })).unwrap();
        assert!(ok.details["roots"].ok);
        let missing = validate_mission("x^2-6x+8", &json!({ "roots": [2] })).unwrap();
        assert!(!missing.details["roots"].ok);

        // Double root: one matching entry suffices.
        let double = validate_mission("x^2-4x+4", &json!({ "roots": [2, 2] })).unwrap();
        assert!(double.details["roots"].ok);

        // No real roots: empty or absent payload roots required.
        let none = validate_mission("x^2+1", &json!({ "roots": [] })).unwrap();
        assert!(none.details["roots"].ok);
        let phantom = validate_mission("x^2+1", &json!({ "roots": [1] })).unwrap();
        assert!(!phantom.details["roots"].ok);
    }

    #[test]
    fn malformed_values_fail_their_own_check_only() {
        let result = validate_mission(
            "x^2-6x+8",
            &json!({ "yIntercept": "ocho", "concavity": "up" }),
        )
        .unwrap();
        assert!(!result.ok);
        assert!(!result.details["yIntercept"].ok);
        assert!(result.details["concavity"].ok);
    }

    #[test]
    fn range_accepts_infinity_tokens() {
        // Upward parabola, vertex y = -1.
        for hi in [json!(null), json!("∞"), json!("inf"), json!("INFINITO"), json!("")] {
            let r = validate_mission("x^2-6x+8", &json!({ "range": [-1, hi] })).unwrap();
            assert!(r.details["range"].ok, "rejected upper bound {hi:?}");
        }
        // Wrong sign token on the unbounded side.
        let r = validate_mission("x^2-6x+8", &json!({ "range": [-1, "-inf"] })).unwrap();
        assert!(!r.details["range"].ok);

        // Downward parabola, vertex y = 1.
        let r = validate_mission("-x^2+4x-3", &json!({ "range": ["-infinito", 1] })).unwrap();
        assert!(r.details["range"].ok);
        let r = validate_mission("-x^2+4x-3", &json!({ "range": [1, "inf"] })).unwrap();
        assert!(!r.details["range"].ok);
    }

    #[test]
    fn factored_form_is_literal_not_algebraic() {
        let ok = validate_mission("x^2-6x+8", &json!({ "factoredForm": "(X - 2)(X - 4)" }))
            .unwrap();
        assert!(ok.details["factoredForm"].ok);

        // Algebraically equivalent but differently spelled: rejected.
        let swapped =
            validate_mission("x^2-6x+8", &json!({ "factoredForm": "(x-4)(x-2)" })).unwrap();
        assert!(!swapped.details["factoredForm"].ok);

        let canonical =
            validate_mission("2x^2-8x+6", &json!({ "canonicalForm": "2(x-2)^2 - 2" })).unwrap();
        assert!(canonical.details["canonicalForm"].ok);
    }

    #[test]
    fn max_min_value_is_vertex_y() {
        let r = validate_mission("2x^2-8x+6", &json!({ "maxMinValue": -2 })).unwrap();
        assert!(r.details["maxMinValue"].ok);
        let r = validate_mission("-x^2+4x-3", &json!({ "maxMinValue": 1, "axisOfSymmetry": 2 }))
            .unwrap();
        assert!(r.ok);
    }

    #[test]
    fn unparseable_mission_function_is_an_error() {
        assert!(validate_mission("??", &json!({ "vertex": {"x": 0, "y": 0} })).is_err());
    }

    #[test]
    fn final_equivalence_and_justification_gate() {
        let r = validate_final("x^2-4x+4", "(x-2)^2", "es un cuadrado perfecto", true);
        assert!(r.ok && r.eq_ok && r.justification_ok);

        let wrong_eq = validate_final("x^2-4x+4", "x^2-4x+3", "cuadrado perfecto", true);
        assert!(!wrong_eq.ok && !wrong_eq.eq_ok);

        let no_keywords = validate_final("x^2-4x+4", "x^2-4x+4", "porque sí", true);
        assert!(!no_keywords.ok && no_keywords.eq_ok && !no_keywords.justification_ok);

        // Policy off: justification is armor text.
        let relaxed = validate_final("x^2-4x+4", "(x-2)^2", "", false);
        assert!(relaxed.ok && relaxed.justification_ok);
    }

    #[test]
    fn final_never_panics_on_garbage() {
        let r = validate_final("x^2-4x+4", ")(", "multiplicidad", true);
        assert!(!r.ok && !r.eq_ok);
        let empty = validate_final("x^2-4x+4", "   ", "multiplicidad", true);
        assert!(!empty.ok);
        assert!(empty.error.is_some());
    }
}

use crate::math::{Concavity, MathError, Quadratic};
use crate::models::{FinalTarget, Mission, PhaseKey};
use serde::{Deserialize, Serialize};

/// Named difficulty bundle: three mission functions plus a final target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EquationSet {
    #[default]
    Basic,
    Intermediate,
    Advanced,
}

impl EquationSet {
    pub const ALL: [EquationSet; 3] =
        [EquationSet::Basic, EquationSet::Intermediate, EquationSet::Advanced];

    pub fn key(self) -> &'static str {
        match self {
            EquationSet::Basic => "basic",
            EquationSet::Intermediate => "intermediate",
            EquationSet::Advanced => "advanced",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EquationSet::Basic => "Básico",
            EquationSet::Intermediate => "Intermedio",
            EquationSet::Advanced => "Avanzado",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EquationSet::Basic => "Ecuaciones simples para principiantes",
            EquationSet::Intermediate => "Ecuaciones de dificultad media",
            EquationSet::Advanced => "Ecuaciones complejas para estudiantes avanzados",
        }
    }

    fn functions(self) -> [&'static str; 3] {
        match self {
            EquationSet::Basic => ["-x^2+4x-3", "x^2-6x+8", "2x^2-8x+6"],
            EquationSet::Intermediate => ["x^2-2x-3", "-2x^2+4x+6", "x^2-4x+4"],
            EquationSet::Advanced => ["3x^2-12x+9", "-x^2+6x-5", "x^2-8x+15"],
        }
    }
}

fn direction(q: &Quadratic) -> &'static str {
    match q.concavity() {
        Concavity::Up => "arriba",
        Concavity::Down => "abajo",
    }
}

fn b_sign(q: &Quadratic) -> &'static str {
    if q.b < 0.0 {
        "negativo"
    } else {
        "positivo"
    }
}

fn width(q: &Quadratic) -> &'static str {
    if q.a.abs() > 1.0 {
        "estrecha"
    } else {
        "normal"
    }
}

fn range_text(q: &Quadratic) -> String {
    let v = q.vertex();
    match q.concavity() {
        Concavity::Up => format!("[{}, ∞)", v.y),
        Concavity::Down => format!("(-∞, {}]", v.y),
    }
}

fn roots_text(q: &Quadratic) -> String {
    let roots: Vec<String> = q.roots().iter().map(|r| format!("{r}")).collect();
    roots.join(", ")
}

fn build_mission(key: PhaseKey, func: &str) -> Result<Mission, MathError> {
    let q = Quadratic::parse(func)?;
    let v = q.vertex();
    let (name, description, hints) = match key {
        PhaseKey::M1 => (
            "Misión 1: Detectives de la Parábola".to_string(),
            format!("Analiza la parábola f(x) = {func}. Encuentra sus propiedades fundamentales."),
            vec![
                format!(
                    "🔍 Pista 1: El coeficiente principal es {}, por lo que la parábola abre hacia {}.",
                    q.a,
                    direction(&q)
                ),
                format!(
                    "📍 Pista 2: Para encontrar el vértice, usa la fórmula x = -b/(2a). Con a = {} y b = {}, el vértice está en x = {}.",
                    q.a, q.b, v.x
                ),
                format!(
                    "🎯 Pista 3: Las raíces son los puntos donde la función cruza el eje x (y = 0). Factoriza: {} = {}.",
                    func,
                    q.factored_form()
                ),
            ],
        ),
        PhaseKey::M2 => (
            "Misión 2: Formas de la Parábola".to_string(),
            format!("Estudia la parábola f(x) = {func}. Determina su forma y propiedades."),
            vec![
                format!(
                    "🔍 Pista 1: El coeficiente principal es {}. El término cuadrático es x².",
                    q.a
                ),
                format!(
                    "📍 Pista 2: El número que acompaña a x es {}; si duplicas la raíz secreta la obtienes.",
                    b_sign(&q)
                ),
                format!(
                    "🎯 Pista 3: El término independiente es el cuadrado de la raíz secreta. Factoriza: {} = {}.",
                    func,
                    q.factored_form()
                ),
            ],
        ),
        PhaseKey::M3 => (
            "Misión 3: Grafiquen la Salvación".to_string(),
            format!(
                "Analiza la parábola f(x) = {func}. Determina los puntos clave de su gráfica y comportamiento."
            ),
            vec![
                format!("🔍 Pista 1: Factoriza primero: {} = {}.", func, q.factored_form()),
                format!(
                    "📍 Pista 2: El coeficiente {} hace que la parábola sea más \"{}\" que x². El vértice está en x = {}.",
                    q.a,
                    width(&q),
                    v.x
                ),
                format!(
                    "🎯 Pista 3: Identifica el vértice ({}, {}), las raíces ({}) y el comportamiento en los extremos. El rango es {}.",
                    v.x,
                    v.y,
                    roots_text(&q),
                    range_text(&q)
                ),
            ],
        ),
        PhaseKey::Final => unreachable!("final phase has no mission template"),
    };
    Ok(Mission { key, name, func: func.to_string(), description, hints })
}

/// The ordered mission list for a difficulty set.
pub fn seed_missions(set: EquationSet) -> Result<Vec<Mission>, MathError> {
    let [f1, f2, f3] = set.functions();
    Ok(vec![
        build_mission(PhaseKey::M1, f1)?,
        build_mission(PhaseKey::M2, f2)?,
        build_mission(PhaseKey::M3, f3)?,
    ])
}

/// The final-phase target polynomial for a difficulty set, with its
/// public hints.
pub fn final_target(set: EquationSet) -> Result<FinalTarget, MathError> {
    let (polynomial, description, hints) = match set {
        EquationSet::Basic => (
            "x^2-4x+4",
            "Fase Final: El Cuadrado Perfecto",
            vec![
                "Observa que el polinomio buscado es un cuadrado perfecto.".to_string(),
                "El número que acompaña a x es negativo; si duplicas la raíz secreta la obtienes.".to_string(),
                "El término independiente es el cuadrado de la raíz secreta.".to_string(),
            ],
        ),
        EquationSet::Intermediate => (
            "x^2-2x+1",
            "Fase Final: El Cuadrado Perfecto (Intermedio)",
            vec![
                "Observa que esta ecuación tiene una forma especial.".to_string(),
                "Recuerda que hay expresiones que se pueden escribir como el cuadrado de un binomio.".to_string(),
                "¿Qué número al cuadrado da 1, y qué número multiplicado por 2 da 2?".to_string(),
            ],
        ),
        EquationSet::Advanced => (
            "x^2-6x+9",
            "Fase Final: El Cuadrado Perfecto (Avanzado)",
            vec![
                "Observa que esta ecuación tiene una forma especial.".to_string(),
                "Recuerda que hay expresiones que se pueden escribir como el cuadrado de un binomio.".to_string(),
                "¿Qué número al cuadrado da 9, y qué número multiplicado por 2 da 6?".to_string(),
            ],
        ),
    };
    let q = Quadratic::parse(polynomial)?;
    Ok(FinalTarget {
        polynomial: polynomial.to_string(),
        factored: q.factored_form(),
        description: description.to_string(),
        hints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_set_seeds_three_missions_in_order() {
        for set in EquationSet::ALL {
            let missions = seed_missions(set).unwrap();
            assert_eq!(missions.len(), 3);
            assert_eq!(missions[0].key, PhaseKey::M1);
            assert_eq!(missions[1].key, PhaseKey::M2);
            assert_eq!(missions[2].key, PhaseKey::M3);
            for m in &missions {
                assert!(Quadratic::parse(&m.func).is_ok(), "unparseable {}", m.func);
                assert_eq!(m.hints.len(), 3);
                assert!(m.description.contains(&m.func));
            }
        }
    }

    #[test]
    fn final_targets_are_perfect_squares() {
        for set in EquationSet::ALL {
            let target = final_target(set).unwrap();
            let q = Quadratic::parse(&target.polynomial).unwrap();
            assert_eq!(q.roots().len(), 1, "{} is not a double root", target.polynomial);
            assert!(target.factored.ends_with("^2"));
            assert!(!target.hints.is_empty());
        }
    }

    #[test]
    fn basic_factored_hint_matches_content_spelling() {
        let missions = seed_missions(EquationSet::Basic).unwrap();
        assert!(missions[0].hints[2].contains("-(x-1)(x-3)"));
        assert!(missions[1].hints[2].contains("(x-2)(x-4)"));
        assert!(missions[2].hints[0].contains("2(x-1)(x-3)"));
    }

    #[test]
    fn set_catalog_metadata() {
        assert_eq!(EquationSet::Basic.key(), "basic");
        assert_eq!(
            serde_json::from_str::<EquationSet>("\"advanced\"").unwrap(),
            EquationSet::Advanced
        );
    }
}

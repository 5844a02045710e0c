//! Dropout risk analysis from questionnaire responses.
//!
//! A form response is a flat JSON object whose `q_<construct>[_n]` keys hold
//! 1 to 5 Likert answers. The generator is asked to score five constructs,
//! apply a fixed weighted formula, and explain its reasoning as JSON. Its
//! output is validated strictly: anything unparsable or internally
//! inconsistent is rejected rather than repaired.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// Risk band derived from a dropout probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Probability in `[0.00, 0.30]`.
    Low,
    /// Probability in `(0.30, 0.60]`.
    Moderate,
    /// Probability in `(0.60, 1.00]`.
    High,
}

impl RiskLevel {
    /// The band containing `probability`.
    pub fn from_probability(probability: f64) -> Self {
        if probability <= 0.30 {
            Self::Low
        } else if probability <= 0.60 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        })
    }
}

/// A validated risk assessment for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoutAnalysis {
    /// Estimated probability of dropping out, in `[0, 1]`.
    pub dropout_probability: f64,
    /// The band `dropout_probability` falls in.
    pub risk_level: RiskLevel,
    /// Factors behind the estimate, each citing the answers it came from.
    pub psychological_reasons: Vec<String>,
    /// Protective factors seen in the answers.
    pub student_strengths: Vec<String>,
    /// Suggested support actions.
    pub recommended_interventions: Vec<String>,
}

/// Normalized construct scores in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstructScores {
    /// From `q_motivation*` answers.
    pub motivation: f64,
    /// From `q_stress*` answers; higher means more stressed.
    pub stress: f64,
    /// From `q_self_efficacy*` answers.
    pub self_efficacy: f64,
    /// From `q_engagement*` answers.
    pub engagement: f64,
    /// From `q_goal_clarity*` answers.
    pub goal_clarity: f64,
}

impl ConstructScores {
    /// Score assumed for a construct with no answers.
    pub const NEUTRAL: f64 = 0.5;

    /// Average each construct's numeric answers and map 1..=5 onto 0..=1.
    ///
    /// Non-numeric values are ignored; out-of-range answers are clamped.
    pub fn from_form(form: &Map<String, Value>) -> Self {
        let score = |construct: &str| {
            let exact = format!("q_{construct}");
            let prefix = format!("q_{construct}_");
            let answers: Vec<f64> = form
                .iter()
                .filter(|(key, _)| **key == exact || key.starts_with(&prefix))
                .filter_map(|(_, value)| answer_value(value))
                .collect();
            if answers.is_empty() {
                return Self::NEUTRAL;
            }
            let mean = answers.iter().sum::<f64>() / answers.len() as f64;
            (mean.clamp(1.0, 5.0) - 1.0) / 4.0
        };

        Self {
            motivation: score("motivation"),
            stress: score("stress"),
            self_efficacy: score("self_efficacy"),
            engagement: score("engagement"),
            goal_clarity: score("goal_clarity"),
        }
    }

    /// The weighted dropout probability, clamped and rounded to two decimals.
    pub fn dropout_probability(&self) -> f64 {
        let base = 0.35 * (1.0 - self.motivation)
            + 0.30 * self.stress
            + 0.20 * (1.0 - self.self_efficacy)
            + 0.10 * (1.0 - self.engagement)
            + 0.05 * (1.0 - self.goal_clarity);
        (base.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }
}

fn answer_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

const SYSTEM_PROMPT: &str = r#"You are an educational psychologist. You receive RAW_FORM_RESPONSE_JSON (a JSON object).
You MUST do the following exactly:

1) Compute normalized construct scores (0.0 - 1.0) for these constructs:
   motivation, stress, self_efficacy, engagement, goal_clarity.
   Average the 1-5 answers of every q_<construct> or q_<construct>_<n> key and map 1..5 onto 0..1.
   If a construct has no answers, assume 0.5.

2) Compute dropout_probability with this deterministic formula (no deviation):
   base = 0.35 * (1 - motivation)
        + 0.30 * stress
        + 0.20 * (1 - self_efficacy)
        + 0.10 * (1 - engagement)
        + 0.05 * (1 - goal_clarity)
   dropout_probability = clamp(base, 0.0, 1.0), rounded to 2 decimal places.

3) Derive risk_level from dropout_probability:
   [0.00, 0.30] -> "Low"
   (0.30, 0.60] -> "Moderate"
   (0.60, 1.00] -> "High"

4) Provide psychological_reasons. Each reason MUST cite the exact input key or raw
   snippet that motivated it, e.g. "q_family_pressure -> 'My parents want me to marry soon.' indicates family pressure".

5) Output ONLY a JSON object with exactly these keys: dropout_probability, risk_level,
   psychological_reasons, student_strengths, recommended_interventions. No commentary.
"#;

const FEW_SHOT: &str = r#"Example 1 INPUT:
{ "q_motivation_1": 5, "q_motivation_2": 4, "q_stress_1": 1, "q_goal_clarity": 5 }

Example 1 OUTPUT:
{
  "dropout_probability": 0.19,
  "risk_level": "Low",
  "psychological_reasons": ["q_stress_1 -> '1' indicates low stress", "q_motivation_1 -> '5' indicates high motivation"],
  "student_strengths": ["High motivation", "Clear goals"],
  "recommended_interventions": ["Periodic mentor check-ins"]
}

Example 2 INPUT:
{ "q_motivation_1": 2, "q_stress_1": 5, "q_self_efficacy_1": 2, "q_goal_clarity": 1 }

Example 2 OUTPUT:
{
  "dropout_probability": 0.81,
  "risk_level": "High",
  "psychological_reasons": ["q_stress_1 -> '5' indicates high stress", "q_motivation_1 -> '2' indicates low motivation", "q_goal_clarity -> '1' indicates poor goal clarity"],
  "student_strengths": ["None clearly stated"],
  "recommended_interventions": ["Immediate counselling for stress", "Mentor assigned weekly"]
}
"#;

/// Build the full analysis prompt for one form response.
pub fn build_analysis_prompt(form: &Map<String, Value>) -> String {
    let form_json = serde_json::to_string_pretty(form).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{SYSTEM_PROMPT}\n{FEW_SHOT}\n\
         Here is the RAW_FORM_RESPONSE_JSON. Compute construct scores, apply the exact formula \
         above, and return ONLY the JSON object.\n\
         \n\
         RAW_FORM_RESPONSE_JSON:\n\
         {form_json}\n"
    )
}

/// Parse and validate generator output as a [`DropoutAnalysis`].
///
/// The outermost `{...}` span is extracted so surrounding prose or code
/// fences are tolerated; nothing else is.
pub fn parse_analysis(raw: &str) -> Result<DropoutAnalysis> {
    let malformed = |message: String| RagError::MalformedUpstreamOutput {
        message,
        raw: raw.to_string(),
    };

    let json = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return Err(malformed("no JSON object in output".into())),
    };
    let analysis: DropoutAnalysis =
        serde_json::from_str(json).map_err(|e| malformed(format!("invalid analysis JSON: {e}")))?;

    let p = analysis.dropout_probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(malformed(format!("dropout_probability {p} is outside [0, 1]")));
    }
    let expected = RiskLevel::from_probability(p);
    if analysis.risk_level != expected {
        return Err(malformed(format!(
            "risk_level {} does not match dropout_probability {p} (expected {expected})",
            analysis.risk_level
        )));
    }
    Ok(analysis)
}

/// The result for one student in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOutcome {
    /// The form's `student_id`, or `student_{n}` by 1-based position.
    pub student_id: String,
    /// The analysis or the reason it failed.
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

/// Success or failure of one student's analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    /// The validated analysis.
    Analysis(DropoutAnalysis),
    /// Why this student's analysis failed.
    Error {
        /// The error message.
        error: String,
    },
}

/// Runs dropout risk analyses with a [`TextGenerator`].
pub struct RiskAnalyzer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl RiskAnalyzer {
    /// Create an analyzer with a 60 second timeout per generator call.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, timeout: Duration::from_secs(60) }
    }

    /// Bound each generator call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Analyze one form response.
    ///
    /// # Errors
    ///
    /// - [`RagError::SynthesisError`] if the generator fails or times out.
    /// - [`RagError::MalformedUpstreamOutput`] if its output does not validate.
    pub async fn analyze(&self, form: &Map<String, Value>) -> Result<DropoutAnalysis> {
        let prompt = build_analysis_prompt(form);
        let raw = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| RagError::SynthesisError {
                provider: self.generator.model_id().to_string(),
                message: format!("request timed out after {}s", self.timeout.as_secs_f32()),
            })??;
        let analysis = parse_analysis(&raw)?;

        let formula = ConstructScores::from_form(form).dropout_probability();
        if (formula - analysis.dropout_probability).abs() > 0.01 {
            debug!(
                reported = analysis.dropout_probability,
                formula, "generator probability differs from the formula"
            );
        }
        Ok(analysis)
    }

    /// Analyze every form in order. A failure is recorded against its
    /// student and never stops the batch.
    pub async fn analyze_batch(&self, forms: &[Map<String, Value>]) -> Vec<StudentOutcome> {
        let mut outcomes = Vec::with_capacity(forms.len());
        for (i, form) in forms.iter().enumerate() {
            let student_id = student_id(form, i + 1);
            let outcome = match self.analyze(form).await {
                Ok(analysis) => AnalysisOutcome::Analysis(analysis),
                Err(e) => {
                    warn!(student_id = %student_id, error = %e, "student analysis failed");
                    AnalysisOutcome::Error { error: e.to_string() }
                }
            };
            outcomes.push(StudentOutcome { student_id, outcome });
        }
        info!(count = outcomes.len(), "batch analysis complete");
        outcomes
    }
}

fn student_id(form: &Map<String, Value>, position: usize) -> String {
    match form.get("student_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("student_{position}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn form(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn risk_bands_are_closed_on_the_right() {
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.30), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.31), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.60), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.61), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(1.0), RiskLevel::High);
    }

    #[test]
    fn construct_scores_follow_the_formula() {
        let low = form(json!({
            "q_motivation_1": 5, "q_motivation_2": 4, "q_stress_1": 1, "q_goal_clarity": 5
        }));
        let scores = ConstructScores::from_form(&low);
        assert_eq!(scores.motivation, 0.875);
        assert_eq!(scores.stress, 0.0);
        assert_eq!(scores.self_efficacy, ConstructScores::NEUTRAL);
        assert_eq!(scores.dropout_probability(), 0.19);

        let high = form(json!({
            "q_motivation_1": 2, "q_stress_1": 5, "q_self_efficacy_1": 2, "q_goal_clarity": 1
        }));
        assert_eq!(ConstructScores::from_form(&high).dropout_probability(), 0.81);
    }

    #[test]
    fn unrelated_keys_do_not_leak_into_constructs() {
        let scores = ConstructScores::from_form(&form(json!({
            "q_stressful_events": 5, "q_stress_2": "3", "student_id": "s-9"
        })));
        assert_eq!(scores.stress, 0.5);
        assert_eq!(scores.motivation, ConstructScores::NEUTRAL);
    }

    #[test]
    fn parse_extracts_the_outer_object() {
        let raw = "```json\n{\"dropout_probability\": 0.45, \"risk_level\": \"Moderate\", \
                   \"psychological_reasons\": [\"q_stress_1 -> '4'\"], \"student_strengths\": [], \
                   \"recommended_interventions\": [\"Counselling\"]}\n```";
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::Moderate);
        assert_eq!(analysis.recommended_interventions, ["Counselling"]);
    }

    #[test]
    fn parse_rejects_inconsistent_or_missing_output() {
        let inconsistent = r#"{"dropout_probability": 0.9, "risk_level": "Low",
            "psychological_reasons": [], "student_strengths": [], "recommended_interventions": []}"#;
        let out_of_range = r#"{"dropout_probability": 1.4, "risk_level": "High",
            "psychological_reasons": [], "student_strengths": [], "recommended_interventions": []}"#;

        for raw in [inconsistent, out_of_range, "I cannot help with that.", "{ nope }"] {
            match parse_analysis(raw) {
                Err(RagError::MalformedUpstreamOutput { raw: kept, .. }) => assert_eq!(kept, raw),
                other => panic!("expected MalformedUpstreamOutput for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn batch_outcome_serializes_flat() {
        let failed = StudentOutcome {
            student_id: "s1".into(),
            outcome: AnalysisOutcome::Error { error: "boom".into() },
        };
        assert_eq!(serde_json::to_value(&failed).unwrap(), json!({"student_id": "s1", "error": "boom"}));
    }

    #[test]
    fn student_id_defaults_to_position() {
        assert_eq!(student_id(&form(json!({"student_id": "A12"})), 1), "A12");
        assert_eq!(student_id(&form(json!({"student_id": 7})), 1), "7");
        assert_eq!(student_id(&form(json!({})), 3), "student_3");
    }
}

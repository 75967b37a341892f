use serde::Serialize;

use crate::error::InvalidProbabilityError;

/// Decision boundary between the two verdicts.
pub const THRESHOLD: f64 = 0.5;

const DISCLAIMER: &str =
    "This is an AI-assisted analysis. Consult a doctor for a professional diagnosis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    #[serde(rename = "Pneumonia")]
    Positive,
    #[serde(rename = "Normal")]
    Negative,
}

impl Verdict {
    fn interpretation(self) -> &'static str {
        match self {
            Verdict::Positive => "High likelihood of pneumonia detected",
            Verdict::Negative => "No signs of pneumonia detected",
        }
    }

    fn recommendation(self) -> &'static str {
        match self {
            Verdict::Positive => "Consult a healthcare professional",
            Verdict::Negative => "No immediate concern",
        }
    }
}

/// Response body of a successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticResult {
    #[serde(rename = "result")]
    pub verdict: Verdict,
    pub probability: f64,
    pub confidence: String,
    pub interpretation: &'static str,
    pub recommendation: &'static str,
    #[serde(rename = "note")]
    pub disclaimer: &'static str,
}

/// Maps a positive-class probability to a verdict.
///
/// Positive only when `probability > threshold`. Confidence is reported
/// toward the chosen verdict, so a negative result shows `1 - probability`.
pub fn interpret(
    probability: f64,
    threshold: f64,
) -> Result<DiagnosticResult, InvalidProbabilityError> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(InvalidProbabilityError(probability));
    }

    let verdict = if probability > threshold {
        Verdict::Positive
    } else {
        Verdict::Negative
    };
    let toward_verdict = match verdict {
        Verdict::Positive => probability,
        Verdict::Negative => 1.0 - probability,
    };

    Ok(DiagnosticResult {
        verdict,
        probability,
        confidence: format!("{:.2}%", toward_verdict * 100.0),
        interpretation: verdict.interpretation(),
        recommendation: verdict.recommendation(),
        disclaimer: DISCLAIMER,
    })
}

//! Optional LLM assessment of a retrieved candidate.
//!
//! Assessment is advisory: a failed call becomes a warning text on the hit and never
//! fails the search it decorates.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm_client::{GenerateOptions, LlmClient};
use crate::models::profile::Profile;
use crate::profiles::prompts::assessment_prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Idoneo,
    DaValutare,
    NonIdoneo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAssessment {
    /// Model answer, or a warning when the call failed.
    pub text: String,
    pub score: Option<u8>,
    pub verdict: Option<Verdict>,
    pub available: bool,
}

static SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)VALUTAZIONE\W*(\d{1,3})").expect("valid regex")
});

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ESITO\W*(NON[_ ]IDONEO|DA[_ ]VALUTARE|IDONEO)").expect("valid regex")
});

/// Pulls the 0-100 score and the verdict out of a free-text assessment.
pub fn parse_assessment(text: &str) -> (Option<u8>, Option<Verdict>) {
    let score = SCORE
        .captures(text)
        .and_then(|c| c[1].parse::<u16>().ok())
        .map(|s| s.min(100) as u8);

    let verdict = VERDICT.captures(text).map(|c| {
        let word = c[1].to_uppercase().replace(' ', "_");
        match word.as_str() {
            "NON_IDONEO" => Verdict::NonIdoneo,
            "DA_VALUTARE" => Verdict::DaValutare,
            _ => Verdict::Idoneo,
        }
    });

    (score, verdict)
}

pub async fn assess_candidate(
    llm: &LlmClient,
    profile: &Profile,
    query: &str,
    similarity: f32,
) -> CandidateAssessment {
    let prompt = assessment_prompt(profile, query, similarity);
    match llm.generate(&prompt, &GenerateOptions::assessment()).await {
        Ok(text) => {
            let (score, verdict) = parse_assessment(&text);
            CandidateAssessment {
                text: text.trim().to_string(),
                score,
                verdict,
                available: true,
            }
        }
        Err(e) => {
            warn!(candidate = %profile.name, "candidate assessment failed: {e}");
            CandidateAssessment {
                text: format!("Analisi LLM non disponibile: {e}"),
                score: None,
                verdict: None,
                available: false,
            }
        }
    }
}

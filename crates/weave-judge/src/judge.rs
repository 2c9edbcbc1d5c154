use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use weave_core::{Message, ServiceError};
use weave_llm::LLMProvider;

use crate::config::JudgeConfig;

const DEFAULT_PASS_THRESHOLD: f64 = 80.0;

/// The material a judge scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub query: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Per-judge verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub judge_id: String,
    pub judge_name: String,
    /// 0..=100
    pub overall_score: f64,
    /// "PASS" or "FAIL"
    pub verdict: String,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub dimension_scores: HashMap<String, f64>,
    pub execution_time_ms: u64,
    pub cost_usd: f64,
}

/// Drives one provider call per evaluation and parses the structured
/// verdict out of the model output.
pub struct LLMJudge {
    config: JudgeConfig,
    provider: Arc<dyn LLMProvider>,
}

impl LLMJudge {
    pub fn new(config: JudgeConfig, provider: Arc<dyn LLMProvider>) -> Self {
        Self { config, provider }
    }

    pub async fn evaluate(&self, context: &EvaluationContext) -> Result<JudgeResult, ServiceError> {
        let started = Instant::now();
        let messages = vec![
            Message::system(self.rubric_prompt()),
            Message::user(evaluation_prompt(context)),
        ];

        let response = self
            .provider
            .chat(&messages, &[])
            .await
            .map_err(|e| ServiceError::internal(format!("judge '{}': {}", self.config.id, e)))?;

        let threshold = self.config.pass_threshold.unwrap_or(DEFAULT_PASS_THRESHOLD);
        let raw = parse_verdict(&response.content);
        let overall_score = raw.overall_score.unwrap_or(0.0).clamp(0.0, 100.0);
        let verdict = match raw.verdict {
            Some(v) if v.eq_ignore_ascii_case("pass") => "PASS".to_string(),
            Some(_) => "FAIL".to_string(),
            None if overall_score >= threshold => "PASS".to_string(),
            None => "FAIL".to_string(),
        };

        Ok(JudgeResult {
            judge_id: self.config.id.clone(),
            judge_name: self.config.name.clone(),
            overall_score,
            verdict,
            reasoning: raw.reasoning.unwrap_or_default(),
            suggestions: raw.suggestions.unwrap_or_default(),
            dimension_scores: raw.dimension_scores.unwrap_or_default(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            cost_usd: response.usage.cost_usd,
        })
    }

    fn rubric_prompt(&self) -> String {
        format!(
            "You are '{}', an evaluation judge. Score the assistant response \
             against these criteria:\n{}\n\
             Reply with a single JSON object: {{\"overall_score\": 0-100, \
             \"verdict\": \"PASS\"|\"FAIL\", \"reasoning\": string, \
             \"suggestions\": [string], \"dimension_scores\": {{name: 0-100}}}}",
            self.config.name, self.config.criteria
        )
    }
}

fn evaluation_prompt(context: &EvaluationContext) -> String {
    let mut prompt = format!(
        "User query:\n{}\n\nAssistant response:\n{}\n",
        context.query, context.response
    );
    if let Some(expected) = context.expected.as_ref() {
        prompt.push_str(&format!("\nExpected answer:\n{}\n", expected));
    }
    prompt
}

#[derive(Debug, Default, Deserialize)]
struct RawVerdict {
    overall_score: Option<f64>,
    verdict: Option<String>,
    reasoning: Option<String>,
    suggestions: Option<Vec<String>>,
    dimension_scores: Option<HashMap<String, f64>>,
}

/// Lenient parse: take the outermost JSON object in the text, tolerate
/// missing fields. Models wrap verdicts in prose often enough that a strict
/// parse would fail most evaluations.
fn parse_verdict(content: &str) -> RawVerdict {
    let start = match content.find('{') {
        Some(idx) => idx,
        None => return RawVerdict::default(),
    };
    let end = match content.rfind('}') {
        Some(idx) if idx > start => idx,
        _ => return RawVerdict::default(),
    };
    serde_json::from_str(&content[start..=end]).unwrap_or_default()
}

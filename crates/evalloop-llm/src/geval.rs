//! Criteria-based LLM grading (G-Eval).
//!
//! The metric turns a free-text criteria into a short list of evaluation
//! steps (once, then cached), and asks the model to score each test case
//! against those steps on a 0-10 scale. Scores are normalized to `[0, 1]`.

use std::sync::Arc;

use async_trait::async_trait;
use evalloop_core::{AgentError, EvalParam, Grade, Grader, TestCase};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::ChatModel;

const MAX_RAW_SCORE: f64 = 10.0;
const DEFAULT_THRESHOLD: f64 = 0.5;

/// Result of measuring one test case.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOutcome {
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    pub reason: String,
    /// `score >= threshold`.
    pub success: bool,
}

pub struct GEvalMetric {
    name: String,
    criteria: String,
    evaluation_params: Vec<EvalParam>,
    evaluation_steps: OnceCell<Vec<String>>,
    threshold: f64,
    model: Arc<dyn ChatModel>,
}

impl std::fmt::Debug for GEvalMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GEvalMetric")
            .field("name", &self.name)
            .field("criteria", &self.criteria)
            .field("evaluation_params", &self.evaluation_params)
            .field("model", &self.model.model_name())
            .finish()
    }
}

#[derive(Deserialize)]
struct StepsReply {
    steps: Vec<String>,
}

#[derive(Deserialize)]
struct VerdictReply {
    score: f64,
    reason: String,
}

impl GEvalMetric {
    pub fn new(
        name: impl Into<String>,
        criteria: impl Into<String>,
        evaluation_params: Vec<EvalParam>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            name: name.into(),
            criteria: criteria.into(),
            evaluation_params,
            evaluation_steps: OnceCell::new(),
            threshold: DEFAULT_THRESHOLD,
            model,
        }
    }

    /// The banking-relevance correctness metric used by the judge.
    pub fn correctness(model: Arc<dyn ChatModel>) -> Self {
        Self::new(
            "Correctness",
            "Correctness - determine if the actual output is related to banking.",
            vec![EvalParam::ActualOutput],
            model,
        )
    }

    /// Skips step generation and grades against the given steps.
    pub fn with_steps(self, steps: Vec<String>) -> Self {
        Self { evaluation_steps: OnceCell::new_with(Some(steps)), ..self }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn criteria(&self) -> &str {
        &self.criteria
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn measure(&self, case: &TestCase) -> Result<MetricOutcome, AgentError> {
        let rendered = self.render_case(case)?;
        let steps = self.steps().await?;

        let mut prompt = String::from("Evaluation Steps:\n");
        for (i, step) in steps.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, step));
        }
        prompt.push('\n');
        prompt.push_str(&rendered);

        let response = self.model.chat(&self.verdict_system_prompt(), &prompt).await?;
        let verdict: VerdictReply = parse_json_reply(&response.content)?;

        let score = verdict.score.clamp(0.0, MAX_RAW_SCORE) / MAX_RAW_SCORE;
        debug!(metric = %self.name, raw = verdict.score, score, "Graded test case");

        Ok(MetricOutcome {
            score,
            reason: verdict.reason,
            success: score >= self.threshold,
        })
    }

    async fn steps(&self) -> Result<&Vec<String>, AgentError> {
        self.evaluation_steps
            .get_or_try_init(|| async {
                let prompt = format!(
                    "Given an evaluation criteria which outlines how you should judge the {}, \
                     generate 3-4 concise evaluation steps based on the criteria below.\n\n\
                     Evaluation Criteria:\n{}\n\n\
                     Return JSON only, in the form {{\"steps\": [\"...\"]}}.",
                    self.param_list(),
                    self.criteria
                );
                let response = self.model.chat("You are an evaluation designer.", &prompt).await?;
                let reply: StepsReply = parse_json_reply(&response.content)?;
                if reply.steps.is_empty() {
                    return Err(AgentError::ParseError("no evaluation steps returned".into()));
                }
                info!(metric = %self.name, steps = reply.steps.len(), "Generated evaluation steps");
                Ok(reply.steps)
            })
            .await
    }

    fn verdict_system_prompt(&self) -> String {
        format!(
            "You are an evaluator. Score how well the {} satisfy the evaluation steps \
             on an integer scale of 0 to {} (higher is better). Return JSON only, in \
             the form {{\"score\": <integer>, \"reason\": \"<one or two sentences>\"}}.",
            self.param_list(),
            MAX_RAW_SCORE as u32
        )
    }

    fn param_list(&self) -> String {
        self.evaluation_params
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn render_case(&self, case: &TestCase) -> Result<String, AgentError> {
        let mut out = String::new();
        for param in &self.evaluation_params {
            let value = case.param(*param).ok_or_else(|| {
                AgentError::InvalidInput(format!("test case has no {}", param.label()))
            })?;
            out.push_str(&format!("{}:\n{}\n\n", param.label(), value));
        }
        Ok(out)
    }
}

#[async_trait]
impl Grader for GEvalMetric {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, case: &TestCase) -> Result<Grade, AgentError> {
        let outcome = self.measure(case).await?;
        Ok(Grade { score: outcome.score, reason: outcome.reason })
    }
}

/// Parses the first JSON object in `text`, tolerating surrounding prose or
/// a markdown code fence.
fn parse_json_reply<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, AgentError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(AgentError::ParseError(format!("no JSON object in reply: {}", text))),
    };
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlmResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with queued responses and records every user prompt.
    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new<I: IntoIterator<Item = &'static str>>(replies: I) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _system: &str, user: &str) -> Result<LlmResponse, AgentError> {
            self.prompts.lock().unwrap().push(user.to_string());
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::LlmError("script exhausted".into()))?;
            Ok(LlmResponse { content, ..Default::default() })
        }
    }

    #[tokio::test]
    async fn test_steps_generated_once_and_cached() {
        let model = ScriptedModel::new([
            r#"{"steps": ["Check the topic is banking", "Penalize unrelated answers"]}"#,
            r#"{"score": 8, "reason": "About a bank account."}"#,
            r#"{"score": 2, "reason": "About cooking."}"#,
        ]);
        let metric = GEvalMetric::correctness(model.clone());

        let first = metric.measure(&TestCase::new("q1", "Your balance is $10")).await.unwrap();
        let second = metric.measure(&TestCase::new("q2", "Add salt")).await.unwrap();

        assert!((first.score - 0.8).abs() < 1e-9);
        assert!(first.success);
        assert!((second.score - 0.2).abs() < 1e-9);
        assert!(!second.success);

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("related to banking"));
        assert!(prompts[1].contains("1. Check the topic is banking"));
        assert!(prompts[1].contains("Actual Output:\nYour balance is $10"));
    }

    #[tokio::test]
    async fn test_only_selected_params_rendered() {
        let model = ScriptedModel::new([r#"{"score": 10, "reason": "ok"}"#]);
        let metric = GEvalMetric::correctness(model.clone()).with_steps(vec!["step".into()]);

        metric.measure(&TestCase::new("secret question", "answer")).await.unwrap();

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("secret question"));
    }

    #[tokio::test]
    async fn test_score_clamped_and_normalized() {
        let model = ScriptedModel::new([
            r#"{"score": 14, "reason": "overflow"}"#,
            r#"{"score": -3, "reason": "underflow"}"#,
        ]);
        let metric = GEvalMetric::correctness(model).with_steps(vec!["s".into()]);

        let high = metric.measure(&TestCase::new("q", "a")).await.unwrap();
        let low = metric.measure(&TestCase::new("q", "a")).await.unwrap();
        assert_eq!(high.score, 1.0);
        assert_eq!(low.score, 0.0);
    }

    #[tokio::test]
    async fn test_fenced_reply_parsed() {
        let model = ScriptedModel::new(["Sure!\n```json\n{\"score\": 5, \"reason\": \"half\"}\n```"]);
        let metric = GEvalMetric::correctness(model).with_steps(vec!["s".into()]);

        let grade = metric.grade(&TestCase::new("q", "a")).await.unwrap();
        assert_eq!(grade.score, 0.5);
        assert_eq!(grade.reason, "half");
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_parse_error() {
        let model = ScriptedModel::new(["I cannot grade this."]);
        let metric = GEvalMetric::correctness(model).with_steps(vec!["s".into()]);

        let err = metric.measure(&TestCase::new("q", "a")).await.unwrap_err();
        assert!(matches!(err, AgentError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_missing_param_is_invalid_input() {
        let model = ScriptedModel::new(Vec::<&'static str>::new());
        let metric = GEvalMetric::new("m", "c", vec![EvalParam::ExpectedOutput], model)
            .with_steps(vec!["s".into()]);

        let err = metric.measure(&TestCase::new("q", "a")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }
}

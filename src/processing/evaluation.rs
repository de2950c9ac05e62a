//! Answer-quality evaluation: ask known questions and let the model judge its own answers.
//!
//! The judge is the completion backend used for answering, so it runs at the same
//! temperature. A verdict must contain `true` or `false`; anything else fails the case.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::{Completer, CompletionError};

use super::retrieval::RetrievalPipeline;
use super::types::PipelineError;

/// Prompt asking the judge to compare an expected and an actual response.
pub const EVAL_PROMPT: &str = concat!(
    "\n",
    "Expected Response: {expected_response}\n",
    "Actual Response: {actual_response}\n",
    "---\n",
    "(Answer with 'true' or 'false') Does the actual response match the expected response?\n",
);

/// Failures while evaluating one case.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Answering the question failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The judge could not be reached.
    #[error("Judge failed: {0}")]
    Judge(#[from] CompletionError),
    /// The judge answered with neither `true` nor `false`.
    #[error("Invalid evaluation result. Cannot determine if 'true' or 'false': {0}")]
    UnclearVerdict(String),
}

/// A question with the response it should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    /// Label shown in logs.
    pub name: String,
    /// Question sent through the retrieval pipeline.
    pub question: String,
    /// Response the answer is judged against.
    pub expected_response: String,
}

impl EvalCase {
    fn new(name: &str, question: &str, expected_response: &str) -> Self {
        Self {
            name: name.to_string(),
            question: question.to_string(),
            expected_response: expected_response.to_string(),
        }
    }
}

/// Board game rule questions answered by the bundled sample documents.
pub fn default_cases() -> Vec<EvalCase> {
    vec![
        EvalCase::new(
            "Monopoly Rules",
            "How much total money does a player start with in Monopoly? (Answer with the number only)",
            "$1500",
        ),
        EvalCase::new(
            "Ticket to Ride Rules",
            "How many points does the longest continuous train get in Ticket to Ride? (Answer with the number only)",
            "10 points",
        ),
    ]
}

/// Fill [`EVAL_PROMPT`].
pub fn render_eval_prompt(expected_response: &str, actual_response: &str) -> String {
    EVAL_PROMPT
        .replace("{expected_response}", expected_response)
        .replace("{actual_response}", actual_response)
}

/// Read a judge reply. `true` wins when both words appear.
pub fn parse_verdict(reply: &str) -> Result<bool, EvaluationError> {
    let cleaned = reply.trim().to_lowercase();
    if cleaned.contains("true") {
        Ok(true)
    } else if cleaned.contains("false") {
        Ok(false)
    } else {
        Err(EvaluationError::UnclearVerdict(cleaned))
    }
}

/// Result of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOutcome {
    /// Case label.
    pub name: String,
    /// Whether the judge accepted the answer.
    pub passed: bool,
    /// Answer text, absent when answering failed.
    pub response: Option<String>,
    /// Error message when the case could not be judged.
    pub error: Option<String>,
}

/// Totals for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// Per-case outcomes in input order.
    pub cases: Vec<CaseOutcome>,
    /// Cases the judge accepted.
    pub passed: usize,
    /// Cases run.
    pub total: usize,
}

impl EvaluationReport {
    /// Percentage of passed cases; zero for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64 * 100.0
    }
}

/// Runs evaluation cases against the retrieval pipeline.
#[derive(Clone)]
pub struct Evaluator {
    retrieval: RetrievalPipeline,
    judge: Arc<dyn Completer>,
}

impl Evaluator {
    /// Judge answers from `retrieval` with `judge`.
    pub fn new(retrieval: RetrievalPipeline, judge: Arc<dyn Completer>) -> Self {
        Self { retrieval, judge }
    }

    /// Answer one case and judge the answer. Returns the verdict and the answer text.
    pub async fn evaluate_case(&self, case: &EvalCase) -> Result<(bool, String), EvaluationError> {
        let answer = self.retrieval.answer(Some(&case.question)).await?;
        let prompt = render_eval_prompt(&case.expected_response, &answer.response);
        let reply = self.judge.complete(&prompt).await?;
        let passed = parse_verdict(&reply)?;
        Ok((passed, answer.response))
    }

    /// Run every case. A case that errors counts as failed.
    pub async fn run(&self, cases: &[EvalCase]) -> EvaluationReport {
        let mut report = EvaluationReport {
            total: cases.len(),
            ..EvaluationReport::default()
        };
        for case in cases {
            let outcome = match self.evaluate_case(case).await {
                Ok((passed, response)) => {
                    tracing::info!(case = %case.name, passed, "Evaluated case");
                    CaseOutcome {
                        name: case.name.clone(),
                        passed,
                        response: Some(response),
                        error: None,
                    }
                }
                Err(error) => {
                    tracing::warn!(case = %case.name, error = %error, "Evaluation case failed");
                    CaseOutcome {
                        name: case.name.clone(),
                        passed: false,
                        response: None,
                        error: Some(error.to_string()),
                    }
                }
            };
            if outcome.passed {
                report.passed += 1;
            }
            report.cases.push(outcome);
        }
        tracing::info!(
            passed = report.passed,
            total = report.total,
            accuracy = report.accuracy(),
            "Evaluation finished"
        );
        report
    }
}

//! Pass/fail screening of one extracted CV against the recruiter's prompts.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, warn};

use super::prompts;
use crate::llm_client::{CompletionModel, CompletionRequest};
use crate::models::candidate::{EvaluationResult, StructuredCv};

const EVALUATION_MAX_TOKENS: u32 = 1000;
pub const EVALUATION_ERROR_RATIONALE: &str = "Error in evaluation";
const NOT_AVAILABLE: &str = "N/A";

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

/// Plain-text rendering of a CV used as evaluation context.
pub fn format_cv_for_evaluation(cv: &StructuredCv) -> String {
    if cv.is_empty() {
        return "No CV data available".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", or_na(&cv.name));
    let _ = writeln!(out, "Location: {}\n", or_na(&cv.location));

    if !cv.experience.is_empty() {
        out.push_str("Work Experience:\n");
        for exp in &cv.experience {
            let _ = writeln!(
                out,
                "- {} at {} ({})",
                or_na(&exp.title),
                or_na(&exp.company),
                or_na(&exp.date_range)
            );
        }
        out.push('\n');
    }

    if !cv.skills.is_empty() {
        out.push_str("Skills:\n");
        for skill in &cv.skills {
            let _ = writeln!(out, "- {skill}");
        }
        out.push('\n');
    }

    if !cv.education.is_empty() {
        out.push_str("Education:\n");
        for edu in &cv.education {
            let _ = writeln!(
                out,
                "- {} at {} ({})",
                or_na(&edu.degree),
                or_na(&edu.institution),
                or_na(&edu.date_range)
            );
        }
    }

    out
}

/// A reply qualifies the candidate if it echoes the profile URL or says PASS.
pub fn is_qualified(reply: &str, profile_url: &str) -> bool {
    reply.contains(profile_url) || reply.to_uppercase().contains("PASS")
}

pub struct CandidateEvaluator {
    llm: Arc<dyn CompletionModel>,
    model: String,
}

impl CandidateEvaluator {
    pub fn new(llm: Arc<dyn CompletionModel>, model: String) -> Self {
        Self { llm, model }
    }

    pub fn build_request(
        &self,
        cv: &StructuredCv,
        profile_url: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> CompletionRequest {
        CompletionRequest::new(
            &self.model,
            prompts::evaluation_system_prompt(system_prompt),
            prompts::evaluation_user_prompt(user_prompt, &format_cv_for_evaluation(cv), profile_url),
            EVALUATION_MAX_TOKENS,
        )
    }

    /// Never fails: a model error yields a rejection with a fixed rationale.
    pub async fn evaluate(
        &self,
        cv: &StructuredCv,
        profile_url: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> EvaluationResult {
        let request = self.build_request(cv, profile_url, system_prompt, user_prompt);
        match self.llm.complete(&request).await {
            Ok(reply) => {
                let qualified = is_qualified(&reply, profile_url);
                debug!(url = profile_url, qualified, "Candidate evaluated");
                EvaluationResult {
                    candidate_url: profile_url.to_string(),
                    qualified,
                    rationale: reply,
                }
            }
            Err(e) => {
                warn!(url = profile_url, "Evaluation call failed: {e}");
                EvaluationResult {
                    candidate_url: profile_url.to_string(),
                    qualified: false,
                    rationale: EVALUATION_ERROR_RATIONALE.to_string(),
                }
            }
        }
    }
}

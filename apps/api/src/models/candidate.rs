//! Domain types that flow through a single sourcing run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_default;

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

fn default_resume_age_days() -> u32 {
    30
}

fn default_target_candidates() -> u32 {
    100
}

fn default_max_radius_km() -> u32 {
    25
}

/// Immutable input for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    /// Optional human label, used in the shortlist email subject.
    #[serde(default)]
    pub name: Option<String>,
    pub search_keywords: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Only resumes modified within this many days are returned.
    #[serde(default = "default_resume_age_days")]
    pub resume_last_updated_days: u32,
    #[serde(default = "default_target_candidates")]
    pub target_candidates: u32,
    #[serde(default = "default_max_radius_km")]
    pub max_radius: u32,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.search_keywords.trim().is_empty() {
            return Err("search_keywords must not be empty".to_string());
        }
        if self.target_candidates == 0 {
            return Err("target_candidates must be greater than zero".to_string());
        }
        if self.max_radius == 0 {
            return Err("max_radius must be greater than zero".to_string());
        }
        if let Some(email) = self.recipient_email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(format!("recipient_email '{email}' is not an email address"));
            }
        }
        Ok(())
    }

    /// Label used when reporting on this search.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.search_keywords)
    }

    pub fn location_or_empty(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    /// Recipient address, if one was given and is non-blank.
    pub fn recipient(&self) -> Option<&str> {
        self.recipient_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search and fetch
// ────────────────────────────────────────────────────────────────────────────

/// A single candidate discovered by search. Identity is the profile URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateRef {
    pub account_key: String,
    pub profile_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl CandidateRef {
    pub fn from_account_key(profile_base: &str, account_key: &str) -> Self {
        Self {
            account_key: account_key.to_string(),
            profile_url: format!("{}/{}", profile_base.trim_end_matches('/'), account_key),
            display_name: None,
        }
    }
}

/// Rendered HTML of one candidate profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePage {
    pub candidate: CandidateRef,
    pub html: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Structured CV
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company: String,
    #[serde(
        rename = "dates",
        alias = "date_range",
        alias = "dateRange",
        default,
        deserialize_with = "null_as_default"
    )]
    pub date_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EducationEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub degree: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub institution: String,
    #[serde(
        rename = "dates",
        alias = "date_range",
        alias = "dateRange",
        default,
        deserialize_with = "null_as_default"
    )]
    pub date_range: String,
}

/// Extracted CV. Every section is present after deserialization; missing or
/// null sections become empty strings and lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredCv {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub education: Vec<EducationEntry>,
}

impl StructuredCv {
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.location.trim().is_empty()
            && self.experience.is_empty()
            && self.skills.is_empty()
            && self.education.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Evaluation and results
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
    pub candidate_url: String,
    pub qualified: bool,
    pub rationale: String,
}

/// A candidate that passed evaluation, with the CV the decision was based on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualifiedCandidate {
    pub name: String,
    pub profile_url: String,
    pub analysis: String,
    pub location: String,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<String>,
    pub education: Vec<EducationEntry>,
}

impl QualifiedCandidate {
    pub fn new(cv: StructuredCv, evaluation: EvaluationResult) -> Self {
        let name = if cv.name.trim().is_empty() {
            "Unknown".to_string()
        } else {
            cv.name
        };
        Self {
            name,
            profile_url: evaluation.candidate_url,
            analysis: evaluation.rationale,
            location: cv.location,
            experience: cv.experience,
            skills: cv.skills,
            education: cv.education,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub candidates: Vec<QualifiedCandidate>,
    /// Unique candidates found by search, before truncation to the target count.
    pub total_found: usize,
    /// Shortlisted candidates the run attempted to fetch and evaluate.
    pub processed_count: usize,
    pub qualified_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn new(
        candidates: Vec<QualifiedCandidate>,
        total_found: usize,
        processed_count: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            qualified_count: candidates.len(),
            candidates,
            total_found,
            processed_count,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

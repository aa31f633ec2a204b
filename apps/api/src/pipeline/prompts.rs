// Prompts for CV extraction and candidate evaluation.

use crate::llm_client::prompts::{JSON_ONLY_SUFFIX, URL_ARRAY_ONLY_SUFFIX};

pub const EXTRACTION_SYSTEM: &str = "You are a CV data extraction specialist. \
    Extract structured data from CV/resume content and return it in the exact JSON format requested.";

const EXTRACTION_SCHEMA: &str = r#"Extract CV data from the provided content and return it in this exact JSON format:

{
  "name": "Full Name",
  "location": "City, Country",
  "experience": [
    {
      "title": "Job Title",
      "company": "Company Name",
      "dates": "Start Date - End Date",
      "location": "Job Location"
    }
  ],
  "skills": ["Skill1", "Skill2", "Skill3"],
  "education": [
    {
      "degree": "Degree Name",
      "institution": "Institution Name",
      "dates": "Start Date - End Date"
    }
  ]
}

If any section is missing or empty, use empty arrays [] or empty strings ""."#;

/// Appended to the caller's system prompt for every evaluation.
const EVALUATION_OUTPUT_RULES: &str = r#"
REQUIRED OUTPUT FORMAT:
["<profile url>", "<profile url>"]
IF NO CANDIDATES QUALIFY: []
No summary. No explanation."#;

const LENIENCY_INSTRUCTION: &str = "IMPORTANT: Be lenient in your evaluation. \
    If a candidate meets most of the requirements but is missing one or two, still consider them QUALIFIED. \
    Focus on potential and transferable skills rather than exact matches. \
    If the candidate shows promise and could potentially fit the role, accept them.";

pub fn extraction_user_prompt(cv_text: &str) -> String {
    format!("{EXTRACTION_SCHEMA} {JSON_ONLY_SUFFIX}\n\nCV Content:\n{cv_text}")
}

pub fn evaluation_system_prompt(system_prompt: &str) -> String {
    format!("{system_prompt}\n{EVALUATION_OUTPUT_RULES}\n{URL_ARRAY_ONLY_SUFFIX}\n\n{LENIENCY_INSTRUCTION}")
}

pub fn evaluation_user_prompt(user_prompt: &str, formatted_cv: &str, profile_url: &str) -> String {
    format!("{user_prompt}\n\nCandidate CV:\n{formatted_cv}\n\nProfile URL: {profile_url}")
}

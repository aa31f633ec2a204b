//! Turns a captured profile page into a [`StructuredCv`].
//!
//! The HTML is reduced to resume text locally, then a language model maps
//! that text onto the CV schema. Every failure is reported as `None`.

use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::prompts;
use crate::llm_client::{strip_json_fences, CompletionModel, CompletionRequest};
use crate::models::candidate::{ResumePage, StructuredCv};

const EXTRACTION_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_CHAR_BUDGET: usize = 8000;
/// Below this, a text-location strategy is considered to have missed.
const MIN_SECTION_CHARS: usize = 200;

const RESUME_CONTAINER: &str = "div.rdp-resume-container";
const RESUME_START_MARKER: &str = "Resume";
const RESUME_END_MARKERS: &[&str] = &["Email Select a template", "Select a template", "Try Professional"];

/// Page furniture removed before any text is read.
pub const NOISE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "header",
    "nav",
    "footer",
    ".header",
    ".nav",
    ".footer",
    ".navigation",
    ".menu",
    ".toolbar",
    ".sidebar",
    ".breadcrumb",
    ".skip-link",
    ".create-new",
    ".candidate-contact-details",
    ".email-template",
    ".template-selector",
    ".message-form",
    ".job-selector",
    ".additional-options",
    ".hcaptcha",
    ".privacy-policy",
    ".terms-service",
    ".cookie-policy",
    ".language-selector",
    ".about-links",
    ".site-footer",
];

/// Recruiter-UI strings stripped from whole-page text in the last-resort path.
pub const UI_CHROME_PHRASES: &[&str] = &[
    "Smart Sourcing",
    "Indeed for Employers",
    "Skip to main content",
    "Create new",
    "ATS Integrations",
    "Post a job",
    "Phone calls",
    "Branded Ads",
    "AI summaries",
    "Manage workforce",
    "Help Notifications",
    "Start of main content",
    "Find candidates",
    "Plans and Pricing",
    "Saved searches",
    "Start Professional trial",
    "Forward resume",
    "Report this resume",
    "Recently updated",
    "Candidate contact details are hidden",
    "Email Select a template",
    "Try Professional",
    "Create a new template",
    "From Company Subject",
    "customize the subject line",
    "Save as template",
    "Your email address",
    "By pressing Send",
    "Cookie Policy",
    "Privacy Policy",
    "Terms of Service",
    "Additional options",
    "Preview Send",
    "This site is protected by hCaptcha",
    "Choose the language",
    "About - Contact Indeed",
    "Home",
    "Jobs",
    "Campaigns",
    "Candidates",
    "Interviews",
    "Analytics",
    "Tools",
    "Messages",
    "Projects",
    "Templates",
];

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn remove_noise(document: &mut Html) {
    for css in NOISE_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }
}

fn container_text(document: &Html) -> Option<String> {
    let selector = Selector::parse(RESUME_CONTAINER).ok()?;
    let container = document.select(&selector).next()?;
    Some(collapse_whitespace(&container.text().collect::<Vec<_>>().join(" ")))
}

/// Text between the first "Resume" heading and the first recruiter-UI marker.
fn marker_section(full_text: &str) -> Option<String> {
    let start = full_text.find(RESUME_START_MARKER)?;
    let rest = &full_text[start..];
    let end = RESUME_END_MARKERS
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

fn strip_ui_chrome(full_text: &str) -> String {
    let mut text = full_text.to_string();
    for phrase in UI_CHROME_PHRASES {
        text = text.replace(phrase, " ");
    }
    collapse_whitespace(&text)
}

/// Reduces a profile page to resume text, capped at `char_budget` characters.
///
/// Prefers the dedicated resume container, then the text between the resume
/// heading and the first UI marker, then the whole page minus known UI strings.
pub fn clean_resume_text(html: &str, char_budget: usize) -> String {
    let decoded = html_escape::decode_html_entities(html);
    let mut document = Html::parse_document(&decoded);
    remove_noise(&mut document);

    let mut text = container_text(&document).unwrap_or_default();

    if text.chars().count() < MIN_SECTION_CHARS {
        let full = collapse_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "));
        if let Some(section) = marker_section(&full).filter(|s| s.chars().count() >= MIN_SECTION_CHARS) {
            debug!("Resume text located via page markers");
            text = section;
        } else {
            debug!("Resume text taken from whole page");
            text = strip_ui_chrome(&full);
        }
    }

    truncate_chars(&text, char_budget)
}

/// Parses a model reply into a CV. Missing sections default to empty.
pub fn parse_cv_response(reply: &str) -> Option<StructuredCv> {
    match serde_json::from_str::<StructuredCv>(strip_json_fences(reply)) {
        Ok(cv) => Some(cv),
        Err(e) => {
            warn!("Extraction reply is not valid CV JSON: {e}");
            None
        }
    }
}

pub struct CvExtractor {
    llm: Arc<dyn CompletionModel>,
    model: String,
    char_budget: usize,
}

impl CvExtractor {
    pub fn new(llm: Arc<dyn CompletionModel>, model: String, char_budget: usize) -> Self {
        Self {
            llm,
            model,
            char_budget,
        }
    }

    pub fn build_request(&self, cv_text: &str) -> CompletionRequest {
        CompletionRequest::new(
            &self.model,
            prompts::EXTRACTION_SYSTEM.to_string(),
            prompts::extraction_user_prompt(cv_text),
            EXTRACTION_MAX_TOKENS,
        )
    }

    pub async fn extract(&self, page: &ResumePage) -> Option<StructuredCv> {
        let url = page.candidate.profile_url.as_str();
        let text = clean_resume_text(&page.html, self.char_budget);
        if text.trim().is_empty() {
            warn!(url, "No resume text found in page");
            return None;
        }
        debug!(url, chars = text.chars().count(), "Cleaned resume text");

        let reply = match self.llm.complete(&self.build_request(&text)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(url, "CV extraction call failed: {e}");
                return None;
            }
        };
        parse_cv_response(&reply)
    }
}

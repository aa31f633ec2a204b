use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::models::candidate::{PipelineResult, QualifiedCandidate};

const RATIONALE_PREVIEW_CHARS: usize = 150;

/// Search parameters echoed in the email header table.
#[derive(Debug, Clone)]
pub struct SearchMetadata {
    pub search_name: String,
    pub keywords: String,
    pub location: String,
    pub max_radius_km: u32,
    pub resume_age_days: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortlistEmail {
    pub subject: String,
    pub html: String,
}

fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= RATIONALE_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(RATIONALE_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn candidate_row(out: &mut String, index: usize, candidate: &QualifiedCandidate) {
    let headline = candidate
        .experience
        .first()
        .map(|e| format!("{} at {}", e.title, e.company))
        .unwrap_or_default();
    let skills = candidate
        .skills
        .iter()
        .take(8)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let _ = write!(
        out,
        r#"
        <tr>
            <td style="padding: 10px; border: 1px solid #ddd; text-align: center;">{index}</td>
            <td style="padding: 10px; border: 1px solid #ddd;">
                <a href="{url}" style="color: #0066cc; font-weight: 500;">{name}</a><br>
                <span style="font-size: 13px; color: #555;">{headline}</span><br>
                <span style="font-size: 12px; color: #777;">{location}</span>
            </td>
            <td style="padding: 10px; border: 1px solid #ddd; font-size: 13px;">{skills}</td>
            <td style="padding: 10px; border: 1px solid #ddd; font-size: 12px; color: #555;">{analysis}</td>
        </tr>"#,
        url = encode_double_quoted_attribute(&candidate.profile_url),
        name = encode_text(&candidate.name),
        headline = encode_text(or_dash(&headline)),
        location = encode_text(or_dash(&candidate.location)),
        skills = encode_text(or_dash(&skills)),
        analysis = encode_text(&preview(&candidate.analysis)),
    );
}

fn metadata_row(out: &mut String, label: &str, value: &str) {
    let _ = write!(
        out,
        r#"
        <tr>
            <td style="padding: 10px; border-bottom: 1px solid #ddd;">{label}</td>
            <td style="padding: 10px; border-bottom: 1px solid #ddd;">{value}</td>
        </tr>"#,
        value = encode_text(value),
    );
}

/// Builds the shortlist message for a finished run.
pub fn render_shortlist_email(result: &PipelineResult, meta: &SearchMetadata) -> ShortlistEmail {
    let subject = format!(
        "{} candidates for '{}'",
        result.qualified_count, meta.search_name
    );

    let mut rows = String::new();
    for (i, candidate) in result.candidates.iter().enumerate() {
        candidate_row(&mut rows, i + 1, candidate);
    }

    let mut metadata = String::new();
    metadata_row(&mut metadata, "Keywords", &meta.keywords);
    metadata_row(
        &mut metadata,
        "Search area",
        &format!("{} + {} km radius", or_dash(&meta.location), meta.max_radius_km),
    );
    metadata_row(&mut metadata, "Last activity", &format!("Last {} days", meta.resume_age_days));
    metadata_row(
        &mut metadata,
        "Candidates",
        &format!(
            "{} found, {} reviewed, {} qualified",
            result.total_found, result.processed_count, result.qualified_count
        ),
    );
    metadata_row(
        &mut metadata,
        "Submitted",
        &meta.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #0066cc; border-bottom: 2px solid #0066cc; padding-bottom: 10px;">New candidate shortlist</h2>
    <table style="width: 100%; border-collapse: collapse; margin: 20px 0; background: #f9f9f9; border: 1px solid #ddd;">
        <tr style="background: #0066cc; color: white;">
            <td style="padding: 12px; font-weight: bold;">Search</td>
            <td style="padding: 12px; font-weight: bold;">{name}</td>
        </tr>{metadata}
    </table>
    <h3 style="color: #0066cc; margin-top: 30px;">Shortlist</h3>
    <table style="width: 100%; border-collapse: collapse; margin: 20px 0;">
        <tr style="background: #f5f5f5;">
            <td style="padding: 10px; border: 1px solid #ddd; font-weight: bold; width: 40px;">#</td>
            <td style="padding: 10px; border: 1px solid #ddd; font-weight: bold;">Candidate</td>
            <td style="padding: 10px; border: 1px solid #ddd; font-weight: bold;">Skills</td>
            <td style="padding: 10px; border: 1px solid #ddd; font-weight: bold;">Assessment</td>
        </tr>{rows}
    </table>
    <p style="font-size: 12px; color: #666; text-align: center;">
        Generated {generated}. Links point to the candidates' public profiles.
    </p>
</body>
</html>"#,
        name = encode_text(&meta.search_name),
        generated = result.completed_at.format("%Y-%m-%d %H:%M UTC"),
    );

    ShortlistEmail { subject, html }
}

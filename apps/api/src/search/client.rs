//! GraphQL client for the resume-search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{PageQuery, SearchApi, SearchError, SearchPage};
use crate::models::candidate::CandidateRef;
use crate::models::null_as_default;
use crate::session::HeaderSet;

pub const DEFAULT_SEARCH_URL: &str = "https://apis.indeed.com/graphql?co=DE&locale=en-DE";
pub const DEFAULT_PROFILE_BASE: &str = "https://resumes.indeed.com/resume";

const OPERATION_NAME: &str = "SmartSourcingResults";
const DEFAULT_STRATEGY_ID: &str = "RCHK8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Names that only show up in demo payloads served to unauthenticated sessions.
pub const PLACEHOLDER_NAMES: &[&str] = &["john doe", "jane doe", "test user", "sample user", "placeholder"];

const SEARCH_QUERY: &str = "query SmartSourcingResults($input: OrchestrationMatchesInput!, $includePagination: Boolean!) {
  findRCPMatches(input: $input) {
    overallMatchCount
    matchConnection {
      pageInfo @include(if: $includePagination) { hasNextPage }
      matches {
        sourcingProfile {
          accountKey
          profileCard { firstName lastName }
        }
      }
    }
  }
}";

// ────────────────────────────────────────────────────────────────────────────
// Response shape. Every level is optional.
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default, deserialize_with = "null_as_default")]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseData {
    #[serde(rename = "findRCPMatches", default)]
    find_matches: Option<MatchResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchResults {
    #[serde(default)]
    overall_match_count: Option<u64>,
    #[serde(default)]
    match_connection: Option<MatchConnection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchConnection {
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    matches: Vec<Match>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Match {
    #[serde(default)]
    sourcing_profile: Option<SourcingProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourcingProfile {
    #[serde(default)]
    account_key: Option<String>,
    #[serde(default)]
    profile_card: Option<ProfileCard>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileCard {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl ProfileCard {
    fn full_name(&self) -> Option<String> {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Exact, case-insensitive match on the whole name. "John Doering" is a real person.
pub fn is_placeholder_name(name: &str) -> bool {
    let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    PLACEHOLDER_NAMES.contains(&normalized.as_str())
}

/// Parses a raw response body. Matches without an account key are skipped.
/// Placeholder names are only counted; the matches themselves are kept.
pub fn parse_search_page(body: &str, profile_base: &str) -> Result<SearchPage, SearchError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    for err in &envelope.errors {
        warn!("Search API reported: {}", err.message);
    }

    let Some(results) = envelope.data.and_then(|d| d.find_matches) else {
        return Ok(SearchPage::default());
    };
    let connection = results.match_connection.unwrap_or_default();

    let mut page = SearchPage {
        has_next_page: connection.page_info.and_then(|p| p.has_next_page),
        total_matches: results.overall_match_count,
        ..Default::default()
    };

    for m in connection.matches {
        let Some(profile) = m.sourcing_profile else {
            continue;
        };
        let Some(key) = profile.account_key.filter(|k| !k.trim().is_empty()) else {
            continue;
        };
        let display_name = profile.profile_card.as_ref().and_then(ProfileCard::full_name);
        if let Some(name) = display_name.as_deref() {
            page.named_matches += 1;
            if is_placeholder_name(name) {
                page.placeholder_matches += 1;
            }
        }
        let mut candidate = CandidateRef::from_account_key(profile_base, key.trim());
        candidate.display_name = display_name;
        page.candidates.push(candidate);
    }

    Ok(page)
}

pub fn build_search_payload(query: PageQuery<'_>, language: &str, country: &str) -> Value {
    json!({
        "operationName": OPERATION_NAME,
        "variables": {
            "input": {
                "searchQuery": {
                    "queryString": query.criteria.keywords,
                    "searchLocale": { "language": language, "country": country }
                },
                "clientSurfaceName": "sourcing-search",
                "identifiers": { "jobIdentifiers": {} },
                "context": {
                    "overrides": {
                        "where": query.criteria.location,
                        "radiusInput": { "distance": query.radius_km, "unit": "KILOMETERS" }
                    }
                },
                "filters": [{
                    "key": "lastModified",
                    "afterBucket": false,
                    "gte": query.criteria.modified_after_ms
                }],
                "defaultStrategyId": DEFAULT_STRATEGY_ID,
                "limit": query.limit,
                "offset": query.offset
            },
            "includePagination": true
        },
        "query": SEARCH_QUERY
    })
}

#[derive(Clone)]
pub struct GraphqlSearchClient {
    client: Client,
    endpoint: String,
    profile_base: String,
    language: String,
    country: String,
}

impl GraphqlSearchClient {
    pub fn new(endpoint: String, profile_base: String) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint,
            profile_base,
            language: "de".to_string(),
            country: "DE".to_string(),
        })
    }

    pub fn with_locale(mut self, language: &str, country: &str) -> Self {
        self.language = language.to_string();
        self.country = country.to_string();
        self
    }
}

#[async_trait]
impl SearchApi for GraphqlSearchClient {
    async fn search_page(&self, query: PageQuery<'_>, headers: &HeaderSet) -> Result<SearchPage, SearchError> {
        let header_map = headers
            .to_header_map()
            .map_err(|e| SearchError::Headers(e.to_string()))?;
        let payload = build_search_payload(query, &self.language, &self.country);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(header_map)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message: String = body.chars().take(500).collect();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page = parse_search_page(&body, &self.profile_base)?;
        debug!(
            radius_km = query.radius_km,
            offset = query.offset,
            received = page.candidates.len(),
            has_next_page = ?page.has_next_page,
            "Search page fetched"
        );
        Ok(page)
    }
}

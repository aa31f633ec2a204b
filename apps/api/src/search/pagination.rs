//! Paging through search results at a single radius.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{SearchApi, SearchCriteria};
use crate::models::candidate::CandidateRef;
use crate::retry::{DelayRange, Sleeper};
use crate::session::HeaderSet;

#[derive(Debug, Clone, Copy)]
pub struct PaginationPolicy {
    pub page_size: u32,
    pub max_pages: u32,
    /// Random pause before every request.
    pub request_delay: DelayRange,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 20,
            request_delay: DelayRange::between(Duration::from_secs(1), Duration::from_secs(3)),
        }
    }
}

/// Why paging at one radius ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    NoNextPage,
    EmptyPage,
    ShortPage,
    LimitReached,
    PageCeiling,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RadiusSearch {
    pub radius_km: u32,
    /// In API order, possibly with duplicates across pages.
    pub candidates: Vec<CandidateRef>,
    pub requests: u32,
    pub stop_reason: StopReason,
}

impl RadiusSearch {
    /// True when the very first request at this radius failed.
    pub fn failed_immediately(&self) -> bool {
        self.requests == 1 && matches!(self.stop_reason, StopReason::Failed(_))
    }
}

/// Collects candidates at `radius_km` until the API runs out of pages, a page
/// comes back short or empty, `limit_cap` candidates have been gathered, the
/// page ceiling is reached, or a request fails.
///
/// A failed request ends this radius and keeps what was already collected.
pub async fn search_at_radius(
    api: &dyn SearchApi,
    headers: &HeaderSet,
    criteria: &SearchCriteria,
    radius_km: u32,
    limit_cap: usize,
    policy: &PaginationPolicy,
    sleeper: &dyn Sleeper,
) -> RadiusSearch {
    let mut candidates: Vec<CandidateRef> = Vec::new();
    let mut requests = 0;
    let mut offset = 0;

    let stop_reason = loop {
        if requests >= policy.max_pages {
            break StopReason::PageCeiling;
        }
        policy.request_delay.pause(sleeper).await;
        requests += 1;

        let page = match api
            .search_page(criteria.page(radius_km, offset, policy.page_size), headers)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(radius_km, offset, "Search request failed: {e}");
                break StopReason::Failed(e.to_string());
            }
        };

        if page.looks_like_placeholder_data() {
            warn!(
                radius_km,
                count = page.placeholder_matches,
                "Every named match is placeholder data, session credentials may be stale"
            );
        }

        let received = page.candidates.len();
        if received == 0 {
            break StopReason::EmptyPage;
        }
        candidates.extend(page.candidates);
        debug!(radius_km, offset, received, total = candidates.len(), "Collected page");

        if page.has_next_page != Some(true) {
            break StopReason::NoNextPage;
        }
        if received < policy.page_size as usize {
            break StopReason::ShortPage;
        }
        if candidates.len() >= limit_cap {
            break StopReason::LimitReached;
        }
        offset += policy.page_size;
    };

    info!(
        radius_km,
        found = candidates.len(),
        requests,
        stop = ?stop_reason,
        "Radius search finished"
    );

    RadiusSearch {
        radius_km,
        candidates,
        requests,
        stop_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchError;
    use crate::testing::{page_of, test_headers, RecordingSleeper, ScriptedSearchApi};

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            keywords: "developer".to_string(),
            location: "Berlin".to_string(),
            modified_after_ms: "0".to_string(),
        }
    }

    fn policy(page_size: u32, max_pages: u32) -> PaginationPolicy {
        PaginationPolicy {
            page_size,
            max_pages,
            request_delay: DelayRange::ZERO,
        }
    }

    #[tokio::test]
    async fn test_stops_when_api_reports_no_next_page() {
        let api = ScriptedSearchApi::default();
        api.push(5, Ok(page_of("a", 0..50, Some(true))));
        api.push(5, Ok(page_of("a", 50..100, Some(false))));
        api.push(5, Ok(page_of("a", 100..150, Some(true))));

        let result = search_at_radius(
            &api,
            &test_headers(),
            &criteria(),
            5,
            1000,
            &policy(50, 20),
            &RecordingSleeper::default(),
        )
        .await;

        assert_eq!(api.calls(), vec![(5, 0), (5, 50)]);
        assert_eq!(result.requests, 2);
        assert_eq!(result.candidates.len(), 100);
        assert_eq!(result.stop_reason, StopReason::NoNextPage);
    }

    #[tokio::test]
    async fn test_missing_page_info_ends_pagination() {
        let api = ScriptedSearchApi::default();
        api.push(5, Ok(page_of("a", 0..50, None)));
        api.push(5, Ok(page_of("a", 50..100, Some(true))));

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 1000, &policy(50, 20), &RecordingSleeper::default()).await;
        assert_eq!(result.requests, 1);
        assert_eq!(result.stop_reason, StopReason::NoNextPage);
    }

    #[tokio::test]
    async fn test_short_page_stops_even_if_more_reported() {
        let api = ScriptedSearchApi::default();
        api.push(10, Ok(page_of("a", 0..20, Some(true))));

        let result = search_at_radius(&api, &test_headers(), &criteria(), 10, 1000, &policy(50, 20), &RecordingSleeper::default()).await;
        assert_eq!(result.candidates.len(), 20);
        assert_eq!(result.stop_reason, StopReason::ShortPage);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let api = ScriptedSearchApi::default();
        api.push(5, Ok(page_of("a", 0..0, Some(true))));

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 10, &policy(50, 20), &RecordingSleeper::default()).await;
        assert!(result.candidates.is_empty());
        assert_eq!(result.stop_reason, StopReason::EmptyPage);
    }

    #[tokio::test]
    async fn test_limit_cap_stops_paging() {
        let api = ScriptedSearchApi::default();
        for i in 0..5 {
            api.push(5, Ok(page_of("a", i * 10..(i + 1) * 10, Some(true))));
        }

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 25, &policy(10, 20), &RecordingSleeper::default()).await;
        assert_eq!(result.requests, 3);
        assert_eq!(result.candidates.len(), 30);
        assert_eq!(result.stop_reason, StopReason::LimitReached);
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let api = ScriptedSearchApi::default();
        for i in 0..10 {
            api.push(5, Ok(page_of("a", i * 2..(i + 1) * 2, Some(true))));
        }

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 1000, &policy(2, 3), &RecordingSleeper::default()).await;
        assert_eq!(result.requests, 3);
        assert_eq!(result.candidates.len(), 6);
        assert_eq!(result.stop_reason, StopReason::PageCeiling);
    }

    #[tokio::test]
    async fn test_failure_keeps_collected_candidates() {
        let api = ScriptedSearchApi::default();
        api.push(5, Ok(page_of("a", 0..10, Some(true))));
        api.push(5, Err(SearchError::Api { status: 503, message: "down".to_string() }));

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 1000, &policy(10, 20), &RecordingSleeper::default()).await;
        assert_eq!(result.candidates.len(), 10);
        assert!(matches!(result.stop_reason, StopReason::Failed(_)));
        assert!(!result.failed_immediately());
    }

    #[tokio::test]
    async fn test_first_request_failure_is_flagged() {
        let api = ScriptedSearchApi::default();
        api.push(5, Err(SearchError::Api { status: 401, message: "unauthorized".to_string() }));

        let result = search_at_radius(&api, &test_headers(), &criteria(), 5, 1000, &policy(10, 20), &RecordingSleeper::default()).await;
        assert!(result.failed_immediately());
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_delay_before_each_request() {
        let api = ScriptedSearchApi::default();
        api.push(5, Ok(page_of("a", 0..2, Some(true))));
        api.push(5, Ok(page_of("a", 2..3, Some(true))));
        let sleeper = RecordingSleeper::default();
        let policy = PaginationPolicy {
            page_size: 2,
            max_pages: 20,
            request_delay: DelayRange::fixed(Duration::from_secs(2)),
        };

        search_at_radius(&api, &test_headers(), &criteria(), 5, 1000, &policy, &sleeper).await;
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(2); 2]);
    }
}

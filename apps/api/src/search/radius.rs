//! Radius schedule and cross-radius deduplication.

use std::collections::HashSet;

use crate::models::candidate::CandidateRef;

/// Radii searched in order: `increment, 2*increment, ...` up to and including `max_radius_km`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiusPlan {
    pub increment_km: u32,
    pub max_radius_km: u32,
}

impl RadiusPlan {
    pub fn new(increment_km: u32, max_radius_km: u32) -> Self {
        Self {
            increment_km: increment_km.max(1),
            max_radius_km,
        }
    }

    pub fn radii(&self) -> impl Iterator<Item = u32> {
        let step = self.increment_km.max(1);
        let max = self.max_radius_km;
        (1..)
            .map_while(move |i: u32| i.checked_mul(step))
            .take_while(move |r| *r <= max)
    }
}

/// Candidates keyed by profile URL, kept in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct CandidateSet {
    seen: HashSet<String>,
    ordered: Vec<CandidateRef>,
}

impl CandidateSet {
    /// Adds unseen candidates and returns how many were new.
    pub fn absorb(&mut self, batch: impl IntoIterator<Item = CandidateRef>) -> usize {
        let before = self.ordered.len();
        for candidate in batch {
            if self.seen.insert(candidate.profile_url.clone()) {
                self.ordered.push(candidate);
            }
        }
        self.ordered.len() - before
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, profile_url: &str) -> bool {
        self.seen.contains(profile_url)
    }

    pub fn as_slice(&self) -> &[CandidateRef] {
        &self.ordered
    }

    pub fn into_vec(self) -> Vec<CandidateRef> {
        self.ordered
    }
}

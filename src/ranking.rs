//! Scores a provider's candidate routes and tags them for display.

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::PresentationPolicy;
use crate::model::{Route, RouteScore, Score};
use crate::safety::SafetyScorer;
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyBucket {
    Safe,
    Caution,
    Unsafe,
}

impl SafetyBucket {
    /// Map line / badge color.
    pub fn color(self) -> &'static str {
        match self {
            SafetyBucket::Safe => "#10b981",
            SafetyBucket::Caution => "#f59e0b",
            SafetyBucket::Unsafe => "#ef4444",
        }
    }
}

impl PresentationPolicy {
    pub fn bucket(&self, score: Score) -> SafetyBucket {
        let value = score.value();
        if value >= self.safe_threshold {
            SafetyBucket::Safe
        } else if value >= self.caution_threshold {
            SafetyBucket::Caution
        } else {
            SafetyBucket::Unsafe
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRoute {
    /// Position in the provider's list; `routes[index]` is the route scored here.
    pub index: usize,
    pub distance_km: f64,
    pub duration_min: f64,
    #[serde(flatten)]
    pub score: RouteScore,
    pub bucket: SafetyBucket,
    pub color: &'static str,
}

/// Scored candidates in the order the provider returned them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub routes: Vec<RankedRoute>,
}

impl Ranking {
    /// Scores each route on its own rayon task; output order matches input.
    pub fn rank(
        routes: &[Route],
        snapshot: &Snapshot,
        scorer: &SafetyScorer,
        policy: &PresentationPolicy,
    ) -> Self {
        let ranked: Vec<RankedRoute> = routes
            .par_iter()
            .enumerate()
            .map(|(index, route)| {
                let score = scorer.score_route(route, snapshot);
                let bucket = policy.bucket(score.score);
                RankedRoute {
                    index,
                    distance_km: route.distance_km(),
                    duration_min: route.duration_min(),
                    score,
                    bucket,
                    color: bucket.color(),
                }
            })
            .collect();

        info!(candidates = ranked.len(), "Ranked candidate routes");
        Self { routes: ranked }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Selecting a route is a plain read.
    pub fn select(&self, index: usize) -> Option<&RankedRoute> {
        self.routes.get(index)
    }

    /// Highest score; the earliest candidate wins ties.
    pub fn safest(&self) -> Option<&RankedRoute> {
        self.routes.iter().fold(None, |best: Option<&RankedRoute>, r| match best {
            Some(b) if b.score.score >= r.score.score => Some(b),
            _ => Some(r),
        })
    }
}

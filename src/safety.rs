use tracing::debug;

use crate::config::EngineConfig;
use crate::coord::Coordinate;
use crate::model::{NEUTRAL_SCORE, Route, RouteScore, Score};
use crate::store::Snapshot;

/// Scores points and routes against a snapshot. Holds only policy, so one
/// instance can be shared freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyScorer {
    config: EngineConfig,
}

impl SafetyScorer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sum of nearby landmark weights minus the penalty for each nearby report.
    /// Positive = safer, negative = riskier.
    pub fn point_score(&self, p: Coordinate, snapshot: &Snapshot) -> f64 {
        let radius = self.config.proximity_radius_km;
        let bonus: f64 = snapshot
            .landmarks_within(p, radius)
            .iter()
            .map(|l| l.weight)
            .sum();
        let hits = snapshot.reports_within(p, radius).len();
        bonus - self.config.report_penalty * hits as f64
    }

    /// Mean point score, recentred on the neutral score and clamped to 1..5.
    pub fn score_route(&self, route: &Route, snapshot: &Snapshot) -> RouteScore {
        if route.is_empty() {
            return RouteScore {
                score: Score::NEUTRAL,
                raw_score: 0.0,
                coordinates_checked: 0,
            };
        }

        let mut total = 0.0;
        let mut count = 0usize;
        for &p in &route.coordinates {
            total += self.point_score(p, snapshot);
            count += 1;
        }

        let mean = total / count.max(1) as f64;
        let score = Score::normalize(mean + NEUTRAL_SCORE);
        debug!(
            points = count,
            raw = total,
            score = score.value(),
            "Route scored"
        );

        RouteScore {
            score,
            raw_score: total,
            coordinates_checked: count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{KM_PER_DEGREE, distance_km};
    use crate::model::{IncidentCategory, IncidentReport, LandmarkCategory, SafetyLandmark};
    use chrono::Utc;
    use uuid::Uuid;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn landmark(at: Coordinate, weight: f64) -> SafetyLandmark {
        SafetyLandmark::new("l", LandmarkCategory::Police, at, Some(weight)).unwrap()
    }

    fn report(at: Coordinate) -> IncidentReport {
        IncidentReport {
            id: Uuid::new_v4(),
            category: IncidentCategory::Theft,
            location: at,
            note: String::new(),
            timestamp: Utc::now(),
            reporter: "test".to_string(),
        }
    }

    #[test]
    fn police_station_point_scores_five() {
        let station = c(30.7199, 76.8089);
        let snapshot = Snapshot::new(vec![landmark(station, 5.0)], Vec::new());
        let route = Route::from_points(vec![station]);
        let result = SafetyScorer::default().score_route(&route, &snapshot);
        assert_eq!(result.raw_score, 5.0);
        assert_eq!(result.score.value(), 5.0);
        assert_eq!(result.coordinates_checked, 1);
    }

    #[test]
    fn quiet_point_is_neutral() {
        let snapshot =
            Snapshot::new(vec![landmark(c(30.80, 76.80), 5.0)], vec![report(c(30.60, 76.80))]);
        let route = Route::from_points(vec![c(30.70, 76.80)]);
        let result = SafetyScorer::default().score_route(&route, &snapshot);
        assert_eq!(result.score.value(), 3.0);
        assert_eq!(result.raw_score, 0.0);
    }

    #[test]
    fn coincident_report_clamps_to_floor() {
        let spot = c(30.71, 76.79);
        let snapshot = Snapshot::new(Vec::new(), vec![report(spot)]);
        let route = Route::from_points(vec![spot]);
        let result = SafetyScorer::default().score_route(&route, &snapshot);
        assert_eq!(result.raw_score, -3.0);
        assert_eq!(result.score.value(), 1.0);
    }

    #[test]
    fn empty_route_is_neutral_regardless_of_snapshot() {
        let spot = c(30.71, 76.79);
        let snapshot = Snapshot::new(vec![landmark(spot, 5.0)], vec![report(spot), report(spot)]);
        let route = Route::from_points(Vec::new());
        let result = SafetyScorer::default().score_route(&route, &snapshot);
        assert_eq!(result.score.value(), 3.0);
        assert_eq!(result.coordinates_checked, 0);
    }

    #[test]
    fn report_penalty_counts_per_point() {
        // Three points 100 m apart along a meridian, one report near all of them.
        let points: Vec<_> = (0..3)
            .map(|i| c(30.70 + i as f64 * 0.1 / KM_PER_DEGREE, 76.80))
            .collect();
        let snapshot = Snapshot::new(Vec::new(), vec![report(points[1])]);
        let scorer = SafetyScorer::default();
        assert_eq!(scorer.point_score(points[0], &snapshot), -3.0);
        let result = scorer.score_route(&Route::from_points(points), &snapshot);
        assert_eq!(result.raw_score, -9.0);
        assert_eq!(result.score.value(), 1.0);
    }

    #[test]
    fn threshold_is_strict() {
        let p = c(30.70, 76.80);
        let q = c(30.70 + 0.2 / KM_PER_DEGREE, 76.8001);
        let d = distance_km(p, q);
        let snapshot = Snapshot::new(vec![landmark(q, 2.0)], vec![report(q)]);

        let at_radius = SafetyScorer::new(EngineConfig {
            proximity_radius_km: d,
            ..EngineConfig::default()
        });
        assert_eq!(at_radius.point_score(p, &snapshot), 0.0);

        let just_outside = SafetyScorer::new(EngineConfig {
            proximity_radius_km: d + 1e-9,
            ..EngineConfig::default()
        });
        assert_eq!(just_outside.point_score(p, &snapshot), 2.0 - 3.0);
    }

    #[test]
    fn default_radius_edge() {
        let p = c(30.70, 76.80);
        let inside = c(30.70 + 0.249999 / KM_PER_DEGREE, 76.80);
        let outside = c(30.70 + 0.250001 / KM_PER_DEGREE, 76.80);
        let scorer = SafetyScorer::default();
        assert_eq!(
            scorer.point_score(p, &Snapshot::new(vec![landmark(inside, 4.0)], Vec::new())),
            4.0
        );
        assert_eq!(
            scorer.point_score(p, &Snapshot::new(vec![landmark(outside, 4.0)], Vec::new())),
            0.0
        );
    }

    #[test]
    fn penalty_is_configurable() {
        let spot = c(30.71, 76.79);
        let snapshot = Snapshot::new(vec![landmark(spot, 1.0)], vec![report(spot)]);
        let scorer = SafetyScorer::new(EngineConfig {
            report_penalty: 0.5,
            ..EngineConfig::default()
        });
        let result = scorer.score_route(&Route::from_points(vec![spot]), &snapshot);
        assert_eq!(result.score.value(), 3.5);
    }

    #[test]
    fn mean_is_rounded_to_two_places() {
        // One point gains 1, two neutral points: mean 1/3.
        let a = c(30.70, 76.80);
        let far1 = c(30.75, 76.80);
        let far2 = c(30.80, 76.80);
        let snapshot = Snapshot::new(vec![landmark(a, 1.0)], Vec::new());
        let route = Route::from_points(vec![a, far1, far2]);
        let result = SafetyScorer::default().score_route(&route, &snapshot);
        assert_eq!(result.score.value(), 3.33);
    }
}

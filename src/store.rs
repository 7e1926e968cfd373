//! Landmark / report access and the per-call scoring snapshot.

use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use geo::Rect;
use itertools::Itertools;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use tracing::{debug, info};

use crate::coord::{self, Coordinate};
use crate::error::{Result, ScoringError};
use crate::model::{IncidentReport, LandmarkCategory, NewReport, SafetyLandmark};

/// Read contract the engine needs from whatever holds landmarks and reports.
///
/// `bounds`, when given, lets an implementation return only records inside
/// the box (edges inclusive). Returning more than asked is allowed.
pub trait SafetyStore: Send + Sync {
    fn landmarks(&self, bounds: Option<&Rect<f64>>) -> Result<Vec<SafetyLandmark>>;

    fn reports(&self, bounds: Option<&Rect<f64>>) -> Result<Vec<IncidentReport>>;

    /// Pulls both collections into one immutable snapshot for a scoring pass.
    fn snapshot(&self, bounds: Option<&Rect<f64>>) -> Result<Snapshot> {
        let landmarks = self.landmarks(bounds)?;
        let reports = self.reports(bounds)?;
        Ok(Snapshot::new(landmarks, reports))
    }
}

/// Write side behind the report endpoint. Reports are append-only.
pub trait ReportSink: SafetyStore {
    /// Appends a report, stamping identity and creation time.
    fn submit_report(&self, new: NewReport) -> Result<IncidentReport>;
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Immutable landmarks + reports with an R-tree over each collection.
pub struct Snapshot {
    landmarks: Vec<SafetyLandmark>,
    reports: Vec<IncidentReport>,
    landmark_index: RTree<IndexedPoint>,
    report_index: RTree<IndexedPoint>,
}

impl Snapshot {
    pub fn new(landmarks: Vec<SafetyLandmark>, reports: Vec<IncidentReport>) -> Self {
        let landmark_index = build_index(landmarks.iter().map(|l| l.location));
        let report_index = build_index(reports.iter().map(|r| r.location));
        Self {
            landmarks,
            reports,
            landmark_index,
            report_index,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn landmarks(&self) -> &[SafetyLandmark] {
        &self.landmarks
    }

    pub fn reports(&self) -> &[IncidentReport] {
        &self.reports
    }

    /// Landmarks strictly closer than `radius_km` to `p`, in snapshot order.
    pub fn landmarks_within(&self, p: Coordinate, radius_km: f64) -> Vec<&SafetyLandmark> {
        candidates(&self.landmark_index, self.landmarks.len(), p, radius_km)
            .into_iter()
            .map(|i| &self.landmarks[i])
            .filter(|l| coord::distance_km(p, l.location) < radius_km)
            .collect()
    }

    /// Reports strictly closer than `radius_km` to `p`, in snapshot order.
    pub fn reports_within(&self, p: Coordinate, radius_km: f64) -> Vec<&IncidentReport> {
        candidates(&self.report_index, self.reports.len(), p, radius_km)
            .into_iter()
            .map(|i| &self.reports[i])
            .filter(|r| coord::distance_km(p, r.location) < radius_km)
            .collect()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("landmarks", &self.landmarks.len())
            .field("reports", &self.reports.len())
            .finish()
    }
}

fn build_index(points: impl Iterator<Item = Coordinate>) -> RTree<IndexedPoint> {
    let items = points
        .enumerate()
        .map(|(i, c)| GeomWithData::new(c.to_xy(), i))
        .collect();
    RTree::bulk_load(items)
}

/// Sorted positions of every record that may lie within `radius_km` of `p`.
fn candidates(
    index: &RTree<IndexedPoint>,
    len: usize,
    p: Coordinate,
    radius_km: f64,
) -> Vec<usize> {
    let Some(bounds) = coord::bounding_box(&[p], radius_km) else {
        return (0..len).collect();
    };
    let envelope = AABB::from_corners(
        [bounds.min().x, bounds.min().y],
        [bounds.max().x, bounds.max().y],
    );
    let mut hits: Vec<usize> = index
        .locate_in_envelope(&envelope)
        .map(|item| item.data)
        .collect();
    hits.sort_unstable();
    hits
}

#[derive(Debug, Default)]
struct Records {
    landmarks: Vec<SafetyLandmark>,
    reports: Vec<IncidentReport>,
}

/// Process-local store: curated landmarks plus an append-only report log.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_landmarks(landmarks: Vec<SafetyLandmark>) -> Self {
        Self {
            records: RwLock::new(Records {
                landmarks,
                reports: Vec::new(),
            }),
        }
    }

    /// Store preloaded with the bundled reference landmarks.
    pub fn seeded() -> Result<Self> {
        let landmarks = seed_landmarks()?;
        info!("Seeded {} safety landmarks", landmarks.len());
        Ok(Self::with_landmarks(landmarks))
    }

    pub fn add_landmark(&self, landmark: SafetyLandmark) -> Result<()> {
        self.write()?.landmarks.push(landmark);
        Ok(())
    }

    /// Reports filed by one reporter, newest first.
    pub fn reports_for(&self, reporter: &str) -> Result<Vec<IncidentReport>> {
        Ok(self
            .read()?
            .reports
            .iter()
            .filter(|r| r.reporter == reporter)
            .cloned()
            .sorted_by(|a, b| b.timestamp.cmp(&a.timestamp))
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| ScoringError::StoreUnavailable("record lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| ScoringError::StoreUnavailable("record lock poisoned".to_string()))
    }
}

impl SafetyStore for MemoryStore {
    fn landmarks(&self, bounds: Option<&Rect<f64>>) -> Result<Vec<SafetyLandmark>> {
        Ok(self
            .read()?
            .landmarks
            .iter()
            .filter(|l| bounds.is_none_or(|b| l.location.within(b)))
            .cloned()
            .collect())
    }

    fn reports(&self, bounds: Option<&Rect<f64>>) -> Result<Vec<IncidentReport>> {
        Ok(self
            .read()?
            .reports
            .iter()
            .filter(|r| bounds.is_none_or(|b| r.location.within(b)))
            .cloned()
            .collect())
    }
}

impl ReportSink for MemoryStore {
    fn submit_report(&self, new: NewReport) -> Result<IncidentReport> {
        let report = new.into_report(Utc::now());
        self.write()?.reports.push(report.clone());
        debug!(id = %report.id, category = ?report.category, "Report stored");
        Ok(report)
    }
}

// Chandigarh reference set: (id, category, name, lat, lng).
const SEED: &[(&str, LandmarkCategory, &str, f64, f64)] = &[
    ("pol-s36", LandmarkCategory::Police, "Sector 36 Police Station", 30.5537, 76.8243),
    ("pol-s17", LandmarkCategory::Police, "Sector 17 Police Station", 30.7392, 76.7838),
    ("pol-s43", LandmarkCategory::Police, "Sector 43 Police Station", 30.6223, 76.7693),
    ("pol-madhya", LandmarkCategory::Police, "Madhya Marg Police Station", 30.7199, 76.8089),
    ("hos-pgi", LandmarkCategory::Hospital, "Post Graduate Institute", 30.7632, 76.8432),
    (
        "hos-gmch",
        LandmarkCategory::Hospital,
        "Government Medical College Hospital",
        30.7490,
        76.7840,
    ),
    ("hos-fortis", LandmarkCategory::Hospital, "Fortis Hospital", 30.7337, 76.8236),
    ("hos-apollo", LandmarkCategory::Hospital, "Apollo Hospital", 30.6890, 76.8045),
    ("mkt-s17", LandmarkCategory::Market, "Sector 17 Market", 30.7392, 76.7838),
    ("mkt-s35", LandmarkCategory::Market, "Sector 35 Market", 30.5641, 76.8154),
    ("mkt-elante", LandmarkCategory::Market, "Elante Mall Market", 30.6885, 76.8045),
    ("mkt-vr", LandmarkCategory::Market, "VR Mall Market", 30.7249, 76.8267),
    ("mall-elante", LandmarkCategory::Mall, "Elante Mall", 30.6885, 76.8045),
    ("mall-vr", LandmarkCategory::Mall, "VR Punjab Mall", 30.7249, 76.8267),
    ("mall-sahara", LandmarkCategory::Mall, "Sahara Mall", 30.7130, 76.8120),
    ("mall-paladi", LandmarkCategory::Mall, "Paladi Mall", 30.7082, 76.8098),
    ("light-1", LandmarkCategory::Light, "Well-lit area", 30.7230, 76.776),
];

pub fn seed_landmarks() -> Result<Vec<SafetyLandmark>> {
    SEED.iter()
        .map(|&(id, category, name, lat, lng)| {
            Ok(SafetyLandmark::new(id, category, Coordinate::new(lat, lng)?, None)?.named(name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::KM_PER_DEGREE;
    use crate::model::IncidentCategory;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn report_at(store: &MemoryStore, lat: f64, lon: f64, reporter: &str) -> IncidentReport {
        store
            .submit_report(NewReport {
                category: IncidentCategory::Harassment,
                location: c(lat, lon),
                note: String::new(),
                reporter: reporter.to_string(),
            })
            .unwrap()
    }

    #[test]
    fn seed_uses_category_weights() {
        let landmarks = seed_landmarks().unwrap();
        assert_eq!(landmarks.len(), 17);
        let police = landmarks.iter().find(|l| l.id == "pol-s17").unwrap();
        assert_eq!(police.weight, 5.0);
        let light = landmarks.iter().find(|l| l.id == "light-1").unwrap();
        assert_eq!(light.weight, 2.0);
    }

    #[test]
    fn added_landmarks_show_up_in_snapshots() {
        let store = MemoryStore::new();
        let before = store.snapshot(None).unwrap();
        let kiosk =
            SafetyLandmark::new("kiosk", LandmarkCategory::Other, c(30.7, 76.8), None).unwrap();
        store.add_landmark(kiosk).unwrap();
        assert!(before.landmarks().is_empty());
        assert_eq!(store.snapshot(None).unwrap().landmarks().len(), 1);
    }

    #[test]
    fn reports_are_appended_and_filtered() {
        let store = MemoryStore::new();
        let first = report_at(&store, 30.70, 76.78, "asha");
        let second = report_at(&store, 30.71, 76.79, "asha");
        report_at(&store, 30.72, 76.80, "ravi");

        let all = store.reports(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], first);
        assert_ne!(first.id, second.id);

        let mine = store.reports_for("asha").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].timestamp >= mine[1].timestamp);
    }

    #[test]
    fn bounded_queries_respect_the_box() {
        let store = MemoryStore::seeded().unwrap();
        let route = crate::model::Route::from_points(vec![c(30.7392, 76.7838)]);
        let bounds = route.bounding_box(0.25).unwrap();
        let near = store.landmarks(Some(&bounds)).unwrap();
        let ids: Vec<_> = near.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["pol-s17", "mkt-s17"]);
    }

    #[test]
    fn index_agrees_with_linear_scan() {
        let mut landmarks = Vec::new();
        for i in 0..40 {
            for j in 0..40 {
                let lat = 30.70 + i as f64 * 0.0013;
                let lon = 76.75 + j as f64 * 0.0017;
                let at = c(lat, lon);
                landmarks.push(
                    SafetyLandmark::new(format!("l{i}-{j}"), LandmarkCategory::Light, at, None)
                        .unwrap(),
                );
            }
        }
        let snapshot = Snapshot::new(landmarks.clone(), Vec::new());

        for k in 0..25 {
            let p = c(30.705 + k as f64 * 0.0019, 76.76 + k as f64 * 0.0023);
            for radius in [0.1, 0.25, 0.6] {
                let indexed: Vec<_> = snapshot
                    .landmarks_within(p, radius)
                    .into_iter()
                    .map(|l| &l.id)
                    .collect();
                let linear: Vec<_> = landmarks
                    .iter()
                    .filter(|l| coord::distance_km(p, l.location) < radius)
                    .map(|l| &l.id)
                    .collect();
                assert_eq!(indexed, linear);
            }
        }
    }

    #[test]
    fn strict_radius_on_reports() {
        let store = MemoryStore::new();
        let origin = c(12.0, 77.0);
        report_at(&store, 12.0 + 0.2499 / KM_PER_DEGREE, 77.0, "a");
        report_at(&store, 12.0 + 0.2501 / KM_PER_DEGREE, 77.0, "b");
        let snapshot = store.snapshot(None).unwrap();
        let hits = snapshot.reports_within(origin, 0.25);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reporter, "a");
    }

    #[test]
    fn falls_back_to_scan_near_antimeridian() {
        let landmarks = vec![
            SafetyLandmark::new("east", LandmarkCategory::Police, c(0.0, 179.9995), None).unwrap(),
            SafetyLandmark::new("west", LandmarkCategory::Police, c(0.0, -179.9995), None).unwrap(),
        ];
        let snapshot = Snapshot::new(landmarks, Vec::new());
        let hits = snapshot.landmarks_within(c(0.0, 180.0), 0.25);
        assert_eq!(hits.len(), 2);
    }
}

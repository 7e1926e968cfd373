use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use geo::Rect;
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

use crate::coord::{self, Coordinate};
use crate::error::{Result, ScoringError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkCategory {
    Police,
    Hospital,
    Market,
    Mall,
    Light,
    Other,
}

impl LandmarkCategory {
    /// Weight applied when a landmark record carries none.
    pub fn default_weight(self) -> f64 {
        match self {
            LandmarkCategory::Police => 5.0,
            LandmarkCategory::Hospital => 4.0,
            LandmarkCategory::Market | LandmarkCategory::Mall => 3.0,
            LandmarkCategory::Light => 2.0,
            LandmarkCategory::Other => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LandmarkCategory::Police => "police",
            LandmarkCategory::Hospital => "hospital",
            LandmarkCategory::Market => "market",
            LandmarkCategory::Mall => "mall",
            LandmarkCategory::Light => "light",
            LandmarkCategory::Other => "other",
        }
    }
}

impl FromStr for LandmarkCategory {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "police" => Ok(LandmarkCategory::Police),
            "hospital" => Ok(LandmarkCategory::Hospital),
            "market" => Ok(LandmarkCategory::Market),
            "mall" => Ok(LandmarkCategory::Mall),
            "light" => Ok(LandmarkCategory::Light),
            "other" => Ok(LandmarkCategory::Other),
            unknown => Err(ScoringError::InvalidLandmark(format!(
                "unknown landmark category '{unknown}'"
            ))),
        }
    }
}

impl fmt::Display for LandmarkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-curated point that raises the safety of its surroundings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyLandmark {
    pub id: String,
    #[serde(rename = "type")]
    pub category: LandmarkCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub location: Coordinate,
    pub weight: f64,
}

impl SafetyLandmark {
    /// Builds a landmark; `weight` falls back to the category default and
    /// must be positive.
    pub fn new(
        id: impl Into<String>,
        category: LandmarkCategory,
        location: Coordinate,
        weight: Option<f64>,
    ) -> Result<Self> {
        let weight = weight.unwrap_or_else(|| category.default_weight());
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ScoringError::InvalidLandmark(format!(
                "weight must be positive, got {weight}"
            )));
        }
        Ok(Self {
            id: id.into(),
            category,
            name: None,
            location,
            weight,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentCategory {
    Assault,
    Theft,
    Harassment,
    Suspicious,
    Other,
}

/// User-submitted incident. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentReport {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub category: IncidentCategory,
    #[serde(flatten)]
    pub location: Coordinate,
    pub note: String,
    pub timestamp: DateTime<Utc>,
    pub reporter: String,
}

/// Report payload before the store assigns identity and time.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    #[serde(rename = "type")]
    pub category: IncidentCategory,
    #[serde(flatten)]
    pub location: Coordinate,
    #[serde(default)]
    pub note: String,
    #[serde(default = "anonymous")]
    pub reporter: String,
}

fn anonymous() -> String {
    "anonymous".to_string()
}

impl NewReport {
    pub fn into_report(self, timestamp: DateTime<Utc>) -> IncidentReport {
        IncidentReport {
            id: Uuid::new_v4(),
            category: self.category,
            location: self.location,
            note: self.note,
            timestamp,
            reporter: self.reporter,
        }
    }
}

/// One candidate path from the external routing provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Route {
    pub coordinates: Vec<Coordinate>,
    /// Total distance in meters.
    #[serde(default, deserialize_with = "non_negative")]
    pub distance: f64,
    /// Total duration in seconds.
    #[serde(default, deserialize_with = "non_negative")]
    pub duration: f64,
}

fn non_negative<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(de::Error::custom(format!("expected a non-negative number, got {value}")))
    }
}

impl Route {
    pub fn new(coordinates: Vec<Coordinate>, distance_m: f64, duration_s: f64) -> Self {
        Self {
            coordinates,
            distance: distance_m,
            duration: duration_s,
        }
    }

    pub fn from_points(coordinates: Vec<Coordinate>) -> Self {
        Self::new(coordinates, 0.0, 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn distance_km(&self) -> f64 {
        round2(self.distance / 1000.0)
    }

    pub fn duration_min(&self) -> f64 {
        (self.duration / 60.0).round()
    }

    /// Box covering every position within `margin_km` of the route.
    pub fn bounding_box(&self, margin_km: f64) -> Option<Rect<f64>> {
        coord::bounding_box(&self.coordinates, margin_km)
    }
}

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;
pub const NEUTRAL_SCORE: f64 = 3.0;

/// Normalized safety score in [1.0, 5.0], two-decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub const NEUTRAL: Score = Score(NEUTRAL_SCORE);

    /// Clamps into [1.0, 5.0], then rounds half away from zero to two places.
    pub fn normalize(value: f64) -> Self {
        let value = if value.is_nan() { NEUTRAL_SCORE } else { value };
        Score(round2(value.clamp(MIN_SCORE, MAX_SCORE)))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Score plus the diagnostics reported alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteScore {
    pub score: Score,
    /// Sum of point scores before averaging.
    pub raw_score: f64,
    pub coordinates_checked: usize,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

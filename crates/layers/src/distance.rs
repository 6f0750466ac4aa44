use std::fmt;

use serde::{Deserialize, Serialize};

/// Distances at or above this switch from meters to kilometers.
pub const KILOMETER_THRESHOLD_M: f64 = 1000.0;

/// Human-facing distance. `Unavailable` is never rendered as zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum DistanceLabel {
    /// Whole meters, truncated.
    Meters(u32),
    /// Tenths of a kilometer, rounded.
    Kilometers { tenths: u64 },
    Unavailable,
}

impl DistanceLabel {
    pub fn from_meters(distance_m: Option<f64>) -> Self {
        let Some(d) = distance_m.filter(|d| d.is_finite() && *d >= 0.0) else {
            return DistanceLabel::Unavailable;
        };
        if d < KILOMETER_THRESHOLD_M {
            DistanceLabel::Meters(d as u32)
        } else {
            DistanceLabel::Kilometers {
                tenths: (d / 100.0).round() as u64,
            }
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, DistanceLabel::Unavailable)
    }

    /// Renders the label, substituting `unavailable` for the sentinel.
    pub fn render(&self, unavailable: &str) -> String {
        match self {
            DistanceLabel::Unavailable => unavailable.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for DistanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceLabel::Meters(m) => write!(f, "{m}m"),
            DistanceLabel::Kilometers { tenths } => write!(f, "{}.{}km", tenths / 10, tenths % 10),
            DistanceLabel::Unavailable => f.write_str("-"),
        }
    }
}

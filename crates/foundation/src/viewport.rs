use serde::{Deserialize, Serialize};

use crate::bounds::GeoBounds;
use crate::geo::Coordinate;

/// Latitude/longitude extent of a viewport, in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub lat_delta: f64,
    pub lon_delta: f64,
}

impl Span {
    pub const fn new(lat_delta: f64, lon_delta: f64) -> Self {
        Self {
            lat_delta,
            lon_delta,
        }
    }
}

/// The visible map region.
///
/// Equality is structural; two equal viewports describe the same query.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub span: Span,
}

impl Viewport {
    pub const fn new(center: Coordinate, span: Span) -> Self {
        Self { center, span }
    }

    /// `[center.lat ± span.lat/2, center.lon ± span.lon/2]`
    pub fn bounds(&self) -> GeoBounds {
        let half_lat = self.span.lat_delta.abs() * 0.5;
        let half_lon = self.span.lon_delta.abs() * 0.5;
        GeoBounds::new(
            self.center.lat - half_lat,
            self.center.lat + half_lat,
            self.center.lon - half_lon,
            self.center.lon + half_lon,
        )
    }
}

use crate::geo::Coordinate;

/// Latitude/longitude box in degrees.
///
/// Containment is inclusive on both edges.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        GeoBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Grows every edge outwards by `margin_deg`.
    pub fn expanded(self, margin_deg: f64) -> Self {
        GeoBounds {
            min_lat: self.min_lat - margin_deg,
            max_lat: self.max_lat + margin_deg,
            min_lon: self.min_lon - margin_deg,
            max_lon: self.max_lon + margin_deg,
        }
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        !(c.lat < self.min_lat
            || c.lat > self.max_lat
            || c.lon < self.min_lon
            || c.lon > self.max_lon)
    }
}

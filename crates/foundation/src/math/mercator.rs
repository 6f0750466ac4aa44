use core::f64::consts::PI;

use crate::geo::Coordinate;
use crate::viewport::Viewport;

/// Latitude limit of the square Web-Mercator world.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Tile size used to express zoom levels.
pub const TILE_PX: f64 = 256.0;

/// Normalized Web-Mercator x in `[0, 1]`.
pub fn mercator_x(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

/// Normalized Web-Mercator y in `[0, 1]`, growing southwards.
pub fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0
}

/// Maps coordinates to pixels for one viewport at one surface size.
///
/// The top-left corner of the viewport is `[0, 0]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenProjection {
    origin: [f64; 2],
    scale: f64,
}

impl ScreenProjection {
    /// Returns `None` when the viewport or surface has no horizontal extent.
    pub fn for_viewport(viewport: &Viewport, viewport_px: [f32; 2]) -> Option<Self> {
        let lon_delta = viewport.span.lon_delta.abs();
        let width = viewport_px[0] as f64;
        if !(lon_delta > 0.0 && width > 0.0 && lon_delta.is_finite() && width.is_finite()) {
            return None;
        }

        let bounds = viewport.bounds();
        Some(Self {
            origin: [mercator_x(bounds.min_lon), mercator_y(bounds.max_lat)],
            scale: width / (lon_delta / 360.0),
        })
    }

    pub fn project(&self, c: Coordinate) -> [f64; 2] {
        [
            (mercator_x(c.lon) - self.origin[0]) * self.scale,
            (mercator_y(c.lat) - self.origin[1]) * self.scale,
        ]
    }

    /// Fractional zoom level equivalent to this projection.
    pub fn zoom(&self) -> f64 {
        (self.scale / TILE_PX).log2()
    }
}

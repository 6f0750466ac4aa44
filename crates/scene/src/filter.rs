use std::collections::HashSet;

use foundation::geo::Coordinate;
use foundation::viewport::Viewport;
use tracing::debug;

use crate::entity::{FacilityInfo, MapEntity};
use crate::records::{CategoryFilter, FacilityId, FacilityRecord};

/// Slack applied to every viewport edge.
///
/// Viewport edges are computed as `center ± span/2`, which is not exact in
/// binary floating point; without slack a coordinate sitting exactly on the
/// visible edge can land a few ulps outside it.
pub const BOUNDARY_EPSILON_DEG: f64 = 1e-9;

/// Whether `coordinate` is inside `viewport`, edges included.
pub fn includes(viewport: &Viewport, coordinate: Coordinate) -> bool {
    viewport
        .bounds()
        .expanded(BOUNDARY_EPSILON_DEG)
        .contains(coordinate)
}

/// A facility that survived viewport and category filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityMatch {
    pub facility: FacilityInfo,
    pub coordinate: Coordinate,
}

/// Client-side replacement for a bounding-box query.
///
/// Facilities with unparseable coordinates are skipped, as are repeated ids
/// (the first occurrence wins). Output keeps input order.
pub fn filter_facilities(
    viewport: &Viewport,
    category: CategoryFilter,
    facilities: &[FacilityRecord],
) -> Vec<FacilityMatch> {
    let mut seen: HashSet<&FacilityId> = HashSet::new();
    let mut out = Vec::new();
    let mut unparsed = 0usize;

    for rec in facilities {
        let Some(coordinate) = rec.coordinate() else {
            unparsed += 1;
            continue;
        };
        if !category.allows(rec.indoor_outdoor) || !includes(viewport, coordinate) {
            continue;
        }
        if !seen.insert(&rec.id) {
            continue;
        }
        out.push(FacilityMatch {
            facility: FacilityInfo::from(rec),
            coordinate,
        });
    }

    if unparsed > 0 {
        debug!(unparsed, "skipped facilities with malformed coordinates");
    }
    out
}

/// Drops entities that fall outside `viewport`.
pub fn retain_in_viewport(viewport: &Viewport, entities: &mut Vec<MapEntity>) {
    entities.retain(|e| includes(viewport, e.coordinate));
}

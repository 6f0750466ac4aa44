use foundation::geo::Coordinate;
use scene::entity::{EntityId, MapEntity};
use scene::records::IndoorOutdoor;
use scene::selection::SelectionState;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceLabel;
use crate::symbology::Symbology;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailConfig {
    pub symbology: Symbology,
    /// Shown wherever a distance cannot be computed.
    pub unavailable_text: String,
    /// `{count}` is replaced with the member count.
    pub cluster_title_template: String,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            symbology: Symbology::default(),
            unavailable_text: "distance unavailable".to_string(),
            cluster_title_template: "{count} rides".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    Single,
    Cluster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub id: EntityId,
    pub name: String,
    pub category: String,
    pub icon: String,
    pub facility_name: String,
    pub address: String,
    pub install_date: String,
    pub distance: DistanceLabel,
    pub distance_text: String,
}

/// Everything the detail surface renders for one selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayModel {
    pub kind: DetailKind,
    pub title: String,
    pub subtitle: String,
    /// Headline distance; the nearest member for clusters.
    pub distance: DistanceLabel,
    pub distance_text: String,
    pub badge: Option<String>,
    /// Distinct icons in row order.
    pub icons: Vec<String>,
    /// Nearest first.
    pub rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, Copy)]
pub enum DetailSubject<'a> {
    Entity(&'a MapEntity),
    Cluster(&'a [MapEntity]),
}

/// Pure projection from a selection to a [`DisplayModel`].
///
/// Distances are recomputed from the supplied user location, so the output
/// depends only on the arguments.
#[derive(Debug, Clone, Default)]
pub struct DetailProjectionBuilder {
    config: DetailConfig,
}

impl DetailProjectionBuilder {
    pub fn new(config: DetailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetailConfig {
        &self.config
    }

    /// Returns `None` only for an empty cluster.
    pub fn build(
        &self,
        subject: DetailSubject<'_>,
        user: Option<Coordinate>,
    ) -> Option<DisplayModel> {
        match subject {
            DetailSubject::Entity(entity) => Some(self.build_entity(entity, user)),
            DetailSubject::Cluster(members) => self.build_cluster(members, user),
        }
    }

    pub fn for_selection(
        &self,
        state: &SelectionState,
        user: Option<Coordinate>,
    ) -> Option<DisplayModel> {
        match state {
            SelectionState::SingleSelected { entity } => {
                self.build(DetailSubject::Entity(entity), user)
            }
            SelectionState::ClusterSelected { members } => {
                self.build(DetailSubject::Cluster(members), user)
            }
            SelectionState::Idle | SelectionState::Dismissed => None,
        }
    }

    pub fn build_entity(&self, entity: &MapEntity, user: Option<Coordinate>) -> DisplayModel {
        let row = self.row(entity, user);
        DisplayModel {
            kind: DetailKind::Single,
            title: entity.name.clone(),
            subtitle: entity.address.clone(),
            distance: row.distance,
            distance_text: row.distance_text.clone(),
            badge: self.badge(entity.facility.indoor_outdoor),
            icons: vec![row.icon.clone()],
            rows: vec![row],
        }
    }

    pub fn build_cluster(
        &self,
        members: &[MapEntity],
        user: Option<Coordinate>,
    ) -> Option<DisplayModel> {
        match members {
            [] => return None,
            [only] => return Some(self.build_entity(only, user)),
            _ => {}
        }

        let mut ranked: Vec<(Option<f64>, &MapEntity)> = members
            .iter()
            .map(|m| (user.map(|u| u.distance_m(&m.coordinate)), m))
            .collect();
        ranked.sort_by(|a, b| foundation::math::precision::cmp_optional_distance(a.0, b.0));

        let rows: Vec<DetailRow> = ranked.iter().map(|(_, m)| self.row(m, user)).collect();
        let nearest = ranked[0].1;

        let mut icons: Vec<String> = Vec::new();
        for row in &rows {
            if !icons.contains(&row.icon) {
                icons.push(row.icon.clone());
            }
        }

        let first_facility = &members[0].facility;
        let shared_facility = members.iter().all(|m| m.facility.id == first_facility.id);
        let title = if shared_facility {
            first_facility.name.clone()
        } else {
            self.config
                .cluster_title_template
                .replace("{count}", &members.len().to_string())
        };

        let shared_kind = members
            .iter()
            .all(|m| m.facility.indoor_outdoor == first_facility.indoor_outdoor);
        let badge = if shared_kind {
            self.badge(first_facility.indoor_outdoor)
        } else {
            None
        };

        Some(DisplayModel {
            kind: DetailKind::Cluster,
            title,
            subtitle: nearest.address.clone(),
            distance: rows[0].distance,
            distance_text: rows[0].distance_text.clone(),
            badge,
            icons,
            rows,
        })
    }

    fn row(&self, entity: &MapEntity, user: Option<Coordinate>) -> DetailRow {
        let distance = DistanceLabel::from_meters(user.map(|u| u.distance_m(&entity.coordinate)));
        DetailRow {
            id: entity.id.clone(),
            name: entity.name.clone(),
            category: entity.category.clone(),
            icon: self.config.symbology.icon_for_category(&entity.category).to_string(),
            facility_name: entity.facility.name.clone(),
            address: entity.address.clone(),
            install_date: entity.install_date.clone(),
            distance,
            distance_text: distance.render(&self.config.unavailable_text),
        }
    }

    fn badge(&self, kind: IndoorOutdoor) -> Option<String> {
        self.config.symbology.badge_for(kind).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scene::entity::FacilityInfo;
    use scene::records::FacilityId;

    fn entity(id: &str, facility: &str, category: &str, lat: f64, lon: f64) -> MapEntity {
        MapEntity {
            id: EntityId::new(id),
            coordinate: Coordinate::new(lat, lon),
            name: format!("ride {id}"),
            category: category.into(),
            address: format!("{id} Park Rd"),
            install_date: "2021-05-01".into(),
            facility: FacilityInfo {
                id: FacilityId::new(facility),
                name: format!("park {facility}"),
                indoor_outdoor: IndoorOutdoor::Outdoor,
            },
            distance_from_user_m: None,
        }
    }

    const USER: Coordinate = Coordinate::new(37.5665, 126.9780);

    #[test]
    fn single_entity_with_location() {
        let b = DetailProjectionBuilder::default();
        // ~850 m north of the user.
        let e = entity("a", "f1", "swing", 37.5665 + 850.5 / 111_195.08, 126.9780);
        let m = b.build_entity(&e, Some(USER));
        assert_eq!(m.kind, DetailKind::Single);
        assert_eq!(m.title, "ride a");
        assert_eq!(m.subtitle, "a Park Rd");
        assert_eq!(m.distance_text, "850m");
        assert_eq!(m.badge.as_deref(), Some("badge.outdoor"));
        assert_eq!(m.icons, vec!["icon.swing".to_string()]);
    }

    #[test]
    fn no_location_is_unavailable_not_zero() {
        let b = DetailProjectionBuilder::default();
        let m = b.build_entity(&entity("a", "f1", "slide", 37.5665, 126.9780), None);
        assert_eq!(m.distance, DistanceLabel::Unavailable);
        assert_eq!(m.distance_text, "distance unavailable");
        assert!(m.rows.iter().all(|r| !r.distance.is_available()));
    }

    #[test]
    fn size_one_cluster_matches_single_entity() {
        let b = DetailProjectionBuilder::default();
        let e = entity("a", "f1", "swing", 37.57, 126.98);
        let single = b.build(DetailSubject::Entity(&e), Some(USER));
        let cluster = b.build(DetailSubject::Cluster(std::slice::from_ref(&e)), Some(USER));
        assert_eq!(single, cluster);
    }

    #[test]
    fn cluster_rows_sorted_and_headline_is_nearest() {
        let b = DetailProjectionBuilder::default();
        let members = vec![
            entity("far", "f1", "slide", 37.60, 126.9780),
            entity("near", "f1", "swing", 37.5670, 126.9780),
            entity("mid", "f1", "swing", 37.58, 126.9780),
        ];
        let m = b.build_cluster(&members, Some(USER)).expect("non-empty");
        let order: Vec<&str> = m.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
        assert_eq!(m.distance, m.rows[0].distance);
        assert_eq!(m.subtitle, "near Park Rd");
        assert_eq!(m.title, "park f1");
        assert_eq!(m.icons, vec!["icon.swing".to_string(), "icon.slide".to_string()]);
    }

    #[test]
    fn mixed_cluster_uses_count_title_and_drops_badge() {
        let b = DetailProjectionBuilder::default();
        let mut indoor = entity("b", "f2", "swing", 37.57, 126.98);
        indoor.facility.indoor_outdoor = IndoorOutdoor::Indoor;
        let members = vec![entity("a", "f1", "swing", 37.57, 126.98), indoor];
        let m = b.build_cluster(&members, None).expect("non-empty");
        assert_eq!(m.title, "2 rides");
        assert_eq!(m.badge, None);
        // Without a location the input order is kept.
        assert_eq!(m.rows[0].id.as_str(), "a");
    }

    #[test]
    fn selection_projection() {
        let b = DetailProjectionBuilder::default();
        assert_eq!(b.for_selection(&SelectionState::Idle, Some(USER)), None);
        assert_eq!(b.for_selection(&SelectionState::Dismissed, None), None);
        let e = entity("a", "f1", "swing", 37.57, 126.98);
        let m = b
            .for_selection(&SelectionState::SingleSelected { entity: e }, None)
            .expect("selected");
        assert_eq!(m.kind, DetailKind::Single);
        assert_eq!(b.build_cluster(&[], None), None);
    }
}

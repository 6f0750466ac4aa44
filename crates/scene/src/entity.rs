use foundation::geo::Coordinate;
use serde::{Deserialize, Serialize};

use crate::records::{FacilityId, FacilityRecord, IndoorOutdoor, SubRecord};

/// Identity of a rendered entity (the sub-record id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The facility a rendered entity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityInfo {
    pub id: FacilityId,
    pub name: String,
    pub indoor_outdoor: IndoorOutdoor,
}

impl From<&FacilityRecord> for FacilityInfo {
    fn from(rec: &FacilityRecord) -> Self {
        Self {
            id: rec.id.clone(),
            name: rec.name.clone(),
            indoor_outdoor: rec.indoor_outdoor,
        }
    }
}

/// What the map renders. Derived on every aggregation cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapEntity {
    pub id: EntityId,
    pub coordinate: Coordinate,
    pub name: String,
    pub category: String,
    pub address: String,
    pub install_date: String,
    pub facility: FacilityInfo,
    pub distance_from_user_m: Option<f64>,
}

impl MapEntity {
    /// Builds an entity from a sub-record.
    ///
    /// Sub-records without a parseable coordinate are placed at their
    /// facility's coordinate.
    pub fn from_sub_record(
        rec: &SubRecord,
        facility: &FacilityInfo,
        facility_coordinate: Coordinate,
    ) -> Self {
        Self {
            id: EntityId(rec.id.clone()),
            coordinate: rec.coordinate().unwrap_or(facility_coordinate),
            name: rec.name.clone(),
            category: rec.category.clone(),
            address: rec.address.clone(),
            install_date: rec.install_date.clone(),
            facility: facility.clone(),
            distance_from_user_m: None,
        }
    }

    pub fn update_distance(&mut self, user: Option<Coordinate>) {
        self.distance_from_user_m = user.map(|u| u.distance_m(&self.coordinate));
    }

    pub fn with_distance_from(mut self, user: Option<Coordinate>) -> Self {
        self.update_distance(user);
        self
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{EntityId, FacilityInfo, MapEntity};
    use crate::records::{FacilityId, IndoorOutdoor};
    use foundation::geo::Coordinate;

    pub fn entity(id: &str, lat: f64, lon: f64) -> MapEntity {
        MapEntity {
            id: EntityId::new(id),
            coordinate: Coordinate::new(lat, lon),
            name: format!("ride {id}"),
            category: "swing".into(),
            address: "1 Park Rd".into(),
            install_date: "2020-01-01".into(),
            facility: FacilityInfo {
                id: FacilityId::new("f1"),
                name: "Central Park".into(),
                indoor_outdoor: IndoorOutdoor::Outdoor,
            },
            distance_from_user_m: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FacilityInfo, MapEntity};
    use crate::records::{FacilityId, IndoorOutdoor, SubRecord};
    use foundation::geo::Coordinate;

    fn info() -> FacilityInfo {
        FacilityInfo {
            id: FacilityId::new("f1"),
            name: "Central Park".into(),
            indoor_outdoor: IndoorOutdoor::Outdoor,
        }
    }

    fn rec(lat: &str, lon: &str) -> SubRecord {
        SubRecord {
            id: "r1".into(),
            facility_id: FacilityId::new("f1"),
            install_date: "2019-05-01".into(),
            name: "Slide".into(),
            category: "slide".into(),
            address: "1 Park Rd".into(),
            latitude: lat.into(),
            longitude: lon.into(),
        }
    }

    #[test]
    fn uses_own_coordinate_when_valid() {
        let e =
            MapEntity::from_sub_record(&rec("37.1", "127.1"), &info(), Coordinate::new(0.0, 0.0));
        assert_eq!(e.coordinate, Coordinate::new(37.1, 127.1));
        assert_eq!(e.id.as_str(), "r1");
    }

    #[test]
    fn falls_back_to_facility_coordinate() {
        let fallback = Coordinate::new(37.0, 127.0);
        let e = MapEntity::from_sub_record(&rec("", "x"), &info(), fallback);
        assert_eq!(e.coordinate, fallback);
    }

    #[test]
    fn distance_follows_user_location() {
        let e =
            MapEntity::from_sub_record(&rec("37.0", "127.0"), &info(), Coordinate::new(0.0, 0.0));
        let e = e.with_distance_from(Some(Coordinate::new(37.0, 127.0)));
        assert_eq!(e.distance_from_user_m, Some(0.0));
        let e = e.with_distance_from(None);
        assert_eq!(e.distance_from_user_m, None);
    }
}

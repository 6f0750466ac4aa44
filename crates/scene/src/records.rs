//! Read-only projections of the remote facility store.
//!
//! Coordinates arrive as text (sometimes as JSON numbers) and are only parsed
//! on demand; a record whose coordinate does not parse is simply skipped by the
//! callers.

use foundation::geo::Coordinate;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "String")]
pub enum IndoorOutdoor {
    Indoor,
    Outdoor,
    #[default]
    Unknown,
}

impl IndoorOutdoor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indoor => "indoor",
            Self::Outdoor => "outdoor",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for IndoorOutdoor {
    fn from(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "indoor" | "in" | "실내" => Self::Indoor,
            "outdoor" | "out" | "실외" => Self::Outdoor,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for IndoorOutdoor {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

/// Null and non-text values decode as `Unknown`.
impl<'de> Deserialize<'de> for IndoorOutdoor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Other(serde::de::IgnoredAny),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self::from(s.as_str()),
            Raw::Other(_) => Self::Unknown,
        })
    }
}

impl From<IndoorOutdoor> for String {
    fn from(v: IndoorOutdoor) -> Self {
        v.as_str().to_string()
    }
}

/// Which facilities a query keeps.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Indoor,
    Outdoor,
}

impl CategoryFilter {
    /// Facilities of unknown kind only pass `All`.
    pub fn allows(&self, kind: IndoorOutdoor) -> bool {
        match self {
            Self::All => true,
            Self::Indoor => kind == IndoorOutdoor::Indoor,
            Self::Outdoor => kind == IndoorOutdoor::Outdoor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityRecord {
    pub id: FacilityId,
    pub name: String,
    #[serde(default)]
    pub indoor_outdoor: IndoorOutdoor,
    #[serde(default, deserialize_with = "text_or_number")]
    pub latitude: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub longitude: String,
}

impl FacilityRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::parse(&self.latitude, &self.longitude)
    }
}

/// A ride or amenity installed at a facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRecord {
    pub id: String,
    pub facility_id: FacilityId,
    #[serde(default)]
    pub install_date: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub latitude: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub longitude: String,
}

impl SubRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::parse(&self.latitude, &self.longitude)
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

//! Facility collection sources.
//!
//! The backend has no geographic query: it lists every facility, and lists
//! sub-records one facility at a time. Implementations:
//! - `HttpSource` for the REST backend
//! - `MemorySource` for tests and demo mode, with fault injection and latency

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Url;
use scene::records::{FacilityId, FacilityRecord, SubRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FetchError;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Backend collection queries.
///
/// Implementations must be `Send + Sync`; fetches run on spawned tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait FacilitySource: Send + Sync {
    fn name(&self) -> &str;

    /// Every facility the backend knows about.
    fn list_facilities(&self) -> BoxFuture<'_, Result<Vec<FacilityRecord>, FetchError>>;

    /// Sub-records belonging to one facility.
    fn list_sub_records(
        &self,
        facility: &FacilityId,
    ) -> BoxFuture<'_, Result<Vec<SubRecord>, FetchError>>;
}

/// REST backend: `GET {base}/facilities` and `GET {base}/facilities/{id}/rides`.
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, FetchError> {
        let base = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!(%url, "backend request");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl FacilitySource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn list_facilities(&self) -> BoxFuture<'_, Result<Vec<FacilityRecord>, FetchError>> {
        Box::pin(async move {
            let url = self.endpoint(&["facilities"])?;
            let listing: Vec<serde_json::Value> = self.get_json(url).await?;
            Ok(decode_each(listing, "facility"))
        })
    }

    fn list_sub_records(
        &self,
        facility: &FacilityId,
    ) -> BoxFuture<'_, Result<Vec<SubRecord>, FetchError>> {
        let id = facility.clone();
        Box::pin(async move {
            let url = self.endpoint(&["facilities", id.as_str(), "rides"])?;
            let listing: Vec<serde_json::Value> = self.get_json(url).await?;
            Ok(decode_each(listing, "sub-record"))
        })
    }
}

/// Facilities plus their sub-records, as stored in a demo file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub facilities: Vec<FacilityRecord>,
    #[serde(default)]
    pub rides: Vec<SubRecord>,
}

impl Dataset {
    /// Parses a dataset file. Entries that do not decode are skipped; only a
    /// malformed document is an error.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FetchError> {
        #[derive(Deserialize)]
        struct Raw {
            facilities: Vec<serde_json::Value>,
            #[serde(default)]
            rides: Vec<serde_json::Value>,
        }
        let raw: Raw = serde_json::from_slice(bytes)?;
        Ok(Self {
            facilities: decode_each(raw.facilities, "facility"),
            rides: decode_each(raw.rides, "sub-record"),
        })
    }
}

/// Decodes each listing entry on its own so one bad record cannot sink the
/// whole listing.
fn decode_each<T: DeserializeOwned>(listing: Vec<serde_json::Value>, kind: &str) -> Vec<T> {
    let total = listing.len();
    let decoded: Vec<T> = listing
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if decoded.len() < total {
        debug!(kind, dropped = total - decoded.len(), total, "undecodable records skipped");
    }
    decoded
}

#[derive(Debug, Default)]
struct Faults {
    primary: Option<String>,
    failing: HashSet<FacilityId>,
}

#[derive(Debug, Default)]
struct Latency {
    primary: Duration,
    sub_records: Duration,
    per_facility: HashMap<FacilityId, Duration>,
}

/// In-memory source.
pub struct MemorySource {
    facilities: RwLock<Vec<FacilityRecord>>,
    rides: RwLock<HashMap<FacilityId, Vec<SubRecord>>>,
    faults: RwLock<Faults>,
    latency: RwLock<Latency>,
    primary_requests: AtomicU64,
    sub_record_requests: AtomicU64,
}

impl MemorySource {
    pub fn new(facilities: Vec<FacilityRecord>, rides: Vec<SubRecord>) -> Self {
        Self {
            facilities: RwLock::new(facilities),
            rides: RwLock::new(group_by_facility(rides)),
            faults: RwLock::new(Faults::default()),
            latency: RwLock::new(Latency::default()),
            primary_requests: AtomicU64::new(0),
            sub_record_requests: AtomicU64::new(0),
        }
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        Self::new(dataset.facilities, dataset.rides)
    }

    /// Makes every facility-list request fail.
    pub fn with_primary_failure(mut self, message: impl Into<String>) -> Self {
        self.faults.get_mut().primary = Some(message.into());
        self
    }

    /// Makes sub-record requests for `id` fail.
    pub fn with_failing_facility(mut self, id: FacilityId) -> Self {
        self.faults.get_mut().failing.insert(id);
        self
    }

    pub fn with_primary_latency(mut self, delay: Duration) -> Self {
        self.latency.get_mut().primary = delay;
        self
    }

    pub fn with_sub_record_latency(mut self, delay: Duration) -> Self {
        self.latency.get_mut().sub_records = delay;
        self
    }

    /// Overrides the sub-record latency for one facility.
    pub fn with_facility_latency(mut self, id: FacilityId, delay: Duration) -> Self {
        self.latency.get_mut().per_facility.insert(id, delay);
        self
    }

    pub async fn set_primary_failure(&self, message: Option<String>) {
        self.faults.write().await.primary = message;
    }

    pub async fn set_facility_failing(&self, id: FacilityId, failing: bool) {
        let mut faults = self.faults.write().await;
        if failing {
            faults.failing.insert(id);
        } else {
            faults.failing.remove(&id);
        }
    }

    pub async fn set_primary_latency(&self, delay: Duration) {
        self.latency.write().await.primary = delay;
    }

    pub async fn replace(&self, dataset: Dataset) {
        *self.facilities.write().await = dataset.facilities;
        *self.rides.write().await = group_by_facility(dataset.rides);
    }

    pub fn primary_requests(&self) -> u64 {
        self.primary_requests.load(Ordering::Relaxed)
    }

    pub fn sub_record_requests(&self) -> u64 {
        self.sub_record_requests.load(Ordering::Relaxed)
    }
}

fn group_by_facility(rides: Vec<SubRecord>) -> HashMap<FacilityId, Vec<SubRecord>> {
    let mut grouped: HashMap<FacilityId, Vec<SubRecord>> = HashMap::new();
    for ride in rides {
        grouped.entry(ride.facility_id.clone()).or_default().push(ride);
    }
    grouped
}

impl FacilitySource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_facilities(&self) -> BoxFuture<'_, Result<Vec<FacilityRecord>, FetchError>> {
        Box::pin(async move {
            self.primary_requests.fetch_add(1, Ordering::Relaxed);
            let delay = self.latency.read().await.primary;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = self.faults.read().await.primary.clone() {
                return Err(FetchError::Unavailable(message));
            }
            Ok(self.facilities.read().await.clone())
        })
    }

    fn list_sub_records(
        &self,
        facility: &FacilityId,
    ) -> BoxFuture<'_, Result<Vec<SubRecord>, FetchError>> {
        let id = facility.clone();
        Box::pin(async move {
            self.sub_record_requests.fetch_add(1, Ordering::Relaxed);
            let delay = {
                let latency = self.latency.read().await;
                latency.per_facility.get(&id).copied().unwrap_or(latency.sub_records)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.faults.read().await.failing.contains(&id) {
                return Err(FetchError::Unavailable(format!("facility {id} unavailable")));
            }
            Ok(self.rides.read().await.get(&id).cloned().unwrap_or_default())
        })
    }
}

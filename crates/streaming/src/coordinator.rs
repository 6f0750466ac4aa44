//! Viewport-driven aggregation.
//!
//! One cycle: list every facility, keep those inside the viewport, fan out one
//! sub-record fetch per surviving facility, join, merge. The join is a counted
//! channel: the expected number of replies is fixed at fan-out time, and the
//! whole wait is bounded by `CoordinatorConfig::join_timeout`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use foundation::geo::Coordinate;
use foundation::viewport::Viewport;
use runtime::epoch::Epoch;
use scene::entity::MapEntity;
use scene::filter::{FacilityMatch, filter_facilities, retain_in_viewport};
use scene::records::{CategoryFilter, FacilityId, SubRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::error::{AggregationError, FetchError};
use crate::source::FacilitySource;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Upper bound on the whole secondary join.
    pub join_timeout: Duration,
    /// Optional cap on the fan-out; matched facilities beyond it (in backend
    /// order) are skipped and reported. `None` fans out to every match.
    pub max_facilities: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            max_facilities: None,
        }
    }
}

/// How complete an aggregation is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialReport {
    pub facilities_matched: usize,
    /// Facilities whose sub-records are missing from the result.
    pub facilities_failed: Vec<FacilityId>,
    pub timed_out: bool,
    /// Matched facilities dropped by `max_facilities`.
    pub facilities_skipped: usize,
}

impl PartialReport {
    pub fn is_partial(&self) -> bool {
        !self.facilities_failed.is_empty() || self.timed_out || self.facilities_skipped > 0
    }
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub epoch: Epoch,
    pub viewport: Viewport,
    pub category: CategoryFilter,
    pub entities: Vec<MapEntity>,
    pub report: PartialReport,
}

/// What one cycle is asked to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRequest {
    pub epoch: Epoch,
    pub viewport: Viewport,
    pub category: CategoryFilter,
    pub user_location: Option<Coordinate>,
}

#[derive(Clone)]
pub struct ViewportQueryCoordinator {
    source: Arc<dyn FacilitySource>,
    config: CoordinatorConfig,
}

type FetchResult = Result<Vec<SubRecord>, FetchError>;
type Reply = (usize, FetchResult);

impl ViewportQueryCoordinator {
    pub fn new(source: Arc<dyn FacilitySource>, config: CoordinatorConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs one aggregation cycle.
    ///
    /// Only a failed facility listing fails the cycle. Failed or late
    /// sub-record fetches leave their facility out and are listed in the
    /// report.
    pub async fn aggregate(&self, request: CycleRequest) -> Result<Aggregation, AggregationError> {
        let CycleRequest {
            epoch,
            viewport,
            category,
            user_location,
        } = request;
        info!(
            %epoch,
            lat = viewport.center.lat,
            lon = viewport.center.lon,
            source = self.source.name(),
            "aggregation cycle started"
        );

        let facilities = match self.source.list_facilities().await {
            Ok(f) => f,
            Err(e) => {
                warn!(%epoch, error = %e, "facility list fetch failed");
                return Err(AggregationError::PrimaryFetch(e));
            }
        };

        let mut matches = filter_facilities(&viewport, category, &facilities);
        let mut report = PartialReport::default();
        if let Some(limit) = self.config.max_facilities {
            if matches.len() > limit {
                report.facilities_skipped = matches.len() - limit;
                warn!(
                    %epoch,
                    matched = matches.len(),
                    limit,
                    "too many facilities in viewport; truncating fan-out"
                );
                matches.truncate(limit);
            }
        }
        report.facilities_matched = matches.len();
        debug!(
            %epoch,
            total = facilities.len(),
            matched = matches.len(),
            "facilities filtered"
        );

        let (replies, timed_out) = self.join(epoch, &matches).await;
        report.timed_out = timed_out;

        let mut seen: HashSet<String> = HashSet::new();
        let mut entities = Vec::new();
        for (m, reply) in matches.iter().zip(replies) {
            match reply {
                Some(Ok(records)) => {
                    for rec in records {
                        if !seen.insert(rec.id.clone()) {
                            debug!(
                                ride_id = %rec.id,
                                facility_id = %m.facility.id,
                                "duplicate sub-record dropped"
                            );
                            continue;
                        }
                        let entity = MapEntity::from_sub_record(&rec, &m.facility, m.coordinate);
                        entities.push(entity);
                    }
                }
                Some(Err(e)) => {
                    warn!(
                        %epoch,
                        facility_id = %m.facility.id,
                        error = %e,
                        "sub-record fetch failed"
                    );
                    report.facilities_failed.push(m.facility.id.clone());
                }
                None => {
                    report.facilities_failed.push(m.facility.id.clone());
                }
            }
        }

        let before = entities.len();
        retain_in_viewport(&viewport, &mut entities);
        if entities.len() < before {
            debug!(
                %epoch,
                dropped = before - entities.len(),
                "sub-records outside viewport dropped"
            );
        }
        for entity in &mut entities {
            entity.update_distance(user_location);
        }

        info!(
            %epoch,
            entities = entities.len(),
            failed = report.facilities_failed.len(),
            timed_out = report.timed_out,
            "aggregation cycle complete"
        );
        Ok(Aggregation {
            epoch,
            viewport,
            category,
            entities,
            report,
        })
    }

    /// Fans out one fetch per facility and waits for exactly that many replies.
    ///
    /// Returns the replies in facility order (`None` for facilities that never
    /// answered) and whether the deadline cut the wait short.
    async fn join(
        &self,
        epoch: Epoch,
        matches: &[FacilityMatch],
    ) -> (Vec<Option<FetchResult>>, bool) {
        let expected = matches.len();
        let mut replies: Vec<Option<FetchResult>> = (0..expected).map(|_| None).collect();
        if expected == 0 {
            return (replies, false);
        }

        let (tx, mut rx) = mpsc::channel::<Reply>(expected);
        let mut tasks = JoinSet::new();
        for (index, m) in matches.iter().enumerate() {
            let source = Arc::clone(&self.source);
            let id = m.facility.id.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = source.list_sub_records(&id).await;
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.config.join_timeout;
        let mut received = 0usize;
        let mut timed_out = false;
        while received < expected {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((index, result))) => {
                    replies[index] = Some(result);
                    received += 1;
                }
                // Every sender is gone; a fetch task died without replying.
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        %epoch,
                        outstanding = expected - received,
                        timeout_ms = self.config.join_timeout.as_millis() as u64,
                        "sub-record join timed out"
                    );
                    break;
                }
            }
        }
        tasks.abort_all();
        (replies, timed_out)
    }
}

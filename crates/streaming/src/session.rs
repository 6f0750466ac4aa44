//! The single consumer context of a map screen.
//!
//! A `MapSession` task owns the aggregation epochs, the last delivered entity
//! list, the cluster engine, the selection state machine and the detail
//! projection. Everything reaches it as a `SessionCommand` or a finished
//! aggregation cycle, and everything leaves it as a `SessionOutput` value.

use std::sync::Arc;

use foundation::viewport::Viewport;
use layers::detail::{DetailConfig, DetailProjectionBuilder, DisplayModel};
use runtime::epoch::{Epoch, EpochGate};
use runtime::metrics::{CycleCounter, CycleMetrics, CycleMetricsSnapshot};
use scene::cluster::{ClusterConfig, ClusterEngine, RenderPass};
use scene::entity::{EntityId, MapEntity};
use scene::records::CategoryFilter;
use scene::selection::{SelectionState, SelectionStateMachine, Transition};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info};

use crate::coordinator::{
    Aggregation, CoordinatorConfig, CycleRequest, PartialReport, ViewportQueryCoordinator,
};
use crate::error::AggregationError;
use crate::location::LocationProvider;
use crate::source::FacilitySource;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub coordinator: CoordinatorConfig,
    pub cluster: ClusterConfig,
    pub detail: DetailConfig,
    pub command_capacity: usize,
    pub output_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            cluster: ClusterConfig::default(),
            detail: DetailConfig::default(),
            command_capacity: 64,
            output_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    ViewportChanged(Viewport),
    CategoryChanged(CategoryFilter),
    /// The location provider has a new value.
    UserLocationChanged,
    EntityTapped(EntityId),
    ClusterTapped(Vec<EntityId>),
    Dismissed,
    /// Re-runs the current query even if nothing changed.
    Refresh,
    ResizeViewport([f32; 2]),
    SnapshotMetrics,
}

/// One delivered aggregation, clustered for the current surface size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFrame {
    pub epoch: Epoch,
    pub viewport: Viewport,
    pub category: CategoryFilter,
    pub entities: Vec<MapEntity>,
    pub render: RenderPass,
    pub report: PartialReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleFailure {
    pub epoch: Epoch,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl CycleFailure {
    fn from_error(epoch: Epoch, err: &AggregationError) -> Self {
        Self {
            epoch,
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Entities(EntityFrame),
    Selection(SelectionState),
    /// `None` when nothing is selected.
    Detail(Option<DisplayModel>),
    Failed(CycleFailure),
    Metrics(CycleMetricsSnapshot),
}

/// Returned when the session task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("map session closed")]
pub struct SessionClosed;

/// Command side of a running session.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }

    pub fn sender(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    /// Closes the command channel and waits for the session to stop.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

struct CycleDone {
    epoch: Epoch,
    result: Result<Aggregation, AggregationError>,
}

pub struct MapSession {
    coordinator: ViewportQueryCoordinator,
    location: Arc<dyn LocationProvider>,
    clusters: ClusterEngine,
    selection: SelectionStateMachine,
    detail: DetailProjectionBuilder,
    gate: EpochGate,
    metrics: CycleMetrics,
    viewport: Option<Viewport>,
    category: CategoryFilter,
    current: Option<Aggregation>,
    /// The latest cycle task; aborted once a newer cycle starts.
    in_flight: Option<AbortHandle>,
    outputs: mpsc::Sender<SessionOutput>,
    done_tx: mpsc::Sender<CycleDone>,
}

impl MapSession {
    /// Starts a session task and returns its command handle and output stream.
    ///
    /// The session stops when every command sender is dropped or the output
    /// receiver is dropped.
    pub fn spawn(
        source: Arc<dyn FacilitySource>,
        location: Arc<dyn LocationProvider>,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::Receiver<SessionOutput>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity.max(1));
        let (done_tx, done_rx) = mpsc::channel(16);

        let session = MapSession {
            coordinator: ViewportQueryCoordinator::new(source, config.coordinator),
            location,
            clusters: ClusterEngine::new(config.cluster),
            selection: SelectionStateMachine::new(),
            detail: DetailProjectionBuilder::new(config.detail),
            gate: EpochGate::new(),
            metrics: CycleMetrics::new(),
            viewport: None,
            category: CategoryFilter::All,
            current: None,
            in_flight: None,
            outputs: output_tx,
            done_tx,
        };
        let task = tokio::spawn(session.run(command_rx, done_rx));
        (
            SessionHandle {
                commands: command_tx,
                task,
            },
            output_rx,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut done: mpsc::Receiver<CycleDone>,
    ) {
        let mut cycles = JoinSet::new();
        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut cycles).await,
                    None => break,
                },
                Some(finished) = done.recv() => self.handle_cycle_done(finished).await,
                Some(_) = cycles.join_next(), if !cycles.is_empty() => Ok(()),
            };
            if step.is_err() {
                debug!("session output receiver dropped");
                break;
            }
        }
        cycles.abort_all();
        info!(snapshot = ?self.metrics.snapshot(), "map session stopped");
    }

    async fn handle_command(
        &mut self,
        command: SessionCommand,
        cycles: &mut JoinSet<()>,
    ) -> Result<(), SessionClosed> {
        match command {
            SessionCommand::ViewportChanged(viewport) => {
                if self.viewport == Some(viewport) {
                    debug!("viewport unchanged; no new cycle");
                    return Ok(());
                }
                self.viewport = Some(viewport);
                self.start_cycle(cycles);
            }
            SessionCommand::CategoryChanged(category) => {
                if self.category == category {
                    return Ok(());
                }
                self.category = category;
                self.start_cycle(cycles);
            }
            SessionCommand::Refresh => self.start_cycle(cycles),
            SessionCommand::UserLocationChanged => self.refresh_location().await?,
            SessionCommand::EntityTapped(id) => {
                let transition = self.selection.tap_entity(&id);
                self.emit_transition(transition).await?;
            }
            SessionCommand::ClusterTapped(ids) => {
                let transition = self.selection.tap_cluster(&ids);
                self.emit_transition(transition).await?;
            }
            SessionCommand::Dismissed => {
                let transition = self.selection.dismiss();
                self.emit_transition(transition).await?;
            }
            SessionCommand::ResizeViewport(viewport_px) => {
                self.clusters.set_viewport_px(viewport_px);
                self.emit_frame().await?;
            }
            SessionCommand::SnapshotMetrics => {
                self.emit(SessionOutput::Metrics(self.metrics.snapshot())).await?;
            }
        }
        Ok(())
    }

    /// Spawns an aggregation for the current viewport and cancels the one it
    /// supersedes. A result that was already on its way is still discarded by
    /// the epoch gate.
    fn start_cycle(&mut self, cycles: &mut JoinSet<()>) {
        let Some(viewport) = self.viewport else {
            debug!("no viewport yet; cycle not started");
            return;
        };
        let epoch = self.gate.begin();
        self.metrics.inc(CycleCounter::Started);
        if let Some(previous) = self.in_flight.take() {
            if !previous.is_finished() {
                previous.abort();
                self.metrics.inc(CycleCounter::Cancelled);
                debug!(%epoch, "superseded cycle cancelled");
            }
        }
        let request = CycleRequest {
            epoch,
            viewport,
            category: self.category,
            user_location: self.location.current_location(),
        };
        let coordinator = self.coordinator.clone();
        let done = self.done_tx.clone();
        self.in_flight = Some(cycles.spawn(async move {
            let result = coordinator.aggregate(request).await;
            let _ = done.send(CycleDone { epoch, result }).await;
        }));
    }

    async fn handle_cycle_done(&mut self, finished: CycleDone) -> Result<(), SessionClosed> {
        let CycleDone { epoch, result } = finished;
        if !self.gate.is_current(epoch) {
            debug!(%epoch, latest = ?self.gate.latest(), "stale cycle result discarded");
            self.metrics.inc(CycleCounter::DiscardedStale);
            return Ok(());
        }

        let mut aggregation = match result {
            Ok(aggregation) => aggregation,
            Err(err) => {
                self.metrics.inc(CycleCounter::Failed);
                return self
                    .emit(SessionOutput::Failed(CycleFailure::from_error(epoch, &err)))
                    .await;
            }
        };
        if !self.gate.try_deliver(epoch) {
            return Ok(());
        }

        self.metrics.inc(CycleCounter::Delivered);
        self.metrics.record_merged(aggregation.entities.len());
        self.metrics.add(
            CycleCounter::SecondaryFailures,
            aggregation.report.facilities_failed.len() as u64,
        );
        if aggregation.report.timed_out {
            self.metrics.inc(CycleCounter::JoinTimeouts);
        }

        // The location may have moved while the cycle was in flight.
        let user = self.location.current_location();
        for entity in &mut aggregation.entities {
            entity.update_distance(user);
        }
        // Entities first, so a selection that vanished goes straight to Idle.
        let mut transition = self.selection.replace_entities(&aggregation.entities);
        transition
            .entered
            .extend(self.selection.set_user_location(user).entered);

        self.current = Some(aggregation);
        self.emit_frame().await?;
        self.emit_transition(transition).await
    }

    async fn refresh_location(&mut self) -> Result<(), SessionClosed> {
        let user = self.location.current_location();
        if let Some(current) = &mut self.current {
            for entity in &mut current.entities {
                entity.update_distance(user);
            }
        }
        let transition = self.selection.set_user_location(user);
        self.emit_frame().await?;
        self.emit_transition(transition).await
    }

    async fn emit_frame(&mut self) -> Result<(), SessionClosed> {
        let Some(current) = &self.current else {
            return Ok(());
        };
        let render = self.clusters.cluster(&current.viewport, &current.entities);
        let frame = EntityFrame {
            epoch: current.epoch,
            viewport: current.viewport,
            category: current.category,
            entities: current.entities.clone(),
            render,
            report: current.report.clone(),
        };
        self.emit(SessionOutput::Entities(frame)).await
    }

    async fn emit_transition(&mut self, transition: Transition) -> Result<(), SessionClosed> {
        if !transition.changed() {
            return Ok(());
        }
        for state in transition.entered {
            self.emit(SessionOutput::Selection(state)).await?;
        }
        let detail = self
            .detail
            .for_selection(self.selection.state(), self.location.current_location());
        self.emit(SessionOutput::Detail(detail)).await
    }

    async fn emit(&self, output: SessionOutput) -> Result<(), SessionClosed> {
        self.outputs.send(output).await.map_err(|_| SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SharedLocation;
    use crate::source::MemorySource;
    use foundation::geo::Coordinate;
    use foundation::viewport::Span;
    use pretty_assertions::assert_eq;
    use scene::records::{FacilityId, FacilityRecord, IndoorOutdoor, SubRecord};
    use std::time::Duration;

    fn facility(id: &str, lat: f64, lon: f64) -> FacilityRecord {
        FacilityRecord {
            id: FacilityId::new(id),
            name: format!("park {id}"),
            indoor_outdoor: IndoorOutdoor::Outdoor,
            latitude: lat.to_string(),
            longitude: lon.to_string(),
        }
    }

    fn ride(id: &str, facility: &str) -> SubRecord {
        SubRecord {
            id: id.into(),
            facility_id: FacilityId::new(facility),
            install_date: String::new(),
            name: id.into(),
            category: "swing".into(),
            address: String::new(),
            latitude: String::new(),
            longitude: String::new(),
        }
    }

    fn viewport(lat: f64) -> Viewport {
        Viewport::new(Coordinate::new(lat, 126.9780), Span::new(0.1, 0.1))
    }

    async fn next_frame(rx: &mut mpsc::Receiver<SessionOutput>) -> EntityFrame {
        loop {
            match rx.recv().await {
                Some(SessionOutput::Entities(frame)) => return frame,
                Some(_) => continue,
                None => panic!("session closed before a frame arrived"),
            }
        }
    }

    fn spawn_session(source: Arc<MemorySource>) -> (SessionHandle, mpsc::Receiver<SessionOutput>) {
        let location = Arc::new(SharedLocation::default());
        MapSession::spawn(source, location, SessionConfig::default())
    }

    async fn next_metrics(rx: &mut mpsc::Receiver<SessionOutput>) -> CycleMetricsSnapshot {
        loop {
            match rx.recv().await {
                Some(SessionOutput::Metrics(m)) => return m,
                Some(SessionOutput::Entities(f)) => {
                    panic!("unexpected frame for epoch {}", f.epoch)
                }
                Some(_) => continue,
                None => panic!("session closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_cycle_is_cancelled() {
        // The first viewport's facility answers slowly, the second quickly.
        let source = Arc::new(
            MemorySource::new(
                vec![facility("slow", 37.5665, 126.9780), facility("fast", 35.1, 126.9780)],
                vec![ride("s1", "slow"), ride("f1", "fast")],
            )
            .with_facility_latency(FacilityId::new("slow"), Duration::from_secs(5))
            .with_facility_latency(FacilityId::new("fast"), Duration::from_millis(10)),
        );
        let (handle, mut rx) = spawn_session(source);

        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        handle.send(SessionCommand::ViewportChanged(viewport(35.1))).await.unwrap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.epoch, Epoch(2));
        assert_eq!(frame.entities.len(), 1);
        assert_eq!(frame.entities[0].id.as_str(), "f1");

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.send(SessionCommand::SnapshotMetrics).await.unwrap();
        let metrics = next_metrics(&mut rx).await;
        assert!(metrics.counters.contains(&("cycles_cancelled", 1)));
        assert!(metrics.counters.contains(&("cycles_delivered", 1)));
        assert!(!metrics.counters.iter().any(|(name, _)| *name == "cycles_discarded_stale"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn finished_cycle_is_not_cancelled() {
        let source = Arc::new(MemorySource::new(
            vec![facility("a", 37.5665, 126.9780)],
            vec![ride("r", "a")],
        ));
        let (handle, mut rx) = spawn_session(source);

        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        assert_eq!(next_frame(&mut rx).await.epoch, Epoch(1));
        handle.send(SessionCommand::Refresh).await.unwrap();
        assert_eq!(next_frame(&mut rx).await.epoch, Epoch(2));

        handle.send(SessionCommand::SnapshotMetrics).await.unwrap();
        let metrics = next_metrics(&mut rx).await;
        assert!(metrics.counters.contains(&("cycles_delivered", 2)));
        assert!(!metrics.counters.iter().any(|(name, _)| *name == "cycles_cancelled"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn equal_viewport_is_a_no_op_but_refresh_is_not() {
        let source = Arc::new(MemorySource::new(
            vec![facility("a", 37.5665, 126.9780)],
            vec![ride("r", "a")],
        ));
        let (handle, mut rx) = spawn_session(source.clone());

        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        assert_eq!(next_frame(&mut rx).await.epoch, Epoch(1));
        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        handle.send(SessionCommand::Refresh).await.unwrap();
        assert_eq!(next_frame(&mut rx).await.epoch, Epoch(2));
        assert_eq!(source.primary_requests(), 2);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn primary_failure_surfaces_retryable_error() {
        let source =
            Arc::new(MemorySource::new(vec![], vec![]).with_primary_failure("backend down"));
        let (handle, mut rx) = spawn_session(source.clone());
        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        match rx.recv().await {
            Some(SessionOutput::Failed(failure)) => {
                assert_eq!(failure.epoch, Epoch(1));
                assert!(failure.retryable);
                assert_eq!(failure.code, "primary_fetch_failed");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        source.set_primary_failure(None).await;
        handle.send(SessionCommand::Refresh).await.unwrap();
        assert_eq!(next_frame(&mut rx).await.epoch, Epoch(2));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn selection_resets_when_entity_disappears() {
        let source = Arc::new(MemorySource::new(
            vec![facility("a", 37.5665, 126.9780), facility("b", 35.1, 126.9780)],
            vec![ride("x", "a"), ride("y", "b")],
        ));
        let (handle, mut rx) = spawn_session(source);

        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        next_frame(&mut rx).await;
        handle.send(SessionCommand::EntityTapped(EntityId::new("x"))).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(SessionOutput::Selection(SelectionState::SingleSelected { .. }))
        ));
        assert!(matches!(rx.recv().await, Some(SessionOutput::Detail(Some(_)))));

        handle.send(SessionCommand::ViewportChanged(viewport(35.1))).await.unwrap();
        next_frame(&mut rx).await;
        assert_eq!(rx.recv().await, Some(SessionOutput::Selection(SelectionState::Idle)));
        assert_eq!(rx.recv().await, Some(SessionOutput::Detail(None)));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn vanished_selection_resets_without_a_stale_update() {
        let source = Arc::new(MemorySource::new(
            vec![facility("a", 37.5665, 126.9780), facility("b", 35.1, 126.9780)],
            vec![ride("x", "a"), ride("y", "b")],
        ));
        let location = SharedLocation::default();
        let (handle, mut rx) = MapSession::spawn(
            source,
            Arc::new(location.clone()),
            SessionConfig::default(),
        );

        handle.send(SessionCommand::ViewportChanged(viewport(37.5665))).await.unwrap();
        next_frame(&mut rx).await;
        handle.send(SessionCommand::EntityTapped(EntityId::new("x"))).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(SessionOutput::Selection(SelectionState::SingleSelected { .. }))
        ));
        assert!(matches!(rx.recv().await, Some(SessionOutput::Detail(Some(_)))));

        // The user moves and the selected ride leaves the results in one cycle.
        location.set(Some(Coordinate::new(35.1, 126.9780)));
        handle.send(SessionCommand::ViewportChanged(viewport(35.1))).await.unwrap();
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame.entities[0].distance_from_user_m, Some(0.0));
        assert_eq!(rx.recv().await, Some(SessionOutput::Selection(SelectionState::Idle)));
        assert_eq!(rx.recv().await, Some(SessionOutput::Detail(None)));

        handle.send(SessionCommand::SnapshotMetrics).await.unwrap();
        assert!(matches!(rx.recv().await, Some(SessionOutput::Metrics(_))));
        handle.shutdown().await;
    }
}

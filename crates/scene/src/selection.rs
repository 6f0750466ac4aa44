use std::collections::{HashMap, HashSet};

use foundation::geo::Coordinate;
use foundation::math::precision::cmp_optional_distance;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{EntityId, MapEntity};

/// What the detail surface is showing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    Idle,
    SingleSelected {
        entity: MapEntity,
    },
    /// Members are a snapshot taken at tap time, nearest first.
    ClusterSelected {
        members: Vec<MapEntity>,
    },
    /// Transient; always followed by `Idle`.
    Dismissed,
}

impl SelectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SelectionState::Idle)
    }

    /// Ids the state refers to.
    pub fn referenced_ids(&self) -> Vec<&EntityId> {
        match self {
            SelectionState::SingleSelected { entity } => vec![&entity.id],
            SelectionState::ClusterSelected { members } => members.iter().map(|m| &m.id).collect(),
            SelectionState::Idle | SelectionState::Dismissed => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionEvent {
    EntityTapped { id: EntityId },
    ClusterTapped { ids: Vec<EntityId> },
    Dismissed,
}

/// States entered while handling one input, oldest first.
///
/// Empty means the state did not change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transition {
    pub entered: Vec<SelectionState>,
}

impl Transition {
    fn unchanged() -> Self {
        Self::default()
    }

    fn to(state: SelectionState) -> Self {
        Self {
            entered: vec![state],
        }
    }

    pub fn changed(&self) -> bool {
        !self.entered.is_empty()
    }
}

/// Owns the selection and the entity snapshot taps are resolved against.
///
/// Transition table:
/// - entity tap (any state) -> `SingleSelected`; while a cluster is open the
///   id is resolved against the cluster snapshot first (drill-down).
/// - cluster tap (any state) -> `ClusterSelected`, members sorted by
///   ascending distance from the user, ties in tap order.
/// - dismiss from a selected state -> `Dismissed` -> `Idle`; from `Idle` it is
///   a no-op.
/// - new results missing the selected entity, or any selected cluster member,
///   -> `Idle`.
/// - taps naming only ids that are not in the current results are no-ops.
#[derive(Debug, Clone, Default)]
pub struct SelectionStateMachine {
    state: SelectionState,
    entities: HashMap<EntityId, MapEntity>,
    user_location: Option<Coordinate>,
}

impl SelectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn snapshot(&self) -> SelectionState {
        self.state.clone()
    }

    pub fn user_location(&self) -> Option<Coordinate> {
        self.user_location
    }

    pub fn handle(&mut self, event: SelectionEvent) -> Transition {
        match event {
            SelectionEvent::EntityTapped { id } => self.tap_entity(&id),
            SelectionEvent::ClusterTapped { ids } => self.tap_cluster(&ids),
            SelectionEvent::Dismissed => self.dismiss(),
        }
    }

    pub fn tap_entity(&mut self, id: &EntityId) -> Transition {
        let from_cluster = match &self.state {
            SelectionState::ClusterSelected { members } => members.iter().find(|m| &m.id == id),
            _ => None,
        };
        let Some(entity) = from_cluster.or_else(|| self.entities.get(id)).cloned() else {
            debug!(%id, "tap on unknown entity ignored");
            return Transition::unchanged();
        };

        let entity = entity.with_distance_from(self.user_location);
        self.enter(SelectionState::SingleSelected { entity })
    }

    pub fn tap_cluster(&mut self, ids: &[EntityId]) -> Transition {
        let mut seen = HashSet::new();
        let mut members: Vec<MapEntity> = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.entities.get(id))
            .map(|e| e.clone().with_distance_from(self.user_location))
            .collect();

        if members.is_empty() {
            debug!(requested = ids.len(), "tap on unknown cluster ignored");
            return Transition::unchanged();
        }

        sort_by_distance(&mut members);
        self.enter(SelectionState::ClusterSelected { members })
    }

    pub fn dismiss(&mut self) -> Transition {
        match self.state {
            SelectionState::Idle => Transition::unchanged(),
            _ => {
                self.state = SelectionState::Idle;
                Transition {
                    entered: vec![SelectionState::Dismissed, SelectionState::Idle],
                }
            }
        }
    }

    /// Installs the entity list of a freshly delivered aggregation cycle.
    pub fn replace_entities(&mut self, entities: &[MapEntity]) -> Transition {
        self.entities = entities
            .iter()
            .map(|e| (e.id.clone(), e.clone()))
            .collect();

        let stale = self
            .state
            .referenced_ids()
            .into_iter()
            .any(|id| !self.entities.contains_key(id));
        if !stale {
            return Transition::unchanged();
        }

        debug!("selection no longer present in results; resetting");
        self.enter(SelectionState::Idle)
    }

    /// Recomputes distances of the current selection.
    ///
    /// Cluster members are re-sorted, but the member set stays the snapshot
    /// taken at tap time.
    pub fn set_user_location(&mut self, location: Option<Coordinate>) -> Transition {
        if self.user_location == location {
            return Transition::unchanged();
        }
        self.user_location = location;

        match &mut self.state {
            SelectionState::SingleSelected { entity } => {
                entity.update_distance(location);
            }
            SelectionState::ClusterSelected { members } => {
                for m in members.iter_mut() {
                    m.update_distance(location);
                }
                sort_by_distance(members);
            }
            SelectionState::Idle | SelectionState::Dismissed => return Transition::unchanged(),
        }
        Transition::to(self.state.clone())
    }

    fn enter(&mut self, state: SelectionState) -> Transition {
        self.state = state.clone();
        Transition::to(state)
    }
}

/// Stable ascending sort; entities without a distance go last.
pub fn sort_by_distance(members: &mut [MapEntity]) {
    members.sort_by(|a, b| cmp_optional_distance(a.distance_from_user_m, b.distance_from_user_m));
}

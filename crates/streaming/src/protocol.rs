//! WebSocket wire format.
//!
//! Clients send `ClientMessage`s describing what the user did; the server
//! answers with `ServerMessage`s derived from session outputs. Both are JSON
//! text frames tagged by `type`.

use foundation::geo::Coordinate;
use foundation::viewport::{Span, Viewport};
use layers::detail::DisplayModel;
use runtime::epoch::Epoch;
use runtime::metrics::CycleMetricsSnapshot;
use scene::entity::EntityId;
use scene::records::CategoryFilter;
use scene::selection::SelectionState;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::session::{EntityFrame, SessionCommand, SessionOutput};

/// Unique identifier for a WebSocket session.
pub type SessionId = String;

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The visible region changed.
    Viewport {
        lat: f64,
        lon: f64,
        lat_delta: f64,
        lon_delta: f64,
    },

    Category { filter: CategoryFilter },

    /// Latest device location; both fields absent clears it.
    UserLocation {
        #[serde(default)]
        lat: Option<f64>,
        #[serde(default)]
        lon: Option<f64>,
    },

    TapEntity { id: EntityId },

    TapCluster { ids: Vec<EntityId> },

    Dismiss,

    /// Retry after a failure, or force a reload.
    Refresh,

    Resize { width_px: f32, height_px: f32 },

    Metrics,

    /// Ping for keepalive.
    Ping { seq: u64 },
}

impl ClientMessage {
    /// The location carried by a `UserLocation` message.
    pub fn user_location(&self) -> Result<Option<Coordinate>, ProtocolError> {
        match *self {
            ClientMessage::UserLocation {
                lat: Some(lat),
                lon: Some(lon),
            } => {
                let c = Coordinate::new(lat, lon);
                if c.is_valid() {
                    Ok(Some(c))
                } else {
                    Err(ProtocolError::InvalidCoordinate { lat, lon })
                }
            }
            _ => Ok(None),
        }
    }

    /// Maps the message onto a session command. `Ping` has none.
    ///
    /// `UserLocation` maps to `UserLocationChanged`; the caller stores the
    /// location in the session's provider first.
    pub fn into_command(self) -> Result<Option<SessionCommand>, ProtocolError> {
        let command = match self {
            ClientMessage::Viewport {
                lat,
                lon,
                lat_delta,
                lon_delta,
            } => {
                let center = Coordinate::new(lat, lon);
                if !center.is_valid() {
                    return Err(ProtocolError::InvalidViewport(format!(
                        "center {lat},{lon} out of range"
                    )));
                }
                if !(lat_delta.is_finite() && lon_delta.is_finite())
                    || lat_delta <= 0.0
                    || lon_delta <= 0.0
                {
                    return Err(ProtocolError::InvalidViewport(format!(
                        "span {lat_delta}x{lon_delta} must be positive"
                    )));
                }
                let span = Span::new(lat_delta, lon_delta);
                SessionCommand::ViewportChanged(Viewport::new(center, span))
            }
            ClientMessage::Category { filter } => SessionCommand::CategoryChanged(filter),
            ClientMessage::UserLocation { .. } => SessionCommand::UserLocationChanged,
            ClientMessage::TapEntity { id } => SessionCommand::EntityTapped(id),
            ClientMessage::TapCluster { ids } => SessionCommand::ClusterTapped(ids),
            ClientMessage::Dismiss => SessionCommand::Dismissed,
            ClientMessage::Refresh => SessionCommand::Refresh,
            ClientMessage::Resize { width_px, height_px } => {
                if !(width_px.is_finite() && height_px.is_finite())
                    || width_px <= 0.0
                    || height_px <= 0.0
                {
                    return Err(ProtocolError::InvalidSurface { width_px, height_px });
                }
                SessionCommand::ResizeViewport([width_px, height_px])
            }
            ClientMessage::Metrics => SessionCommand::SnapshotMetrics,
            ClientMessage::Ping { .. } => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session established.
    Hello {
        session_id: SessionId,
        server_version: String,
        capabilities: Vec<String>,
    },

    /// A delivered aggregation; `partial` is set when some facilities are missing.
    Entities {
        partial: bool,
        #[serde(flatten)]
        frame: EntityFrame,
    },

    Selection { selection: SelectionState },

    Detail { detail: Option<DisplayModel> },

    Metrics { snapshot: CycleMetricsSnapshot },

    /// Pong response.
    Pong { seq: u64 },

    /// Error message.
    Error {
        code: String,
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        epoch: Option<Epoch>,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
            retryable: false,
            epoch: None,
        }
    }
}

impl From<SessionOutput> for ServerMessage {
    fn from(output: SessionOutput) -> Self {
        match output {
            SessionOutput::Entities(frame) => ServerMessage::Entities {
                partial: frame.report.is_partial(),
                frame,
            },
            SessionOutput::Selection(selection) => ServerMessage::Selection { selection },
            SessionOutput::Detail(detail) => ServerMessage::Detail { detail },
            SessionOutput::Failed(failure) => ServerMessage::Error {
                code: failure.code,
                message: failure.message,
                retryable: failure.retryable,
                epoch: Some(failure.epoch),
            },
            SessionOutput::Metrics(snapshot) => ServerMessage::Metrics { snapshot },
        }
    }
}

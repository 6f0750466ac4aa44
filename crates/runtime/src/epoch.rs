use serde::{Deserialize, Serialize};

/// Monotonically increasing tag of one aggregation cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Latest-epoch-wins gate.
///
/// Every requested cycle gets a fresh epoch from `begin`. A completed cycle may
/// only be delivered if its epoch is still the most recently requested one, and
/// each epoch is delivered at most once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EpochGate {
    latest_requested: u64,
    delivered: Option<u64>,
}

impl EpochGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new cycle. Any cycle still in flight becomes stale.
    pub fn begin(&mut self) -> Epoch {
        self.latest_requested = self.latest_requested.wrapping_add(1);
        Epoch(self.latest_requested)
    }

    pub fn latest(&self) -> Option<Epoch> {
        (self.latest_requested > 0).then_some(Epoch(self.latest_requested))
    }

    pub fn last_delivered(&self) -> Option<Epoch> {
        self.delivered.map(Epoch)
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        epoch.0 == self.latest_requested && self.latest_requested > 0
    }

    /// Returns `true` if `epoch` may be delivered, and records the delivery.
    pub fn try_deliver(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch) || self.delivered == Some(epoch.0) {
            return false;
        }
        self.delivered = Some(epoch.0);
        true
    }
}

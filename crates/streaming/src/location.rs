use std::sync::Arc;

use foundation::geo::Coordinate;
use parking_lot::RwLock;

/// Where the user currently is, if known.
pub trait LocationProvider: Send + Sync {
    fn current_location(&self) -> Option<Coordinate>;
}

/// Last reported user location, shared between the transport and a session.
#[derive(Debug, Clone, Default)]
pub struct SharedLocation {
    inner: Arc<RwLock<Option<Coordinate>>>,
}

impl SharedLocation {
    pub fn new(initial: Option<Coordinate>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Stores `location`; invalid coordinates clear it. Returns whether the value changed.
    pub fn set(&self, location: Option<Coordinate>) -> bool {
        let location = location.filter(Coordinate::is_valid);
        let mut guard = self.inner.write();
        if *guard == location {
            return false;
        }
        *guard = location;
        true
    }
}

impl LocationProvider for SharedLocation {
    fn current_location(&self) -> Option<Coordinate> {
        *self.inner.read()
    }
}

/// A provider that never knows the location.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current_location(&self) -> Option<Coordinate> {
        None
    }
}

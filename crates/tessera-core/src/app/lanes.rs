//! Lane ownership: at most one worker drives a lane at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::Lane;

/// Busy flags per lane, shared by every engine handle.
#[derive(Debug, Clone, Default)]
pub struct LaneCoordinator {
    busy: Arc<Mutex<HashSet<Lane>>>,
}

impl LaneCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lane, or returns `None` if another worker holds it.
    pub fn try_claim(&self, lane: &Lane) -> Option<LaneClaim> {
        if !self.lock().insert(lane.clone()) {
            return None;
        }
        Some(LaneClaim {
            lane: lane.clone(),
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self, lane: &Lane) -> bool {
        self.lock().contains(lane)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Lane>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the lane when dropped, including on early return and unwinding.
#[derive(Debug)]
pub struct LaneClaim {
    lane: Lane,
    busy: Arc<Mutex<HashSet<Lane>>>,
}

impl LaneClaim {
    pub fn lane(&self) -> &Lane {
        &self.lane
    }
}

impl Drop for LaneClaim {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.lane);
    }
}

//! Utilities to track object's life cycle

use std::sync::atomic::{AtomicBool, Ordering};

/// Util to track an entity's life time
///
/// Entity handles stay cheaply cloneable after the compositor tears the
/// backing object down; this flag is what later capture operations consult.
#[derive(Debug)]
pub struct AliveTracker {
    is_alive: AtomicBool,
}

impl Default for AliveTracker {
    fn default() -> Self {
        Self {
            is_alive: AtomicBool::new(true),
        }
    }
}

impl AliveTracker {
    /// Notify the tracker that the entity is dead
    pub fn destroy_notify(&self) {
        self.is_alive.store(false, Ordering::Release);
    }

    /// Check if the entity is alive
    #[inline]
    pub fn alive(&self) -> bool {
        self.is_alive.load(Ordering::Acquire)
    }
}

/// Trait that is implemented on entities tracked by waycapture
pub trait IsAlive {
    /// Check if the entity is alive
    fn alive(&self) -> bool;
}

impl<T: IsAlive> IsAlive for &T {
    #[inline]
    fn alive(&self) -> bool {
        IsAlive::alive(*self)
    }
}

//! Registry of locations the user has tried to reach.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Records locations so that they stay visible even when authentication
/// fails.
pub trait KnownLocations: Send + Sync {
    /// Adds `location` if it is not already recorded.
    fn ensure_known(&self, location: &str);
}

/// Registry that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoKnownLocations;

impl KnownLocations for NoKnownLocations {
    fn ensure_known(&self, _: &str) {}
}

/// In-memory registry.
#[derive(Debug, Default)]
pub struct KnownLocationSet {
    locations: Mutex<BTreeSet<String>>,
}

impl KnownLocationSet {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports whether `location` was recorded.
    #[must_use]
    pub fn contains(&self, location: &str) -> bool {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(location)
    }

    /// Every recorded location in sorted order.
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl KnownLocations for KnownLocationSet {
    fn ensure_known(&self, location: &str) {
        let mut locations = self.locations.lock().unwrap_or_else(PoisonError::into_inner);
        if !locations.contains(location) {
            locations.insert(location.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_known_is_idempotent() {
        let known = KnownLocationSet::new();
        known.ensure_known(":pserver:cvs.example.org:/cvsroot");
        known.ensure_known(":pserver:cvs.example.org:/cvsroot");
        known.ensure_known(":ext:cvs.example.org:/cvsroot");
        assert!(known.contains(":pserver:cvs.example.org:/cvsroot"));
        assert_eq!(
            known.locations(),
            [":ext:cvs.example.org:/cvsroot", ":pserver:cvs.example.org:/cvsroot"]
        );
    }
}

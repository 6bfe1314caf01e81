//! Process-wide serial port allow-list
//!
//! Transports only resolve device paths they can enumerate, plus the names
//! registered here. Every open registers its port name first, so a stick
//! behind a udev symlink (`/dev/serial/by-id/...`) or an unusual device node
//! stays reachable.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

static GLOBAL: Lazy<PortRegistry> = Lazy::new(PortRegistry::new);

/// Lock-guarded set of port names
#[derive(Debug, Default)]
pub struct PortRegistry {
    names: Mutex<BTreeSet<String>>,
}

impl PortRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every connection in this process
    pub fn global() -> &'static PortRegistry {
        &GLOBAL
    }

    /// Add a port name. Returns `true` if the name was not registered yet.
    pub fn add(&self, name: &str) -> bool {
        let mut names = self.lock();
        if names.contains(name) {
            return false;
        }
        names.insert(name.to_string())
    }

    /// Whether `name` has been registered
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Registered names joined with `:`
    pub fn to_property_string(&self) -> String {
        self.names().join(":")
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

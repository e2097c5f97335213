//! Compiled-in table of check-in destinations.
//!
//! The table has to match the destination list shipped with the client app
//! entry for entry. Nothing here can detect drift between the two.

/// A check-in target with its reference coordinates and issuing country.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    pub id: u64,
    pub latitude: f64,
    pub longitude: f64,
    /// ISO-3166 alpha-2 country code.
    pub jurisdiction: &'static str,
}

pub trait DestinationRegistry: Send + Sync {
    fn lookup(&self, id: u64) -> Option<Destination>;
}

const DESTINATIONS: &[Destination] = &[
    Destination {
        id: 1,
        latitude: 28.0026,
        longitude: 86.8528,
        jurisdiction: "NP",
    },
    Destination {
        id: 2,
        latitude: 48.8584,
        longitude: 2.2945,
        jurisdiction: "FR",
    },
    Destination {
        id: 3,
        latitude: 40.6892,
        longitude: -74.0445,
        jurisdiction: "US",
    },
    Destination {
        id: 4,
        latitude: -33.8568,
        longitude: 151.2153,
        jurisdiction: "AU",
    },
    Destination {
        id: 5,
        latitude: -13.1631,
        longitude: -72.545,
        jurisdiction: "PE",
    },
    Destination {
        id: 6,
        latitude: 29.9792,
        longitude: 31.1342,
        jurisdiction: "EG",
    },
    Destination {
        id: 7,
        latitude: 27.1751,
        longitude: 78.0421,
        jurisdiction: "IN",
    },
    Destination {
        id: 8,
        latitude: 41.8902,
        longitude: 12.4922,
        jurisdiction: "IT",
    },
];

/// The production registry, backed by the table above.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRegistry;

impl DestinationRegistry for StaticRegistry {
    fn lookup(&self, id: u64) -> Option<Destination> {
        DESTINATIONS.iter().find(|d| d.id == id).copied()
    }
}

/// Registry fake for tests. Counts lookups so tests can assert that a
/// rejected request never got as far as destination resolution.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    destinations: Vec<Destination>,
    lookups: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl InMemoryRegistry {
    pub fn new(destinations: Vec<Destination>) -> Self {
        Self {
            destinations,
            lookups: Default::default(),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl DestinationRegistry for InMemoryRegistry {
    fn lookup(&self, id: u64) -> Option<Destination> {
        self.lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.destinations.iter().find(|d| d.id == id).copied()
    }
}

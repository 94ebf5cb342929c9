use std::{
    fmt::{self, Display},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

/// First sid handed out by a fresh registry.
pub const FIRST_SID: u32 = 42;

/// Storage id of a device or holder.
///
/// A sid is allocated once and survives copies of the graph it lives in. Two
/// graphs of the same session talk about the same entity iff they use the
/// same sid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sid(pub u32);

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Sid {
    fn from(value: u32) -> Self {
        Sid(value)
    }
}

/// Hands out sids for all graphs of one storage session.
///
/// Cloning the registry yields a handle to the same counter, so every graph
/// copied from another shares the allocation space of its origin.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    next: Arc<AtomicU32>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(FIRST_SID)),
        }
    }

    /// Returns a sid that was never returned before by this registry.
    pub fn allocate(&self) -> Sid {
        Sid(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers a sid taken over from another snapshot and returns it
    /// unchanged. Later allocations never collide with it.
    pub fn register_copy(&self, sid: Sid) -> Sid {
        self.next
            .fetch_max(sid.0.saturating_add(1), Ordering::SeqCst);
        sid
    }

    /// Returns the sid the next call to `allocate` will hand out.
    pub fn peek(&self) -> Sid {
        Sid(self.next.load(Ordering::SeqCst))
    }

    /// Returns whether both handles refer to the same registry.
    pub fn is_same(&self, other: &IdentityRegistry) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_allocate() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.allocate(), Sid(42));
        assert_eq!(registry.allocate(), Sid(43));

        let sids: BTreeSet<Sid> = (0..100).map(|_| registry.allocate()).collect();
        assert_eq!(sids.len(), 100);
        assert!(!sids.contains(&Sid(42)));
    }

    #[test]
    fn test_register_copy() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.register_copy(Sid(100)), Sid(100));
        assert_eq!(registry.allocate(), Sid(101));

        // Registering an older sid does not rewind the counter
        assert_eq!(registry.register_copy(Sid(50)), Sid(50));
        assert_eq!(registry.allocate(), Sid(102));
    }

    #[test]
    fn test_shared_handles() {
        let registry = IdentityRegistry::new();
        let handle = registry.clone();
        assert!(registry.is_same(&handle));
        assert!(!registry.is_same(&IdentityRegistry::new()));

        assert_eq!(handle.allocate(), Sid(42));
        assert_eq!(registry.allocate(), Sid(43));
        assert_eq!(registry.peek(), Sid(44));
    }

    #[test]
    fn test_independent_registries() {
        let first = IdentityRegistry::new();
        let second = IdentityRegistry::new();
        assert_eq!(first.allocate(), second.allocate());
    }
}

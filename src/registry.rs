//! Typed adapter registry — the only edge between protocol adapters.
//!
//! Grounded in the teacher's `Runtime`-handle redesign note (spec.md §9):
//! globally mutable singletons and cyclic module imports are replaced by a
//! registry of typed capability trait objects keyed by a stable string.
//! Registration happens once at adapter startup; lookup afterwards never
//! blocks on a write lock.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// Well-known capability keys. Using `&'static str` (rather than an enum)
/// keeps the registry open to capabilities this crate doesn't know about —
/// an out-of-tree adapter can register under its own key.
pub mod keys {
    pub const OPLOCK_BREAKER: &str = "oplock_breaker";
    pub const IDENTITY_RESOLVER: &str = "identity_resolver";
    pub const SHARE_CHANGE: &str = "share_change_callback";
    pub const NLM_GRANTED_TRANSPORT: &str = "nlm_granted_transport";
}

/// Lock-free-after-start registry of `Arc<dyn Any>` capability providers.
#[derive(Default)]
pub struct Registry {
    providers: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Registers a provider under `key`. Overwrites any prior registration —
    /// callers are expected to register once at startup, but tests may
    /// re-register to swap in a fake.
    pub fn set_provider<T>(&self, key: &'static str, provider: Arc<T>)
    where
        T: Any + Send + Sync + 'static,
    {
        self.providers.insert(key, provider);
        tracing::debug!(key, "adapter registered");
    }

    /// Looks up a provider by key and downcasts it to `T`. Returns `None`
    /// if nothing is registered under `key`, or if the registered value is
    /// not a `T` (a programmer error — callers pair a key with exactly one
    /// concrete type, enforced by convention, not the type system).
    pub fn get_provider<T>(&self, key: &'static str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync + 'static,
    {
        let entry = self.providers.get(key)?;
        entry.value().clone().downcast::<T>().ok()
    }

    pub fn is_registered(&self, key: &'static str) -> bool {
        self.providers.contains_key(key)
    }
}

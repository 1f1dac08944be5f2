//! # Cache states
//!
//! Explicit state machine for invalidatable caches: a value is `Uncomputed`
//! before first access, `Computed` afterwards, and `Stale` once any input it
//! was derived from has changed. Access while `Stale` or `Uncomputed`
//! recomputes; mutating an input transitions to `Stale`.
//!
//! Immutable at-most-once caches (match state, coordinates) use
//! `once_cell::sync::OnceCell` instead; this type exists for entities whose
//! inputs can legitimately change, i.e. [`Dataset`](crate::dataset::Dataset).

/// Lifecycle of a recomputable cached value.
#[derive(Debug, Clone, Default)]
pub enum CacheState<T> {
    #[default]
    Uncomputed,
    Computed(T),
    /// An input changed since the value was computed; the next access must
    /// recompute.
    Stale,
}

impl<T> CacheState<T> {
    pub fn is_computed(&self) -> bool {
        matches!(self, CacheState::Computed(_))
    }

    /// Mark the cache invalid. `Uncomputed` stays `Uncomputed`; a computed
    /// value is discarded.
    pub fn invalidate(&mut self) {
        if self.is_computed() {
            *self = CacheState::Stale;
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            CacheState::Computed(v) => Some(v),
            _ => None,
        }
    }

    pub fn set(&mut self, value: T) -> &T {
        *self = CacheState::Computed(value);
        match self {
            CacheState::Computed(v) => v,
            _ => unreachable!(),
        }
    }

    /// Discard the value entirely (out-of-memory mode drops the in-memory
    /// copy after persisting it).
    pub fn clear(&mut self) {
        *self = CacheState::Uncomputed;
    }
}

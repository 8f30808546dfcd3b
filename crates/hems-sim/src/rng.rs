//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Process-wide random source shared by generators and feeds."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::prelude::*;

/// Cloneable handle to a single `StdRng` guarded by a mutex.
///
/// Every clone draws from the same sequence. Callers only rely on each draw
/// being uniform, never on their position in the sequence.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    /// Seed from `seed` when given, otherwise from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Run `f` with exclusive access to the generator.
    ///
    /// Keep `f` short: the lock is held for its whole duration.
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRng").finish_non_exhaustive()
    }
}

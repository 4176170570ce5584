//! Generation-based memory reclamation.
//!
//! A single writer publishes new structures and retires old ones; readers
//! pin the current generation with a scoped [`GenerationGuard`] for the
//! duration of each read operation. Retired resources are parked on a hold
//! list tagged with the generation in which they were retired, and freed
//! only once no live guard can still observe that generation.
//!
//! The sweep itself is externally driven: callers periodically compute
//! [`GenerationHandler::first_used_generation`] and pass it to
//! [`GenerationHandler::reclaim`].

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::Mutex;

/// A monotonically increasing generation number.
pub type Generation = u64;

/// A deferred-free resource tagged with the generation it was retired in.
/// The resource is never read; it is owned solely so its drop runs at
/// reclaim time.
struct GenerationHold {
    generation: Generation,
    _resource: Box<dyn Any + Send>,
}

/// Tracks the current generation, live reader guards, and retired
/// resources awaiting reclamation.
///
/// Guard registration and the hold list are mutex-protected administrative
/// state; neither is touched on hot read paths beyond the guard
/// acquire/release at operation boundaries.
#[derive(Debug)]
pub struct GenerationHandler {
    current: AtomicU64,
    active: Mutex<BTreeMap<Generation, usize>>,
    holds: Mutex<Vec<GenerationHold>>,
}

impl std::fmt::Debug for GenerationHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHold")
            .field("generation", &self.generation)
            .finish()
    }
}

impl GenerationHandler {
    /// Create a new handler starting at generation 0.
    pub fn new() -> Self {
        GenerationHandler {
            current: AtomicU64::new(0),
            active: Mutex::new(BTreeMap::new()),
            holds: Mutex::new(Vec::new()),
        }
    }

    /// Get the current generation.
    pub fn current_generation(&self) -> Generation {
        self.current.load(Ordering::Acquire)
    }

    /// Advance to the next generation. Writer-only.
    pub fn increment_generation(&self) -> Generation {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Acquire a guard pinning the current generation.
    pub fn take_guard(self: &Arc<Self>) -> GenerationGuard {
        let mut active = self.active.lock();
        let generation = self.current_generation();
        *active.entry(generation).or_insert(0) += 1;
        GenerationGuard {
            handler: Arc::clone(self),
            generation,
        }
    }

    /// The oldest generation any live guard still references, or the
    /// current generation if no guards are outstanding.
    pub fn first_used_generation(&self) -> Generation {
        let active = self.active.lock();
        active
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.current_generation())
    }

    /// Park a retired resource until all guards that could observe it
    /// have been released. Tagged with the current generation.
    pub fn hold(&self, resource: Box<dyn Any + Send>) {
        let generation = self.current_generation();
        self.holds.lock().push(GenerationHold {
            generation,
            _resource: resource,
        });
    }

    /// Drop every held resource retired before `first_used`. Idempotent,
    /// and a no-op when nothing qualifies.
    pub fn reclaim(&self, first_used: Generation) {
        let mut holds = self.holds.lock();
        let before = holds.len();
        holds.retain(|hold| hold.generation >= first_used);
        let freed = before - holds.len();
        if freed > 0 {
            debug!("reclaimed {freed} held resources below generation {first_used}");
        }
    }

    /// Number of resources currently parked on the hold list.
    pub fn held_count(&self) -> usize {
        self.holds.lock().len()
    }

    fn release(&self, generation: Generation) {
        let mut active = self.active.lock();
        match active.get_mut(&generation) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                active.remove(&generation);
            }
            None => unreachable!("guard released for unregistered generation"),
        }
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped reader token pinning one generation. Everything retired at or
/// after the pinned generation stays alive while the guard does.
#[derive(Debug)]
pub struct GenerationGuard {
    handler: Arc<GenerationHandler>,
    generation: Generation,
}

impl GenerationGuard {
    /// The generation this guard pins.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.handler.release(self.generation);
    }
}

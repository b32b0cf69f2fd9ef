use bitvec::prelude::{BitVec, Lsb0};

use crate::params::InternalTrigger;

/// Number of internal triggers on a QDAC-II
pub(crate) const INTERNAL_TRIGGERS: usize = 14;


/// Error type for trigger pool operations. `Exhausted` is raised when
/// all internal triggers are in use, `DoubleFree` when an attempt was made
/// to release a trigger that is already in the pool, `Invalid` when the
/// trigger does not belong to the pool at all and `Stale` when it was
/// allocated before the pool was last reclaimed.
#[derive(Debug)]
pub enum TriggerError {
    /// No internal trigger available
    Exhausted,
    /// Trigger released twice
    DoubleFree(u8),
    /// Trigger outside the pool
    Invalid(u8),
    /// Trigger from an earlier pool generation
    Stale(u8),
}

impl std::fmt::Display for TriggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            TriggerError::Exhausted => write!(f, "No more internal triggers available"),
            TriggerError::DoubleFree(t) => write!(f, "Internal trigger {} is already free", t),
            TriggerError::Invalid(t) => write!(f, "No internal trigger {}", t),
            TriggerError::Stale(t) => write!(f, "Internal trigger {} was reclaimed by a reset", t),
        }
    }
}

impl std::error::Error for TriggerError {}


/// Internal trigger allocator
///
/// The instrument has a fixed number of internal triggers which are shared
/// by every arrangement and sweep operating on the same device. The pool
/// keeps one bit per trigger, set when the trigger is available. Allocation
/// always hands out the lowest available trigger, so a freshly reset pool
/// gives out `int1`, `int2`, ... in order. Whoever allocates a trigger is
/// responsible for releasing it again, otherwise the pool will eventually
/// run dry.
///
/// [`TriggerPool::free_all()`] starts a new generation. Triggers allocated
/// in an earlier generation can no longer be released into the pool.
pub(crate) struct TriggerPool {
    available: BitVec<u32, Lsb0>,
    generation: u32,
}

impl TriggerPool {

    /// Create a pool with `size` internal triggers, all available
    pub fn new(size: usize) -> Self {
        TriggerPool { available: BitVec::repeat(true, size), generation: 0 }
    }

    /// Total number of triggers managed by this pool
    pub fn size(&self) -> usize {
        self.available.len()
    }

    /// Number of triggers not currently allocated
    pub fn available(&self) -> usize {
        self.available.count_ones()
    }

    /// Allocate the lowest numbered available trigger
    pub fn allocate(&mut self) -> Result<InternalTrigger, TriggerError> {
        let index = self.available.first_one().ok_or(TriggerError::Exhausted)?;
        self.available.set(index, false);

        Ok(InternalTrigger::with_generation((index + 1) as u8, self.generation))
    }

    /// `true` if `trigger` was allocated since the last reclaim
    pub fn is_current(&self, trigger: &InternalTrigger) -> bool {
        trigger.generation() == self.generation
    }

    /// Return a trigger to the pool
    pub fn free(&mut self, trigger: InternalTrigger) -> Result<(), TriggerError> {
        let number = trigger.value();
        let index = match (number as usize).checked_sub(1) {
            Some(i) if i < self.size() => i,
            _ => return Err(TriggerError::Invalid(number))
        };

        if !self.is_current(&trigger) {
            return Err(TriggerError::Stale(number));
        }

        if self.available[index] {
            return Err(TriggerError::DoubleFree(number));
        }

        self.available.set(index, true);

        Ok(())
    }

    /// Mark every trigger as available and start a new generation
    pub fn free_all(&mut self) {
        self.available.fill(true);
        self.generation = self.generation.wrapping_add(1);
    }

}

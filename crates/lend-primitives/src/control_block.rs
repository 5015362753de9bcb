//! Control block shared by one owner and its borrows
//!
//! A `ControlBlock` is paired 1:1 with an owned object. The owning side holds
//! one implicit unit of the reference count from construction until it
//! releases the object; every borrow that observes the object holds one more.
//!
//! # Safety Invariants
//!
//! 1. **Count never negative**: `remove_reference` at zero returns
//!    `OverRelease` and leaves the counter untouched
//! 2. **Freed is monotonic**: `mark_freed` only ever stores `true`
//! 3. **Single finisher**: exactly one holder observes the transition to zero,
//!    and only that holder may free a heap block
//! 4. **Freed before last unit**: owners mark the block freed before giving up
//!    their unit, so whoever observes zero also observes `is_freed()`
//!
//! # Verification
//!
//! This module includes Kani proofs for the above invariants.

use alloc::boxed::Box;
use core::fmt;
use core::ptr::NonNull;

use thiserror::Error;

use crate::sync::{AtomicBool, AtomicUsize, Ordering};

/// Units held by the owning side for as long as it owns the object.
pub const OWNER_UNIT: usize = 1;

/// Hard ceiling on live references to one block.
pub const MAX_REFERENCES: usize = isize::MAX as usize;

/// Where a control block lives, which decides who frees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOrigin {
    /// Boxed next to a heap-owned object. Freed by whichever holder drops the
    /// count to zero.
    Heap,
    /// Stored inline in an embedded owner. Never freed through the counter.
    Embedded,
}

/// `remove_reference` was called on a block whose count is already zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("reference removed from a control block whose count is already zero")]
pub struct OverRelease;

/// Result of the owning side giving up its unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    /// No borrows were attached. The owner finishes the release.
    Last,
    /// This many borrows are still attached. The last of them finishes.
    Outstanding(usize),
}

/// Shared bookkeeping record for one owned object.
pub struct ControlBlock {
    /// Owner unit plus one unit per live borrow
    references: AtomicUsize,
    /// Set once the owner has let go of the object
    freed: AtomicBool,
    origin: BlockOrigin,
}

impl ControlBlock {
    /// Create a block seeded with the owner unit.
    pub fn new(origin: BlockOrigin) -> Self {
        Self {
            references: AtomicUsize::new(OWNER_UNIT),
            freed: AtomicBool::new(false),
            origin,
        }
    }

    /// Allocate a `Heap` block and hand out its raw pointer.
    ///
    /// The caller becomes the holder of the owner unit and must eventually
    /// pass the pointer to [`ControlBlock::free_heap`] once the count reaches
    /// zero.
    pub fn new_heap() -> NonNull<ControlBlock> {
        NonNull::from(Box::leak(Box::new(Self::new(BlockOrigin::Heap))))
    }

    /// Free a block allocated by [`ControlBlock::new_heap`].
    ///
    /// # Safety
    ///
    /// - `block` must come from `new_heap` and not have been freed already
    /// - the caller must be the holder that observed the count reach zero
    /// - no reference into the block may outlive this call
    pub unsafe fn free_heap(block: NonNull<ControlBlock>) {
        debug_assert_eq!(block.as_ref().origin, BlockOrigin::Heap);
        debug_assert_eq!(block.as_ref().reference_count(), 0);
        drop(Box::from_raw(block.as_ptr()));
    }

    /// Add one unit. Returns the new count.
    ///
    /// # Panics
    ///
    /// At [`MAX_REFERENCES`]. The counter is left untouched.
    pub fn add_reference(&self) -> usize {
        // A new reference is always minted from an existing one, so the
        // increment needs no synchronization with other holders.
        let mut current = self.references.load(Ordering::Relaxed);
        loop {
            if current >= MAX_REFERENCES {
                panic!("control block reference count overflow");
            }
            match self.references.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current + 1,
                Err(actual) => current = actual,
            }
        }
    }

    /// Remove one unit. Returns the new count, or `OverRelease` if the count
    /// was already zero (the counter is left at zero).
    pub fn remove_reference(&self) -> Result<usize, OverRelease> {
        let mut current = self.references.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(OverRelease);
            }

            // AcqRel: the holder that reaches zero must see every write made
            // by the holders that released before it.
            match self.references.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(current - 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Give up the owner unit: marks the block freed, then removes one unit.
    pub fn release_owner(&self) -> Result<Released, OverRelease> {
        self.mark_freed();
        match self.remove_reference()? {
            0 => Ok(Released::Last),
            outstanding => Ok(Released::Outstanding(outstanding)),
        }
    }

    /// Record that the owner no longer keeps the object alive. Idempotent.
    pub fn mark_freed(&self) {
        self.freed.store(true, Ordering::Release);
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::Acquire)
    }

    /// Current count (advisory outside of the release protocol).
    pub fn reference_count(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    /// Whether any borrow is attached. Only meaningful while the owner unit
    /// is still held.
    pub fn has_borrows(&self) -> bool {
        self.reference_count() > OWNER_UNIT
    }

    pub fn origin(&self) -> BlockOrigin {
        self.origin
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("references", &self.reference_count())
            .field("freed", &self.is_freed())
            .field("origin", &self.origin)
            .finish()
    }
}

// ============================================================================
// Kani Proofs for Control Block Invariants
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: Balanced add/remove returns to the owner unit
    #[kani::proof]
    #[kani::unwind(6)]
    fn balanced_borrows_restore_owner_unit() {
        let block = ControlBlock::new(BlockOrigin::Embedded);
        let borrows: usize = kani::any();
        kani::assume(borrows <= 4);

        for _ in 0..borrows {
            block.add_reference();
        }
        for _ in 0..borrows {
            kani::assert(block.remove_reference().is_ok(), "balanced remove must succeed");
        }

        kani::assert(
            block.reference_count() == OWNER_UNIT,
            "count must return to the owner unit",
        );
    }

    /// Proof: Removing at zero never wraps
    #[kani::proof]
    fn over_release_is_rejected() {
        let block = ControlBlock::new(BlockOrigin::Embedded);
        let _ = block.remove_reference();

        kani::assert(block.remove_reference() == Err(OverRelease), "must report over-release");
        kani::assert(block.reference_count() == 0, "counter must stay at zero");
    }

    /// Proof: Owner release reports exactly the borrows still attached
    #[kani::proof]
    #[kani::unwind(6)]
    fn owner_release_counts_outstanding() {
        let block = ControlBlock::new(BlockOrigin::Embedded);
        let borrows: usize = kani::any();
        kani::assume(borrows <= 4);

        for _ in 0..borrows {
            block.add_reference();
        }

        let released = block.release_owner();
        if borrows == 0 {
            kani::assert(released == Ok(Released::Last), "sole owner finishes");
        } else {
            kani::assert(
                released == Ok(Released::Outstanding(borrows)),
                "borrows remain attached",
            );
        }
        kani::assert(block.is_freed(), "release always marks freed");
    }

    /// Proof: Freed never reverts
    #[kani::proof]
    fn freed_is_monotonic() {
        let block = ControlBlock::new(BlockOrigin::Embedded);
        block.mark_freed();
        block.add_reference();
        let _ = block.remove_reference();
        block.mark_freed();

        kani::assert(block.is_freed(), "freed must stay set");
    }
}

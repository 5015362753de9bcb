//! Object/control-block pointer pair shared by every handle
//!
//! # Safety Invariants
//!
//! 1. **Paired**: `ptr` and `block` describe the same owned object for the
//!    lease's whole life
//! 2. **Counted**: every live handle holding a lease owns one unit of
//!    `block`'s count (the owner unit for owners, a borrow unit otherwise)
//! 3. **Leaked on dangling**: when an owner lets go while borrows remain, the
//!    object is never dropped or deallocated, so `ptr` stays readable for as
//!    long as any lease to it exists

use core::ptr::NonNull;

use lend_primitives::{BlockOrigin, ControlBlock, Released};

#[cfg(any(debug_assertions, feature = "checked"))]
use crate::violation::{self, OwnerKind, Violation};

/// Pointer to an owned object together with its control block.
///
/// Plain data: copying a lease does not touch the count. Handles decide when
/// units are added and released.
pub(crate) struct RawLease<T: ?Sized> {
    ptr: NonNull<T>,
    block: NonNull<ControlBlock>,
}

impl<T: ?Sized> Clone for RawLease<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RawLease<T> {}

impl<T: ?Sized> RawLease<T> {
    /// Take ownership of a boxed object and pair it with a fresh heap block
    /// holding the owner unit.
    pub(crate) fn from_box(value: Box<T>) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(value)),
            block: ControlBlock::new_heap(),
        }
    }

    /// Pair an object with a block that lives elsewhere (inside a `Lendable`).
    pub(crate) fn embedded(ptr: NonNull<T>, block: NonNull<ControlBlock>) -> Self {
        Self { ptr, block }
    }

    pub(crate) fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Address of the object with any metadata dropped, for identity checks.
    pub(crate) fn thin(self) -> *const () {
        self.ptr.cast::<()>().as_ptr()
    }

    /// # Safety
    ///
    /// The caller must hold a unit of the block's count for `'a`.
    pub(crate) unsafe fn block<'a>(self) -> &'a ControlBlock {
        self.block.as_ref()
    }

    /// # Safety
    ///
    /// The caller must hold a unit of the block's count for `'a`, and no
    /// `&mut T` to the object may be live during `'a`.
    pub(crate) unsafe fn value<'a>(self) -> &'a T {
        &*self.ptr.as_ptr()
    }

    /// Like [`RawLease::value`], but reports a borrow that outlived its
    /// owner in checked builds. The object was leaked, so the read is still
    /// valid.
    ///
    /// # Safety
    ///
    /// Same as [`RawLease::value`].
    #[track_caller]
    pub(crate) unsafe fn checked_value<'a>(self) -> &'a T {
        #[cfg(any(debug_assertions, feature = "checked"))]
        {
            let block = self.block();
            if block.is_freed() {
                violation::report(Violation::ReleasedAccess {
                    outstanding: block.reference_count(),
                });
            }
        }
        self.value()
    }

    /// Re-type the object pointer.
    ///
    /// # Safety
    ///
    /// `cast` must return a non-null pointer to the same object, valid for
    /// the returned type.
    pub(crate) unsafe fn cast<U: ?Sized>(self, cast: impl FnOnce(*mut T) -> *mut U) -> RawLease<U> {
        RawLease {
            ptr: NonNull::new_unchecked(cast(self.ptr.as_ptr())),
            block: self.block,
        }
    }

    /// Attach one more borrow to the block and return the same lease.
    ///
    /// # Safety
    ///
    /// The caller must hold a unit of the block's count.
    pub(crate) unsafe fn add_borrow(self) -> Self {
        self.block().add_reference();
        self
    }

    /// Release a borrow unit. The holder that takes the count to zero frees a
    /// heap block; the object it described was leaked by its owner.
    ///
    /// # Safety
    ///
    /// The caller must own one borrow unit and must not use the lease after.
    #[track_caller]
    pub(crate) unsafe fn release_borrow(self) {
        let block = self.block();
        match block.remove_reference() {
            Ok(0) if block.origin() == BlockOrigin::Heap => {
                tracing::debug!(target: "lend", "last borrow of a released object freed its control block");
                ControlBlock::free_heap(self.block);
            }
            Ok(_) => {}
            #[cfg(any(debug_assertions, feature = "checked"))]
            Err(over) => violation::report(over.into()),
            #[cfg(not(any(debug_assertions, feature = "checked")))]
            Err(_) => {}
        }
    }

    /// Release the owner unit of a heap lease.
    ///
    /// Returns the object when no borrow is attached. Otherwise the object is
    /// leaked for the borrows to keep reading, the last of them frees the
    /// block, and the dangling owner is reported.
    ///
    /// # Safety
    ///
    /// The lease must come from [`RawLease::from_box`], the caller must own
    /// its owner unit, and must not use the lease after.
    #[track_caller]
    pub(crate) unsafe fn release_owner(self) -> Option<Box<T>> {
        let block = self.block();
        match block.release_owner() {
            Ok(Released::Last) => {
                ControlBlock::free_heap(self.block);
                Some(Box::from_raw(self.ptr.as_ptr()))
            }
            Ok(Released::Outstanding(outstanding)) => {
                tracing::warn!(
                    target: "lend",
                    outstanding,
                    "owner released while lent, leaking the object"
                );
                #[cfg(any(debug_assertions, feature = "checked"))]
                violation::report(Violation::DanglingBorrow {
                    owner: OwnerKind::UniquePtr,
                    outstanding,
                });
                None
            }
            #[cfg(any(debug_assertions, feature = "checked"))]
            Err(over) => {
                violation::report(over.into());
                None
            }
            #[cfg(not(any(debug_assertions, feature = "checked")))]
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sole_owner_gets_box_back() {
        let lease = RawLease::from_box(Box::new(String::from("owned")));
        // SAFETY: sole owner of a fresh lease
        let value = unsafe { lease.release_owner() };
        assert_eq!(value.as_deref().map(String::as_str), Some("owned"));
    }

    #[test]
    fn test_trailing_borrow_frees_block() {
        let lease = RawLease::from_box(Box::new(11_u32));
        // SAFETY: the owner unit is held until release_owner below
        let borrow = unsafe { lease.add_borrow() };
        assert_eq!(unsafe { lease.block() }.reference_count(), 2);

        let ((), _) = crate::capture_violations(|| {
            // SAFETY: releases the owner unit exactly once
            assert!(unsafe { lease.release_owner() }.is_none());
        });

        // SAFETY: the borrow unit keeps block and leaked object alive
        unsafe {
            assert!(borrow.block().is_freed());
            assert_eq!(*borrow.value(), 11);
            borrow.release_borrow();
        }
    }

    #[test]
    fn test_cast_keeps_identity() {
        let lease = RawLease::from_box(Box::new(3_u8));
        // SAFETY: unsizing coercion to the same object
        let wide: RawLease<dyn core::fmt::Debug> =
            unsafe { lease.cast(|ptr| ptr as *mut dyn core::fmt::Debug) };
        assert_eq!(wide.thin(), lease.thin());

        // SAFETY: sole owner
        let boxed = unsafe { wide.release_owner() };
        assert_eq!(boxed.map(|value| format!("{value:?}")), Some("3".to_string()));
    }
}

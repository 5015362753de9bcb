//! Owner that embeds its object and control block in place
//!
//! A [`Lendable`] stores `T` inline next to its own control block, so it can
//! live on the stack or inside another struct. Borrows point straight into
//! that storage, which is why lending requires a pinned reference: once a
//! `Lendable` is pinned it cannot move, and unpinned it cannot be lent.
//!
//! # Safety Invariants
//!
//! 1. **No move while lent**: borrows are only created from
//!    `Pin<&Lendable>`, and `Lendable` is `!Unpin`
//! 2. **No drop while lent**: dropping with borrows attached aborts the
//!    process, whatever the violation policy, since the storage is about to
//!    be invalidated
//! 3. **No `&mut T` while lent**: `DerefMut` needs an unpinned value (never
//!    lent), and the pinned `value_mut`/`set_value` check the count first

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::{PhantomData, PhantomPinned};
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::ptr::{self, NonNull};

use lend_primitives::{BlockOrigin, ControlBlock, Released, OWNER_UNIT};

use crate::access::{Access, Const, Mut};
use crate::raw::RawLease;
use crate::violation::{self, OwnerKind, Violation};

/// Embedded owner. Lend from it through `Pin<&Lendable<T, A>>`.
///
/// ```
/// use std::pin::pin;
/// use lend::{lend, Lendable};
///
/// let lendable = pin!(Lendable::new(String::from("inline")));
/// let borrow = lend(lendable.as_ref());
/// assert_eq!(borrow.len(), 6);
/// assert_eq!(lendable.reference_count(), 2);
/// ```
pub struct Lendable<T, A: Access = Mut> {
    block: ControlBlock,
    value: UnsafeCell<T>,
    _pinned: PhantomPinned,
    _marker: PhantomData<(A, *const ())>,
}

// SAFETY: borrows on other threads may read the value while the lendable
// moves between threads inside its pin, so `T: Sync` is needed with `T: Send`.
unsafe impl<T: Send + Sync, A: Access> Send for Lendable<T, A> {}
// SAFETY: shared access only reads the value and lends it atomically
unsafe impl<T: Sync, A: Access> Sync for Lendable<T, A> {}

impl<T> Lendable<T, Mut> {
    pub fn new(value: T) -> Self {
        Self::with_value(value)
    }
}

impl<T> Lendable<T, Const> {
    pub fn new_const(value: T) -> Self {
        Self::with_value(value)
    }
}

impl<T, A: Access> Lendable<T, A> {
    fn with_value(value: T) -> Self {
        Self {
            block: ControlBlock::new(BlockOrigin::Embedded),
            value: UnsafeCell::new(value),
            _pinned: PhantomPinned,
            _marker: PhantomData,
        }
    }

    pub(crate) fn lease(self: Pin<&Self>) -> RawLease<T> {
        let this = self.get_ref();
        // SAFETY: `UnsafeCell::get` never returns null
        let value = unsafe { NonNull::new_unchecked(this.value.get()) };
        RawLease::embedded(value, NonNull::from(&this.block))
    }

    /// Move the value out. An unpinned lendable has never been lent.
    ///
    /// The value comes back as a plain `T` whatever the access marker.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the value is read exactly once
        unsafe { ptr::read(this.value.get()) }
    }

    /// Replace the value in place.
    ///
    /// With borrows attached the replacement is refused: the dangling
    /// borrows are reported and the old value is kept.
    #[track_caller]
    pub fn set_value(self: Pin<&mut Self>, value: T) {
        // SAFETY: the value is not structurally pinned, and the lendable
        // itself is not moved
        let this = unsafe { self.get_unchecked_mut() };
        let outstanding = this.lent_count();
        if outstanding > 0 {
            violation::report(Violation::DanglingBorrow {
                owner: OwnerKind::Lendable,
                outstanding,
            });
            return;
        }
        *this.value.get_mut() = value;
    }

    /// Owner unit plus one per live borrow.
    pub fn reference_count(&self) -> usize {
        self.block.reference_count()
    }

    pub fn lent_count(&self) -> usize {
        self.reference_count().saturating_sub(OWNER_UNIT)
    }

    pub fn as_ptr(&self) -> *const T {
        self.value.get()
    }
}

impl<T> Lendable<T, Mut> {
    /// Mutable access to a pinned lendable, available only while nothing is
    /// lent.
    pub fn value_mut(self: Pin<&mut Self>) -> Option<&mut T> {
        // SAFETY: the value is not structurally pinned, and the lendable
        // itself is not moved
        let this = unsafe { self.get_unchecked_mut() };
        if this.lent_count() > 0 {
            return None;
        }
        Some(this.value.get_mut())
    }
}

impl<T, A: Access> Deref for Lendable<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: mutation needs `&mut self` with no borrow attached, or an
        // unsafe borrow-side `as_mut` whose caller excludes readers
        unsafe { &*self.value.get() }
    }
}

impl<T> DerefMut for Lendable<T, Mut> {
    fn deref_mut(&mut self) -> &mut T {
        // An unpinned `&mut Lendable` can never have been lent
        self.value.get_mut()
    }
}

impl<T, A: Access> Drop for Lendable<T, A> {
    fn drop(&mut self) {
        match self.block.release_owner() {
            Ok(Released::Last) => {}
            Ok(Released::Outstanding(outstanding)) => violation::abort(
                Violation::DanglingBorrow {
                    owner: OwnerKind::Lendable,
                    outstanding,
                },
                core::any::type_name::<T>(),
            ),
            #[cfg(any(debug_assertions, feature = "checked"))]
            Err(over) => violation::report(over.into()),
            #[cfg(not(any(debug_assertions, feature = "checked")))]
            Err(_) => {}
        }
    }
}

impl<T: Clone, A: Access> Clone for Lendable<T, A> {
    /// Copies the value into a fresh lendable with its own block.
    fn clone(&self) -> Self {
        Self::with_value((**self).clone())
    }
}

impl<T: Default, A: Access> Default for Lendable<T, A> {
    fn default() -> Self {
        Self::with_value(T::default())
    }
}

impl<T> From<T> for Lendable<T, Mut> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug, A: Access> fmt::Debug for Lendable<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lendable")
            .field("value", &**self)
            .field("lent", &self.lent_count())
            .field("access", &A::NAME)
            .finish()
    }
}

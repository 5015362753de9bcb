//! Counted, non-owning borrows
//!
//! A borrow holds one unit of its owner's control block for as long as it
//! lives. Cloning adds a unit, dropping removes one. Borrows carry no
//! lifetime: when an owner lets go of a lent object the owner reports it, and
//! in checked builds every later dereference through a borrow reports
//! `LENT_PTR_RELEASED`.
//!
//! State machine for a [`LentPtr`]:
//!
//! ```text
//! Empty --lend/clone--> Attached --owner released--> Released
//!   ^                      |                            |
//!   +---- reset/take ------+-------- reset/take --------+
//! ```
//!
//! Borrows cross threads like `&T` does, so the object must be `Sync`:
//!
//! ```compile_fail
//! use std::cell::Cell;
//! use lend::{lend, make_unique};
//!
//! let owner = make_unique(Cell::new(1));
//! let lent = lend(&owner);
//! std::thread::spawn(move || drop(lent));
//! ```
//!
//! A read-write borrow can write into the object, so borrows are invariant in
//! `T`. Shortening a lifetime inside the object is rejected:
//!
//! ```compile_fail
//! use lend::LentRef;
//!
//! fn shorten<'a>(lent: LentRef<&'static str>) -> LentRef<&'a str> {
//!     lent
//! }
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::Deref;

use crate::access::{Access, Coerce, Const, Mut};
use crate::raw::RawLease;
use crate::unique::{UniquePtr, UniqueRef};
use crate::violation::{self, HandleKind, Violation};

// ============================================================================
// LentRef
// ============================================================================

/// Non-null borrow.
pub struct LentRef<T: ?Sized, A: Access = Mut> {
    lease: RawLease<T>,
    _marker: PhantomData<(*mut T, A)>,
}

// SAFETY: a borrow only ever shares the object, like `&T`
unsafe impl<T: ?Sized + Sync, A: Access> Send for LentRef<T, A> {}
// SAFETY: a borrow only ever shares the object, like `&T`
unsafe impl<T: ?Sized + Sync, A: Access> Sync for LentRef<T, A> {}

impl<T: ?Sized, A: Access> LentRef<T, A> {
    /// Attach a new borrow to `lease`.
    ///
    /// # Safety
    ///
    /// The caller must hold a unit of the lease's block for the duration of
    /// the call.
    pub(crate) unsafe fn attach(lease: RawLease<T>) -> Self {
        Self::adopt(lease.add_borrow())
    }

    /// # Safety
    ///
    /// A borrow unit of the lease must be transferred to the new handle.
    pub(crate) unsafe fn adopt(lease: RawLease<T>) -> Self {
        Self {
            lease,
            _marker: PhantomData,
        }
    }

    pub(crate) fn lease(&self) -> RawLease<T> {
        self.lease
    }

    pub(crate) fn into_lease(self) -> RawLease<T> {
        ManuallyDrop::new(self).lease
    }

    /// Read the object without the released-owner check.
    pub fn get(&self) -> &T {
        // SAFETY: our unit keeps the object readable
        unsafe { self.lease.value() }
    }

    /// Whether the owner already let go of the object.
    pub fn is_released(&self) -> bool {
        // SAFETY: our unit keeps the block alive
        unsafe { self.lease.block() }.is_freed()
    }

    /// Live units on the owner's block, this borrow included.
    pub fn reference_count(&self) -> usize {
        // SAFETY: our unit keeps the block alive
        unsafe { self.lease.block() }.reference_count()
    }

    pub fn as_ptr(&self) -> *const T {
        self.lease.as_ptr()
    }

    pub fn with_access<B: Access>(self) -> LentRef<T, B>
    where
        A: Coerce<B>,
    {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { LentRef::adopt(self.into_lease()) }
    }

    pub fn into_const(self) -> LentRef<T, Const> {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { LentRef::adopt(self.into_lease()) }
    }
}

impl<T: ?Sized> LentRef<T, Mut> {
    /// Mutable access through a read-write borrow.
    ///
    /// # Safety
    ///
    /// No other reference to the object (through its owner or any borrow)
    /// may be used while the returned reference is live. Anything written
    /// must be valid for the owner's `T`, lifetimes included.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut(&self) -> &mut T {
        &mut *self.lease.as_ptr()
    }
}

impl<T: ?Sized, A: Access> Deref for LentRef<T, A> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        // SAFETY: our unit keeps the object readable
        unsafe { self.lease.checked_value() }
    }
}

impl<T: ?Sized, A: Access> Clone for LentRef<T, A> {
    fn clone(&self) -> Self {
        // SAFETY: `self` holds a unit
        unsafe { Self::attach(self.lease) }
    }
}

impl<T: ?Sized, A: Access> Drop for LentRef<T, A> {
    fn drop(&mut self) {
        // SAFETY: our unit is released exactly once, here
        unsafe { self.lease.release_borrow() }
    }
}

impl<'a, T: ?Sized, A: Access> From<&'a UniqueRef<T, A>> for LentRef<T, A> {
    fn from(owner: &'a UniqueRef<T, A>) -> Self {
        // SAFETY: the owner holds its unit while borrowed
        unsafe { Self::attach(owner.lease()) }
    }
}

/// Non-fatal promotion: an empty borrow comes back as the error.
impl<T: ?Sized, A: Access> TryFrom<LentPtr<T, A>> for LentRef<T, A> {
    type Error = LentPtr<T, A>;

    fn try_from(mut lent: LentPtr<T, A>) -> Result<Self, Self::Error> {
        match lent.lease.take() {
            // SAFETY: the borrow unit moves to the new handle
            Some(lease) => Ok(unsafe { LentRef::adopt(lease) }),
            None => Err(lent),
        }
    }
}

impl<T: ?Sized + fmt::Debug, A: Access> fmt::Debug for LentRef<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LentRef")
            .field("value", &self.get())
            .field("released", &self.is_released())
            .field("access", &A::NAME)
            .finish()
    }
}

// ============================================================================
// LentPtr
// ============================================================================

/// Nullable borrow.
pub struct LentPtr<T: ?Sized, A: Access = Mut> {
    lease: Option<RawLease<T>>,
    _marker: PhantomData<(*mut T, A)>,
}

// SAFETY: same reasoning as `LentRef`
unsafe impl<T: ?Sized + Sync, A: Access> Send for LentPtr<T, A> {}
// SAFETY: same reasoning as `LentRef`
unsafe impl<T: ?Sized + Sync, A: Access> Sync for LentPtr<T, A> {}

impl<T: ?Sized, A: Access> LentPtr<T, A> {
    pub const fn null() -> Self {
        Self {
            lease: None,
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// The caller must hold a unit of the lease's block for the duration of
    /// the call.
    pub(crate) unsafe fn attach(lease: Option<RawLease<T>>) -> Self {
        Self::adopt(lease.map(|lease| lease.add_borrow()))
    }

    /// # Safety
    ///
    /// A borrow unit of any lease must be transferred to the new handle.
    pub(crate) unsafe fn adopt(lease: Option<RawLease<T>>) -> Self {
        Self {
            lease,
            _marker: PhantomData,
        }
    }

    pub(crate) fn lease(&self) -> Option<RawLease<T>> {
        self.lease
    }

    pub(crate) fn into_lease(self) -> Option<RawLease<T>> {
        ManuallyDrop::new(self).lease
    }

    pub fn is_null(&self) -> bool {
        self.lease.is_none()
    }

    /// Read the object, if any, without the released-owner check.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: our unit keeps the object readable
        self.lease.map(|lease| unsafe { lease.value() })
    }

    /// Detach from the owner, leaving this borrow empty.
    pub fn reset(&mut self) {
        if let Some(lease) = self.lease.take() {
            // SAFETY: our unit is released exactly once, here
            unsafe { lease.release_borrow() }
        }
    }

    /// Move the borrow out, leaving this one empty.
    pub fn take(&mut self) -> Self {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { Self::adopt(self.lease.take()) }
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.lease, &mut other.lease);
    }

    pub fn is_released(&self) -> bool {
        // SAFETY: our unit keeps the block alive
        self.lease
            .map_or(false, |lease| unsafe { lease.block() }.is_freed())
    }

    /// Live units on the owner's block, this borrow included; zero when
    /// empty.
    pub fn reference_count(&self) -> usize {
        // SAFETY: our unit keeps the block alive
        self.lease
            .map_or(0, |lease| unsafe { lease.block() }.reference_count())
    }

    pub fn with_access<B: Access>(self) -> LentPtr<T, B>
    where
        A: Coerce<B>,
    {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { LentPtr::adopt(self.into_lease()) }
    }

    pub fn into_const(self) -> LentPtr<T, Const> {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { LentPtr::adopt(self.into_lease()) }
    }
}

impl<T: ?Sized> LentPtr<T, Mut> {
    /// Mutable access through a read-write borrow.
    ///
    /// # Safety
    ///
    /// Same contract as [`LentRef::as_mut`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut(&self) -> Option<&mut T> {
        self.lease.map(|lease| &mut *lease.as_ptr())
    }
}

impl<T: ?Sized, A: Access> Deref for LentPtr<T, A> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.lease {
            // SAFETY: our unit keeps the object readable
            Some(lease) => unsafe { lease.checked_value() },
            None => violation::fatal(Violation::NullAccess {
                handle: HandleKind::Lent,
            }),
        }
    }
}

impl<T: ?Sized, A: Access> Clone for LentPtr<T, A> {
    fn clone(&self) -> Self {
        // SAFETY: `self` holds a unit when non-empty
        unsafe { Self::attach(self.lease) }
    }
}

impl<T: ?Sized, A: Access> Drop for LentPtr<T, A> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, A: Access> Default for LentPtr<T, A> {
    fn default() -> Self {
        Self::null()
    }
}

impl<'a, T: ?Sized, A: Access> From<&'a UniquePtr<T, A>> for LentPtr<T, A> {
    fn from(owner: &'a UniquePtr<T, A>) -> Self {
        // SAFETY: the owner holds its unit while borrowed
        unsafe { Self::attach(owner.lease()) }
    }
}

impl<'a, T: ?Sized, A: Access> From<&'a UniqueRef<T, A>> for LentPtr<T, A> {
    fn from(owner: &'a UniqueRef<T, A>) -> Self {
        LentRef::from(owner).into()
    }
}

impl<T: ?Sized, A: Access> From<LentRef<T, A>> for LentPtr<T, A> {
    fn from(lent: LentRef<T, A>) -> Self {
        // SAFETY: the borrow unit moves to the new handle
        unsafe { Self::adopt(Some(lent.into_lease())) }
    }
}

impl<T: ?Sized + fmt::Debug, A: Access> fmt::Debug for LentPtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("LentPtr")
                .field("value", &value)
                .field("released", &self.is_released())
                .field("access", &A::NAME)
                .finish(),
            None => f.write_str("LentPtr(null)"),
        }
    }
}

//! Unique owners of heap objects
//!
//! [`UniqueRef`] always owns an object; [`UniquePtr`] may be empty. Both pair
//! the object with a heap control block that counts the borrows lent out of
//! them. Releasing an owner (reset, drop, `into_box`) while borrows remain is
//! a dangling borrow: the object is leaked so the borrows keep reading valid
//! memory, and the violation is reported.
//!
//! Owners never hand out `&mut T` while lent. `get_mut` returns `None` until
//! every borrow is gone.
//!
//! Owners are invariant in `T`, like the borrows they lend:
//!
//! ```compile_fail
//! use lend::UniqueRef;
//!
//! fn shorten<'a>(owner: UniqueRef<&'static str>) -> UniqueRef<&'a str> {
//!     owner
//! }
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::Deref;

use lend_primitives::OWNER_UNIT;

use crate::access::{Access, Coerce, Const, Mut};
use crate::raw::RawLease;
use crate::violation::{self, HandleKind, Violation};

/// Create a non-null owner of `value` with read-write access.
///
/// ```
/// use lend::make_unique;
///
/// let mut owner = make_unique(vec![1, 2]);
/// owner.get_mut().unwrap().push(3);
/// assert_eq!(*owner, [1, 2, 3]);
/// ```
pub fn make_unique<T>(value: T) -> UniqueRef<T, Mut> {
    UniqueRef::new(value)
}

/// Create a non-null owner of `value` with read-only access.
pub fn make_unique_const<T>(value: T) -> UniqueRef<T, Const> {
    UniqueRef::new_const(value)
}

// ============================================================================
// UniqueRef
// ============================================================================

/// Non-null unique owner.
pub struct UniqueRef<T: ?Sized, A: Access = Mut> {
    lease: RawLease<T>,
    _marker: PhantomData<(Box<T>, *mut T, A)>,
}

// SAFETY: borrows on other threads may read the object while the owner moves,
// so sending the owner needs `T: Sync` as well as `T: Send`.
unsafe impl<T: ?Sized + Send + Sync, A: Access> Send for UniqueRef<T, A> {}
// SAFETY: `&UniqueRef` only reads the object and lends it; lending is atomic.
unsafe impl<T: ?Sized + Sync, A: Access> Sync for UniqueRef<T, A> {}

impl<T> UniqueRef<T, Mut> {
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T> UniqueRef<T, Const> {
    pub fn new_const(value: T) -> Self {
        UniqueRef::new(value).into_const()
    }
}

impl<T: ?Sized> UniqueRef<T, Mut> {
    /// Take ownership of an existing allocation.
    pub fn from_box(value: Box<T>) -> Self {
        // SAFETY: a fresh lease carries exactly the owner unit
        unsafe { Self::from_lease(RawLease::from_box(value)) }
    }

    /// Take ownership of a pointer produced by [`Box::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null, come from `Box::into_raw` and not be owned by
    /// anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self::from_box(Box::from_raw(ptr))
    }

    /// Mutable access, available only while nothing is lent.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.lent_count() > 0 {
            return None;
        }
        // SAFETY: no borrow exists and none can be created while `self` is
        // mutably borrowed
        Some(unsafe { &mut *self.lease.as_ptr() })
    }

    /// Mutable access without checking for borrows.
    ///
    /// # Safety
    ///
    /// No borrow may read the object while the returned reference is live.
    pub unsafe fn get_mut_unchecked(&mut self) -> &mut T {
        &mut *self.lease.as_ptr()
    }
}

impl<T: ?Sized, A: Access> UniqueRef<T, A> {
    /// # Safety
    ///
    /// The lease's owner unit must be transferred to the new handle.
    pub(crate) unsafe fn from_lease(lease: RawLease<T>) -> Self {
        Self {
            lease,
            _marker: PhantomData,
        }
    }

    pub(crate) fn lease(&self) -> RawLease<T> {
        self.lease
    }

    /// Give up the handle without releasing its owner unit.
    pub(crate) fn into_lease(self) -> RawLease<T> {
        ManuallyDrop::new(self).lease
    }

    /// Hand the object back as a `Box`.
    ///
    /// The access marker goes with the handle: a `Const` owner that gives up
    /// its object returns a plain, writable `Box`.
    ///
    /// Returns `None` if borrows are still attached; the object is then
    /// leaked to them and the dangling owner is reported.
    #[track_caller]
    pub fn into_box(self) -> Option<Box<T>> {
        // SAFETY: the owner unit moves out of `self` and is released once
        unsafe { self.into_lease().release_owner() }
    }

    /// Owner unit plus one per live borrow.
    pub fn reference_count(&self) -> usize {
        // SAFETY: the owner unit keeps the block alive
        unsafe { self.lease.block() }.reference_count()
    }

    pub fn lent_count(&self) -> usize {
        self.reference_count().saturating_sub(OWNER_UNIT)
    }

    pub fn as_ptr(&self) -> *const T {
        self.lease.as_ptr()
    }

    /// Re-type the access marker, keeping or strengthening it.
    pub fn with_access<B: Access>(self) -> UniqueRef<T, B>
    where
        A: Coerce<B>,
    {
        // SAFETY: the owner unit moves to the new handle
        unsafe { UniqueRef::from_lease(self.into_lease()) }
    }

    pub fn into_const(self) -> UniqueRef<T, Const> {
        // SAFETY: the owner unit moves to the new handle
        unsafe { UniqueRef::from_lease(self.into_lease()) }
    }
}

impl<T: ?Sized, A: Access> Deref for UniqueRef<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: owned object; `&mut T` is only handed out through `&mut self`
        unsafe { self.lease.value() }
    }
}

impl<T: ?Sized, A: Access> Drop for UniqueRef<T, A> {
    fn drop(&mut self) {
        // SAFETY: the owner unit is released exactly once, here
        drop(unsafe { self.lease.release_owner() });
    }
}

impl<T: ?Sized> From<Box<T>> for UniqueRef<T, Mut> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized + fmt::Debug, A: Access> fmt::Debug for UniqueRef<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueRef")
            .field("value", &&**self)
            .field("lent", &self.lent_count())
            .field("access", &A::NAME)
            .finish()
    }
}

// ============================================================================
// UniquePtr
// ============================================================================

/// Nullable unique owner.
pub struct UniquePtr<T: ?Sized, A: Access = Mut> {
    lease: Option<RawLease<T>>,
    _marker: PhantomData<(Box<T>, *mut T, A)>,
}

// SAFETY: same reasoning as `UniqueRef`
unsafe impl<T: ?Sized + Send + Sync, A: Access> Send for UniquePtr<T, A> {}
// SAFETY: same reasoning as `UniqueRef`
unsafe impl<T: ?Sized + Sync, A: Access> Sync for UniquePtr<T, A> {}

impl<T> UniquePtr<T, Mut> {
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T> UniquePtr<T, Const> {
    pub fn new_const(value: T) -> Self {
        UniquePtr::new(value).into_const()
    }
}

impl<T: ?Sized> UniquePtr<T, Mut> {
    pub fn from_box(value: Box<T>) -> Self {
        UniqueRef::from_box(value).into()
    }

    /// Take ownership of a pointer produced by [`Box::into_raw`]. A null
    /// pointer gives an empty owner.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from `Box::into_raw` and not be owned by
    /// anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        if ptr.is_null() {
            Self::null()
        } else {
            Self::from_box(Box::from_raw(ptr))
        }
    }

    /// Mutable access, available only while non-empty and nothing is lent.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let lease = self.lease?;
        if self.lent_count() > 0 {
            return None;
        }
        // SAFETY: no borrow exists and none can be created while `self` is
        // mutably borrowed
        Some(unsafe { &mut *lease.as_ptr() })
    }

    /// # Safety
    ///
    /// No borrow may read the object while the returned reference is live.
    pub unsafe fn get_mut_unchecked(&mut self) -> Option<&mut T> {
        self.lease.map(|lease| &mut *lease.as_ptr())
    }
}

impl<T: ?Sized, A: Access> UniquePtr<T, A> {
    pub const fn null() -> Self {
        Self {
            lease: None,
            _marker: PhantomData,
        }
    }

    pub(crate) fn lease(&self) -> Option<RawLease<T>> {
        self.lease
    }

    pub(crate) fn into_lease(self) -> Option<RawLease<T>> {
        ManuallyDrop::new(self).lease
    }

    /// # Safety
    ///
    /// Any lease's owner unit must be transferred to the new handle.
    pub(crate) unsafe fn from_lease(lease: Option<RawLease<T>>) -> Self {
        Self {
            lease,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.lease.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: owned object; `&mut T` is only handed out through `&mut self`
        self.lease.map(|lease| unsafe { lease.value() })
    }

    /// Drop the current object and adopt `value`.
    ///
    /// The new object gets its own control block. If the old one is still
    /// lent, it is leaked to its borrows and the dangling owner is reported.
    #[track_caller]
    pub fn reset(&mut self, value: Option<Box<T>>) {
        let fresh = value.map(RawLease::from_box);
        if let Some(old) = mem::replace(&mut self.lease, fresh) {
            // SAFETY: the old owner unit left `self` above and is released once
            drop(unsafe { old.release_owner() });
        }
    }

    /// Move the object out into a new owner, leaving this one empty.
    pub fn take(&mut self) -> Self {
        // SAFETY: the owner unit moves to the new handle
        unsafe { Self::from_lease(self.lease.take()) }
    }

    /// Hand the object back as a `Box`, dropping the access marker along
    /// with the handle.
    ///
    /// `None` if empty, or if borrows are still attached (the object is then
    /// leaked to them and the dangling owner is reported).
    #[track_caller]
    pub fn into_box(self) -> Option<Box<T>> {
        // SAFETY: the owner unit moves out of `self` and is released once
        self.into_lease().and_then(|lease| unsafe { lease.release_owner() })
    }

    /// Owner unit plus one per live borrow; zero when empty.
    pub fn reference_count(&self) -> usize {
        // SAFETY: the owner unit keeps the block alive
        self.lease
            .map_or(0, |lease| unsafe { lease.block() }.reference_count())
    }

    pub fn lent_count(&self) -> usize {
        self.reference_count().saturating_sub(OWNER_UNIT)
    }

    pub fn with_access<B: Access>(self) -> UniquePtr<T, B>
    where
        A: Coerce<B>,
    {
        // SAFETY: the owner unit moves to the new handle
        unsafe { UniquePtr::from_lease(self.into_lease()) }
    }

    pub fn into_const(self) -> UniquePtr<T, Const> {
        // SAFETY: the owner unit moves to the new handle
        unsafe { UniquePtr::from_lease(self.into_lease()) }
    }
}

impl<T: ?Sized, A: Access> Deref for UniquePtr<T, A> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => violation::fatal(Violation::NullAccess {
                handle: HandleKind::Unique,
            }),
        }
    }
}

impl<T: ?Sized, A: Access> Drop for UniquePtr<T, A> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            // SAFETY: the owner unit is released exactly once, here
            drop(unsafe { lease.release_owner() });
        }
    }
}

impl<T: ?Sized, A: Access> Default for UniquePtr<T, A> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for UniquePtr<T, Mut> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized, A: Access> From<UniqueRef<T, A>> for UniquePtr<T, A> {
    fn from(owner: UniqueRef<T, A>) -> Self {
        // SAFETY: the owner unit moves to the new handle
        unsafe { Self::from_lease(Some(owner.into_lease())) }
    }
}

/// Non-fatal promotion: an empty owner comes back as the error.
impl<T: ?Sized, A: Access> TryFrom<UniquePtr<T, A>> for UniqueRef<T, A> {
    type Error = UniquePtr<T, A>;

    fn try_from(mut owner: UniquePtr<T, A>) -> Result<Self, Self::Error> {
        match owner.lease.take() {
            // SAFETY: the owner unit moves to the new handle
            Some(lease) => Ok(unsafe { UniqueRef::from_lease(lease) }),
            None => Err(owner),
        }
    }
}

impl<T: ?Sized + fmt::Debug, A: Access> fmt::Debug for UniquePtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("UniquePtr")
                .field("value", &value)
                .field("lent", &self.lent_count())
                .field("access", &A::NAME)
                .finish(),
            None => f.write_str("UniquePtr(null)"),
        }
    }
}

//! Widening and narrowing conversions between handle types
//!
//! [`upcast!`](crate::upcast) re-types any owner or borrow along an unsizing
//! coercion (`S` to `dyn Trait`, or a sub-trait object to its super-trait on
//! toolchains with trait upcasting). The conversion is written as a coercion,
//! so anything that is not a widening fails to compile:
//!
//! ```compile_fail
//! use std::any::Any;
//! use lend::{make_unique, upcast, UniqueRef};
//!
//! let owner: UniqueRef<dyn Any> = upcast!(make_unique(1_u32) => dyn Any);
//! let back: UniqueRef<u32> = upcast!(owner => u32);
//! ```
//!
//! Narrowing goes through `downcast` on `dyn Any` handles, which checks the
//! concrete type and hands the original back on mismatch.

use core::any::Any;

use crate::access::Access;
use crate::lent::{LentPtr, LentRef};
use crate::raw::RawLease;
use crate::unique::{UniquePtr, UniqueRef};

/// Re-types the object pointer of a handle without touching its count.
///
/// Used by [`upcast!`](crate::upcast); not meant to be called directly.
#[doc(hidden)]
pub trait Rebind: Sized {
    type Target: ?Sized;
    type Output<U: ?Sized>;

    /// # Safety
    ///
    /// `cast` must return a pointer to the same object, valid for `U`.
    unsafe fn rebind<U: ?Sized, F>(self, cast: F) -> Self::Output<U>
    where
        F: FnOnce(*mut Self::Target) -> *mut U;
}

impl<T: ?Sized, A: Access> Rebind for UniqueRef<T, A> {
    type Target = T;
    type Output<U: ?Sized> = UniqueRef<U, A>;

    unsafe fn rebind<U: ?Sized, F>(self, cast: F) -> UniqueRef<U, A>
    where
        F: FnOnce(*mut T) -> *mut U,
    {
        UniqueRef::from_lease(self.into_lease().cast(cast))
    }
}

impl<T: ?Sized, A: Access> Rebind for UniquePtr<T, A> {
    type Target = T;
    type Output<U: ?Sized> = UniquePtr<U, A>;

    unsafe fn rebind<U: ?Sized, F>(self, cast: F) -> UniquePtr<U, A>
    where
        F: FnOnce(*mut T) -> *mut U,
    {
        UniquePtr::from_lease(self.into_lease().map(|lease| lease.cast(cast)))
    }
}

impl<T: ?Sized, A: Access> Rebind for LentRef<T, A> {
    type Target = T;
    type Output<U: ?Sized> = LentRef<U, A>;

    unsafe fn rebind<U: ?Sized, F>(self, cast: F) -> LentRef<U, A>
    where
        F: FnOnce(*mut T) -> *mut U,
    {
        LentRef::adopt(self.into_lease().cast(cast))
    }
}

impl<T: ?Sized, A: Access> Rebind for LentPtr<T, A> {
    type Target = T;
    type Output<U: ?Sized> = LentPtr<U, A>;

    unsafe fn rebind<U: ?Sized, F>(self, cast: F) -> LentPtr<U, A>
    where
        F: FnOnce(*mut T) -> *mut U,
    {
        LentPtr::adopt(self.into_lease().map(|lease| lease.cast(cast)))
    }
}

/// Widen a handle to a trait object (or any other unsizing target).
///
/// ```
/// use lend::{lend, make_unique, upcast, LentRef, UniqueRef};
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// let owner: UniqueRef<dyn Shape> = upcast!(make_unique(Square(2.0)) => dyn Shape);
/// let lent: LentRef<dyn Shape> = lend(&owner);
/// assert_eq!(lent.area(), 4.0);
/// ```
#[macro_export]
macro_rules! upcast {
    ($handle:expr => $target:ty) => {{
        let handle = $handle;
        // SAFETY: the closure is a plain coercion, so the result addresses
        // the same object
        unsafe {
            $crate::cast::Rebind::rebind(handle, |ptr| -> *mut $target {
                let widened: *mut $target = ptr;
                widened
            })
        }
    }};
}

macro_rules! impl_downcast {
    ($($handle:ident: |$this:ident| $lease:expr),+ $(,)?) => {$(
        impl<A: Access> $handle<dyn Any, A> {
            /// Whether the object's concrete type is `S`.
            pub fn is<S: Any>(&self) -> bool {
                let $this = self;
                let lease: Option<RawLease<dyn Any>> = $lease;
                // SAFETY: the handle's unit keeps the object readable
                lease.map_or(false, |lease| unsafe { lease.value() }.is::<S>())
            }

            /// Narrow to the concrete type `S`, or get the handle back.
            pub fn downcast<S: Any>(self) -> Result<$handle<S, A>, Self> {
                if !self.is::<S>() {
                    return Err(self);
                }
                // SAFETY: the object was just checked to be an `S`
                Ok(unsafe { Rebind::rebind(self, |ptr| ptr as *mut S) })
            }
        }
    )+};
}

impl_downcast! {
    UniqueRef: |handle| Some(handle.lease()),
    UniquePtr: |handle| handle.lease(),
    LentRef: |handle| Some(handle.lease()),
    LentPtr: |handle| handle.lease(),
}

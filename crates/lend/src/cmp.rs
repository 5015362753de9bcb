//! Pointer-identity equality across handle flavours
//!
//! Two handles are equal when they address the same object, whatever their
//! flavour, access or static type. Empty handles are equal to each other and
//! to null raw pointers. The pointee's own `PartialEq` is never consulted.

use core::ptr;

use crate::access::Access;
use crate::lendable::Lendable;
use crate::lent::{LentPtr, LentRef};
use crate::unique::{UniquePtr, UniqueRef};

/// Address of the object a handle points at, null when empty.
trait Identity {
    fn address(&self) -> *const ();
}

impl<T: ?Sized, A: Access> Identity for UniqueRef<T, A> {
    fn address(&self) -> *const () {
        self.lease().thin()
    }
}

impl<T: ?Sized, A: Access> Identity for UniquePtr<T, A> {
    fn address(&self) -> *const () {
        self.lease().map_or(ptr::null(), |lease| lease.thin())
    }
}

impl<T: ?Sized, A: Access> Identity for LentRef<T, A> {
    fn address(&self) -> *const () {
        self.lease().thin()
    }
}

impl<T: ?Sized, A: Access> Identity for LentPtr<T, A> {
    fn address(&self) -> *const () {
        self.lease().map_or(ptr::null(), |lease| lease.thin())
    }
}

impl<T, A: Access> Identity for Lendable<T, A> {
    fn address(&self) -> *const () {
        self.as_ptr().cast()
    }
}

macro_rules! eq_across {
    ($lhs:ident => $($rhs:ident),+) => {$(
        impl<T: ?Sized, U: ?Sized, A: Access, B: Access> PartialEq<$rhs<U, B>> for $lhs<T, A> {
            fn eq(&self, other: &$rhs<U, B>) -> bool {
                self.address() == other.address()
            }
        }
    )+};
}

eq_across!(UniqueRef => UniqueRef, UniquePtr, LentRef, LentPtr);
eq_across!(UniquePtr => UniqueRef, UniquePtr, LentRef, LentPtr);
eq_across!(LentRef => UniqueRef, UniquePtr, LentRef, LentPtr);
eq_across!(LentPtr => UniqueRef, UniquePtr, LentRef, LentPtr);

macro_rules! eq_extra {
    ($($handle:ident),+) => {$(
        impl<T: ?Sized, A: Access> Eq for $handle<T, A> {}

        impl<T: ?Sized, U, A: Access, B: Access> PartialEq<Lendable<U, B>> for $handle<T, A> {
            fn eq(&self, other: &Lendable<U, B>) -> bool {
                self.address() == other.address()
            }
        }

        impl<T, U: ?Sized, A: Access, B: Access> PartialEq<$handle<U, B>> for Lendable<T, A> {
            fn eq(&self, other: &$handle<U, B>) -> bool {
                self.address() == other.address()
            }
        }

        impl<T: ?Sized, U: ?Sized, A: Access> PartialEq<*const U> for $handle<T, A> {
            fn eq(&self, other: &*const U) -> bool {
                self.address() == other.cast::<()>()
            }
        }

        impl<T: ?Sized, U: ?Sized, A: Access> PartialEq<*mut U> for $handle<T, A> {
            fn eq(&self, other: &*mut U) -> bool {
                self.address() == other.cast::<()>().cast_const()
            }
        }
    )+};
}

eq_extra!(UniqueRef, UniquePtr, LentRef, LentPtr);

impl<T, U, A: Access, B: Access> PartialEq<Lendable<U, B>> for Lendable<T, A> {
    fn eq(&self, other: &Lendable<U, B>) -> bool {
        self.address() == other.address()
    }
}

impl<T, A: Access> Eq for Lendable<T, A> {}

impl<T, U: ?Sized, A: Access> PartialEq<*const U> for Lendable<T, A> {
    fn eq(&self, other: &*const U) -> bool {
        self.address() == other.cast::<()>()
    }
}

impl<T, U: ?Sized, A: Access> PartialEq<*mut U> for Lendable<T, A> {
    fn eq(&self, other: &*mut U) -> bool {
        self.address() == other.cast::<()>().cast_const()
    }
}

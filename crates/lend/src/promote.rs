//! Lending and promotion entry points
//!
//! [`lend`] and [`lend_const`] create borrows from any owner flavour.
//! [`promote_to_ref`] turns a nullable handle into its non-null flavour and
//! treats an empty source as an invalid promotion.
//!
//! | source              | `lend`          | `promote_to_ref` |
//! |---------------------|-----------------|------------------|
//! | `&UniquePtr<T, A>`  | `LentPtr<T, A>` |                  |
//! | `&UniqueRef<T, A>`  | `LentRef<T, A>` |                  |
//! | `Pin<&Lendable<T, A>>` | `LentRef<T, A>` |               |
//! | `UniquePtr<T, A>`   |                 | `UniqueRef<T, A>` |
//! | `LentPtr<T, A>`     |                 | `LentRef<T, A>`  |
//! | `&LentPtr<T, A>`    |                 | `LentRef<T, A>` (new borrow) |
//!
//! Non-null handles are already references; promoting one does not compile:
//!
//! ```compile_fail
//! use lend::{lend, make_unique, promote_to_ref};
//!
//! let owner = make_unique(1);
//! let lent = promote_to_ref(lend(&owner));
//! ```

use core::pin::Pin;

use crate::access::{Access, Const};
use crate::lendable::Lendable;
use crate::lent::{LentPtr, LentRef};
use crate::unique::{UniquePtr, UniqueRef};
use crate::violation::{self, HandleKind, Violation};

/// Sources that can hand out borrows.
pub trait Lend {
    /// Borrow keeping the source's access.
    type Lent;
    /// Borrow with read-only access.
    type ConstLent;

    fn lend(self) -> Self::Lent;
    fn lend_const(self) -> Self::ConstLent;
}

impl<'a, T: ?Sized, A: Access> Lend for &'a UniquePtr<T, A> {
    type Lent = LentPtr<T, A>;
    type ConstLent = LentPtr<T, Const>;

    fn lend(self) -> Self::Lent {
        LentPtr::from(self)
    }

    fn lend_const(self) -> Self::ConstLent {
        LentPtr::from(self).into_const()
    }
}

impl<'a, T: ?Sized, A: Access> Lend for &'a UniqueRef<T, A> {
    type Lent = LentRef<T, A>;
    type ConstLent = LentRef<T, Const>;

    fn lend(self) -> Self::Lent {
        LentRef::from(self)
    }

    fn lend_const(self) -> Self::ConstLent {
        LentRef::from(self).into_const()
    }
}

impl<'a, T, A: Access> Lend for Pin<&'a Lendable<T, A>> {
    type Lent = LentRef<T, A>;
    type ConstLent = LentRef<T, Const>;

    fn lend(self) -> Self::Lent {
        // SAFETY: the lendable holds its owner unit while borrowed
        unsafe { LentRef::attach(self.lease()) }
    }

    fn lend_const(self) -> Self::ConstLent {
        self.lend().into_const()
    }
}

/// Nullable handles that have a non-null flavour.
pub trait Promote: Sized {
    type Ref;

    /// Handle family reported when promoting an empty source.
    const HANDLE: HandleKind;

    fn try_promote(self) -> Option<Self::Ref>;

    /// Promote, treating an empty source as a fatal violation.
    #[track_caller]
    fn promote(self) -> Self::Ref {
        match self.try_promote() {
            Some(promoted) => promoted,
            None => violation::fatal(Violation::InvalidPromotion {
                handle: Self::HANDLE,
            }),
        }
    }
}

impl<T: ?Sized, A: Access> Promote for UniquePtr<T, A> {
    type Ref = UniqueRef<T, A>;
    const HANDLE: HandleKind = HandleKind::Unique;

    fn try_promote(self) -> Option<Self::Ref> {
        UniqueRef::try_from(self).ok()
    }
}

impl<T: ?Sized, A: Access> Promote for LentPtr<T, A> {
    type Ref = LentRef<T, A>;
    const HANDLE: HandleKind = HandleKind::Lent;

    fn try_promote(self) -> Option<Self::Ref> {
        LentRef::try_from(self).ok()
    }
}

impl<'a, T: ?Sized, A: Access> Promote for &'a LentPtr<T, A> {
    type Ref = LentRef<T, A>;
    const HANDLE: HandleKind = HandleKind::Lent;

    fn try_promote(self) -> Option<Self::Ref> {
        self.clone().try_promote()
    }
}

/// Lend from `source`, keeping its access.
pub fn lend<S: Lend>(source: S) -> S::Lent {
    source.lend()
}

/// Lend from `source` with read-only access.
pub fn lend_const<S: Lend>(source: S) -> S::ConstLent {
    source.lend_const()
}

/// Promote a nullable handle to its non-null flavour.
///
/// # Panics
///
/// Reports `INVALID_PROMOTION` and panics if `source` is empty.
#[track_caller]
pub fn promote_to_ref<S: Promote>(source: S) -> S::Ref {
    source.promote()
}

#[cfg(test)]
mod tests {
    use std::pin::pin;

    use super::*;
    use crate::{capture_violations, make_unique, make_unique_const, Mut};

    #[test]
    fn test_lend_keeps_access() {
        let owner = make_unique(1);
        let _mutable: LentRef<i32, Mut> = lend(&owner);
        let _readonly: LentRef<i32, Const> = lend_const(&owner);

        let frozen = make_unique_const(2);
        let _still_const: LentRef<i32, Const> = lend(&frozen);

        assert_eq!(owner.reference_count(), 3);
        assert_eq!(frozen.reference_count(), 2);
    }

    #[test]
    fn test_lend_from_null_owner_is_null() {
        let owner: UniquePtr<i32> = UniquePtr::null();
        let lent = lend(&owner);
        assert!(lent.is_null());
        assert_eq!(owner.reference_count(), 0);
    }

    #[test]
    fn test_promote_owner() {
        let owner = UniquePtr::new(4);
        let promoted = promote_to_ref(owner);
        assert_eq!(*promoted, 4);
        assert_eq!(promoted.reference_count(), 1);
    }

    #[test]
    fn test_promote_borrow_by_value_and_reference() {
        let owner = make_unique(6);
        let nullable: LentPtr<i32> = lend(&owner).into();

        let copied = promote_to_ref(&nullable);
        assert_eq!(owner.reference_count(), 3);

        let moved = promote_to_ref(nullable);
        assert_eq!(owner.reference_count(), 3);
        assert_eq!(*copied + *moved, 12);
    }

    #[test]
    fn test_lend_from_lendable_and_promote_chain() {
        let lendable = pin!(Lendable::new(String::from("chain")));
        let nullable: LentPtr<String> = lend(lendable.as_ref()).into();
        let promoted = promote_to_ref(&nullable);
        assert_eq!(promoted.as_str(), "chain");
        assert_eq!(lendable.reference_count(), 3);
    }

    #[test]
    fn test_try_promote_empty() {
        let empty: LentPtr<i32> = LentPtr::null();
        assert!(empty.try_promote().is_none());
    }

    #[test]
    #[should_panic(expected = "INVALID_PROMOTION")]
    fn test_promote_empty_owner_panics() {
        let empty: UniquePtr<i32> = UniquePtr::null();
        let _ = promote_to_ref(empty);
    }

    #[test]
    fn test_promote_empty_panics_inside_capture() {
        let outcome = std::panic::catch_unwind(|| {
            capture_violations(|| {
                let empty: LentPtr<u8> = LentPtr::null();
                promote_to_ref(&empty).get().to_owned()
            })
        });
        assert!(outcome.is_err());
    }
}

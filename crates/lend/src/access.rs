//! Access markers carried by every owner and borrow
//!
//! A handle is typed either `Mut` (the owner may hand out `&mut T`, and a
//! borrow may be used for unchecked mutation) or `Const` (read-only for as
//! long as the object is held through handles). Giving up ownership with
//! `into_box` or `into_inner` gives up the marker too. While held, access may
//! be kept or strengthened, never weakened:
//!
//! | from \ to | `Mut` | `Const` |
//! |-----------|-------|---------|
//! | `Mut`     | yes   | yes (explicit) |
//! | `Const`   | no    | yes     |
//!
//! The table is the [`Coerce`] relation. Conversions that are not in it
//! have no impl and fail to compile:
//!
//! ```compile_fail
//! use lend::{lend, make_unique_const, LentRef, Mut};
//!
//! let owner = make_unique_const(1);
//! let lent: LentRef<i32, Mut> = lend(&owner);
//! ```
//!
//! ```compile_fail
//! use lend::{make_unique_const, Const, Mut, UniqueRef};
//!
//! let owner: UniqueRef<i32, Const> = make_unique_const(1);
//! let writable: UniqueRef<i32, Mut> = owner.with_access();
//! ```

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Mut {}
    impl Sealed for super::Const {}
}

/// Access level of a handle. Sealed: only [`Mut`] and [`Const`] exist.
pub trait Access: sealed::Sealed + 'static {
    /// Whether handles at this level may produce `&mut T`
    const MUTABLE: bool;
    const NAME: &'static str;
}

/// Read-write access.
#[derive(Debug)]
pub enum Mut {}

/// Read-only access.
#[derive(Debug)]
pub enum Const {}

impl Access for Mut {
    const MUTABLE: bool = true;
    const NAME: &'static str = "mut";
}

impl Access for Const {
    const MUTABLE: bool = false;
    const NAME: &'static str = "const";
}

/// `A: Coerce<B>` holds when a handle typed at `A` may be re-typed at `B`.
pub trait Coerce<B: Access>: Access {}

impl Coerce<Mut> for Mut {}
impl Coerce<Const> for Mut {}
impl Coerce<Const> for Const {}

#[cfg(test)]
mod tests {
    use super::*;

    fn coerces<A: Coerce<B>, B: Access>() -> (bool, bool) {
        (A::MUTABLE, B::MUTABLE)
    }

    #[test]
    fn test_strengthening_only() {
        assert_eq!(coerces::<Mut, Mut>(), (true, true));
        assert_eq!(coerces::<Mut, Const>(), (true, false));
        assert_eq!(coerces::<Const, Const>(), (false, false));
    }

    #[test]
    fn test_names() {
        assert_eq!(Mut::NAME, "mut");
        assert_eq!(Const::NAME, "const");
    }
}

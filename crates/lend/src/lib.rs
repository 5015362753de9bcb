//! Lend - Checked Unique Owners and Counted Borrows
//!
//! Handle types for "exactly one owner, many non-owning observers", with the
//! two classic lifetime bugs caught at run time:
//!
//! - an owner giving up its object while borrows still observe it
//! - dereferencing a borrow whose owner is gone, or an empty handle
//!
//! # Handles
//!
//! | Type | Role | Nullable |
//! |------|------|----------|
//! | [`UniqueRef`] | unique owner of a heap object | no |
//! | [`UniquePtr`] | unique owner of a heap object | yes |
//! | [`Lendable`] | owner embedding its object in place | no |
//! | [`LentRef`] | counted borrow | no |
//! | [`LentPtr`] | counted borrow | yes |
//!
//! Every handle carries an access marker, [`Mut`] or [`Const`]. Borrows keep
//! or strengthen their source's access; weakening does not compile.
//!
//! # Example
//!
//! ```
//! use lend::{lend, make_unique, LentPtr, UniquePtr};
//!
//! let mut owner: UniquePtr<i32> = make_unique(1).into();
//! let first: LentPtr<i32> = lend(&owner);
//! let second = first.clone();
//! assert_eq!(owner.reference_count(), 3);
//!
//! drop(first);
//! drop(second);
//! assert_eq!(owner.reference_count(), 1);
//!
//! owner.reset(None);
//! assert!(owner.is_null());
//! ```
//!
//! # Checked Builds
//!
//! Dangling-borrow, released-access and over-release detection is compiled
//! in with `debug_assertions` or the `checked` feature (see [`CHECKED`]).
//! Reference counting is always on, since it decides when control blocks
//! are freed. What a detected violation does is set by
//! [`set_violation_policy`]; tests can collect violations with
//! [`capture_violations`] instead.
//!
//! Owners cannot be copied:
//!
//! ```compile_fail
//! use lend::{make_unique, UniqueRef};
//!
//! let owner = make_unique(1);
//! let copy: UniqueRef<i32> = owner.clone();
//! ```

pub mod access;
pub mod cast;
mod cmp;
pub mod lendable;
pub mod lent;
pub mod promote;
mod raw;
pub mod unique;
pub mod violation;

pub use access::{Access, Coerce, Const, Mut};
pub use lendable::Lendable;
pub use lent::{LentPtr, LentRef};
pub use promote::{lend, lend_const, promote_to_ref, Lend, Promote};
pub use unique::{make_unique, make_unique_const, UniquePtr, UniqueRef};
pub use violation::{
    capture_violations, set_violation_policy, violation_policy, HandleKind, OwnerKind,
    Violation, ViolationPolicy,
};

/// Whether dangling-borrow and released-access checks are compiled in.
pub const CHECKED: bool = cfg!(any(debug_assertions, feature = "checked"));

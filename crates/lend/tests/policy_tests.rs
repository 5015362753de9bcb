//! Violation policy tests
//!
//! The policy is process-wide, so everything that changes it lives in one
//! test function in its own test binary.

use std::panic::{self, AssertUnwindSafe};

use lend::{
    lend, make_unique, promote_to_ref, set_violation_policy, violation_policy, LentPtr,
    UniquePtr, ViolationPolicy,
};

#[test]
fn test_policy_lifecycle() {
    let expected_default = if cfg!(feature = "abort-on-violation") {
        ViolationPolicy::Abort
    } else {
        ViolationPolicy::Panic
    };
    assert_eq!(violation_policy(), expected_default);
    assert_eq!(ViolationPolicy::default(), expected_default);

    // Log: dangling owners and released access are survivable
    let previous = set_violation_policy(ViolationPolicy::Log);
    assert_eq!(previous, expected_default);
    assert_eq!(violation_policy(), ViolationPolicy::Log);

    let mut owner = UniquePtr::new(String::from("logged"));
    let borrow = lend(&owner);
    owner.reset(Some(Box::new(String::from("replacement"))));
    assert_eq!(borrow.len(), 6);
    assert!(borrow.is_released());
    assert_eq!(*owner, "replacement");
    drop(borrow);

    // Log never lets an empty handle be dereferenced
    let null_access = panic::catch_unwind(|| {
        let empty: LentPtr<u32> = LentPtr::null();
        *empty
    });
    assert!(null_access.is_err());

    let promotion = panic::catch_unwind(|| {
        let empty: UniquePtr<u32> = UniquePtr::null();
        *promote_to_ref(empty)
    });
    assert!(promotion.is_err());

    // Panic: the dangling owner panics at the reset, after leaking
    set_violation_policy(ViolationPolicy::Panic);
    let mut owner: UniquePtr<u8> = make_unique(1_u8).into();
    let borrow = lend(&owner);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| owner.reset(None)));
    assert_eq!(outcome.is_err(), lend::CHECKED);
    assert!(owner.is_null());
    assert_eq!(borrow.get(), Some(&1));

    set_violation_policy(expected_default);
}

//! Lending integration tests
//!
//! End-to-end owner/borrow scenarios, the reference-count property, and
//! cross-thread use of borrows.

use std::any::Any;
use std::pin::{pin, Pin};
use std::sync::{mpsc, Arc, Barrier};
use std::process::Command;
use std::thread;

use lend::{
    capture_violations, lend, lend_const, make_unique, promote_to_ref, upcast, Const, Lendable,
    LentPtr, LentRef, OwnerKind, UniquePtr, UniqueRef, Violation,
};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Value(u32);

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_lend_copy_release_then_reset() {
    let ((), violations) = capture_violations(|| {
        let mut owner: UniquePtr<Value> = make_unique(Value(1)).into();

        let borrow1 = lend(&owner);
        let borrow2 = borrow1.clone();
        assert_eq!(owner.reference_count(), 3);

        drop(borrow1);
        assert_eq!(owner.reference_count(), 2);

        drop(borrow2);
        assert_eq!(owner.reference_count(), 1);

        owner.reset(None);
        assert!(owner.is_null());
        assert_eq!(owner.reference_count(), 0);
    });

    assert!(violations.is_empty(), "unexpected violations: {violations:?}");
}

#[test]
fn test_reset_with_live_borrow_reports_once() {
    let ((), violations) = capture_violations(|| {
        let mut owner: UniquePtr<Value> = make_unique(Value(1)).into();

        let borrow1 = lend(&owner);
        let borrow2 = borrow1.clone();
        drop(borrow1);

        owner.reset(None);
        owner.reset(None);

        // The object was leaked to the surviving borrow
        assert_eq!(borrow2.get(), Some(&Value(1)));
        assert!(borrow2.is_released());
    });

    if lend::CHECKED {
        assert_eq!(
            violations,
            vec![Violation::DanglingBorrow {
                owner: OwnerKind::UniquePtr,
                outstanding: 1,
            }]
        );
    } else {
        assert!(violations.is_empty());
    }
}

#[cfg(any(debug_assertions, feature = "checked"))]
#[test]
#[should_panic(expected = "UNIQUE_PTR_DANGLING")]
fn test_reset_with_live_borrow_panics_by_default() {
    let mut owner: UniquePtr<Value> = make_unique(Value(1)).into();
    let _borrow = lend(&owner);
    owner.reset(None);
}

#[test]
fn test_drop_owner_with_live_borrow() {
    let (borrow, violations) = capture_violations(|| {
        let owner = make_unique(String::from("outlived"));
        let borrow = lend(&owner);
        drop(owner);
        borrow
    });

    assert_eq!(borrow.get(), "outlived");
    assert_eq!(borrow.reference_count(), 1);
    if lend::CHECKED {
        assert_eq!(violations.len(), 1);
    }
}

#[test]
fn test_owner_into_box_without_borrows() {
    let ((), violations) = capture_violations(|| {
        let owner = make_unique(Value(4));
        {
            let _borrow = lend(&owner);
        }
        assert_eq!(owner.into_box().map(|boxed| *boxed), Some(Value(4)));
    });

    assert!(violations.is_empty());
}

// ============================================================================
// Moves
// ============================================================================

#[test]
fn test_move_empties_owner_and_borrow() {
    let mut owner = UniquePtr::new(Value(2));
    let mut borrow = LentPtr::from(&owner);

    let moved_borrow = borrow.take();
    assert!(borrow.is_null());
    assert!(borrow == LentPtr::<Value>::null());
    assert_eq!(owner.reference_count(), 2);

    drop(moved_borrow);
    let moved_owner = owner.take();
    assert!(owner.is_null());
    assert_eq!(moved_owner.get(), Some(&Value(2)));
}

#[test]
#[should_panic(expected = "LENT_REF_NULL_ACCESS")]
fn test_deref_after_take_is_rejected() {
    let owner = make_unique(Value(3));
    let mut borrow: LentPtr<Value> = lend(&owner).into();
    let _moved = borrow.take();
    let _value = borrow.0;
}

// ============================================================================
// Access and conversions
// ============================================================================

#[test]
fn test_const_borrows_from_mut_owner() {
    let owner = make_unique(Value(5));
    let readonly: LentRef<Value, Const> = lend_const(&owner);
    let strengthened: LentRef<Value, Const> = lend(&owner).into_const();

    assert!(readonly == strengthened);
    assert_eq!(owner.lent_count(), 2);
}

trait Named {
    fn name(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

struct Widget {
    id: u32,
}

impl Named for Widget {
    fn name(&self) -> String {
        format!("widget-{}", self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_upcast_then_lend_trait_object() {
    let owner: UniqueRef<dyn Named> = upcast!(make_unique(Widget { id: 7 }) => dyn Named);
    let lent: LentRef<dyn Named> = lend(&owner);

    assert_eq!(lent.name(), "widget-7");
    assert_eq!(lent.as_any().downcast_ref::<Widget>().map(|w| w.id), Some(7));
}

#[test]
fn test_downcast_round_trip_keeps_identity() {
    let owner: UniquePtr<dyn Any> = upcast!(UniquePtr::new(Value(8)) => dyn Any);
    let lent: LentPtr<dyn Any> = lend(&owner);

    let lent = match lent.downcast::<String>() {
        Ok(_) => panic!("Value is not a String"),
        Err(original) => original,
    };
    let concrete = lent.downcast::<Value>().ok().unwrap();

    assert_eq!(*concrete, Value(8));
    assert!(concrete == owner);
}

#[test]
fn test_promotion_round_trip() {
    let owner = promote_to_ref(UniquePtr::new(Value(9)));
    let nullable: LentPtr<Value> = lend(&owner).into();
    let promoted = promote_to_ref(nullable);

    assert_eq!(*promoted, Value(9));
    assert_eq!(owner.reference_count(), 2);
}

// ============================================================================
// Lendable
// ============================================================================

struct Document {
    title: Lendable<String>,
    revision: u32,
}

#[test]
fn test_lendable_field_inside_pinned_struct() {
    let mut document = Box::pin(Document {
        title: Lendable::new(String::from("draft")),
        revision: 1,
    });

    // SAFETY: `title` is never moved out of the pinned document
    let title: Pin<&Lendable<String>> = unsafe { document.as_ref().map_unchecked(|doc| &doc.title) };
    let borrow = lend(title);
    assert_eq!(borrow.as_str(), "draft");
    assert_eq!(title.lent_count(), 1);
    drop(borrow);

    // SAFETY: `revision` is not structurally pinned, and nothing is lent
    unsafe { document.as_mut().get_unchecked_mut() }.revision += 1;

    assert_eq!(document.revision, 2);
    assert_eq!(document.title.reference_count(), 1);
}

#[test]
fn test_lendable_borrows_cross_threads() {
    let lendable = Box::pin(Lendable::new(vec![1_u32, 2, 3]));
    let borrows: Vec<LentRef<Vec<u32>>> = (0..4).map(|_| lend(lendable.as_ref())).collect();

    let sums: Vec<u32> = borrows
        .into_iter()
        .map(|borrow| thread::spawn(move || borrow.iter().sum::<u32>()))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(sums, vec![6; 4]);
    assert_eq!(lendable.reference_count(), 1);
}

#[test]
fn test_stack_lendable_scoped() {
    let lendable = pin!(Lendable::new(Value(10)));
    let first = lend(lendable.as_ref());
    let second = first.clone();

    assert!(first == second);
    assert!(first == *lendable);
    assert_eq!(lendable.reference_count(), 3);
}

const ABORT_CHILD_ENV: &str = "LEND_TEST_ABORT_CHILD";

#[test]
fn test_lendable_dropped_while_lent_aborts() {
    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        let borrow: LentRef<Value>;
        {
            let lendable = pin!(Lendable::new(Value(1)));
            borrow = lend(lendable.as_ref());
        }
        drop(borrow);
        return;
    }

    // The abort takes the whole process down, so run the scenario in a child
    let exe = std::env::current_exe().unwrap();
    let output = Command::new(exe)
        .args([
            "--exact",
            "test_lendable_dropped_while_lent_aborts",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(ABORT_CHILD_ENV, "1")
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(6), "stderr: {stderr}");
    }
    assert!(stderr.contains("LENDABLE_DANGLING"), "stderr: {stderr}");
    assert!(stderr.contains("1 dangling references"), "stderr: {stderr}");
    assert!(stderr.contains("Value"), "stderr: {stderr}");
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_clone_and_drop() {
    let owner = make_unique(Value(11));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let borrow = lend(&owner);
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    let copy = borrow.clone();
                    assert_eq!(copy.0, 11);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(owner.reference_count(), 1);
}

#[test]
fn test_last_borrow_on_other_thread_frees_block() {
    let (sender, receiver) = mpsc::channel::<LentRef<Value>>();
    let reader = thread::spawn(move || {
        let borrow = receiver.recv().unwrap();
        let value = borrow.get().0;
        drop(borrow);
        value
    });

    let ((), violations) = capture_violations(|| {
        let owner = make_unique(Value(12));
        let borrow = lend(&owner);
        drop(owner);
        sender.send(borrow).unwrap();
    });

    assert_eq!(reader.join().unwrap(), 12);
    if lend::CHECKED {
        assert_eq!(violations.len(), 1);
    }
}

#[test]
fn test_handles_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<UniqueRef<String>>();
    assert_send_sync::<UniquePtr<Vec<u8>>>();
    assert_send_sync::<LentRef<String>>();
    assert_send_sync::<LentPtr<u64, Const>>();
    assert_send_sync::<Lendable<String>>();
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Lend,
    LendConst,
    CloneAt(usize),
    DropAt(usize),
    TakeAt(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Lend),
        Just(Op::LendConst),
        any::<usize>().prop_map(Op::CloneAt),
        any::<usize>().prop_map(Op::DropAt),
        any::<usize>().prop_map(Op::TakeAt),
    ]
}

proptest! {
    #[test]
    fn prop_count_is_owner_plus_live_borrows(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let owner = make_unique(Value(0));
        let mut live: Vec<LentPtr<Value, Const>> = Vec::new();

        for op in ops {
            match op {
                Op::Lend => live.push(LentPtr::from(lend(&owner)).into_const()),
                Op::LendConst => live.push(lend_const(&owner).into()),
                Op::CloneAt(i) if !live.is_empty() => {
                    let copy = live[i % live.len()].clone();
                    live.push(copy);
                }
                Op::DropAt(i) if !live.is_empty() => {
                    let index = i % live.len();
                    live.swap_remove(index);
                }
                Op::TakeAt(i) if !live.is_empty() => {
                    // Moving out leaves an empty handle that holds no unit
                    let index = i % live.len();
                    let moved = live[index].take();
                    live[index] = moved;
                }
                _ => {}
            }

            let attached = live.iter().filter(|lent| !lent.is_null()).count();
            prop_assert_eq!(owner.reference_count(), 1 + attached);
        }

        drop(live);
        prop_assert_eq!(owner.reference_count(), 1);
    }
}

//! Ownership violations and how they are reported
//!
//! Every misuse the handles detect at run time is a [`Violation`]. Reporting
//! goes through one path:
//!
//! 1. log the violation at `error` on the `lend` target, tagged with the
//!    caller's file and line
//! 2. if the current thread is inside [`capture_violations`], record it and
//!    carry on
//! 3. otherwise apply the process-wide [`ViolationPolicy`]
//!
//! Some call sites cannot continue no matter what the policy says: an empty
//! handle has nothing to dereference, so null access and invalid promotion
//! always panic after reporting. A `Lendable` dropped while lent always
//! aborts, since its storage is about to go away under live borrows.

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU8, Ordering};

use lend_primitives::OverRelease;
use thiserror::Error;

/// Kind of owner that gave up an object while it was still lent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    UniquePtr,
    Lendable,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::UniquePtr => f.write_str("UNIQUE_PTR"),
            OwnerKind::Lendable => f.write_str("LENDABLE"),
        }
    }
}

/// Family of the nullable handle involved in a violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// `UniquePtr` / `UniqueRef`
    Unique,
    /// `LentPtr` / `LentRef`
    Lent,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Unique => f.write_str("UNIQUE_PTR"),
            HandleKind::Lent => f.write_str("LENT_REF"),
        }
    }
}

/// A run-time ownership or lending error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Violation {
    /// An owner was reset, replaced or dropped while borrows were attached.
    #[error("{owner}_DANGLING: owner released with {outstanding} dangling references")]
    DanglingBorrow { owner: OwnerKind, outstanding: usize },

    /// An empty nullable handle was dereferenced.
    #[error("{handle}_NULL_ACCESS: accessing a null pointer")]
    NullAccess { handle: HandleKind },

    /// A control block lost more references than it was given.
    #[error("CONTROL_BLOCK_OVER_RELEASE: {0}")]
    OverRelease(#[from] OverRelease),

    /// An empty handle was promoted to its non-null flavour.
    #[error("INVALID_PROMOTION: cannot promote an empty {handle} to a reference")]
    InvalidPromotion { handle: HandleKind },

    /// A borrow was dereferenced after its owner let go of the object.
    #[error("LENT_PTR_RELEASED: access through a borrow whose owner released the object ({outstanding} references left)")]
    ReleasedAccess { outstanding: usize },
}

// ============================================================================
// Policy
// ============================================================================

/// What happens to a reported violation outside of a capture scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ViolationPolicy {
    /// Panic at the call site that detected the violation
    Panic = 0,
    /// Log, write to stderr and abort the process
    Abort = 1,
    /// Log and continue
    Log = 2,
}

impl ViolationPolicy {
    const DEFAULT: Self = if cfg!(feature = "abort-on-violation") {
        ViolationPolicy::Abort
    } else {
        ViolationPolicy::Panic
    };

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ViolationPolicy::Abort,
            2 => ViolationPolicy::Log,
            _ => ViolationPolicy::Panic,
        }
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static POLICY: AtomicU8 = AtomicU8::new(ViolationPolicy::DEFAULT as u8);

/// Set the process-wide violation policy. Returns the previous one.
pub fn set_violation_policy(policy: ViolationPolicy) -> ViolationPolicy {
    ViolationPolicy::from_u8(POLICY.swap(policy as u8, Ordering::AcqRel))
}

pub fn violation_policy() -> ViolationPolicy {
    ViolationPolicy::from_u8(POLICY.load(Ordering::Acquire))
}

// ============================================================================
// Capture
// ============================================================================

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Violation>>> = const { RefCell::new(None) };
}

/// Restores the enclosing scope's buffer, including on unwind.
struct CaptureScope {
    previous: Option<Option<Vec<Violation>>>,
}

impl CaptureScope {
    fn enter() -> Self {
        let previous = CAPTURED.with(|slot| slot.replace(Some(Vec::new())));
        Self {
            previous: Some(previous),
        }
    }

    fn finish(mut self) -> Vec<Violation> {
        let previous = self.previous.take().flatten();
        CAPTURED
            .with(|slot| slot.replace(previous))
            .unwrap_or_default()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = CAPTURED.try_with(|slot| *slot.borrow_mut() = previous);
        }
    }
}

/// Run `f`, collecting every violation reported on this thread instead of
/// applying the policy.
///
/// Violations that cannot be survived (null access, invalid promotion) are
/// still recorded but then panic out of `f`. Scopes nest; an inner scope
/// keeps its violations to itself.
///
/// ```
/// use lend::{capture_violations, lend, make_unique, UniquePtr, Violation};
///
/// let (_, violations) = capture_violations(|| {
///     let mut owner: UniquePtr<i32> = make_unique(5).into();
///     let borrow = lend(&owner);
///     owner.reset(None);
///     assert_eq!(*borrow, 5);
/// });
///
/// if lend::CHECKED {
///     assert!(matches!(violations[0], Violation::DanglingBorrow { outstanding: 1, .. }));
/// }
/// ```
pub fn capture_violations<R>(f: impl FnOnce() -> R) -> (R, Vec<Violation>) {
    let scope = CaptureScope::enter();
    let result = f();
    (result, scope.finish())
}

fn record(violation: &Violation) -> bool {
    CAPTURED
        .try_with(|slot| match slot.borrow_mut().as_mut() {
            Some(captured) => {
                captured.push(violation.clone());
                true
            }
            None => false,
        })
        .unwrap_or(false)
}

// ============================================================================
// Reporting
// ============================================================================

/// Report a violation the caller can survive.
#[track_caller]
pub(crate) fn report(violation: Violation) {
    let location = Location::caller();
    tracing::error!(
        target: "lend",
        file = location.file(),
        line = location.line(),
        %violation,
        "ownership violation"
    );

    if record(&violation) {
        return;
    }

    match violation_policy() {
        ViolationPolicy::Log => {}
        // A second panic while unwinding would abort without the message
        ViolationPolicy::Panic if std::thread::panicking() => {}
        ViolationPolicy::Panic => panic!("{violation}"),
        ViolationPolicy::Abort => abort_now(location, &violation),
    }
}

/// Report a violation the caller cannot survive, then panic.
#[track_caller]
pub(crate) fn fatal(violation: Violation) -> ! {
    report(violation.clone());
    panic!("{violation}");
}

/// Report and abort regardless of policy or capture. `value_type` names the
/// object whose storage is going away.
#[track_caller]
pub(crate) fn abort(violation: Violation, value_type: &'static str) -> ! {
    let location = Location::caller();
    tracing::error!(
        target: "lend",
        file = location.file(),
        line = location.line(),
        value_type,
        %violation,
        "unrecoverable ownership violation"
    );
    eprintln!("{location}: {violation} (value type `{value_type}`)");
    std::process::abort()
}

fn abort_now(location: &Location<'_>, violation: &Violation) -> ! {
    eprintln!("{location}: {violation}");
    std::process::abort()
}

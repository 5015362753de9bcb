//! Lend Primitives - Control Block Bookkeeping
//!
//! This crate contains the shared, atomically updated bookkeeping record that
//! ties one owned object to all of its non-owning observers. Every owner and
//! borrow handle in `lend` reads and writes this record, and nothing else in
//! the workspace touches the counter directly.
//!
//! # Design Principles
//!
//! 1. **One unit per holder**: the count is seeded with one unit for the
//!    owning side; each live borrow adds exactly one more
//! 2. **Monotonic release**: the freed flag only ever moves false -> true
//! 3. **No wraparound**: removing a reference at zero is reported, never wraps
//! 4. **Verified**: Kani proofs and loom models cover the counter
//!
//! # Module Organization
//!
//! - `control_block` - `ControlBlock`, `BlockOrigin`, heap allocation helpers
//! - `sync` - atomics shim (core atomics, or loom atomics under `loom`)
//! - `loom_tests` - Concurrency tests using loom (with `loom` feature)
//!
//! # Verification
//!
//! 1. **Kani proofs** (`cargo kani`): counter bounds and freed monotonicity
//! 2. **Loom tests** (`cargo test --features loom`): concurrent add/remove
//! 3. **Unit tests**: single-threaded protocol checks

#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod control_block;
mod sync;


pub use control_block::{BlockOrigin, ControlBlock, OverRelease, Released, MAX_REFERENCES, OWNER_UNIT};

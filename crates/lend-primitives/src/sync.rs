//! Atomics used by the control block
//!
//! Under the `loom` feature every atomic is swapped for its loom counterpart,
//! so the model checker can explore all interleavings of the real
//! `ControlBlock` code rather than a copy of it.

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(not(feature = "loom"))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

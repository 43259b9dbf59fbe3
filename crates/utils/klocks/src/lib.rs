//! 内核自旋锁。
//!
//! 严格不可重入；唯一的例外是 [`RecursiveSpinLock`]，它记录持有者与深度，
//! 用于同一逻辑持有者确实可能重入的场合（比如日志输出路径）

#![cfg_attr(not(test), no_std)]

mod kspin;
mod recursive;

pub use kspin::{SpinMutex, SpinMutexGuard, SpinNoIrqMutex, SpinNoIrqMutexGuard};
pub use recursive::{RecursiveSpinLock, RecursiveSpinLockGuard};
pub use spin::{Lazy, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};

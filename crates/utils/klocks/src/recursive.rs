//! 可重入自旋锁。
//!
//! 记录持有者 token 与深度，同一持有者可以再次进入。只用于确实会被
//! 同一逻辑持有者合法重入的锁，目前即日志输出路径。
//!
//! 它不保护数据（重入时发放 `&mut` 会构成别名），只序列化一段临界区

use core::{
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

const UNOWNED: usize = 0;

pub struct RecursiveSpinLock {
    owner: AtomicUsize,
    /// 只有持有者会读写，深度本身不需要跨 hart 同步
    depth: AtomicUsize,
}

pub struct RecursiveSpinLockGuard<'a> {
    lock: &'a RecursiveSpinLock,
    _no_irq_guard: hal::NoIrqGuard,
    _not_send: PhantomData<*const ()>,
}

impl RecursiveSpinLock {
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(UNOWNED),
            depth: AtomicUsize::new(0),
        }
    }

    #[track_caller]
    pub fn lock(&self) -> RecursiveSpinLockGuard<'_> {
        let no_irq_guard = hal::NoIrqGuard::new();
        let token = hal::owner_token();
        debug_assert_ne!(token, UNOWNED);

        if self.owner.load(Ordering::Acquire) == token {
            // 重入：深度必然已经大于 0
            debug_assert!(self.depth.load(Ordering::Relaxed) > 0);
        } else {
            while self
                .owner
                .compare_exchange_weak(UNOWNED, token, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                core::hint::spin_loop();
            }
            debug_assert_eq!(self.depth.load(Ordering::Relaxed), 0);
        }
        self.depth.fetch_add(1, Ordering::Relaxed);

        RecursiveSpinLockGuard {
            lock: self,
            _no_irq_guard: no_irq_guard,
            _not_send: PhantomData,
        }
    }
}

impl Default for RecursiveSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecursiveSpinLockGuard<'_> {
    fn drop(&mut self) {
        let token = hal::owner_token();
        assert_eq!(
            self.lock.owner.load(Ordering::Relaxed),
            token,
            "recursive lock released by non-owner"
        );
        if self.lock.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.lock.owner.store(UNOWNED, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, vec::Vec};

    use super::RecursiveSpinLock;

    #[test]
    fn reentrant_on_same_owner() {
        let lock = RecursiveSpinLock::new();
        let a = lock.lock();
        let b = lock.lock();
        let c = lock.lock();
        drop(c);
        drop(b);
        drop(a);
        // 完全释放后可以再次获取
        drop(lock.lock());
    }

    #[test]
    fn excludes_other_owners() {
        let lock = Arc::new(RecursiveSpinLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut ts = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            ts.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _outer = lock.lock();
                    let _inner = lock.lock();
                    let seen = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    // 持锁期间没有并发的进入者
                    assert_eq!(
                        counter.load(std::sync::atomic::Ordering::SeqCst),
                        seen + 1
                    );
                    counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                }
            }));
        }
        for t in ts {
            t.join().unwrap();
        }
    }
}

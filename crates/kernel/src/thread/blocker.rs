//! 线程在一个等待点上挂起自己所用的原语。
//!
//! 由需要等待点的子系统持有（管道、wait4、睡眠等）。一个线程同一时刻
//! 至多出现在一个 blocker 的等待队列里；等待队列只记 tid，真正的挂起
//! 与恢复都在调度器那边

use alloc::sync::{Arc, Weak};

use klocks::SpinNoIrqMutex;
use smallvec::SmallVec;

use crate::{sched, thread::Thread, time};

/// 等待队列本体。调度器通过 [`Weak`] 引用它，以便信号或超时唤醒时
/// 把 tid 从队列里摘掉
pub(crate) type WaiterQueue = SpinNoIrqMutex<SmallVec<[usize; 4]>>;

pub struct ThreadBlocker {
    queue: Arc<WaiterQueue>,
}

impl ThreadBlocker {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SpinNoIrqMutex::new(SmallVec::new())),
        }
    }

    /// 把调用线程挂在这个等待点上，直到被唤醒。
    ///
    /// `wake_time_ms` 给出则同时注册一个定时唤醒
    pub fn block(&self, thread: &Arc<Thread>, wake_time_ms: Option<usize>) {
        self.add_waiter(thread.tid());
        if let Some(wake_time_ms) = wake_time_ms {
            time::register_timer(wake_time_ms, thread.tid());
        }
        sched::block_current(thread, Arc::downgrade(&self.queue));
    }

    pub(crate) fn add_waiter(&self, tid: usize) {
        let mut queue = self.queue.lock();
        debug_assert!(
            !queue.contains(&tid),
            "tid {tid} already waiting on this blocker"
        );
        queue.push(tid);
    }

    pub(crate) fn queue_weak(&self) -> Weak<WaiterQueue> {
        Arc::downgrade(&self.queue)
    }

    /// 唤醒等得最久的一个线程，返回其 tid
    pub fn unblock_one(&self) -> Option<usize> {
        let tid = {
            let mut queue = self.queue.lock();
            if queue.is_empty() {
                return None;
            }
            queue.remove(0)
        };
        sched::unblock_thread(tid);
        Some(tid)
    }

    pub fn unblock_all(&self) {
        let tids = core::mem::take(&mut *self.queue.lock());
        for tid in tids {
            sched::unblock_thread(tid);
        }
    }

    pub fn waiter_count(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn has_waiter(&self, tid: usize) -> bool {
        self.queue.lock().contains(&tid)
    }
}

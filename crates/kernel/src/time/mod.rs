//! 定时唤醒。
//!
//! 带 deadline 的阻塞原语在挂起前把 (到点时刻, tid) 注册进这里；
//! 时钟中断路径调用 [`check_timers`]，把到点的线程交还调度器。
//! 线程提前被事件或信号唤醒时不撤销定时器：晚到的到期唤醒落在
//! `unblock_thread` 的幂等 no-op 上

use alloc::collections::BinaryHeap;
use core::cmp::{Ordering, Reverse};

use klocks::SpinNoIrqMutex;

use crate::sched;

struct Timer {
    expire_ms: usize,
    tid: usize,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.expire_ms == other.expire_ms
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expire_ms.cmp(&other.expire_ms)
    }
}

static TIMERS: SpinNoIrqMutex<BinaryHeap<Reverse<Timer>>> =
    SpinNoIrqMutex::new(BinaryHeap::new());

pub fn register_timer(expire_ms: usize, tid: usize) {
    TIMERS.lock().push(Reverse(Timer { expire_ms, tid }));
}

/// 唤醒所有到点的等待者
pub fn check_timers() {
    let curr_ms = hal::get_time_ms();
    loop {
        let tid = {
            let mut timers = TIMERS.lock();
            match timers.peek() {
                Some(timer) if curr_ms >= timer.0.expire_ms => timers.pop().unwrap().0.tid,
                _ => return,
            }
        };
        // 在锁外唤醒，unblock 自己会去拿调度器的锁
        sched::unblock_thread(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_deadline_order() {
        let base = hal::get_time_ms() + 10_000;
        // 故意乱序注册
        register_timer(base + 30, 9902);
        register_timer(base + 10, 9901);
        register_timer(base + 20, 9903);

        let mut timers = TIMERS.lock();
        let mut seen = alloc::vec::Vec::new();
        let mut kept = alloc::vec::Vec::new();
        while let Some(Reverse(timer)) = timers.pop() {
            if (9901..=9903).contains(&timer.tid) {
                seen.push(timer.tid);
            } else {
                kept.push(timer);
            }
        }
        for timer in kept {
            timers.push(Reverse(timer));
        }
        assert_eq!(seen, [9901, 9903, 9902]);
    }
}

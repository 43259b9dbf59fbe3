//! 调度器：维护「就绪线程」到「正在某个 hart 上执行」的映射。
//!
//! 策略是全局就绪队列上的朴素轮转，没有优先级。被阻塞的线程按 tid
//! 存进阻塞表，`unblock_thread` O(1) 找回。每个 hart 的 idle 执行流
//! 是 hart 私有的，从不进入全局队列。
//!
//! 不变量：任一线程同一时刻只出现在就绪队列、阻塞表、某个 hart 的
//! current 三者之一；`Terminated` 线程只由调度器摘除

use alloc::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use defines::error::{errno, KResult};
use hashbrown::HashMap;
use klocks::{Lazy, SpinNoIrqMutex};

use crate::{
    hart,
    process::Process,
    thread::{Thread, ThreadState, WaiterQueue},
    time,
};

pub static SCHEDULER: Lazy<Scheduler> = Lazy::new(Scheduler::new);

struct BlockedEntry {
    thread: Arc<Thread>,
    /// 所在 blocker 的等待队列。信号或超时唤醒时要把 tid 从里面摘掉
    queue: Weak<WaiterQueue>,
}

struct RunQueue {
    ready: VecDeque<Arc<Thread>>,
    blocked: HashMap<usize, BlockedEntry>,
}

pub struct Scheduler {
    queue: SpinNoIrqMutex<RunQueue>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            queue: SpinNoIrqMutex::new(RunQueue {
                ready: VecDeque::new(),
                blocked: HashMap::new(),
            }),
        }
    }

    /// 放进就绪队列。分配失败必须上报：悄悄丢掉会让线程永远失踪
    pub fn add_thread(&self, thread: Arc<Thread>) -> KResult<()> {
        let mut queue = self.queue.lock();
        queue.ready.try_reserve(1).map_err(|_| errno::ENOMEM)?;
        queue.ready.push_back(thread);
        Ok(())
    }

    /// 把线程从阻塞表挪回就绪队列。对已就绪或正在执行的线程是幂等的
    /// no-op，不会重复入队。跨 hart 唤醒时发 IPI 让对方尽快重新调度
    pub fn unblock_thread(&self, tid: usize) {
        let woken = {
            let mut queue = self.queue.lock();
            match queue.blocked.remove(&tid) {
                Some(entry) => {
                    // 同时退出 blocker 的等待队列，维持「至多属于一个 blocker」
                    if let Some(waiters) = entry.queue.upgrade() {
                        let mut waiters = waiters.lock();
                        if let Some(pos) = waiters.iter().position(|t| *t == tid) {
                            waiters.remove(pos);
                        }
                    }
                    queue.ready.push_back(entry.thread);
                    true
                }
                None => false,
            }
        };
        if woken {
            hart::notify_other_harts();
        }
    }

    /// 当前线程自愿挂起，记录它所在的等待队列，然后让出 hart。
    ///
    /// 进入阻塞表的 bookkeeping 与真正的切换分成两步，切换永远是最后一步
    pub fn block_current(&self, thread: &Arc<Thread>, queue: Weak<WaiterQueue>) {
        self.enqueue_blocked(thread, queue);
        self.schedule(SwitchOut::Blocked);
    }

    pub(crate) fn enqueue_blocked(&self, thread: &Arc<Thread>, queue: Weak<WaiterQueue>) {
        let mut run_queue = self.queue.lock();
        let prev = run_queue.blocked.insert(
            thread.tid(),
            BlockedEntry {
                thread: Arc::clone(thread),
                queue,
            },
        );
        assert!(prev.is_none(), "thread blocked twice");
    }

    /// 协作式让出：当前线程回到就绪队列尾部，换下一个就绪线程上来。
    ///
    /// 从时钟中断里调用时，返回到的是下一个线程的中断尾声
    pub fn yield_now(&self) {
        self.schedule(SwitchOut::Ready);
    }

    /// 时钟中断驱动：先唤醒到点的定时等待，再轮转
    pub fn timer_tick(&self) {
        time::check_timers();
        self.yield_now();
    }

    /// 取出下一个可运行线程。`Terminated` 的线程在这里被丢弃，
    /// 这是它们离开调度器的唯一出口
    fn take_next_ready(&self) -> Option<Arc<Thread>> {
        let mut queue = self.queue.lock();
        while let Some(thread) = queue.ready.pop_front() {
            if thread.state.load(atomic::Ordering::SeqCst) == ThreadState::Terminated {
                // 析构在锁外进行
                drop(queue);
                drop(thread);
                queue = self.queue.lock();
                continue;
            }
            return Some(thread);
        }
        None
    }

    /// 挑下一个线程并切换过去。`how` 决定当前线程的去向
    fn schedule(&self, how: SwitchOut) {
        let Some(next) = self.take_next_ready() else {
            // 没有就绪线程：回到本 hart 的 idle 执行流
            hart::switch_to_idle(how);
            return;
        };
        if next.state.load(atomic::Ordering::SeqCst) == ThreadState::NotStarted {
            next.set_state(ThreadState::Executing);
        }
        hart::switch_to(Some(next), how);
    }

    // ---- 以下为观测接口，调度决策不依赖它们 ----

    pub fn is_blocked(&self, tid: usize) -> bool {
        self.queue.lock().blocked.contains_key(&tid)
    }

    pub fn is_ready(&self, tid: usize) -> bool {
        self.queue
            .lock()
            .ready
            .iter()
            .any(|thread| thread.tid() == tid)
    }
}

/// 切换走的时候，当前线程该被放到哪里
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOut {
    /// 回就绪队列尾部（yield / 时间片用尽）
    Ready,
    /// 已进阻塞表，调度器不再持有它
    Blocked,
    /// 线程已终止，由调度器就地丢弃
    Exited,
    /// 执行流刚被重新装配（清理载体），原现场直接作废
    Reprimed,
}

pub fn add_thread(thread: Arc<Thread>) -> KResult<()> {
    SCHEDULER.add_thread(thread)
}

pub fn unblock_thread(tid: usize) {
    SCHEDULER.unblock_thread(tid);
}

pub fn block_current(thread: &Arc<Thread>, queue: Weak<WaiterQueue>) {
    SCHEDULER.block_current(thread, queue);
}

pub fn yield_now() {
    SCHEDULER.yield_now();
}

pub fn timer_tick() {
    SCHEDULER.timer_tick();
}

/// 当前线程已 `Terminated`，永久让出。释放它的栈必须等执行流离开
/// 那条栈之后，由 hart 的 idle 执行流完成
pub fn exit_current() -> ! {
    SCHEDULER.schedule(SwitchOut::Exited);
    unreachable!("terminated thread was scheduled again")
}

/// 当前线程的执行流刚被 `setup_process_cleanup` 重新装配，
/// 丢掉旧现场、从新装配的入口重新进入本线程
pub fn run_reprimed_current() -> ! {
    hart::reenter_current();
}

/// 清理载体的终点：线程与进程一起交给调度器销毁
pub fn delete_current_process_and_thread(process: Arc<Process>) -> ! {
    drop(process);
    SCHEDULER.schedule(SwitchOut::Exited);
    unreachable!("terminated cleanup thread was scheduled again")
}

/// hart 没有活可干时停在这里。`should_shutdown` 为真时停机
pub fn idle_loop(should_shutdown: impl Fn() -> bool) -> ! {
    loop {
        if should_shutdown() {
            hart::shutdown();
        }
        SCHEDULER.yield_now();
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadBlocker;

    fn spawn_parked_thread() -> (Arc<Process>, Arc<Thread>) {
        let process = Process::new_bare("sched-test".into());
        let thread = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        process.add_thread(Arc::clone(&thread));
        (process, thread)
    }

    #[test]
    fn add_thread_makes_thread_ready() {
        let (_process, thread) = spawn_parked_thread();
        let tid = thread.tid();
        SCHEDULER.add_thread(Arc::clone(&thread)).unwrap();
        assert!(SCHEDULER.is_ready(tid));
        assert!(!SCHEDULER.is_blocked(tid));
    }

    #[test]
    fn thread_is_in_exactly_one_place() {
        let (_process, thread) = spawn_parked_thread();
        let tid = thread.tid();
        let blocker = ThreadBlocker::new();

        blocker.add_waiter(tid);
        SCHEDULER.enqueue_blocked(&thread, blocker.queue_weak());
        assert!(SCHEDULER.is_blocked(tid));
        assert!(!SCHEDULER.is_ready(tid));

        SCHEDULER.unblock_thread(tid);
        assert!(!SCHEDULER.is_blocked(tid));
        assert!(SCHEDULER.is_ready(tid));
        // 等待队列的成员资格随之消失
        assert!(!blocker.has_waiter(tid));
    }

    #[test]
    fn unblock_is_idempotent() {
        let (_process, thread) = spawn_parked_thread();
        let tid = thread.tid();
        let blocker = ThreadBlocker::new();

        blocker.add_waiter(tid);
        SCHEDULER.enqueue_blocked(&thread, blocker.queue_weak());
        SCHEDULER.unblock_thread(tid);
        SCHEDULER.unblock_thread(tid);
        SCHEDULER.unblock_thread(tid);

        // 不会重复入队
        let mut queue = SCHEDULER.queue.lock();
        let count = queue
            .ready
            .iter()
            .filter(|thread| thread.tid() == tid)
            .count();
        assert_eq!(count, 1);
        queue.ready.retain(|thread| thread.tid() != tid);
    }

    #[test]
    fn cross_hart_unblock_raises_ipi() {
        let (_process, thread) = spawn_parked_thread();
        let tid = thread.tid();
        let blocker = ThreadBlocker::new();

        SCHEDULER.enqueue_blocked(&thread, blocker.queue_weak());
        hal::take_pending_ipis();
        SCHEDULER.unblock_thread(tid);
        assert_ne!(hal::take_pending_ipis(), 0);
    }
}

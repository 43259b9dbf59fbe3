//! 线程：调度的单位。
//!
//! 独占自己的内核栈与（用户线程的）用户栈、中断返回栈，持有保存的
//! 执行现场和两级信号掩码。状态机只会向前走：
//! `NotStarted -> Executing -> Terminated`，任何状态都不会回头。
//! 线程不能被别人直接终止，只能被信号要求自我了断

mod blocker;
mod inner;

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU32, Ordering};

use atomic::Atomic;
use defines::{
    error::{errno, KResult},
    signal::SignalActionFlags,
};
use klocks::{SpinMutex, SpinMutexGuard, SpinNoIrqMutex};

pub use self::blocker::ThreadBlocker;
pub(crate) use self::blocker::WaiterQueue;
pub use self::inner::{SignalState, ThreadInner};
use crate::{
    hart,
    memory::{alloc_interrupt_stack, alloc_user_stack, KernelStack, StackRange},
    process::Process,
    sched,
    signal::{DefaultHandler, Disposition, KSignalSet, Signal, SignalContext},
    trap::{self, TrapContext},
};

/// tid 全局单调分配，整个运行期内不复用
static TID_ALLOCATOR: idallocator::MonotonicAllocator =
    idallocator::MonotonicAllocator::begin_with(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::NoUninit)]
#[repr(u8)]
pub enum ThreadState {
    NotStarted,
    Executing,
    Terminated,
}

pub struct Thread {
    tid: usize,
    pub state: Atomic<ThreadState>,
    /// 线程的退出码，`sys_exit` 时被设置。
    ///
    /// 如果它是进程中的最后一个线程，进程退出码取它
    pub exit_code: Atomic<i8>,
    is_userspace: bool,
    /// 对所属进程的弱引用。进程持有线程的强引用，方向不能反过来
    pub process: Weak<Process>,
    kernel_stack: KernelStack,
    inner: SpinMutex<ThreadInner>,
    /// 信号状态独立加锁，且不与调度器共享锁
    sig: SpinNoIrqMutex<SignalState>,
    /// 持有内核内部锁的计数。非零期间不向用户态注入 handler
    held_locks: AtomicU32,
}

impl Thread {
    fn new(
        process: &Arc<Process>,
        is_userspace: bool,
        kernel_stack: KernelStack,
        signal_mask: KSignalSet,
        inner: ThreadInner,
    ) -> Self {
        Self {
            tid: TID_ALLOCATOR.alloc(),
            state: Atomic::new(ThreadState::NotStarted),
            exit_code: Atomic::new(0),
            is_userspace,
            process: Arc::downgrade(process),
            kernel_stack,
            inner: SpinMutex::new(inner),
            sig: SpinNoIrqMutex::new(SignalState::new(signal_mask)),
            held_locks: AtomicU32::new(0),
        }
    }

    /// 创建一个内核线程，首次被调度时从 `entry(arg)` 开始执行，
    /// 返回后走退出路径。栈分配失败返回 `ENOMEM`，不泄漏进程引用
    pub fn create_kernel(
        entry: fn(usize),
        arg: usize,
        process: &Arc<Process>,
    ) -> KResult<Arc<Self>> {
        let kernel_stack = KernelStack::alloc()?;
        let kernel_ctx = hal::TaskContext::goto(kernel_thread_entry as usize, kernel_stack.top());
        let inner = ThreadInner {
            trap_context: TrapContext::app_init_context(0, 0),
            kernel_ctx,
            signal_stack: alloc::vec::Vec::new(),
            user_stack: None,
            interrupt_stack: None,
            kernel_entry: Some((entry, arg)),
        };
        Ok(Arc::new(Self::new(
            process,
            false,
            kernel_stack,
            KSignalSet::empty(),
            inner,
        )))
    }

    /// 创建一个用户线程：内核栈、用户栈、中断返回栈各一条。
    ///
    /// 返回的线程还没有可执行的用户现场，需要随后 `setup_exec`
    pub fn create_userspace(process: &Arc<Process>) -> KResult<Arc<Self>> {
        let kernel_stack = KernelStack::alloc()?;
        let (user_stack, interrupt_stack) = {
            let mut process_inner = process.lock_inner();
            let user_stack = alloc_user_stack(&mut process_inner.memory_space)?;
            match alloc_interrupt_stack(&mut process_inner.memory_space) {
                Ok(interrupt_stack) => (user_stack, interrupt_stack),
                Err(e) => {
                    // 撤销已分配的用户栈，进程里不能留下泄漏的区域
                    process_inner.memory_space.remove_range(user_stack.vaddr);
                    return Err(e);
                }
            }
        };
        let inner = ThreadInner {
            trap_context: TrapContext::app_init_context(0, user_stack.top()),
            kernel_ctx: hal::TaskContext::goto(user_thread_entry as usize, kernel_stack.top()),
            signal_stack: alloc::vec::Vec::new(),
            user_stack: Some(user_stack),
            interrupt_stack: Some(interrupt_stack),
            kernel_entry: None,
        };
        Ok(Arc::new(Self::new(
            process,
            true,
            kernel_stack,
            KSignalSet::empty(),
            inner,
        )))
    }

    /// （重新）装配用户态现场：从 `entry` 开始执行，argc/argv/envp 放进
    /// 约定的寄存器。既用于进程创建，也用于 exec 替换镜像。
    ///
    /// 信号掩码继承，不在这里动
    pub fn setup_exec(
        &self,
        entry: usize,
        user_sp: usize,
        argc: usize,
        argv_base: usize,
        envp_base: usize,
    ) {
        debug_assert!(self.is_userspace);
        let mut inner = self.inner.lock();
        inner.trap_context = TrapContext::app_init_context(entry, user_sp);
        *inner.trap_context.a0_mut() = argc;
        *inner.trap_context.a1_mut() = argv_base;
        *inner.trap_context.a2_mut() = envp_base;
        inner.signal_stack.clear();
        inner.kernel_ctx =
            hal::TaskContext::goto(user_thread_entry as usize, self.kernel_stack.top());
    }

    /// 重新装配执行流去跑进程清理例程。只在线程集合清空之后调用。
    ///
    /// 先掩蔽全部信号：清理过程不允许被打断
    pub fn setup_process_cleanup(&self) {
        {
            let mut sig = self.sig.lock();
            sig.blocked = KSignalSet::all();
            sig.pending = KSignalSet::empty();
        }
        let mut inner = self.inner.lock();
        inner.kernel_ctx =
            hal::TaskContext::goto(process_cleanup_entry as usize, self.kernel_stack.top());
    }

    /// fork 用：把本线程的浮点状态与栈内容复制进挂在 `new_process` 下的
    /// 新线程。新线程从 `(sp, ip)` 恢复执行，按子进程约定返回 0
    pub fn clone_thread(
        &self,
        new_process: &Arc<Process>,
        sp: usize,
        ip: usize,
    ) -> KResult<Arc<Self>> {
        debug_assert!(self.is_userspace);
        debug_assert_eq!(self.state.load(Ordering::SeqCst), ThreadState::Executing);

        let kernel_stack = KernelStack::alloc()?;
        let (user_stack, interrupt_stack, mut trap_context) = self.lock_inner_with(|inner| {
            (
                inner.user_stack,
                inner.interrupt_stack,
                inner.trap_context.clone(),
            )
        });
        // 本线程正在运行，浮点状态以硬件寄存器为准
        hal::save_float(&mut trap_context.float_regs);

        {
            let src = self.process.upgrade().ok_or(errno::ESRCH)?;
            let src_inner = src.lock_inner();
            let mut dst_inner = new_process.lock_inner();
            for stack in [user_stack, interrupt_stack].into_iter().flatten() {
                src_inner
                    .memory_space
                    .clone_range_into(stack.vaddr, &mut dst_inner.memory_space)?;
            }
        }

        *trap_context.sp_mut() = sp;
        trap_context.sepc = ip;
        // 子线程看到的返回值是 0
        *trap_context.a0_mut() = 0;

        let signal_mask = self.sig.lock().blocked;
        let inner = ThreadInner {
            trap_context,
            kernel_ctx: hal::TaskContext::goto(user_thread_entry as usize, kernel_stack.top()),
            signal_stack: alloc::vec::Vec::new(),
            user_stack,
            interrupt_stack,
            kernel_entry: None,
        };
        Ok(Arc::new(Self::new(
            new_process,
            true,
            kernel_stack,
            signal_mask,
            inner,
        )))
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn is_userspace(&self) -> bool {
        self.is_userspace
    }

    pub fn kernel_stack(&self) -> &KernelStack {
        &self.kernel_stack
    }

    pub fn lock_inner(&self) -> SpinMutexGuard<'_, ThreadInner> {
        self.inner.lock()
    }

    /// 锁 inner 然后进行操作，这是一个便捷方法
    pub fn lock_inner_with<T>(&self, f: impl FnOnce(&mut ThreadInner) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state, Ordering::SeqCst);
    }

    /// 进入一段不允许注入信号的临界区，守卫存续期间
    /// `can_add_signal_to_execute` 恒为假
    pub fn protected_section(self: &Arc<Self>) -> ProtectedSectionGuard {
        self.held_locks.fetch_add(1, Ordering::SeqCst);
        ProtectedSectionGuard {
            thread: Arc::clone(self),
        }
    }

    pub fn in_protected_section(&self) -> bool {
        self.held_locks.load(Ordering::SeqCst) > 0
    }

    // ------------------------------------------------------------------
    // 信号
    // ------------------------------------------------------------------

    /// 是否存在一个 pending、未被掩蔽、且处置不是忽略（含默认忽略）的信号。
    ///
    /// 所有阻塞原语用它决定要不要以 `EINTR` 收场
    pub fn is_interrupted_by_signal(&self) -> bool {
        let Some(process) = self.process.upgrade() else {
            return false;
        };
        // 锁序：先进程信号锁，后线程信号锁
        process.with_signals(|proc_sig| {
            let sig = self.sig.lock();
            let deliverable = (sig.pending | proc_sig.pending) & !sig.blocked;
            deliverable
                .iter_signals()
                .any(|signal| !Disposition::of(proc_sig.handlers.action(signal), signal).is_noop())
        })
    }

    /// 返回用户态的路径现在是否可以注入一个 handler
    pub fn can_add_signal_to_execute(&self) -> bool {
        self.is_userspace
            && self.state.load(Ordering::SeqCst) == ThreadState::Executing
            && self.held_locks.load(Ordering::SeqCst) == 0
            && self.is_interrupted_by_signal()
    }

    /// 信号投递状态机。
    ///
    /// `signal` 不给出时取编号最小的 pending 且未掩蔽的信号。选定的信号
    /// 从线程与进程两级 pending 中清除；同一编号的多次到达合并成一次
    pub fn handle_signal(&self, signal: Option<Signal>) {
        let Some(process) = self.process.upgrade() else {
            return;
        };
        let Some((signal, action)) = process.with_signals(|proc_sig| {
            let mut sig = self.sig.lock();
            let signal = match signal {
                Some(signal) => signal,
                None => ((sig.pending | proc_sig.pending) & !sig.blocked).first_pending()?,
            };
            sig.pending.remove(signal.into());
            proc_sig.pending.remove(signal.into());
            Some((signal, proc_sig.handlers.action(signal).clone()))
        }) else {
            return;
        };

        debug!("handle signal {signal:?}");
        match Disposition::of(&action, signal) {
            Disposition::Ignore => {}
            Disposition::Handler(action) => {
                let old_mask = {
                    let mut sig = self.sig.lock();
                    let old_mask = sig.blocked;
                    sig.blocked |= KSignalSet::from_bits_truncate(action.mask);
                    if !action.flags.contains(SignalActionFlags::SA_NODEFER) {
                        sig.blocked.insert(signal.into());
                    }
                    old_mask
                };
                self.lock_inner_with(|inner| {
                    let old_trap_context = inner.trap_context.clone();
                    inner.trap_context.inject_handler_frame(
                        action.handler,
                        signal.to_user(),
                        action.restorer,
                    );
                    inner.signal_stack.push(SignalContext {
                        old_mask,
                        old_trap_context,
                    });
                });
            }
            Disposition::Default(default) => match default {
                DefaultHandler::Ignore => {}
                DefaultHandler::Terminate => {
                    process.exit(128 + signal.to_user(), Some(signal), false);
                }
                DefaultHandler::CoreDump => {
                    process.exit(128 + signal.to_user(), Some(signal), true);
                }
                DefaultHandler::Stop | DefaultHandler::Continue => {
                    unreachable!("job control signals are not implemented")
                }
            },
        }
    }

    /// handler 的尾声：弹出一层保存的现场，恢复掩码与返回上下文。
    ///
    /// 返回被恢复现场里的 a0，调用方把它作为「系统调用返回值」写回去，
    /// 被打断的那条系统调用的结果才不会被冲掉
    pub fn sigreturn(&self) -> KResult<isize> {
        let Some(SignalContext {
            old_mask,
            old_trap_context,
        }) = self.lock_inner_with(|inner| inner.signal_stack.pop())
        else {
            return Err(errno::EINVAL);
        };
        let restored_a0 = old_trap_context.user_regs[9] as isize;
        self.sig.lock().blocked = old_mask;
        self.lock_inner_with(|inner| inner.trap_context = old_trap_context);
        Ok(restored_a0)
    }

    /// 向线程投送一个信号，返回信号是否真的被记录。
    ///
    /// 处置检查发生在发送时刻：忽略（含默认忽略）的信号既不记录也不
    /// 唤醒目标；处于掩码中的信号同样不记录。目标不是调用者时将其从
    /// 任何阻塞等待中唤醒
    pub fn add_signal(&self, signal: Signal) -> bool {
        let Some(process) = self.process.upgrade() else {
            // 目标已经走过信号还有意义的阶段，安静地作为 no-op
            return false;
        };
        let recorded = process.with_signals(|proc_sig| {
            if Disposition::of(proc_sig.handlers.action(signal), signal).is_noop() {
                return false;
            }
            let mut sig = self.sig.lock();
            if sig.blocked.contains(signal.into()) {
                return false;
            }
            sig.pending.insert(signal.into());
            true
        });
        if recorded && hart::curr_tid() != Some(self.tid) {
            sched::unblock_thread(self.tid);
        }
        recorded
    }

    pub fn with_signal_state<T>(&self, f: impl FnOnce(&mut SignalState) -> T) -> T {
        f(&mut self.sig.lock())
    }

    // ------------------------------------------------------------------
    // 阻塞
    // ------------------------------------------------------------------

    /// 阻塞系统调用的标准样式：先查一次信号（快速失败），阻塞，
    /// 醒来后再查一次，区分真唤醒与信号唤醒
    pub fn block_or_eintr_indefinite(self: &Arc<Self>, blocker: &ThreadBlocker) -> KResult<()> {
        if self.is_interrupted_by_signal() {
            return Err(errno::EINTR);
        }
        blocker.block(self, None);
        self.classify_wakeup(None, false)
    }

    /// 同上，但最多等 `timeout_ms`。`etimedout` 要求超时以
    /// `ETIMEDOUT` 报告，否则超时按成功返回
    pub fn block_or_eintr_or_timeout_ms(
        self: &Arc<Self>,
        blocker: &ThreadBlocker,
        timeout_ms: usize,
        etimedout: bool,
    ) -> KResult<()> {
        self.block_or_eintr_or_waketime_ms(blocker, hal::get_time_ms() + timeout_ms, etimedout)
    }

    /// 同上，deadline 是绝对时刻
    pub fn block_or_eintr_or_waketime_ms(
        self: &Arc<Self>,
        blocker: &ThreadBlocker,
        wake_time_ms: usize,
        etimedout: bool,
    ) -> KResult<()> {
        if self.is_interrupted_by_signal() {
            return Err(errno::EINTR);
        }
        blocker.block(self, Some(wake_time_ms));
        self.classify_wakeup(Some(wake_time_ms), etimedout)
    }

    /// 醒来后的三分：信号、超时、真唤醒。信号的检查顺序优先于超时
    pub fn classify_wakeup(&self, wake_time_ms: Option<usize>, etimedout: bool) -> KResult<()> {
        if self.is_interrupted_by_signal() {
            return Err(errno::EINTR);
        }
        if let Some(wake_time_ms) = wake_time_ms {
            if etimedout && hal::get_time_ms() >= wake_time_ms {
                return Err(errno::ETIMEDOUT);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 退出
    // ------------------------------------------------------------------

    /// 自然终止。只能由线程自己调用。
    ///
    /// 如果进程报告这是最后一个线程，本线程转而成为清理载体：释放地址
    /// 空间不能在这个空间自己的映射里进行，必须换到只剩内核映射的执行流
    pub fn on_exit(self: &Arc<Self>) -> ! {
        let process = self
            .process
            .upgrade()
            .expect("exiting thread must still have a process");
        if process.on_thread_exit(self) {
            self.setup_process_cleanup();
            sched::run_reprimed_current()
        } else {
            self.set_state(ThreadState::Terminated);
            sched::exit_current()
        }
    }

    /// 保存的栈指针必须落在内核栈或中断返回栈内。违反即内核状态不可信，
    /// 唯一正确的反应是立刻停机
    pub fn validate_stack(&self) {
        let (sp, interrupt_stack) =
            self.lock_inner_with(|inner| (inner.kernel_ctx.sp(), inner.interrupt_stack));
        // 栈顶本身是合法的初始 sp，上界取闭区间
        if self.kernel_stack.bottom() < sp && sp <= self.kernel_stack.top() {
            return;
        }
        if let Some(interrupt_stack) = interrupt_stack {
            if interrupt_stack.vaddr < sp && sp <= interrupt_stack.top() {
                return;
            }
        }
        panic!(
            "tid {} sp {:#x} outside kernel stack {:#x}..{:#x}",
            self.tid,
            sp,
            self.kernel_stack.bottom(),
            self.kernel_stack.top(),
        );
    }

    /// 进程回收用户栈时取走记录，避免重复解除映射
    pub(crate) fn take_stacks(&self) -> (Option<StackRange>, Option<StackRange>) {
        let mut inner = self.inner.lock();
        (inner.user_stack.take(), inner.interrupt_stack.take())
    }
}

pub struct ProtectedSectionGuard {
    thread: Arc<Thread>,
}

impl Drop for ProtectedSectionGuard {
    fn drop(&mut self) {
        let prev = self.thread.held_locks.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0);
    }
}

/// 新内核线程首次被调度到时的入口
fn kernel_thread_entry() -> ! {
    // 新栈上的第一件事：替被换下去的执行流收尾
    hart::finish_switch();
    let thread = hart::curr_thread().expect("kernel thread entry without current thread");
    let (entry, arg) = thread
        .lock_inner_with(|inner| inner.kernel_entry.take())
        .expect("kernel thread has no entry");
    entry(arg);
    // 入口函数返回即自然退出
    thread.on_exit()
}

/// 新用户线程首次被调度到时的入口：直接走返回用户态的路径
fn user_thread_entry() -> ! {
    hart::finish_switch();
    let thread = hart::curr_thread().expect("user thread entry without current thread");
    trap::return_to_user(&thread)
}

/// 进程清理载体的入口，见 [`Thread::setup_process_cleanup`]
fn process_cleanup_entry() -> ! {
    hart::finish_switch();
    let thread = hart::curr_thread().expect("cleanup entry without current thread");
    let process = thread
        .process
        .upgrade()
        .expect("cleanup entry without process");
    process.cleanup();
    thread.set_state(ThreadState::Terminated);
    sched::delete_current_process_and_thread(process)
}

#[cfg(test)]
mod tests {
    use defines::signal::{KSignalAction, SIG_IGN};

    use super::*;
    use crate::{sched::SCHEDULER, time};

    fn kernel_pair() -> (alloc::sync::Arc<Process>, Arc<Thread>) {
        let process = Process::new_bare("thread-test".into());
        let thread = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        process.add_thread(Arc::clone(&thread));
        (process, thread)
    }

    fn install_handler(process: &Process, signal: Signal) {
        process.with_signals(|sig| {
            *sig.handlers.action_mut(signal) = KSignalAction {
                handler: 0x5000,
                flags: SignalActionFlags::empty(),
                restorer: 0x6000,
                mask: 0,
            };
        });
    }

    #[test]
    fn repeated_sends_coalesce_into_one_delivery() {
        let (process, thread) = kernel_pair();
        install_handler(&process, Signal::SIGUSR1);

        assert!(thread.add_signal(Signal::SIGUSR1));
        assert!(thread.add_signal(Signal::SIGUSR1));
        assert!(thread.is_interrupted_by_signal());

        thread.handle_signal(None);
        // 第二次发送没有排队：一次投递之后什么都不剩
        assert!(!thread.is_interrupted_by_signal());
        assert!(thread.with_signal_state(|sig| sig.pending.is_empty()));
    }

    #[test]
    fn blocked_mask_suppresses_recording() {
        let (process, thread) = kernel_pair();
        install_handler(&process, Signal::SIGUSR1);

        thread.with_signal_state(|sig| sig.blocked.insert(Signal::SIGUSR1.into()));
        assert!(!thread.add_signal(Signal::SIGUSR1));
        assert!(!thread.add_signal(Signal::SIGUSR1));
        assert!(thread.with_signal_state(|sig| sig.pending.is_empty()));
        assert!(!thread.is_interrupted_by_signal());
    }

    #[test]
    fn default_ignored_signals_never_wake_a_blocked_thread() {
        let (_process, thread) = kernel_pair();
        let tid = thread.tid();
        let blocker = ThreadBlocker::new();
        blocker.add_waiter(tid);
        SCHEDULER.enqueue_blocked(&thread, blocker.queue_weak());

        // 处置是默认忽略，发送时刻就被判成 no-op
        assert!(!thread.add_signal(Signal::SIGCHLD));
        assert!(!thread.add_signal(Signal::SIGURG));
        assert!(SCHEDULER.is_blocked(tid));
        assert!(!SCHEDULER.is_ready(tid));
        assert!(blocker.has_waiter(tid));
        assert!(!thread.is_interrupted_by_signal());
    }

    #[test]
    fn explicitly_ignored_signal_is_noop_at_send() {
        let (process, thread) = kernel_pair();
        process.with_signals(|sig| {
            sig.handlers.action_mut(Signal::SIGUSR2).handler = SIG_IGN;
        });
        assert!(!thread.add_signal(Signal::SIGUSR2));
        assert!(thread.with_signal_state(|sig| sig.pending.is_empty()));
    }

    #[test]
    fn handler_injection_and_sigreturn_round_trip() {
        let (process, thread) = kernel_pair();
        install_handler(&process, Signal::SIGUSR1);
        let original = thread.lock_inner_with(|inner| {
            inner.trap_context.sepc = 0x1234;
            *inner.trap_context.a0_mut() = 77;
            inner.trap_context.clone()
        });

        assert!(thread.add_signal(Signal::SIGUSR1));
        thread.handle_signal(None);

        thread.lock_inner_with(|inner| {
            assert_eq!(inner.trap_context.sepc, 0x5000);
            assert_eq!(inner.trap_context.user_regs[9], Signal::SIGUSR1 as usize);
            assert_eq!(inner.trap_context.user_regs[0], 0x6000);
            assert_eq!(inner.signal_stack.len(), 1);
        });
        // handler 执行期间自己被掩蔽
        assert!(thread.with_signal_state(|sig| sig.blocked.contains(Signal::SIGUSR1.into())));

        let restored_a0 = thread.sigreturn().unwrap();
        assert_eq!(restored_a0, 77);
        thread.lock_inner_with(|inner| {
            assert_eq!(inner.trap_context, original);
            assert!(inner.signal_stack.is_empty());
        });
        assert!(!thread.with_signal_state(|sig| sig.blocked.contains(Signal::SIGUSR1.into())));

        // 没有可弹出的现场时是 EINVAL
        assert_eq!(thread.sigreturn().err(), Some(errno::EINVAL));
    }

    #[test]
    fn default_terminate_exits_process_with_128_plus_signo() {
        let (process, thread) = kernel_pair();
        assert!(thread.add_signal(Signal::SIGTERM));
        thread.handle_signal(None);
        assert!(process.is_exited());
        let status = process.status.load(Ordering::SeqCst);
        assert_eq!(status.exit_code(), Some(128 + Signal::SIGTERM as u8));
        assert!(status.signaled());
        assert!(!status.dumped());
    }

    #[test]
    fn core_dump_group_is_tagged_dumped() {
        let (process, thread) = kernel_pair();
        thread.handle_signal(Some(Signal::SIGSEGV));
        let status = process.status.load(Ordering::SeqCst);
        assert_eq!(status.exit_code(), Some(128 + Signal::SIGSEGV as u8));
        assert!(status.dumped());
    }

    #[test]
    #[should_panic(expected = "job control")]
    fn stop_signals_are_fatal_if_reached() {
        let (_process, thread) = kernel_pair();
        thread.handle_signal(Some(Signal::SIGTSTP));
    }

    #[test]
    fn pending_signal_fails_fast_with_eintr_before_blocking() {
        let (process, thread) = kernel_pair();
        install_handler(&process, Signal::SIGUSR1);
        assert!(thread.add_signal(Signal::SIGUSR1));

        let blocker = ThreadBlocker::new();
        assert_eq!(
            thread.block_or_eintr_indefinite(&blocker),
            Err(errno::EINTR)
        );
        // 从未真正挂起
        assert_eq!(blocker.waiter_count(), 0);
        assert!(!SCHEDULER.is_blocked(thread.tid()));
    }

    /// 带超时的阻塞等待中途被信号打断：必须在 deadline 之前以 EINTR
    /// 醒来，而不是等到超时
    #[test]
    fn signal_interrupts_timed_block_before_deadline() {
        let (process, thread) = kernel_pair();
        let tid = thread.tid();
        install_handler(&process, Signal::SIGUSR1);

        let deadline = hal::get_time_ms() + 500;
        let blocker = ThreadBlocker::new();
        blocker.add_waiter(tid);
        SCHEDULER.enqueue_blocked(&thread, blocker.queue_weak());
        time::register_timer(deadline, tid);

        // 信号到达：线程立刻回到就绪队列，退出等待队列
        assert!(thread.add_signal(Signal::SIGUSR1));
        assert!(SCHEDULER.is_ready(tid));
        assert!(!blocker.has_waiter(tid));
        assert!(hal::get_time_ms() < deadline);

        // 醒来后的三分：信号优先于超时
        assert_eq!(
            thread.classify_wakeup(Some(deadline), true),
            Err(errno::EINTR)
        );

        // 返回用户态时 handler 被注入，原先的部分结果被换成 handler 现场
        thread.handle_signal(None);
        thread.lock_inner_with(|inner| {
            assert_eq!(inner.trap_context.sepc, 0x5000);
        });
    }

    #[test]
    fn wakeup_without_signal_after_deadline_is_etimedout() {
        let (_process, thread) = kernel_pair();
        let deadline = hal::get_time_ms() + 5;
        hal::advance_time_ms(5);
        assert_eq!(
            thread.classify_wakeup(Some(deadline), true),
            Err(errno::ETIMEDOUT)
        );
        // 调用方不要求 ETIMEDOUT 语义时按成功返回
        assert_eq!(thread.classify_wakeup(Some(deadline), false), Ok(()));
    }

    #[test]
    fn clone_thread_round_trips_float_state_and_primes_child() {
        let process = Process::new_bare("clone-src".into());
        let thread = Thread::create_userspace(&process).unwrap();
        process.add_thread(Arc::clone(&thread));
        let user_stack = thread
            .lock_inner_with(|inner| inner.user_stack)
            .unwrap();
        thread.setup_exec(0x1000, user_stack.top(), 0, 0, 0);
        thread.set_state(ThreadState::Executing);

        thread.lock_inner_with(|inner| {
            inner.trap_context.float_regs.regs[0] = 3.25;
            inner.trap_context.float_regs.regs[31] = -1.5;
            inner.trap_context.float_regs.fcsr = 0x1f;
        });
        process.lock_inner_with(|inner| {
            inner
                .memory_space
                .write(user_stack.vaddr + 64, b"stack contents")
        })
        .unwrap();

        let child_process = Process::new_bare("clone-dst".into());
        let child = thread
            .clone_thread(&child_process, 0x3f_dead_0000, 0x4321)
            .unwrap();

        assert_eq!(child.state.load(Ordering::SeqCst), ThreadState::NotStarted);
        child.lock_inner_with(|inner| {
            assert_eq!(inner.trap_context.sp(), 0x3f_dead_0000);
            assert_eq!(inner.trap_context.sepc, 0x4321);
            // 子线程按约定返回 0
            assert_eq!(inner.trap_context.user_regs[9], 0);
            assert_eq!(inner.trap_context.float_regs.regs[0], 3.25);
            assert_eq!(inner.trap_context.float_regs.regs[31], -1.5);
            assert_eq!(inner.trap_context.float_regs.fcsr, 0x1f);
        });
        // 栈内容被复制进了新进程的地址空间
        let mut buf = [0_u8; 14];
        child_process
            .lock_inner_with(|inner| inner.memory_space.read(user_stack.vaddr + 64, &mut buf))
            .unwrap();
        assert_eq!(&buf, b"stack contents");
    }

    #[test]
    fn setup_process_cleanup_masks_all_signals() {
        let (_process, thread) = kernel_pair();
        thread.add_signal(Signal::SIGTERM);
        thread.setup_process_cleanup();
        thread.with_signal_state(|sig| {
            assert_eq!(sig.blocked, KSignalSet::all());
            assert!(sig.pending.is_empty());
        });
        assert!(!thread.is_interrupted_by_signal());
    }

    #[test]
    #[should_panic(expected = "outside kernel stack")]
    fn corrupted_stack_pointer_is_fatal() {
        let (_process, thread) = kernel_pair();
        thread.lock_inner_with(|inner| {
            inner.kernel_ctx = hal::TaskContext::goto(0, 0xdead_beef);
        });
        thread.validate_stack();
    }

    #[test]
    fn fresh_thread_passes_stack_validation() {
        let (_process, thread) = kernel_pair();
        thread.validate_stack();
    }

    #[test]
    fn protected_section_gates_signal_injection() {
        let process = Process::new_bare("section-test".into());
        let thread = Thread::create_userspace(&process).unwrap();
        process.add_thread(Arc::clone(&thread));
        install_handler(&process, Signal::SIGUSR1);
        thread.set_state(ThreadState::Executing);
        assert!(thread.add_signal(Signal::SIGUSR1));
        assert!(thread.can_add_signal_to_execute());

        {
            let _guard = thread.protected_section();
            assert!(!thread.can_add_signal_to_execute());
            // 但信号本身仍然构成打断
            assert!(thread.is_interrupted_by_signal());
        }
        assert!(thread.can_add_signal_to_execute());
    }

    #[test]
    fn process_wide_pending_signals_are_visible_to_threads() {
        let (process, thread) = kernel_pair();
        install_handler(&process, Signal::SIGINT);
        assert!(process.send_signal(Signal::SIGINT));
        assert!(thread.is_interrupted_by_signal());

        thread.handle_signal(None);
        // 两级 pending 都被清除
        assert!(process.pending_signals().is_empty());
        assert!(!thread.is_interrupted_by_signal());
    }
}

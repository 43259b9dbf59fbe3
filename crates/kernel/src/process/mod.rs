//! 进程：地址空间与共享资源的持有者。
//!
//! 进程强持有线程，线程弱引用进程；进程的寿命到最后一个线程退出并
//! 完成清理为止。清理由最后退出的那个线程充当载体来执行，因为释放
//! 一个地址空间不能在它自己的映射里进行。
//!
//! 释放顺序是硬约束：fd 表、进程内分配器先于地址空间

mod allocator;
mod exec;
mod inner;
mod manager;

use alloc::{
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{num::NonZeroUsize, sync::atomic::Ordering};

use atomic::Atomic;
use compact_str::CompactString;
use defines::error::{errno, KResult};
use idallocator::RecycleAllocator;
use klocks::{SpinMutex, SpinMutexGuard, SpinNoIrqMutex};

pub use self::allocator::{FixedWidthAllocator, GeneralAllocator};
pub use self::inner::ProcessInner;
pub use self::manager::{ProcessManager, PROCESS_MANAGER};
use crate::{
    fs::FdTable,
    hart,
    memory::MemorySpace,
    sched,
    signal::{Disposition, KSignalSet, Signal, SignalHandlers},
    thread::{Thread, ThreadBlocker},
};

static PID_ALLOCATOR: SpinMutex<RecycleAllocator> = SpinMutex::new(RecycleAllocator::begin_with(1));

/// 进程级的信号状态：处置表 + 进程范围的 pending 集。
///
/// 自己一把锁，与任何线程的信号锁分开；嵌套时先拿进程的再拿线程的
pub struct ProcessSignals {
    pub handlers: SignalHandlers,
    pub pending: KSignalSet,
}

pub struct Process {
    pid: usize,
    pub status: Atomic<ProcessStatus>,
    /// 父进程 wait4 时在这里等子进程退出
    pub wait4_blocker: ThreadBlocker,
    sig: SpinNoIrqMutex<ProcessSignals>,
    inner: SpinMutex<ProcessInner>,
}

impl Process {
    pub(crate) fn new_bare(name: CompactString) -> Arc<Self> {
        Arc::new(Self {
            pid: PID_ALLOCATOR.lock().alloc(),
            status: Atomic::new(ProcessStatus::normal()),
            wait4_blocker: ThreadBlocker::new(),
            sig: SpinNoIrqMutex::new(ProcessSignals {
                handlers: SignalHandlers::new(),
                pending: KSignalSet::empty(),
            }),
            inner: SpinMutex::new(ProcessInner {
                name,
                memory_space: MemorySpace::new(),
                parent: Weak::new(),
                children: Vec::new(),
                cwd: CompactString::const_new("/"),
                fd_table: FdTable::empty(),
                fixed_allocators: Vec::new(),
                general_allocator: None,
                threads: alloc::collections::BTreeMap::new(),
            }),
        })
    }

    /// 内核进程：一个内核线程挂在一个没有用户地址空间的进程下
    pub fn create_kernel(
        name: CompactString,
        entry: fn(usize),
        arg: usize,
    ) -> KResult<Arc<Self>> {
        let process = Self::new_bare(name);
        let thread = Thread::create_kernel(entry, arg, &process)?;
        process.add_thread(Arc::clone(&thread));
        PROCESS_MANAGER.add(process.pid, &process);
        let registered = scopeguard::guard((), |()| PROCESS_MANAGER.remove(process.pid));
        sched::add_thread(thread)?;
        scopeguard::ScopeGuard::into_inner(registered);
        Ok(process)
    }

    /// 用户进程：校验并装载镜像、铺好 argv、挂上主线程、注册调度。
    ///
    /// 镜像字节由调用方（外部的加载器/文件系统）提供
    pub fn create_userspace(
        path: CompactString,
        elf_data: &[u8],
        args: Vec<CompactString>,
    ) -> KResult<Arc<Self>> {
        let _enter = info_span!("spawn process", path = path).entered();
        let mut process_name = path;
        for arg in args.iter().skip(1) {
            process_name.push(' ');
            process_name.push_str(arg);
        }

        let mut memory_space = MemorySpace::new();
        let elf_entry = exec::load_elf(&mut memory_space, elf_data)?;

        let process = Self::new_bare(process_name);
        process.lock_inner_with(|inner| {
            inner.memory_space = memory_space;
            inner.fd_table = FdTable::with_stdio();
        });

        let thread = Thread::create_userspace(&process)?;
        let (user_sp, argv_base, envp_base) = {
            let stack_top = thread
                .lock_inner_with(|inner| inner.user_stack.expect("fresh user thread has a stack"))
                .top();
            let mut inner = process.lock_inner();
            exec::init_stack(&mut inner.memory_space, stack_top, &args, &[])?
        };
        thread.setup_exec(elf_entry, user_sp, args.len(), argv_base, envp_base);

        process.add_thread(Arc::clone(&thread));
        PROCESS_MANAGER.add(process.pid, &process);
        let registered = scopeguard::guard((), |()| PROCESS_MANAGER.remove(process.pid));
        sched::add_thread(thread)?;
        scopeguard::ScopeGuard::into_inner(registered);
        Ok(process)
    }

    /// fork：克隆地址空间与主线程。目前只支持单线程进程。
    ///
    /// `stack` 若给出则指定子进程主线程的栈顶
    pub fn fork(self: &Arc<Self>, stack: Option<NonZeroUsize>) -> KResult<Arc<Self>> {
        let child = {
            let inner = self.lock_inner();
            assert_eq!(inner.threads.len(), 1, "fork of multi-threaded process");
            let child = Self::new_bare(inner.name.clone());
            {
                let mut child_inner = child.lock_inner();
                child_inner.memory_space = MemorySpace::clone_from_other(&inner.memory_space)?;
                child_inner.cwd = inner.cwd.clone();
                child_inner.fd_table = inner.fd_table.clone();
                child_inner.parent = Arc::downgrade(self);
            }
            child
        };
        // 处置表继承，pending 不继承
        let handlers = self.with_signals(|sig| sig.handlers.clone());
        child.with_signals(|sig| sig.handlers = handlers);

        let main_thread = self.lock_inner_with(|inner| inner.main_thread());
        let (mut sp, ip) =
            main_thread.lock_inner_with(|inner| (inner.trap_context.sp(), inner.trap_context.sepc));
        if let Some(stack) = stack {
            sp = stack.get();
        }
        let child_thread = main_thread.clone_thread(&child, sp, ip)?;
        child.add_thread(Arc::clone(&child_thread));

        self.lock_inner_with(|inner| inner.children.push(Arc::clone(&child)));
        PROCESS_MANAGER.add(child.pid, &child);
        let registered = scopeguard::guard((), |()| PROCESS_MANAGER.remove(child.pid));
        sched::add_thread(child_thread)?;
        scopeguard::ScopeGuard::into_inner(registered);
        Ok(child)
    }

    /// exec：用新镜像替换当前映像。要求单线程。
    ///
    /// 线程的信号掩码保留，处置表全部回到默认
    pub fn exec(
        &self,
        path: CompactString,
        elf_data: &[u8],
        args: Vec<CompactString>,
    ) -> KResult<()> {
        let mut process_name = path;
        for arg in args.iter().skip(1) {
            process_name.push(' ');
            process_name.push_str(arg);
        }

        self.with_signals(|sig| sig.handlers.reset());

        let mut inner = self.lock_inner();
        assert_eq!(inner.threads.len(), 1, "exec of multi-threaded process");
        let main_thread = inner.main_thread();
        // 旧映像整体作废，线程栈随后重新分配
        let _ = main_thread.take_stacks();
        inner.memory_space.recycle_user_pages();
        let elf_entry = exec::load_elf(&mut inner.memory_space, elf_data)?;
        let user_stack = crate::memory::alloc_user_stack(&mut inner.memory_space)?;
        let interrupt_stack = crate::memory::alloc_interrupt_stack(&mut inner.memory_space)?;
        let (user_sp, argv_base, envp_base) =
            exec::init_stack(&mut inner.memory_space, user_stack.top(), &args, &[])?;
        inner.name = process_name;
        inner.fd_table.close_on_exec();
        drop(inner);

        main_thread.lock_inner_with(|thread_inner| {
            thread_inner.user_stack = Some(user_stack);
            thread_inner.interrupt_stack = Some(interrupt_stack);
        });
        main_thread.setup_exec(elf_entry, user_sp, args.len(), argv_base, envp_base);
        Ok(())
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn lock_inner(&self) -> SpinMutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    /// 锁 inner 然后进行操作，这是一个便捷方法。持锁期间算作临界区，
    /// 不向当前线程注入信号
    pub fn lock_inner_with<T>(&self, f: impl FnOnce(&mut ProcessInner) -> T) -> T {
        let _section = hart::protected_section();
        f(&mut self.inner.lock())
    }

    pub fn with_signals<T>(&self, f: impl FnOnce(&mut ProcessSignals) -> T) -> T {
        f(&mut self.sig.lock())
    }

    pub fn pending_signals(&self) -> KSignalSet {
        self.sig.lock().pending
    }

    pub fn add_thread(&self, thread: Arc<Thread>) {
        let mut inner = self.inner.lock();
        inner.threads.insert(thread.tid(), thread);
    }

    /// 线程退出时回调。把线程从集合中摘除并立刻归还它的用户栈；
    /// 返回集合是否因此变空——变空即调用者须成为清理载体
    pub fn on_thread_exit(&self, thread: &Thread) -> bool {
        let (user_stack, interrupt_stack) = thread.take_stacks();
        let mut inner = self.inner.lock();
        inner.threads.remove(&thread.tid());
        for stack in [user_stack, interrupt_stack].into_iter().flatten() {
            inner.memory_space.remove_range(stack.vaddr);
        }
        let empty = inner.threads.is_empty();
        drop(inner);
        if empty {
            // 自然退出：进程退出码取最后一个线程的
            let code = thread.exit_code.load(Ordering::SeqCst) as u8;
            let _ = self.status.compare_exchange(
                ProcessStatus::normal(),
                ProcessStatus::exited(code, false, false),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        empty
    }

    /// 强制终止整个进程。幂等：并发到达的致命信号里只有第一个生效，
    /// 返回本次调用是否是生效的那一次。
    ///
    /// 线程不能被别人终止，这里只标记状态并唤醒所有线程，
    /// 它们在各自回到内核入口时发现标记、自行退出
    pub fn exit(&self, code: u8, signal: Option<Signal>, dumped: bool) -> bool {
        let new_status = ProcessStatus::exited(code, signal.is_some(), dumped);
        if self
            .status
            .compare_exchange(
                ProcessStatus::normal(),
                new_status,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }
        info!("process {} exits with status {:#x}", self.pid, new_status.bits());
        let tids: Vec<usize> =
            self.lock_inner_with(|inner| inner.threads.keys().copied().collect());
        for tid in tids {
            if hart::curr_tid() != Some(tid) {
                sched::unblock_thread(tid);
            }
        }
        true
    }

    /// 进程级信号：记入进程 pending，唤醒一个没有屏蔽它的线程去处理
    pub fn send_signal(&self, signal: Signal) -> bool {
        let recorded = self.with_signals(|sig| {
            if Disposition::of(sig.handlers.action(signal), signal).is_noop() {
                return false;
            }
            sig.pending.insert(signal.into());
            true
        });
        if recorded {
            let threads: Vec<Arc<Thread>> =
                self.lock_inner_with(|inner| inner.threads.values().cloned().collect());
            for thread in threads {
                let blocked =
                    thread.with_signal_state(|sig| sig.blocked.contains(signal.into()));
                if !blocked {
                    if hart::curr_tid() != Some(thread.tid()) {
                        sched::unblock_thread(thread.tid());
                    }
                    break;
                }
            }
        }
        recorded
    }

    /// 清理例程。由清理载体线程在线程集合清空之后执行。
    ///
    /// 顺序：fd 表 → 进程内分配器 → 地址空间，前两者可能依赖活着的
    /// 映射，这个顺序不可交换。之后注销进程、移交孤儿、通知父进程
    pub fn cleanup(&self) {
        let _enter = info_span!("process cleanup", pid = self.pid).entered();
        let (children, parent) = {
            let mut inner = self.inner.lock();
            debug_assert!(inner.threads.is_empty());
            inner.fd_table.clear();
            for allocator in core::mem::take(&mut inner.fixed_allocators) {
                allocator.release(&mut inner.memory_space);
            }
            if let Some(general) = inner.general_allocator.take() {
                general.release(&mut inner.memory_space);
            }
            inner.memory_space.recycle_user_pages();
            inner.cwd = CompactString::const_new("");
            (
                core::mem::take(&mut inner.children),
                core::mem::replace(&mut inner.parent, Weak::new()),
            )
        };

        // 孤儿交给 init 进程
        if !children.is_empty() {
            let init = PROCESS_MANAGER.init_proc();
            init.lock_inner_with(|init_inner| {
                for child in children {
                    child.lock_inner_with(|child_inner| {
                        child_inner.parent = Arc::downgrade(&init);
                    });
                    init_inner.children.push(child);
                }
            });
        }

        let status = self.status.load(Ordering::SeqCst);
        self.status.store(status.as_zombie(), Ordering::SeqCst);
        PROCESS_MANAGER.remove(self.pid);
        if self.pid == 1 {
            crate::SHUTDOWN.store(true, Ordering::SeqCst);
        }

        if let Some(parent) = parent.upgrade() {
            parent.send_signal(Signal::SIGCHLD);
            parent.wait4_blocker.unblock_all();
        }
    }

    /// 摘走一个已成僵尸的子进程。没有子进程时 `ECHILD`；
    /// 有但尚未退出时返回 `Ok(None)`，调用方应当阻塞等待
    pub fn take_zombie_child(
        &self,
        pid: Option<usize>,
    ) -> KResult<Option<(usize, ProcessStatus)>> {
        let mut inner = self.inner.lock();
        let candidates = inner
            .children
            .iter()
            .filter(|child| pid.is_none_or(|pid| child.pid() == pid))
            .count();
        if candidates == 0 {
            return Err(errno::ECHILD);
        }
        if let Some(pos) = inner
            .children
            .iter()
            .position(|child| child.is_zombie() && pid.is_none_or(|pid| child.pid() == pid))
        {
            let child = inner.children.remove(pos);
            return Ok(Some((child.pid(), child.status.load(Ordering::SeqCst))));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // 进程内堆
    // ------------------------------------------------------------------

    /// 不超过一页的请求按 2 的幂分档定宽分配，更大的走通用分配器
    pub fn allocate(&self, bytes: usize) -> KResult<usize> {
        if bytes == 0 {
            return Err(errno::EINVAL);
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if bytes <= defines::config::PAGE_SIZE {
            let class = bytes
                .next_power_of_two()
                .max(defines::config::FIXED_CLASS_MIN);
            for allocator in &mut inner.fixed_allocators {
                if allocator.allocation_size() == class {
                    if let Some(addr) = allocator.allocate() {
                        return Ok(addr);
                    }
                }
            }
            let mut allocator = FixedWidthAllocator::new(&mut inner.memory_space, class)?;
            let addr = allocator
                .allocate()
                .expect("fresh allocator has free slots");
            inner.fixed_allocators.push(allocator);
            Ok(addr)
        } else {
            let general = inner.general_allocator.get_or_insert_with(GeneralAllocator::new);
            general.allocate(&mut inner.memory_space, bytes)
        }
    }

    /// 归还 [`Process::allocate`] 给出的地址。不认识的指针只告警
    pub fn free(&self, addr: usize) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        for i in 0..inner.fixed_allocators.len() {
            if inner.fixed_allocators[i].deallocate(addr) {
                if inner.fixed_allocators[i].allocations() == 0 {
                    let allocator = inner.fixed_allocators.swap_remove(i);
                    allocator.release(&mut inner.memory_space);
                }
                return;
            }
        }
        if let Some(general) = &mut inner.general_allocator {
            if general.deallocate(&mut inner.memory_space, addr) {
                return;
            }
        }
        warn!("free called on pointer {addr:#x} that was not allocated");
    }

    pub fn cwd(&self) -> CompactString {
        self.lock_inner_with(|inner| inner.cwd.clone())
    }

    /// 由 chdir 一类路径调用。合法性（存在、是目录）由外部文件系统判定
    pub fn set_cwd(&self, cwd: CompactString) {
        debug_assert!(cwd.starts_with('/'));
        self.lock_inner_with(|inner| inner.cwd = cwd);
    }

    pub fn is_exited(&self) -> bool {
        self.status.load(Ordering::SeqCst).is_exited()
    }

    pub fn is_zombie(&self) -> bool {
        self.status.load(Ordering::SeqCst).is_zombie()
    }

    pub fn exit_code(&self) -> Option<u8> {
        self.status.load(Ordering::SeqCst).exit_code()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        PID_ALLOCATOR.lock().dealloc(self.pid);
    }
}

/// 进程状态，打包在一个原子量里。
///
/// 低 8 位是退出码；第 8~9 位是阶段（0 正常、1 已标记退出、2 僵尸）；
/// 第 10 位表示因信号退出，第 11 位表示带核心转储
#[derive(bytemuck::NoUninit, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ProcessStatus(u16);

impl ProcessStatus {
    const PHASE_MASK: u16 = 0b11 << 8;
    const PHASE_EXITED: u16 = 1 << 8;
    const PHASE_ZOMBIE: u16 = 2 << 8;
    const FLAG_SIGNALED: u16 = 1 << 10;
    const FLAG_DUMPED: u16 = 1 << 11;

    pub fn normal() -> Self {
        Self(0)
    }

    pub fn exited(code: u8, signaled: bool, dumped: bool) -> Self {
        let mut bits = Self::PHASE_EXITED | u16::from(code);
        if signaled {
            bits |= Self::FLAG_SIGNALED;
        }
        if dumped {
            bits |= Self::FLAG_DUMPED;
        }
        Self(bits)
    }

    /// 资源回收完毕，保留退出码与原因，阶段推进到僵尸
    pub fn as_zombie(self) -> Self {
        Self((self.0 & !Self::PHASE_MASK) | Self::PHASE_ZOMBIE)
    }

    pub fn is_exited(self) -> bool {
        self.0 & Self::PHASE_MASK != 0
    }

    pub fn is_zombie(self) -> bool {
        self.0 & Self::PHASE_MASK == Self::PHASE_ZOMBIE
    }

    pub fn exit_code(self) -> Option<u8> {
        if self.is_exited() {
            Some(self.0 as u8)
        } else {
            None
        }
    }

    pub fn signaled(self) -> bool {
        self.0 & Self::FLAG_SIGNALED != 0
    }

    pub fn dumped(self) -> bool {
        self.0 & Self::FLAG_DUMPED != 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::exec::tests::tiny_elf;
    use super::*;
    use crate::{
        fs::{FdFlags, NullFile},
        thread::ThreadState,
    };

    #[test]
    fn last_thread_exit_designates_the_cleanup_vehicle() {
        let process = Process::new_bare("two-threads".into());
        let t1 = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        let t2 = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        process.add_thread(Arc::clone(&t1));
        process.add_thread(Arc::clone(&t2));

        assert!(!process.on_thread_exit(&t1));
        // 只有最后一个退出者得到「集合已空」的答复，它将成为清理载体
        assert!(process.on_thread_exit(&t2));
        assert!(process.is_exited());
    }

    #[test]
    fn concurrent_fatal_signals_run_exit_exactly_once() {
        let process = Process::new_bare("kill-race".into());
        let thread = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        process.add_thread(thread);

        let process = &process;
        let wins: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(move || {
                        usize::from(process.exit(
                            128 + Signal::SIGKILL as u8,
                            Some(Signal::SIGKILL),
                            false,
                        ))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(wins, 1);
        assert_eq!(
            process.exit_code(),
            Some(128 + Signal::SIGKILL as u8)
        );
    }

    #[test]
    fn cleanup_releases_resources_in_order_and_goes_zombie() {
        let process = Process::new_bare("cleanup".into());
        let thread = Thread::create_kernel(|_| {}, 0, &process).unwrap();
        process.add_thread(Arc::clone(&thread));
        PROCESS_MANAGER.add(process.pid(), &process);

        let small = process.allocate(100).unwrap();
        let large = process.allocate(3 * defines::config::PAGE_SIZE).unwrap();
        assert_ne!(small, large);
        process.lock_inner_with(|inner| {
            inner
                .fd_table
                .insert(Arc::new(NullFile), FdFlags::empty())
                .unwrap();
        });

        assert!(process.on_thread_exit(&thread));
        thread.setup_process_cleanup();
        process.cleanup();

        assert!(process.is_zombie());
        process.lock_inner_with(|inner| {
            assert_eq!(inner.fd_table.open_count(), 0);
            assert!(inner.fixed_allocators.is_empty());
            assert!(inner.general_allocator.is_none());
            assert!(inner.memory_space.is_empty());
        });
        assert!(PROCESS_MANAGER.get(process.pid()).is_none());
    }

    #[test]
    fn small_allocations_share_a_size_class_page() {
        let process = Process::new_bare("alloc".into());
        let a = process.allocate(24).unwrap();
        let b = process.allocate(30).unwrap();
        // 同一档（32 字节）出自同一页
        assert_eq!(a & !(defines::config::PAGE_SIZE - 1), b & !(defines::config::PAGE_SIZE - 1));
        process.free(a);
        let c = process.allocate(25).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn freeing_an_unknown_pointer_is_a_warning_not_a_crash() {
        let process = Process::new_bare("bad-free".into());
        process.free(0xdead_0000);
        // 已有分配不受影响
        let addr = process.allocate(64).unwrap();
        process.free(addr);
    }

    #[test]
    fn fork_clones_image_and_child_returns_zero() {
        let elf = tiny_elf(goblin::elf::header::EM_RISCV, 0x4_0000, b"\x73\x00\x00\x00");
        let parent = Process::create_userspace(
            "/initproc".into(),
            &elf,
            alloc::vec!["/initproc".into()],
        )
        .unwrap();
        let parent_thread = parent.lock_inner_with(|inner| inner.main_thread());
        parent_thread.set_state(ThreadState::Executing);

        let child = parent.fork(None).unwrap();
        assert_ne!(child.pid(), parent.pid());
        assert!(PROCESS_MANAGER.get(child.pid()).is_some());
        parent.lock_inner_with(|inner| {
            assert_eq!(inner.children.len(), 1);
            assert_eq!(inner.children[0].pid(), child.pid());
        });

        let child_thread = child.lock_inner_with(|inner| inner.main_thread());
        child_thread.lock_inner_with(|inner| {
            // 子进程的返回值约定
            assert_eq!(inner.trap_context.user_regs[9], 0);
        });
        // 镜像内容确实被克隆
        let mut buf = [0_u8; 4];
        child
            .lock_inner_with(|inner| inner.memory_space.read(0x4_0000, &mut buf))
            .unwrap();
        assert_eq!(&buf, b"\x73\x00\x00\x00");

        // 子进程退出、清理之后，父进程可以收尸
        assert_eq!(parent.take_zombie_child(None).unwrap(), None);
        assert!(child.on_thread_exit(&child_thread));
        child.cleanup();
        let (pid, status) = parent.take_zombie_child(None).unwrap().unwrap();
        assert_eq!(pid, child.pid());
        assert!(status.is_zombie());
        // 再 wait 就没有子进程了
        assert_eq!(parent.take_zombie_child(None).err(), Some(errno::ECHILD));
    }

    #[test]
    fn wait_with_no_children_is_echild() {
        let process = Process::new_bare("childless".into());
        assert_eq!(process.take_zombie_child(None).err(), Some(errno::ECHILD));
    }

    #[test]
    fn exec_resets_handlers_and_replaces_image() {
        let elf = tiny_elf(goblin::elf::header::EM_RISCV, 0x4_0000, b"\x13\x00\x00\x00");
        let process = Process::create_userspace(
            "/initproc".into(),
            &elf,
            alloc::vec!["/initproc".into()],
        )
        .unwrap();
        process.with_signals(|sig| {
            sig.handlers.action_mut(Signal::SIGUSR1).handler = 0x5000;
        });
        let thread = process.lock_inner_with(|inner| inner.main_thread());
        let old_mask = thread.with_signal_state(|sig| {
            sig.blocked.insert(Signal::SIGUSR2.into());
            sig.blocked
        });

        let new_elf = tiny_elf(goblin::elf::header::EM_RISCV, 0x8_0000, b"\x13\x00\x00\x00");
        process
            .exec("/shell".into(), &new_elf, alloc::vec!["/shell".into()])
            .unwrap();

        // 处置表回到默认，线程掩码保留
        process.with_signals(|sig| {
            assert_eq!(
                sig.handlers.action(Signal::SIGUSR1).handler,
                defines::signal::SIG_DFL
            );
        });
        assert_eq!(thread.with_signal_state(|sig| sig.blocked), old_mask);
        thread.lock_inner_with(|inner| {
            assert_eq!(inner.trap_context.sepc, 0x8_0000);
        });
        process.lock_inner_with(|inner| {
            assert!(inner.name.starts_with("/shell"));
        });
    }
}

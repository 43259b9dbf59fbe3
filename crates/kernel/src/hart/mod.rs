//! per-hart 状态。
//!
//! 每个 hart 一个 [`Hart`] 结构：当前线程、idle 执行流、以及一格
//! 「切换完成后待收尾」的暂存。当前线程指针只存在于这里，没有任何
//! 文件级的 current 变量。
//!
//! riscv64 上 `tp` 保存本 hart 结构的地址；hosted 后端用一个显式的
//! 活动 hart 下标代替，便于在宿主机上驱动这套结构

use alloc::sync::Arc;
use core::cell::UnsafeCell;

use defines::config::HART_NUM;
use hal::TaskContext;

use crate::{
    process::Process,
    sched::SwitchOut,
    thread::{ProtectedSectionGuard, Thread},
};

/// 可以认为代表一个处理器，存放 per-hart 的数据。
///
/// 只会被本 hart 访问，不会被并行访问
#[repr(align(64))]
pub struct Hart {
    hart_id: usize,
    /// 当前 hart 上正在运行的线程。idle 时为 None
    thread: Option<Arc<Thread>>,
    /// 本 hart 的 idle 执行流（启动栈）。从不进入全局就绪队列
    idle_ctx: TaskContext,
    /// 刚被切换走的线程，等接手的执行流替它收尾
    pending: Option<(Arc<Thread>, SwitchOut)>,
}

impl Hart {
    const fn new() -> Self {
        Self {
            hart_id: 0,
            thread: None,
            idle_ctx: TaskContext::zeroed(),
            pending: None,
        }
    }
}

struct PerHart(UnsafeCell<Hart>);

// SAFETY: 每个 Hart 只被它自己的 hart 访问
unsafe impl Sync for PerHart {}

static HARTS: [PerHart; HART_NUM] = [const { PerHart(UnsafeCell::new(Hart::new())) }; HART_NUM];

#[cfg(target_arch = "riscv64")]
pub fn local_hart() -> *mut Hart {
    let tp: usize;
    unsafe {
        core::arch::asm!("mv {}, tp", out(reg) tp);
    }
    tp as *mut Hart
}

/// 设置当前 hart 的 `Hart` 结构，将 `tp` 设置为其地址。
///
/// # Safety
///
/// 须保证由不同 hart 各调用一次
#[cfg(target_arch = "riscv64")]
pub unsafe fn set_local_hart(hart_id: usize) {
    let hart = HARTS[hart_id].0.get();
    unsafe {
        (*hart).hart_id = hart_id;
        core::arch::asm!("mv tp, {}", in(reg) hart as usize);
    }
}

#[cfg(not(target_arch = "riscv64"))]
static ACTIVE_HART: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

#[cfg(not(target_arch = "riscv64"))]
pub fn local_hart() -> *mut Hart {
    let id = ACTIVE_HART.load(core::sync::atomic::Ordering::SeqCst);
    HARTS[id].0.get()
}

pub fn hart_id() -> usize {
    unsafe { (*local_hart()).hart_id }
}

pub fn curr_thread() -> Option<Arc<Thread>> {
    unsafe { (*local_hart()).thread.clone() }
}

pub fn curr_tid() -> Option<usize> {
    unsafe { (*local_hart()).thread.as_ref().map(|thread| thread.tid()) }
}

pub fn curr_process() -> Option<Arc<Process>> {
    unsafe {
        (*local_hart())
            .thread
            .as_ref()
            .and_then(|thread| thread.process.upgrade())
    }
}

/// 当前线程（若有）进入一段不注入信号的临界区
pub fn protected_section() -> Option<ProtectedSectionGuard> {
    curr_thread().map(|thread| thread.protected_section())
}

/// 调度器选定 next 之后的机械切换。
///
/// prev 的去向（回就绪队列 / 已在阻塞表 / 待销毁）由接手的执行流在
/// [`finish_switch`] 里收尾：prev 的栈在切换完成前仍在被使用，任何
/// 导致它被重新调度或释放的动作都必须推迟到切换之后
pub(crate) fn switch_to(next: Option<Arc<Thread>>, how: SwitchOut) {
    let hart = unsafe { &mut *local_hart() };
    if let Some(next) = &next {
        next.validate_stack();
    }
    let prev = core::mem::replace(&mut hart.thread, next);
    let prev_ctx: *mut TaskContext = match &prev {
        Some(prev) => prev.lock_inner_with(|inner| &mut inner.kernel_ctx as *mut _),
        None => &mut hart.idle_ctx,
    };
    let next_ctx: *const TaskContext = match &hart.thread {
        Some(next) => next.lock_inner_with(|inner| &inner.kernel_ctx as *const _),
        None => &hart.idle_ctx,
    };
    if let Some(prev) = prev {
        debug_assert!(hart.pending.is_none());
        hart.pending = Some((prev, how));
    }
    if core::ptr::eq(prev_ctx, next_ctx) {
        // 没有别的执行流可去（idle 让出给 idle）
        finish_switch();
        return;
    }
    unsafe { hal::switch(prev_ctx, next_ctx) };
    // 再次被调度到，先替换走我们的那一方收尾
    finish_switch();
}

/// 切换完成后的收尾：上一个执行流离开了它的栈，现在可以安全地
/// 重新入队或销毁它
pub fn finish_switch() {
    let hart = unsafe { &mut *local_hart() };
    let Some((prev, how)) = hart.pending.take() else {
        return;
    };
    match how {
        SwitchOut::Ready => {
            if let Err(e) = crate::sched::add_thread(prev) {
                // 放不回队列的线程会永远失踪，必须可见
                error!("requeue after switch failed: {e:?}");
            }
        }
        // 阻塞表持有自己的引用，这里的那份放掉即可
        SwitchOut::Blocked => drop(prev),
        // 栈与线程结构在这里释放；若它是进程清理载体，进程一并销毁
        SwitchOut::Exited => drop(prev),
        SwitchOut::Reprimed => unreachable!("reprimed thread keeps its identity"),
    }
}

/// 丢掉当前现场，从刚装配好的入口重新进入当前线程
pub(crate) fn reenter_current() -> ! {
    let hart = unsafe { &mut *local_hart() };
    let thread = hart
        .thread
        .as_ref()
        .expect("reenter without current thread");
    let next_ctx: *const TaskContext =
        thread.lock_inner_with(|inner| &inner.kernel_ctx as *const _);
    // 旧现场作废，保存进一个一次性的壳里
    let mut scratch = TaskContext::zeroed();
    unsafe { hal::switch(&mut scratch, next_ctx) };
    unreachable!("discarded context was resumed")
}

pub(crate) fn switch_to_idle(how: SwitchOut) {
    switch_to(None, how);
}

/// 让其他 hart 尽快重新审视就绪队列
pub fn notify_other_harts() {
    let current = hart_id();
    for id in 0..HART_NUM {
        if id != current {
            hal::send_reschedule_ipi(id);
        }
    }
}

pub fn shutdown() -> ! {
    info!("system shutdown");
    #[cfg(target_arch = "riscv64")]
    {
        sbi_rt::system_reset(sbi_rt::Shutdown, sbi_rt::NoReason);
        unreachable!()
    }
    #[cfg(not(target_arch = "riscv64"))]
    panic!("system halted");
}

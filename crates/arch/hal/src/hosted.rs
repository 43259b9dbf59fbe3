//! 宿主机后端。
//!
//! 没有特权指令可用，因此「关中断」退化为一个深度计数，时钟退化为一个
//! 手动推进的单调计数器。调度、信号、生命周期等核心逻辑在这个后端上
//! 单元测试；真正的上下文切换只有 riscv64 后端才能执行

use core::{
    marker::PhantomData,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use defines::trap_context::FloatContext;

use crate::TaskContext;

pub(crate) unsafe fn switch_impl(_old: *mut TaskContext, _new: *const TaskContext) {
    panic!("context switch requires a target backend");
}

/// hosted 后端没有独立的浮点寄存器组，浮点状态完全活在 `FloatContext` 里
pub fn save_float(_ctx: &mut FloatContext) {}

pub fn restore_float(_ctx: &FloatContext) {}

static IRQ_DEPTH: AtomicUsize = AtomicUsize::new(0);

pub struct NoIrqGuard {
    _not_send: PhantomData<*const ()>,
}

impl NoIrqGuard {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        IRQ_DEPTH.fetch_add(1, Ordering::SeqCst);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for NoIrqGuard {
    fn drop(&mut self) {
        IRQ_DEPTH.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn interrupts_disabled() -> bool {
    IRQ_DEPTH.load(Ordering::SeqCst) > 0
}

/// 逻辑持有者标识，给递归锁用
pub fn owner_token() -> usize {
    #[cfg(test)]
    {
        std::thread_local! {
            static TOKEN: u8 = const { 0 };
        }
        TOKEN.with(|t| t as *const u8 as usize)
    }
    #[cfg(not(test))]
    {
        1
    }
}

static NOW_NS: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn get_time() -> usize {
    NOW_NS.load(Ordering::SeqCst) as usize
}

#[inline]
pub fn get_time_us() -> usize {
    get_time() / (crate::NANO_PER_SEC / crate::MICRO_PER_SEC)
}

#[inline]
pub fn get_time_ms() -> usize {
    get_time() / (crate::NANO_PER_SEC / crate::MILLI_PER_SEC)
}

/// 推进 hosted 时钟。由测试或宿主驱动调用
pub fn advance_time_ms(ms: usize) {
    NOW_NS.fetch_add((ms * (crate::NANO_PER_SEC / crate::MILLI_PER_SEC)) as u64, Ordering::SeqCst);
}

pub fn set_next_trigger() {}

static PENDING_IPIS: AtomicUsize = AtomicUsize::new(0);

/// 让目标 hart 尽快重新审视自己的就绪队列。
///
/// hosted 后端只记录请求，供测试断言
pub fn send_reschedule_ipi(hart_id: usize) {
    PENDING_IPIS.fetch_or(1 << hart_id, Ordering::SeqCst);
}

pub fn take_pending_ipis() -> usize {
    PENDING_IPIS.swap(0, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_guard_nests() {
        assert!(!interrupts_disabled());
        let outer = NoIrqGuard::new();
        {
            let _inner = NoIrqGuard::new();
            assert!(interrupts_disabled());
        }
        assert!(interrupts_disabled());
        drop(outer);
        assert!(!interrupts_disabled());
    }

    #[test]
    fn ipi_requests_accumulate_by_hart() {
        take_pending_ipis();
        send_reschedule_ipi(0);
        send_reschedule_ipi(3);
        send_reschedule_ipi(3);
        assert_eq!(take_pending_ipis(), 0b1001);
        assert_eq!(take_pending_ipis(), 0);
    }
}

use core::{arch::asm, marker::PhantomData};

use defines::trap_context::FloatContext;
use riscv::register::{sstatus, time};

use crate::TaskContext;

core::arch::global_asm!(include_str!("switch.S"));

extern "C" {
    fn __switch(old: *mut TaskContext, new: *const TaskContext);
    fn __save_float(ctx: *mut FloatContext);
    fn __restore_float(ctx: *const FloatContext);
}

pub(crate) unsafe fn switch_impl(old: *mut TaskContext, new: *const TaskContext) {
    unsafe { __switch(old, new) }
}

pub fn save_float(ctx: &mut FloatContext) {
    unsafe { __save_float(ctx) }
}

pub fn restore_float(ctx: &FloatContext) {
    unsafe { __restore_float(ctx) }
}

pub struct NoIrqGuard {
    before: bool,
    _not_send: PhantomData<*const ()>,
}

impl NoIrqGuard {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let before = sstatus::read().sie();
        if before {
            unsafe {
                sstatus::clear_sie();
            }
        }
        Self {
            before,
            _not_send: PhantomData,
        }
    }
}

impl Drop for NoIrqGuard {
    fn drop(&mut self) {
        if self.before {
            unsafe {
                sstatus::set_sie();
            }
        }
    }
}

pub fn interrupts_disabled() -> bool {
    !sstatus::read().sie()
}

/// 逻辑持有者标识，给递归锁用。
///
/// tp 存放 per-hart 结构的地址，天然每个 hart 唯一
pub fn owner_token() -> usize {
    let tp: usize;
    unsafe {
        asm!("mv {}, tp", out(reg) tp);
    }
    tp
}

/// QEMU virt 机器的时钟频率
const CLOCK_FREQ: usize = 12_500_000;
const TICKS_PER_SEC: usize = 100;

#[inline]
pub fn get_time() -> usize {
    time::read()
}

#[inline]
pub fn get_time_us() -> usize {
    time::read() * crate::MICRO_PER_SEC / CLOCK_FREQ
}

#[inline]
pub fn get_time_ms() -> usize {
    time::read() * crate::MILLI_PER_SEC / CLOCK_FREQ
}

/// set the next timer interrupt
pub fn set_next_trigger() {
    sbi_rt::set_timer((get_time() + CLOCK_FREQ / TICKS_PER_SEC) as u64);
}

/// 让目标 hart 尽快重新审视自己的就绪队列
pub fn send_reschedule_ipi(hart_id: usize) {
    sbi_rt::send_ipi(sbi_rt::HartMask::from_mask_base(1 << hart_id, 0));
}

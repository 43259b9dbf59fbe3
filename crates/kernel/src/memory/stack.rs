//! 线程栈的分配。
//!
//! 内核栈位于内核地址空间，随 [`KernelStack`] 的析构释放，且只释放一次。
//! 用户栈和中断返回栈位于所属进程的地址空间里，由线程退出路径或进程
//! 清理例程显式解除映射

use core::ops::Range;

use defines::{
    config::{
        INTERRUPT_STACK_SIZE, KERNEL_STACK_REGION_BOTTOM, KERNEL_STACK_REGION_TOP,
        KERNEL_STACK_SIZE, USER_STACK_REGION_BOTTOM, USER_STACK_REGION_TOP, USER_STACK_SIZE,
    },
    error::KResult,
};
use klocks::{Lazy, SpinMutex};

use super::{MapPermission, MemorySpace};

/// 内核自身的地址空间。内核栈都从这里划出
pub static KERNEL_SPACE: Lazy<SpinMutex<MemorySpace>> =
    Lazy::new(|| SpinMutex::new(MemorySpace::new()));

/// 一个线程的内核栈。独占所有权，析构时解除映射
pub struct KernelStack {
    vaddr: usize,
}

impl KernelStack {
    pub fn alloc() -> KResult<Self> {
        let vaddr = KERNEL_SPACE.lock().allocate_range(
            KERNEL_STACK_SIZE,
            KERNEL_STACK_REGION_BOTTOM..KERNEL_STACK_REGION_TOP,
            MapPermission::R | MapPermission::W,
        )?;
        trace!("kernel stack at {vaddr:#x}");
        Ok(Self { vaddr })
    }

    pub fn bottom(&self) -> usize {
        self.vaddr
    }

    pub fn top(&self) -> usize {
        self.vaddr + KERNEL_STACK_SIZE
    }

    pub fn range(&self) -> Range<usize> {
        self.vaddr..self.top()
    }
}

impl Drop for KernelStack {
    fn drop(&mut self) {
        let removed = KERNEL_SPACE.lock().remove_range(self.vaddr);
        debug_assert!(removed, "kernel stack double free");
    }
}

/// 进程地址空间内的一段栈区域。纯记录，不负责释放
#[derive(Clone, Copy, Debug)]
pub struct StackRange {
    pub vaddr: usize,
    pub size: usize,
}

impl StackRange {
    pub fn top(&self) -> usize {
        self.vaddr + self.size
    }

    pub fn range(&self) -> Range<usize> {
        self.vaddr..self.top()
    }
}

/// 在进程地址空间里分配一条用户栈，返回其区域
pub fn alloc_user_stack(memory_space: &mut MemorySpace) -> KResult<StackRange> {
    let vaddr = memory_space.allocate_range(
        USER_STACK_SIZE,
        USER_STACK_REGION_BOTTOM..USER_STACK_REGION_TOP,
        MapPermission::R | MapPermission::W | MapPermission::U,
    )?;
    trace!("user stack is {:#x}..{:#x}", vaddr, vaddr + USER_STACK_SIZE);
    Ok(StackRange {
        vaddr,
        size: USER_STACK_SIZE,
    })
}

/// 中断返回栈。映射在进程地址空间，但没有 U 权限，只有内核能访问
pub fn alloc_interrupt_stack(memory_space: &mut MemorySpace) -> KResult<StackRange> {
    let vaddr = memory_space.allocate_range(
        INTERRUPT_STACK_SIZE,
        USER_STACK_REGION_BOTTOM..USER_STACK_REGION_TOP,
        MapPermission::R | MapPermission::W,
    )?;
    Ok(StackRange {
        vaddr,
        size: INTERRUPT_STACK_SIZE,
    })
}

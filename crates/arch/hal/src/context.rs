/// 内核执行流的切换点。
///
/// 只保存 callee-saved 寄存器：对被切换走的一方来说，`switch` 就是一次
/// 普通的函数调用，caller-saved 部分由编译器自行保存
#[repr(C)]
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// 切换回来之后从这里继续执行
    ra: usize,
    /// 内核栈指针
    sp: usize,
    /// s0~s11
    s: [usize; 12],
}

impl TaskContext {
    pub const fn zeroed() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s: [0; 12],
        }
    }

    /// 一个全新的执行流：首次被切换到时在 `kstack_top` 上从 `entry` 开始
    pub fn goto(entry: usize, kstack_top: usize) -> Self {
        Self {
            ra: entry,
            sp: kstack_top,
            s: [0; 12],
        }
    }

    pub fn sp(&self) -> usize {
        self.sp
    }
}

#[cfg(target_arch = "riscv64")]
use crate::riscv64::switch_impl;

#[cfg(not(target_arch = "riscv64"))]
use crate::hosted::switch_impl;

/// 保存当前执行流到 `old`，恢复 `new` 并跳转过去。
///
/// # Safety
///
/// `new` 必须指向一个有效的、不在任何 hart 上运行的上下文；
/// `old` 必须独占可写。两者都不能是当前 hart 正在运行的那一份
pub unsafe fn switch(old: *mut TaskContext, new: *const TaskContext) {
    unsafe { switch_impl(old, new) }
}

//! 内核核心：线程与进程的生命周期、调度器、阻塞原语与信号投递。
//!
//! 文件系统、驱动、页表机制都在这条边界之外；这里只依赖它们暴露的
//! 窄接口（分配一段映射好的零页区域、读出一个可执行镜像的字节）

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate kernel_tracer;
extern crate alloc;

use core::sync::atomic::{AtomicBool, Ordering};

pub mod fs;
pub mod hart;
mod lang_items;
pub mod memory;
pub mod process;
pub mod sched;
pub mod signal;
pub mod syscall;
pub mod thread;
pub mod time;
pub mod trap;

/// init 进程退出后置位，各 hart 的 idle 循环看到后停机
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// 启动路径的内核侧初始化。引导 stub 在把 bss 清零之后调用，
/// 每个 hart 一次
///
/// # Safety
///
/// `hart_id` 必须互不相同，且本函数先于任何分配与调度被调用
#[cfg(all(target_arch = "riscv64", not(test)))]
pub unsafe fn boot_init(hart_id: usize, is_boot_hart: bool) {
    unsafe {
        if is_boot_hart {
            memory::kernel_heap::init();
        }
        hart::set_local_hart(hart_id);
    }
    trap::init();
    info!("hart {hart_id} started");
}

pub fn kernel_loop() -> ! {
    info!("Enter kernel loop");
    sched::idle_loop(|| SHUTDOWN.load(Ordering::SeqCst))
}

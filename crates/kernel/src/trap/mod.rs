//! 用户态与内核态之间的边界。
//!
//! 对上承诺一件事：任何一次系统调用返回用户态之前，在返回值写好之后、
//! 恢复用户现场之前，对 pending 信号做且只做一次检查。信号在系统调用
//! 期间到达也不会被错过。
//!
//! 真正的现场保存恢复在 `trap.S`；hosted 后端没有用户态，相应入口
//! 只在 riscv64 下存在

use alloc::sync::Arc;

pub use defines::trap_context::TrapContext;

use crate::thread::Thread;

/// 用户线程的主循环：返回用户态，陷回来，处理，再返回。
///
/// 进程被标记退出后，线程在回到这里时自行了断
pub fn user_loop(thread: &Arc<Thread>) -> ! {
    loop {
        if let Some(process) = thread.process.upgrade() {
            if process.is_exited() {
                thread.on_exit();
            }
        }
        return_once(thread);
    }
}

/// 一次完整的「返回用户态直到下一次 trap」
fn return_once(thread: &Arc<Thread>) {
    // 回到用户态之前的最后一关：唯一的信号检查点
    if thread.can_add_signal_to_execute() {
        thread.handle_signal(None);
    }

    #[cfg(target_arch = "riscv64")]
    {
        arch::return_to_user_and_handle_trap(thread);
    }
    #[cfg(not(target_arch = "riscv64"))]
    panic!("userspace requires a target backend");
}

/// 保留旧名字给线程入口用
pub fn return_to_user(thread: &Arc<Thread>) -> ! {
    user_loop(thread)
}

#[cfg(target_arch = "riscv64")]
mod arch {
    use alloc::sync::Arc;

    use defines::trap_context::TrapContext;
    use riscv::register::{
        scause::{self, Exception, Interrupt, Trap},
        sstatus, stval,
        stvec::{self, TrapMode},
    };

    use crate::{sched, syscall, thread::Thread};

    core::arch::global_asm!(include_str!("trap.S"));

    extern "C" {
        fn __return_to_user(cx: *mut TrapContext);
        fn __kernel_trap_vector();
    }

    pub(super) fn return_to_user_and_handle_trap(thread: &Arc<Thread>) {
        let trap_context: *mut TrapContext =
            thread.lock_inner_with(|inner| &mut inner.trap_context as *mut _);
        unsafe {
            // trap 入口换成用户侧的，期间不能再收中断
            sstatus::clear_sie();
            set_user_trap_entry();
            __return_to_user(trap_context);
            // 回到这里说明用户态触发了一次 trap
            set_kernel_trap_entry();
        }
        user_trap_handler(thread);
    }

    fn user_trap_handler(thread: &Arc<Thread>) {
        let scause = scause::read();
        match scause.cause() {
            Trap::Exception(Exception::UserEnvCall) => {
                unsafe {
                    sstatus::set_sie();
                }
                let (id, args) = thread.lock_inner_with(|inner| {
                    inner.trap_context.sepc += 4;
                    let user_regs = &inner.trap_context.user_regs;
                    (
                        user_regs[16],
                        [user_regs[9], user_regs[10], user_regs[11], user_regs[12], user_regs[13], user_regs[14]],
                    )
                });
                let result = syscall::syscall(thread, id, args);
                thread.lock_inner_with(|inner| {
                    inner.trap_context.user_regs[9] = result as usize;
                });
            }
            Trap::Exception(
                Exception::StoreFault
                | Exception::StorePageFault
                | Exception::InstructionFault
                | Exception::InstructionPageFault
                | Exception::LoadFault
                | Exception::LoadPageFault,
            ) => {
                let sepc = thread.lock_inner_with(|inner| inner.trap_context.sepc);
                error!(
                    "{:?} in application, bad addr = {:#x}, bad inst pc = {:#x}",
                    scause.cause(),
                    stval::read(),
                    sepc,
                );
                thread.add_signal(crate::signal::Signal::SIGSEGV);
            }
            Trap::Exception(Exception::IllegalInstruction) => {
                let sepc = thread.lock_inner_with(|inner| inner.trap_context.sepc);
                error!("IllegalInstruction(pc={sepc:#x}) in application");
                thread.add_signal(crate::signal::Signal::SIGILL);
            }
            Trap::Interrupt(Interrupt::SupervisorTimer) => {
                trace!("timer interrupt");
                hal::set_next_trigger();
                sched::timer_tick();
            }
            _ => {
                panic!(
                    "Unsupported trap {:?}, stval = {:#x}!",
                    scause.cause(),
                    stval::read()
                );
            }
        }
    }

    pub fn init() {
        unsafe {
            riscv::register::sie::set_stimer();
            hal::set_next_trigger();
            set_kernel_trap_entry();
            sstatus::set_sie();
        }
    }

    fn set_user_trap_entry() {
        extern "C" {
            fn __trap_from_user();
        }
        unsafe {
            stvec::write(__trap_from_user as usize, TrapMode::Direct);
        }
    }

    fn set_kernel_trap_entry() {
        unsafe {
            stvec::write(__kernel_trap_vector as usize, TrapMode::Direct);
        }
    }

    /// 内核态里触发的 trap 只可能是时钟或致命错误
    #[no_mangle]
    extern "C" fn kernel_trap_handler() {
        let scause = scause::read();
        match scause.cause() {
            Trap::Interrupt(Interrupt::SupervisorTimer) => {
                hal::set_next_trigger();
                sched::timer_tick();
            }
            Trap::Interrupt(Interrupt::SupervisorSoft) => {
                // 来自其他 hart 的重调度通知
                sched::yield_now();
            }
            _ => {
                panic!(
                    "kernel trap {:?}, stval = {:#x}",
                    scause.cause(),
                    stval::read()
                );
            }
        }
    }
}

#[cfg(target_arch = "riscv64")]
pub use arch::init;

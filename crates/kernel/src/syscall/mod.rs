//! 系统调用实现。
//!
//! 分发器拿到的是当前线程；每个实现单独拿自己需要的进程资源。
//! 这一层只定义内核核心自己承诺语义的那些调用，完整的调用面属于
//! 外部的分发边界。
//!
//! 返回契约：成功为非负值，失败为负的 errno。信号检查不在这里做，
//! 它固定发生在返回用户态之前的最后一步

mod fs;
mod process;
mod signal;
mod time;

use alloc::sync::Arc;

use defines::{
    error::{errno, KResult},
    syscall as ids,
};

use crate::thread::Thread;

pub fn syscall(thread: &Arc<Thread>, id: usize, args: [usize; 6]) -> isize {
    let _enter = debug_span!("syscall", name = ids::name(id)).entered();
    let result: KResult<isize> = match id {
        ids::READ => fs::sys_read(thread, args[0], args[1], args[2]),
        ids::WRITE => fs::sys_write(thread, args[0], args[1], args[2]),
        ids::EXIT => process::sys_exit(thread, args[0] as i8),
        ids::EXIT_GROUP => process::sys_exit_group(thread, args[0] as i8),
        ids::NANOSLEEP => time::sys_nanosleep(thread, args[0], args[1]),
        ids::SCHED_YIELD => process::sys_sched_yield(),
        ids::KILL => signal::sys_kill(args[0] as isize, args[1]),
        ids::TKILL => signal::sys_tkill(args[0], args[1]),
        ids::RT_SIGACTION => signal::sys_rt_sigaction(thread, args[0], args[1], args[2]),
        ids::RT_SIGPROCMASK => signal::sys_rt_sigprocmask(thread, args[0], args[1], args[2]),
        ids::RT_SIGRETURN => signal::sys_rt_sigreturn(thread),
        ids::GETPID => process::sys_getpid(thread),
        ids::GETPPID => process::sys_getppid(thread),
        ids::GETTID => Ok(thread.tid() as isize),
        ids::CLONE => process::sys_clone(thread, args[0], args[1]),
        ids::EXECVE => process::sys_execve(thread, args[0]),
        ids::WAIT4 => process::sys_wait4(thread, args[0] as isize, args[1]),
        _ => {
            warn!("unsupported syscall {id}");
            Err(errno::ENOSYS)
        }
    };
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!(
                "syscall {} failed: {}",
                ids::name(id),
                defines::error::errno::error_info(e.as_isize())
            );
            e.as_isize()
        }
    }
}

/// 从当前进程的地址空间里读用户内存
pub(crate) fn read_user(
    process: &crate::process::Process,
    ptr: usize,
    buf: &mut [u8],
) -> KResult<()> {
    process.lock_inner_with(|inner| inner.memory_space.read(ptr, buf))
}

pub(crate) fn write_user(
    process: &crate::process::Process,
    ptr: usize,
    bytes: &[u8],
) -> KResult<()> {
    process.lock_inner_with(|inner| inner.memory_space.write(ptr, bytes))
}

pub(crate) fn read_user_usize(process: &crate::process::Process, ptr: usize) -> KResult<usize> {
    let mut buf = [0_u8; core::mem::size_of::<usize>()];
    read_user(process, ptr, &mut buf)?;
    Ok(usize::from_ne_bytes(buf))
}

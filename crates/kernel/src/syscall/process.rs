use alloc::{sync::Arc, vec::Vec};
use core::{num::NonZeroUsize, sync::atomic::Ordering};

use compact_str::CompactString;
use defines::error::{errno, KResult};

use super::{read_user, read_user_usize, write_user};
use crate::{
    fs, sched,
    thread::Thread,
};

/// 结束当前线程。进程的其余线程不受影响
pub fn sys_exit(thread: &Arc<Thread>, code: i8) -> KResult<isize> {
    thread.exit_code.store(code, Ordering::SeqCst);
    thread.on_exit()
}

/// 结束整个进程：标记状态并唤醒所有线程，然后自己先走
pub fn sys_exit_group(thread: &Arc<Thread>, code: i8) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    process.exit(code as u8, None, false);
    thread.exit_code.store(code, Ordering::SeqCst);
    thread.on_exit()
}

pub fn sys_sched_yield() -> KResult<isize> {
    sched::yield_now();
    Ok(0)
}

pub fn sys_getpid(thread: &Arc<Thread>) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    Ok(process.pid() as isize)
}

pub fn sys_getppid(thread: &Arc<Thread>) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let ppid = process.lock_inner_with(|inner| {
        inner.parent.upgrade().map(|parent| parent.pid()).unwrap_or(1)
    });
    Ok(ppid as isize)
}

/// fork 形态的 clone。`stack` 非零则指定子进程主线程的栈顶
pub fn sys_clone(thread: &Arc<Thread>, _flags: usize, stack: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let child = process.fork(NonZeroUsize::new(stack))?;
    Ok(child.pid() as isize)
}

/// 从登记的镜像表中找到 `path` 并替换当前映像。
///
/// `argv_ptr` 是用户空间的 `char *argv[]`，以 NULL 结尾
pub fn sys_execve(thread: &Arc<Thread>, argv_ptr: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;

    let mut args = Vec::new();
    let mut cursor = argv_ptr;
    loop {
        let str_ptr = read_user_usize(&process, cursor)?;
        if str_ptr == 0 {
            break;
        }
        args.push(read_user_str(&process, str_ptr)?);
        cursor += core::mem::size_of::<usize>();
    }
    let path = args.first().cloned().ok_or(errno::EINVAL)?;

    let image = fs::images::lookup(&path).ok_or(errno::ENOENT)?;
    process.exec(path, image, args)?;
    Ok(0)
}

/// 等待一个子进程变成僵尸并回收它。
///
/// `pid` 为 -1 表示任意子进程；`status_ptr` 非零则写回打包的退出状态
pub fn sys_wait4(thread: &Arc<Thread>, pid: isize, status_ptr: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let want = match pid {
        -1 => None,
        pid if pid > 0 => Some(pid as usize),
        _ => return Err(errno::EINVAL),
    };
    loop {
        if let Some((child_pid, status)) = process.take_zombie_child(want)? {
            if status_ptr != 0 {
                let packed = u32::from(status.bits());
                write_user(&process, status_ptr, &packed.to_ne_bytes())?;
            }
            return Ok(child_pid as isize);
        }
        // 还没有子进程退出，在进程的等待点上挂起
        thread.block_or_eintr_indefinite(&process.wait4_blocker)?;
    }
}

fn read_user_str(
    process: &crate::process::Process,
    mut ptr: usize,
) -> KResult<CompactString> {
    let mut out = CompactString::new("");
    let mut byte = [0_u8; 1];
    loop {
        read_user(process, ptr, &mut byte)?;
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0] as char);
        ptr += 1;
        if out.len() > 4096 {
            return Err(errno::ERANGE);
        }
    }
}

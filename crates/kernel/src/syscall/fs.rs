use alloc::{sync::Arc, vec};

use defines::error::{errno, KResult};

use super::{read_user, write_user};
use crate::thread::Thread;

/// 单次读写的上限，防止用户长度直接变成内核分配量
const IO_CHUNK_LIMIT: usize = 64 * 1024;

pub fn sys_read(thread: &Arc<Thread>, fd: usize, buf_ptr: usize, len: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let file = process.lock_inner_with(|inner| inner.fd_table.get(fd))?;
    let mut buf = vec![0_u8; len.min(IO_CHUNK_LIMIT)];
    let n = file.read(&mut buf)?;
    write_user(&process, buf_ptr, &buf[..n])?;
    Ok(n as isize)
}

pub fn sys_write(thread: &Arc<Thread>, fd: usize, buf_ptr: usize, len: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let file = process.lock_inner_with(|inner| inner.fd_table.get(fd))?;
    let mut buf = vec![0_u8; len.min(IO_CHUNK_LIMIT)];
    read_user(&process, buf_ptr, &mut buf)?;
    let n = file.write(&buf)?;
    Ok(n as isize)
}

use alloc::sync::Arc;

use defines::error::{errno, KResult};

use super::{read_user, write_user};
use crate::thread::{Thread, ThreadBlocker};

/// 睡到指定时长。被信号打断时写回剩余时间并返回 `EINTR`
pub fn sys_nanosleep(thread: &Arc<Thread>, req_ptr: usize, rem_ptr: usize) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let mut buf = [0_u8; 16];
    read_user(&process, req_ptr, &mut buf)?;
    let secs = u64::from_ne_bytes(buf[0..8].try_into().unwrap());
    let nanos = u64::from_ne_bytes(buf[8..16].try_into().unwrap());
    if nanos >= 1_000_000_000 {
        return Err(errno::EINVAL);
    }
    let total_ms = (secs as usize) * 1000 + (nanos as usize).div_ceil(1_000_000);
    let wake_time_ms = hal::get_time_ms() + total_ms;

    // 没有人会主动唤醒这个等待点，醒来只能是超时或信号
    let blocker = ThreadBlocker::new();
    match thread.block_or_eintr_or_waketime_ms(&blocker, wake_time_ms, false) {
        Ok(()) => Ok(0),
        Err(e) if e == errno::EINTR => {
            if rem_ptr != 0 {
                let remaining_ms = wake_time_ms.saturating_sub(hal::get_time_ms());
                let rem_secs = (remaining_ms / 1000) as u64;
                let rem_nanos = ((remaining_ms % 1000) * 1_000_000) as u64;
                let mut out = [0_u8; 16];
                out[0..8].copy_from_slice(&rem_secs.to_ne_bytes());
                out[8..16].copy_from_slice(&rem_nanos.to_ne_bytes());
                write_user(&process, rem_ptr, &out)?;
            }
            Err(e)
        }
        Err(e) => Err(e),
    }
}

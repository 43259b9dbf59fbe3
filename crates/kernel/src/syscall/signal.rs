use alloc::sync::Arc;

use defines::{
    error::{errno, KResult},
    signal::{KSignalAction, SignalActionFlags},
};

use super::{read_user, write_user};
use crate::{
    process::{Process, PROCESS_MANAGER},
    signal::{KSignalSet, SigProcMaskHow, Signal},
    thread::Thread,
};

/// 向进程投送信号。`signum` 为 0 时只做存在性检查
pub fn sys_kill(pid: isize, signum: usize) -> KResult<isize> {
    if pid <= 0 {
        // 进程组暂不支持
        return Err(errno::EINVAL);
    }
    let process = PROCESS_MANAGER.get(pid as usize).ok_or(errno::ESRCH)?;
    if signum == 0 {
        return Ok(0);
    }
    let signal = parse_signum(signum)?;
    process.send_signal(signal);
    Ok(0)
}

/// 向指定线程投送信号
pub fn sys_tkill(tid: usize, signum: usize) -> KResult<isize> {
    let signal = parse_signum(signum)?;
    let thread = find_thread(tid).ok_or(errno::ESRCH)?;
    thread.add_signal(signal);
    Ok(0)
}

/// 设置当前进程收到某个信号时的行为。
///
/// `SIGKILL` 和 `SIGSTOP` 的处置不可更改
pub fn sys_rt_sigaction(
    thread: &Arc<Thread>,
    signum: usize,
    act_ptr: usize,
    old_act_ptr: usize,
) -> KResult<isize> {
    let signal = parse_signum(signum)?;
    if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
        return Err(errno::EINVAL);
    }
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;

    let new_action = if act_ptr != 0 {
        Some(read_user_action(&process, act_ptr)?)
    } else {
        None
    };
    let old_action = process.with_signals(|sig| {
        let old = sig.handlers.action(signal).clone();
        if let Some(new_action) = new_action {
            *sig.handlers.action_mut(signal) = new_action;
        }
        old
    });
    if old_act_ptr != 0 {
        write_user_action(&process, old_act_ptr, &old_action)?;
    }
    Ok(0)
}

/// 调整当前线程的信号掩码。`SIGKILL` 和 `SIGSTOP` 无法被掩蔽
pub fn sys_rt_sigprocmask(
    thread: &Arc<Thread>,
    how: usize,
    set_ptr: usize,
    old_set_ptr: usize,
) -> KResult<isize> {
    let process = thread.process.upgrade().ok_or(errno::ESRCH)?;
    let how = SigProcMaskHow::from_user(how).ok_or(errno::EINVAL)?;

    let new_set = if set_ptr != 0 {
        let mut buf = [0_u8; 8];
        read_user(&process, set_ptr, &mut buf)?;
        Some(KSignalSet::from_bits_truncate(u64::from_ne_bytes(buf)))
    } else {
        None
    };

    let old = thread.with_signal_state(|sig| {
        let old = sig.blocked;
        if let Some(mut new_set) = new_set {
            new_set.remove(KSignalSet::SIGKILL | KSignalSet::SIGSTOP);
            sig.blocked = match how {
                SigProcMaskHow::Block => sig.blocked | new_set,
                SigProcMaskHow::Unblock => sig.blocked & !new_set,
                SigProcMaskHow::SetMask => new_set,
            };
        }
        old
    });

    if old_set_ptr != 0 {
        write_user(&process, old_set_ptr, &old.bits().to_ne_bytes())?;
    }
    Ok(0)
}

/// handler 的尾声。返回被恢复现场的 a0，它会被写回返回值寄存器
pub fn sys_rt_sigreturn(thread: &Arc<Thread>) -> KResult<isize> {
    thread.sigreturn()
}

fn parse_signum(signum: usize) -> KResult<Signal> {
    u8::try_from(signum)
        .ok()
        .and_then(Signal::from_user)
        .ok_or(errno::EINVAL)
}

fn find_thread(tid: usize) -> Option<Arc<Thread>> {
    let processes = PROCESS_MANAGER.lock_all();
    for process in processes.values() {
        let found = process.lock_inner_with(|inner| inner.threads.get(&tid).cloned());
        if found.is_some() {
            return found;
        }
    }
    None
}

/// musl 的 `k_sigaction` 布局：handler、flags(u32 + 4 字节对齐)、
/// restorer、mask
fn read_user_action(process: &Process, ptr: usize) -> KResult<KSignalAction> {
    let mut buf = [0_u8; 32];
    read_user(process, ptr, &mut buf)?;
    let word = |range: core::ops::Range<usize>| {
        usize::from_ne_bytes(buf[range].try_into().unwrap())
    };
    Ok(KSignalAction {
        handler: word(0..8),
        flags: SignalActionFlags::from_bits_truncate(u32::from_ne_bytes(
            buf[8..12].try_into().unwrap(),
        )),
        restorer: word(16..24),
        mask: u64::from_ne_bytes(buf[24..32].try_into().unwrap()),
    })
}

fn write_user_action(process: &Process, ptr: usize, action: &KSignalAction) -> KResult<()> {
    let mut buf = [0_u8; 32];
    buf[0..8].copy_from_slice(&action.handler.to_ne_bytes());
    buf[8..12].copy_from_slice(&action.flags.bits().to_ne_bytes());
    buf[16..24].copy_from_slice(&action.restorer.to_ne_bytes());
    buf[24..32].copy_from_slice(&action.mask.to_ne_bytes());
    write_user(process, ptr, &buf)
}

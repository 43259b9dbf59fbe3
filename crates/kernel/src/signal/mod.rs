//! 参考：<https://man7.org/linux/man-pages/man7/signal.7.html>
//!
//! signal action 属于进程，线程有各自的掩码和待处理信号。
//!
//! `fork` 继承父进程的 signal action 和线程掩码，但待处理信号置空；
//! `exec` 将 signal action 置回默认值，线程掩码保留。
//!
//! 信号编号从 1 开始，与 POSIX 一致；掩码的 bit n 对应编号 n 的信号

mod handlers;

use bitflags::bitflags;
use defines::signal::{KSignalAction, SIG_DFL, SIG_IGN};
use num_enum::TryFromPrimitive;

use crate::trap::TrapContext;

pub use handlers::{DefaultHandler, SignalHandlers};

/// 投递 handler 前被保存的现场，sigreturn 时恢复
pub struct SignalContext {
    pub old_mask: KSignalSet,
    pub old_trap_context: TrapContext,
}

#[derive(Debug, Clone, Copy)]
pub enum SigProcMaskHow {
    /// 掩蔽传入的信号集，即新掩码是传入值和旧值的并集
    Block,
    /// 取消掩蔽传入的信号集
    Unblock,
    /// 将掩码直接设置为传入的信号集
    SetMask,
}

impl SigProcMaskHow {
    pub fn from_user(how: usize) -> Option<Self> {
        match how {
            0 => Some(Self::Block),
            1 => Some(Self::Unblock),
            2 => Some(Self::SetMask),
            _ => None,
        }
    }
}

// 只考虑标准信号，实时信号暂不支持

bitflags! {
    /// 64bit 的信号集。bit 0 恒空，bit n 即编号 n 的信号
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct KSignalSet: u64 {
        const SIGHUP    = 1 << defines::signal::SIGHUP;
        const SIGINT    = 1 << defines::signal::SIGINT;
        const SIGQUIT   = 1 << defines::signal::SIGQUIT;
        const SIGILL    = 1 << defines::signal::SIGILL;
        const SIGTRAP   = 1 << defines::signal::SIGTRAP;
        const SIGABRT   = 1 << defines::signal::SIGABRT;
        const SIGBUS    = 1 << defines::signal::SIGBUS;
        const SIGFPE    = 1 << defines::signal::SIGFPE;
        const SIGKILL   = 1 << defines::signal::SIGKILL;
        const SIGUSR1   = 1 << defines::signal::SIGUSR1;
        const SIGSEGV   = 1 << defines::signal::SIGSEGV;
        const SIGUSR2   = 1 << defines::signal::SIGUSR2;
        const SIGPIPE   = 1 << defines::signal::SIGPIPE;
        const SIGALRM   = 1 << defines::signal::SIGALRM;
        const SIGTERM   = 1 << defines::signal::SIGTERM;
        const SIGSTKFLT = 1 << defines::signal::SIGSTKFLT;
        const SIGCHLD   = 1 << defines::signal::SIGCHLD;
        const SIGCONT   = 1 << defines::signal::SIGCONT;
        const SIGSTOP   = 1 << defines::signal::SIGSTOP;
        const SIGTSTP   = 1 << defines::signal::SIGTSTP;
        const SIGTTIN   = 1 << defines::signal::SIGTTIN;
        const SIGTTOU   = 1 << defines::signal::SIGTTOU;
        const SIGURG    = 1 << defines::signal::SIGURG;
        const SIGXCPU   = 1 << defines::signal::SIGXCPU;
        const SIGXFSZ   = 1 << defines::signal::SIGXFSZ;
        const SIGVTALRM = 1 << defines::signal::SIGVTALRM;
        const SIGPROF   = 1 << defines::signal::SIGPROF;
        const SIGWINCH  = 1 << defines::signal::SIGWINCH;
        const SIGIO     = 1 << defines::signal::SIGIO;
        const SIGPWR    = 1 << defines::signal::SIGPWR;
        const SIGSYS    = 1 << defines::signal::SIGSYS;
    }
}

impl KSignalSet {
    /// 编号最小的成员
    pub fn first_pending(self) -> Option<Signal> {
        Signal::try_from(self.bits().trailing_zeros() as u8).ok()
    }

    pub fn iter_signals(self) -> impl Iterator<Item = Signal> {
        (defines::signal::SIGMIN..=defines::signal::SIGMAX)
            .filter_map(Signal::from_user)
            .filter(move |signal| self.contains((*signal).into()))
    }
}

impl From<Signal> for KSignalSet {
    fn from(value: Signal) -> Self {
        Self::from_bits_truncate(1 << (value as u8))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum Signal {
    SIGHUP = defines::signal::SIGHUP,
    SIGINT = defines::signal::SIGINT,
    SIGQUIT = defines::signal::SIGQUIT,
    SIGILL = defines::signal::SIGILL,
    SIGTRAP = defines::signal::SIGTRAP,
    SIGABRT = defines::signal::SIGABRT,
    SIGBUS = defines::signal::SIGBUS,
    SIGFPE = defines::signal::SIGFPE,
    SIGKILL = defines::signal::SIGKILL,
    SIGUSR1 = defines::signal::SIGUSR1,
    SIGSEGV = defines::signal::SIGSEGV,
    SIGUSR2 = defines::signal::SIGUSR2,
    SIGPIPE = defines::signal::SIGPIPE,
    SIGALRM = defines::signal::SIGALRM,
    SIGTERM = defines::signal::SIGTERM,
    SIGSTKFLT = defines::signal::SIGSTKFLT,
    SIGCHLD = defines::signal::SIGCHLD,
    SIGCONT = defines::signal::SIGCONT,
    SIGSTOP = defines::signal::SIGSTOP,
    SIGTSTP = defines::signal::SIGTSTP,
    SIGTTIN = defines::signal::SIGTTIN,
    SIGTTOU = defines::signal::SIGTTOU,
    SIGURG = defines::signal::SIGURG,
    SIGXCPU = defines::signal::SIGXCPU,
    SIGXFSZ = defines::signal::SIGXFSZ,
    SIGVTALRM = defines::signal::SIGVTALRM,
    SIGPROF = defines::signal::SIGPROF,
    SIGWINCH = defines::signal::SIGWINCH,
    SIGIO = defines::signal::SIGIO,
    SIGPWR = defines::signal::SIGPWR,
    SIGSYS = defines::signal::SIGSYS,
}

impl Signal {
    pub fn from_user(signum: u8) -> Option<Signal> {
        Signal::try_from(signum).ok()
    }

    pub fn to_user(self) -> u8 {
        self as u8
    }
}

/// 某个信号此刻的有效处置
pub enum Disposition {
    Ignore,
    Default(DefaultHandler),
    Handler(KSignalAction),
}

impl Disposition {
    pub fn of(action: &KSignalAction, signal: Signal) -> Self {
        match action.handler {
            SIG_IGN => Disposition::Ignore,
            SIG_DFL => Disposition::Default(DefaultHandler::new(signal)),
            _ => Disposition::Handler(action.clone()),
        }
    }

    /// 忽略或默认忽略。这样的信号不构成打断；在发送时刻检查，
    /// 既不记录也不唤醒目标
    pub fn is_noop(&self) -> bool {
        match self {
            Disposition::Ignore => true,
            Disposition::Default(default) => matches!(default, DefaultHandler::Ignore),
            Disposition::Handler(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bits_match_signal_numbers() {
        assert_eq!(KSignalSet::SIGHUP.bits(), 1 << 1);
        assert_eq!(KSignalSet::from(Signal::SIGKILL).bits(), 1 << 9);
    }

    #[test]
    fn first_pending_is_lowest_numbered() {
        let set = KSignalSet::SIGTERM | KSignalSet::SIGINT | KSignalSet::SIGUSR1;
        assert_eq!(set.first_pending(), Some(Signal::SIGINT));
        assert_eq!(KSignalSet::empty().first_pending(), None);
    }

    #[test]
    fn iter_signals_in_ascending_order() {
        let set = KSignalSet::SIGSYS | KSignalSet::SIGHUP | KSignalSet::SIGCHLD;
        let signals: alloc::vec::Vec<_> = set.iter_signals().collect();
        assert_eq!(
            signals,
            [Signal::SIGHUP, Signal::SIGCHLD, Signal::SIGSYS]
        );
    }
}

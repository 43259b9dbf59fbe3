use bitflags::bitflags;

/// 信号编号与 POSIX 一致，从 1 开始。0 不是合法信号
pub const SIGHUP: u8 = 1;
pub const SIGINT: u8 = 2;
pub const SIGQUIT: u8 = 3;
pub const SIGILL: u8 = 4;
pub const SIGTRAP: u8 = 5;
pub const SIGABRT: u8 = 6;
pub const SIGBUS: u8 = 7;
pub const SIGFPE: u8 = 8;
pub const SIGKILL: u8 = 9;
pub const SIGUSR1: u8 = 10;
pub const SIGSEGV: u8 = 11;
pub const SIGUSR2: u8 = 12;
pub const SIGPIPE: u8 = 13;
pub const SIGALRM: u8 = 14;
pub const SIGTERM: u8 = 15;
pub const SIGSTKFLT: u8 = 16;
pub const SIGCHLD: u8 = 17;
pub const SIGCONT: u8 = 18;
pub const SIGSTOP: u8 = 19;
pub const SIGTSTP: u8 = 20;
pub const SIGTTIN: u8 = 21;
pub const SIGTTOU: u8 = 22;
pub const SIGURG: u8 = 23;
pub const SIGXCPU: u8 = 24;
pub const SIGXFSZ: u8 = 25;
pub const SIGVTALRM: u8 = 26;
pub const SIGPROF: u8 = 27;
pub const SIGWINCH: u8 = 28;
pub const SIGIO: u8 = 29;
pub const SIGPWR: u8 = 30;
pub const SIGSYS: u8 = 31;

/// `SIGIO` 的别名，老接口中叫 `SIGPOLL`
pub const SIGPOLL: u8 = SIGIO;

pub const SIGMIN: u8 = SIGHUP;
pub const SIGMAX: u8 = SIGSYS;

/// 参考 musl 的 `k_sigaction`
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KSignalAction {
    /// signal handler 的地址。0 为默认行为，1 为忽略
    pub handler: usize,
    pub flags: SignalActionFlags,
    pub restorer: usize,
    /// 执行 handler 期间额外掩蔽的信号集
    pub mask: u64,
}

pub const SIG_DFL: usize = 0;
pub const SIG_IGN: usize = 1;

impl KSignalAction {
    pub const fn new() -> Self {
        Self {
            handler: SIG_DFL,
            flags: SignalActionFlags::empty(),
            restorer: 0,
            mask: 0,
        }
    }
}

impl Default for KSignalAction {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SignalActionFlags: u32 {
        const SA_RESTORER = 0x04_000_000;
        /// 一般而言，执行一个 signal handler 时会屏蔽自己这个信号。
        ///
        /// 指定这个 flag 则不屏蔽。sigaction 中的 mask 仍然生效
        const SA_NODEFER  = 0x40_000_000;
    }
}

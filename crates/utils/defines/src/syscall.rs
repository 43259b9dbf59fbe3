macro_rules! declare_syscall_id {
    ($($name:tt, $id:literal,)*) => {
        $(pub const $name: usize = $id;)*
        pub fn name(id: usize) -> &'static str {
            match id {
                $($id => stringify!($name),)*
                _ => "UNKNOWN",
            }
        }
    };
}

#[rustfmt::skip]
declare_syscall_id!(
    READ,               63,
    WRITE,              64,
    EXIT,               93,
    EXIT_GROUP,         94,
    NANOSLEEP,          101,
    SCHED_YIELD,        124,
    KILL,               129,
    TKILL,              130,
    RT_SIGACTION,       134,
    RT_SIGPROCMASK,     135,
    RT_SIGRETURN,       139,
    GETPID,             172,
    GETPPID,            173,
    GETTID,             178,
    CLONE,              220,
    EXECVE,             221,
    WAIT4,              260,
);

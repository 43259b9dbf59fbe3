use alloc::vec::Vec;

use hal::TaskContext;

use crate::{
    memory::StackRange,
    signal::{KSignalSet, SignalContext},
    trap::TrapContext,
};

/// 线程的可变部分，由 `Thread::inner` 的锁保护
pub struct ThreadInner {
    /// 每次陷入内核时保存、返回用户态时恢复的现场
    pub trap_context: TrapContext,
    /// 内核态执行流的切换点
    pub kernel_ctx: TaskContext,
    /// 投递 handler 时保存的现场栈，sigreturn 逐层弹出
    pub signal_stack: Vec<SignalContext>,
    /// 用户栈与中断返回栈。内核线程没有
    pub user_stack: Option<StackRange>,
    pub interrupt_stack: Option<StackRange>,
    /// 内核线程的入口与参数，首次被调度时取走
    pub kernel_entry: Option<(fn(usize), usize)>,
}

/// 线程的信号状态。
///
/// 用独立于调度器的锁保护，中断上下文里也可以安全地动它
pub struct SignalState {
    /// 已到达、尚未投递的信号
    pub pending: KSignalSet,
    /// 投递被抑制的信号。处于掩码中的信号在发送时刻就不被记录
    pub blocked: KSignalSet,
}

impl SignalState {
    pub const fn new(blocked: KSignalSet) -> Self {
        Self {
            pending: KSignalSet::empty(),
            blocked,
        }
    }
}

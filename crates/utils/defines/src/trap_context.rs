//! 陷入上下文的内存布局。
//!
//! 汇编侧按字段偏移访问，因此必须是 `repr(C)` 且不随意调整字段顺序

/// sstatus 中 SPIE 位。返回用户态后打开中断
pub const SSTATUS_SPIE: usize = 1 << 5;
/// sstatus 中 SPP 位。0 表示 trap 来自用户态
pub const SSTATUS_SPP: usize = 1 << 8;

#[repr(C)]
#[derive(Clone, Debug, PartialEq)]
pub struct TrapContext {
    /// 不包括 x0(zero)，因为 x0 恒定为 0。`user_regs[i]` 即 x(i+1)
    pub user_regs: [usize; 31],
    /// 原始 sstatus 值。trap 发生之前的中断使能与权限模式都在里面
    pub sstatus: usize,
    /// 发生 trap 时的 pc 值。从 user trap 返回就是回到它
    pub sepc: usize,
    /// 返回内核态时的继续执行点，由返回用户态的汇编填写
    pub kernel_sp: usize,
    pub kernel_ra: usize,
    pub kernel_tp: usize,
    /// s0~s11。作为一次「函数调用」的 callee-saved 部分保存
    pub kernel_s: [usize; 12],
    /// 浮点寄存器块，随上下文一起保存恢复
    pub float_regs: FloatContext,
}

impl TrapContext {
    /// 用户线程初次进入用户态时的上下文：在指定的 `sp` 上从 `entry` 开始运行
    pub fn app_init_context(entry: usize, sp: usize) -> Self {
        let mut cx = Self {
            user_regs: [0; 31],
            // SPP = User，返回后重新打开中断
            sstatus: SSTATUS_SPIE,
            sepc: entry,
            kernel_sp: 0,
            kernel_ra: 0,
            kernel_tp: 0,
            kernel_s: [0; 12],
            float_regs: FloatContext::new(),
        };
        *cx.sp_mut() = sp;
        cx
    }

    pub fn ra_mut(&mut self) -> &mut usize {
        &mut self.user_regs[0]
    }

    pub fn sp(&self) -> usize {
        self.user_regs[1]
    }

    pub fn sp_mut(&mut self) -> &mut usize {
        &mut self.user_regs[1]
    }

    pub fn a0_mut(&mut self) -> &mut usize {
        &mut self.user_regs[9]
    }

    pub fn a1_mut(&mut self) -> &mut usize {
        &mut self.user_regs[10]
    }

    pub fn a2_mut(&mut self) -> &mut usize {
        &mut self.user_regs[11]
    }

    /// 向用户控制流中注入一次 handler 调用。
    ///
    /// 调用者须先保存好当前上下文；handler 返回时跳到 `restorer`，
    /// 由 sigreturn 恢复被保存的上下文，因此栈布局不构成任何约定
    pub fn inject_handler_frame(&mut self, handler: usize, signal: u8, restorer: usize) {
        self.sepc = handler;
        *self.a0_mut() = usize::from(signal);
        *self.ra_mut() = restorer;
    }
}

/// f0~f31 与 fcsr。
///
/// `clone` 线程时随栈内容一起复制，使子线程看到一致的浮点状态
#[repr(C)]
#[derive(Clone, Debug, PartialEq)]
pub struct FloatContext {
    pub regs: [f64; 32],
    pub fcsr: u32,
}

impl FloatContext {
    pub const fn new() -> Self {
        Self {
            regs: [0.0; 32],
            fcsr: 0,
        }
    }
}

impl Default for FloatContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_init_context_primes_entry_and_stack() {
        let cx = TrapContext::app_init_context(0x1000, 0x4000_0000);
        assert_eq!(cx.sepc, 0x1000);
        assert_eq!(cx.sp(), 0x4000_0000);
        assert_eq!(cx.sstatus & SSTATUS_SPP, 0);
    }

    #[test]
    fn inject_handler_frame_redirects_control_flow() {
        let mut cx = TrapContext::app_init_context(0x1000, 0x4000_0000);
        cx.inject_handler_frame(0x2000, 10, 0x3000);
        assert_eq!(cx.sepc, 0x2000);
        assert_eq!(cx.user_regs[9], 10);
        assert_eq!(cx.user_regs[0], 0x3000);
    }
}

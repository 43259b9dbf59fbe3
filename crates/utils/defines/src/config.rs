pub const PTR_SIZE: usize = core::mem::size_of::<usize>();
const KB: usize = 1024;
const MB: usize = 1024 * KB;

/// 一个页大小的 bit 数
pub const PAGE_SIZE_BITS: usize = 12;
/// 页大小
pub const PAGE_SIZE: usize = 1 << PAGE_SIZE_BITS;

/// 每个线程的内核栈大小
pub const KERNEL_STACK_SIZE: usize = 64 * PAGE_SIZE;
/// 用户栈的大小
pub const USER_STACK_SIZE: usize = 8 * MB;
/// 中断返回栈的大小。用户线程陷入内核时首先落在这里
pub const INTERRUPT_STACK_SIZE: usize = 4 * PAGE_SIZE;

/// 用户栈从这里向低地址排布，即低地址空间 256GiB 的末端
pub const USER_STACK_REGION_TOP: usize = 0x40_0000_0000;
/// 用户栈区域的下界。栈放不进这个窗口就视为线程数超限
pub const USER_STACK_REGION_BOTTOM: usize = 0x20_0000_0000;

/// 进程内堆分配器划地的窗口
pub const PROCESS_HEAP_BOTTOM: usize = 0x10_0000_0000;
pub const PROCESS_HEAP_TOP: usize = USER_STACK_REGION_BOTTOM;

/// 内核栈区域，位于高地址空间
pub const KERNEL_STACK_REGION_BOTTOM: usize = 0xFFFF_FFC0_0000_0000;
pub const KERNEL_STACK_REGION_TOP: usize = 0xFFFF_FFD0_0000_0000;

/// 信号机制所需的 bitset 大小
pub const SIGSET_SIZE: usize = 64;
pub const SIGSET_SIZE_BYTES: usize = SIGSET_SIZE / 8;

/// 核心数
pub const HART_NUM: usize = 8;

/// 时间片长度，时钟中断按它驱动轮转
pub const TIME_SLICE_MS: usize = 10;

/// 进程内低于等于一页的分配走定宽分配器，其大小类为 2 的幂
pub const FIXED_CLASS_MIN: usize = 16;

const _: () = assert!(USER_STACK_SIZE % PAGE_SIZE == 0 && KERNEL_STACK_SIZE % PAGE_SIZE == 0);

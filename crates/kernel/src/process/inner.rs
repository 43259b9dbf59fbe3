use alloc::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};

use compact_str::CompactString;

use super::{
    allocator::{FixedWidthAllocator, GeneralAllocator},
    Process,
};
use crate::{fs::FdTable, memory::MemorySpace, thread::Thread};

pub struct ProcessInner {
    /* 这里的资源都要考虑在进程清理与 fork/exec 时的去向 */
    pub name: CompactString,

    /* 地址空间 */
    pub memory_space: MemorySpace,

    /* 进程树 */
    pub parent: Weak<Process>,
    pub children: Vec<Arc<Process>>,
    /// cwd 永远以 `/` 开头
    pub cwd: CompactString,

    /* 文件 */
    pub fd_table: FdTable,

    /* 进程内堆 */
    pub fixed_allocators: Vec<FixedWidthAllocator>,
    pub general_allocator: Option<GeneralAllocator>,

    /* 线程 */
    pub threads: BTreeMap<usize, Arc<Thread>>,
}

impl ProcessInner {
    /// tid 最小的线程，即主线程
    pub fn main_thread(&self) -> Arc<Thread> {
        Arc::clone(self.threads.values().next().expect("process has no threads"))
    }
}

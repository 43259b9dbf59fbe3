//! 内核自身的堆。
//!
//! 物理内存分配器的内部机制在核心之外，这里只是把一段启动时预留的
//! 静态区域交给链表分配器。hosted 后端直接使用宿主的分配器

use core::mem::MaybeUninit;

use linked_list_allocator::LockedHeap;

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

const KERNEL_HEAP_SIZE: usize = 32 * 1024 * 1024;

static mut HEAP_SPACE: MaybeUninit<[u8; KERNEL_HEAP_SIZE]> = MaybeUninit::uninit();

/// # Safety
///
/// 只能在启动早期、任何分配发生之前调用一次
pub unsafe fn init() {
    unsafe {
        let start: *mut u8 = core::ptr::addr_of_mut!(HEAP_SPACE).cast();
        HEAP.lock().init(start, KERNEL_HEAP_SIZE);
    }
}

//! 进程内的两级堆分配器。
//!
//! 不超过一页的请求由按 2 的幂分档的定宽分配器服务，更大的请求走
//! 通用分配器。两者的地都从进程自己的地址空间里划。失败模式必须
//! 以错误或告警的形式浮出水面，绝不允许悄悄破坏状态

use alloc::{collections::BTreeMap, vec::Vec};

use defines::{
    config::{PAGE_SIZE, PROCESS_HEAP_BOTTOM, PROCESS_HEAP_TOP},
    error::KResult,
};

use crate::memory::{MapPermission, MemorySpace};

/// 单一尺寸档的定宽分配器，管一页
pub struct FixedWidthAllocator {
    class_size: usize,
    region: usize,
    free_slots: Vec<u16>,
    allocations: usize,
}

impl FixedWidthAllocator {
    pub fn new(memory_space: &mut MemorySpace, class_size: usize) -> KResult<Self> {
        debug_assert!(class_size.is_power_of_two() && class_size <= PAGE_SIZE);
        let region = memory_space.allocate_range(
            PAGE_SIZE,
            PROCESS_HEAP_BOTTOM..PROCESS_HEAP_TOP,
            MapPermission::R | MapPermission::W | MapPermission::U,
        )?;
        let free_slots = (0..(PAGE_SIZE / class_size) as u16).rev().collect();
        Ok(Self {
            class_size,
            region,
            free_slots,
            allocations: 0,
        })
    }

    pub fn allocation_size(&self) -> usize {
        self.class_size
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn max_allocations(&self) -> usize {
        PAGE_SIZE / self.class_size
    }

    pub fn allocate(&mut self) -> Option<usize> {
        let slot = self.free_slots.pop()?;
        self.allocations += 1;
        Some(self.region + slot as usize * self.class_size)
    }

    /// 地址属于本分配器则回收并返回 true
    pub fn deallocate(&mut self, addr: usize) -> bool {
        if addr < self.region || addr >= self.region + PAGE_SIZE {
            return false;
        }
        let offset = addr - self.region;
        if offset % self.class_size != 0 {
            return false;
        }
        let slot = (offset / self.class_size) as u16;
        debug_assert!(!self.free_slots.contains(&slot), "double free in size class");
        self.free_slots.push(slot);
        self.allocations -= 1;
        true
    }

    /// 连同底下的区域一起归还
    pub fn release(self, memory_space: &mut MemorySpace) {
        memory_space.remove_range(self.region);
    }
}

/// 超过一页的请求，每个请求独占整数页的区域
pub struct GeneralAllocator {
    chunks: BTreeMap<usize, usize>,
}

impl GeneralAllocator {
    pub fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
        }
    }

    pub fn allocate(&mut self, memory_space: &mut MemorySpace, bytes: usize) -> KResult<usize> {
        let size = bytes.next_multiple_of(PAGE_SIZE);
        let vaddr = memory_space.allocate_range(
            size,
            PROCESS_HEAP_BOTTOM..PROCESS_HEAP_TOP,
            MapPermission::R | MapPermission::W | MapPermission::U,
        )?;
        self.chunks.insert(vaddr, size);
        Ok(vaddr)
    }

    pub fn deallocate(&mut self, memory_space: &mut MemorySpace, addr: usize) -> bool {
        if self.chunks.remove(&addr).is_none() {
            return false;
        }
        memory_space.remove_range(addr);
        true
    }

    pub fn release(self, memory_space: &mut MemorySpace) {
        for vaddr in self.chunks.into_keys() {
            memory_space.remove_range(vaddr);
        }
    }
}

impl Default for GeneralAllocator {
    fn default() -> Self {
        Self::new()
    }
}

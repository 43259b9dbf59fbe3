//! 地址空间与映射区域。
//!
//! 本模块只承诺两个操作：在给定范围内分配一段映射好、清零的区域，
//! 以及把区域克隆进另一个地址空间。后备存储是直接映射的缓冲区，
//! 页表后端从同一接口接入，区域之外的虚存机制不属于这一层

#[cfg(all(target_arch = "riscv64", not(test)))]
pub mod kernel_heap;
mod stack;

use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::ops::Range;

use bitflags::bitflags;
use defines::{
    config::PAGE_SIZE,
    error::{errno, KResult},
};

pub use stack::{alloc_interrupt_stack, alloc_user_stack, KernelStack, StackRange, KERNEL_SPACE};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MapPermission: u8 {
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

/// 一段连续的映射区域。创建即清零
pub struct VirtualRange {
    vaddr: usize,
    perm: MapPermission,
    data: Box<[u8]>,
}

impl VirtualRange {
    fn new_zeroed(vaddr: usize, size: usize, perm: MapPermission) -> KResult<Self> {
        debug_assert!(vaddr % PAGE_SIZE == 0 && size % PAGE_SIZE == 0);
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| errno::ENOMEM)?;
        data.resize(size, 0);
        Ok(Self {
            vaddr,
            perm,
            data: data.into_boxed_slice(),
        })
    }

    pub fn vaddr(&self) -> usize {
        self.vaddr
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn end(&self) -> usize {
        self.vaddr + self.data.len()
    }

    pub fn perm(&self) -> MapPermission {
        self.perm
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.vaddr <= addr && addr < self.end()
    }

    fn clone_contents(&self) -> KResult<Self> {
        let mut range = Self::new_zeroed(self.vaddr, self.size(), self.perm)?;
        range.data.copy_from_slice(&self.data);
        Ok(range)
    }
}

/// 一个进程（或内核自身）的地址空间：一组互不重叠的 [`VirtualRange`]
pub struct MemorySpace {
    ranges: BTreeMap<usize, VirtualRange>,
}

impl MemorySpace {
    pub const fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    /// 在 `bounds` 内找一块空闲位置，分配一段大小为 `size` 的清零区域。
    ///
    /// 从高地址向低地址找，每段区域之间留一页空隙作为 guard page。
    /// 返回区域起始地址
    pub fn allocate_range(
        &mut self,
        size: usize,
        bounds: Range<usize>,
        perm: MapPermission,
    ) -> KResult<usize> {
        debug_assert!(size % PAGE_SIZE == 0);
        let mut top = bounds.end;
        for range in self.ranges.values().rev() {
            if range.end() <= bounds.start || range.vaddr >= bounds.end {
                continue;
            }
            if top >= range.end() + PAGE_SIZE && top - range.end() - PAGE_SIZE >= size + PAGE_SIZE {
                break;
            }
            top = range.vaddr;
        }
        let vaddr = top
            .checked_sub(size + PAGE_SIZE)
            .filter(|vaddr| *vaddr >= bounds.start)
            .ok_or(errno::ENOMEM)?;
        self.insert(VirtualRange::new_zeroed(vaddr, size, perm)?);
        Ok(vaddr)
    }

    /// 在指定地址放置一段清零区域，用于加载 ELF 段。与已有区域重叠则 `EINVAL`
    pub fn allocate_fixed(
        &mut self,
        vaddr: usize,
        size: usize,
        perm: MapPermission,
    ) -> KResult<()> {
        if self.range_containing(vaddr).is_some()
            || self.range_containing(vaddr + size - 1).is_some()
        {
            return Err(errno::EINVAL);
        }
        self.insert(VirtualRange::new_zeroed(vaddr, size, perm)?);
        Ok(())
    }

    fn insert(&mut self, range: VirtualRange) {
        self.ranges.insert(range.vaddr, range);
    }

    /// 解除一段区域的映射。区域不存在时返回 false
    pub fn remove_range(&mut self, vaddr: usize) -> bool {
        self.ranges.remove(&vaddr).is_some()
    }

    pub fn range(&self, vaddr: usize) -> Option<&VirtualRange> {
        self.ranges.get(&vaddr)
    }

    pub fn range_containing(&self, addr: usize) -> Option<&VirtualRange> {
        self.ranges
            .range(..=addr)
            .next_back()
            .map(|(_, range)| range)
            .filter(|range| range.contains(addr))
    }

    /// 把 `vaddr` 起始的区域克隆进 `target`，内容一并复制
    pub fn clone_range_into(&self, vaddr: usize, target: &mut MemorySpace) -> KResult<()> {
        let range = self.ranges.get(&vaddr).ok_or(errno::EINVAL)?;
        target.insert(range.clone_contents()?);
        Ok(())
    }

    /// fork：克隆整个地址空间
    pub fn clone_from_other(other: &MemorySpace) -> KResult<MemorySpace> {
        let mut space = MemorySpace::new();
        for range in other.ranges.values() {
            space.insert(range.clone_contents()?);
        }
        Ok(space)
    }

    pub fn write(&mut self, addr: usize, bytes: &[u8]) -> KResult<()> {
        let range = self
            .ranges
            .range_mut(..=addr)
            .next_back()
            .map(|(_, range)| range)
            .filter(|range| range.contains(addr))
            .ok_or(errno::EFAULT)?;
        let offset = addr - range.vaddr;
        if offset + bytes.len() > range.size() {
            return Err(errno::EFAULT);
        }
        range.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, addr: usize, buf: &mut [u8]) -> KResult<()> {
        let range = self.range_containing(addr).ok_or(errno::EFAULT)?;
        let offset = addr - range.vaddr;
        if offset + buf.len() > range.size() {
            return Err(errno::EFAULT);
        }
        buf.copy_from_slice(&range.data[offset..offset + buf.len()]);
        Ok(())
    }

    /// 进程退出时的地址空间回收。之后这个空间不应再被访问
    pub fn recycle_user_pages(&mut self) {
        self.ranges = BTreeMap::new();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Default for MemorySpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: Range<usize> = 0x1000_0000..0x2000_0000;

    #[test]
    fn allocate_range_picks_top_down_with_guard_gap() {
        let mut space = MemorySpace::new();
        let a = space
            .allocate_range(4 * PAGE_SIZE, BOUNDS, MapPermission::R | MapPermission::W)
            .unwrap();
        let b = space
            .allocate_range(4 * PAGE_SIZE, BOUNDS, MapPermission::R | MapPermission::W)
            .unwrap();
        assert!(a > b);
        // 两段区域之间至少隔一页
        assert!(space.range(b).unwrap().end() < a);
        assert_eq!(a + 4 * PAGE_SIZE + PAGE_SIZE, BOUNDS.end);
    }

    #[test]
    fn allocated_range_is_zeroed_and_writable() {
        let mut space = MemorySpace::new();
        let vaddr = space
            .allocate_range(PAGE_SIZE, BOUNDS, MapPermission::R | MapPermission::W)
            .unwrap();
        let mut buf = [0xff_u8; 16];
        space.read(vaddr + 64, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        space.write(vaddr + 64, &[1, 2, 3]).unwrap();
        space.read(vaddr + 64, &mut buf[..3]).unwrap();
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn out_of_range_access_is_efault() {
        let mut space = MemorySpace::new();
        let vaddr = space
            .allocate_range(PAGE_SIZE, BOUNDS, MapPermission::R)
            .unwrap();
        assert_eq!(space.write(vaddr + PAGE_SIZE, &[0]), Err(errno::EFAULT));
        let mut buf = [0; 1];
        assert_eq!(space.read(0x3000_0000, &mut buf), Err(errno::EFAULT));
    }

    #[test]
    fn clone_copies_contents() {
        let mut space = MemorySpace::new();
        let vaddr = space
            .allocate_range(PAGE_SIZE, BOUNDS, MapPermission::R | MapPermission::W)
            .unwrap();
        space.write(vaddr, b"fork me").unwrap();

        let cloned = MemorySpace::clone_from_other(&space).unwrap();
        let mut buf = [0_u8; 7];
        cloned.read(vaddr, &mut buf).unwrap();
        assert_eq!(&buf, b"fork me");

        // 深拷贝：改动父空间不影响子空间
        space.write(vaddr, b"changed").unwrap();
        cloned.read(vaddr, &mut buf).unwrap();
        assert_eq!(&buf, b"fork me");
    }

    #[test]
    fn exhausted_bounds_report_enomem() {
        let mut space = MemorySpace::new();
        let tight = 0x1000_0000..0x1000_0000 + 4 * PAGE_SIZE;
        space
            .allocate_range(PAGE_SIZE, tight.clone(), MapPermission::R)
            .unwrap();
        assert_eq!(
            space.allocate_range(2 * PAGE_SIZE, tight, MapPermission::R),
            Err(errno::ENOMEM)
        );
    }
}

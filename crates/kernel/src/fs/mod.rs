//! 进程的打开文件表。
//!
//! 真正的文件系统在内核核心之外，这里只有进程拥有的那张 fd 表和
//! 它在 fork/exec/退出时的行为。表中的对象通过 [`File`] 这层窄接口
//! 进出

use alloc::{sync::Arc, vec::Vec};

use bitflags::bitflags;
use defines::error::{errno, KResult};

/// 文件系统一侧需要实现的全部接口
pub trait File: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> KResult<usize>;
    fn write(&self, buf: &[u8]) -> KResult<usize>;
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FdFlags: u8 {
        const CLOEXEC = 1;
    }
}

#[derive(Clone)]
struct FdEntry {
    file: Arc<dyn File>,
    flags: FdFlags,
}

/// fd 表。进程退出时必须先于地址空间释放
#[derive(Clone)]
pub struct FdTable {
    entries: Vec<Option<FdEntry>>,
}

impl FdTable {
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 0/1/2 接到控制台
    pub fn with_stdio() -> Self {
        let tty: Arc<dyn File> = Arc::new(TtyFile);
        let mut table = Self::empty();
        for _ in 0..3 {
            table.entries.push(Some(FdEntry {
                file: Arc::clone(&tty),
                flags: FdFlags::empty(),
            }));
        }
        table
    }

    /// 占用最小的空闲 fd
    pub fn insert(&mut self, file: Arc<dyn File>, flags: FdFlags) -> KResult<usize> {
        let entry = Some(FdEntry { file, flags });
        if let Some(fd) = self.entries.iter().position(Option::is_none) {
            self.entries[fd] = entry;
            return Ok(fd);
        }
        self.entries.try_reserve(1).map_err(|_| errno::ENOMEM)?;
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    pub fn get(&self, fd: usize) -> KResult<Arc<dyn File>> {
        self.entries
            .get(fd)
            .and_then(Option::as_ref)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(errno::EBADF)
    }

    pub fn close(&mut self, fd: usize) -> KResult<()> {
        match self.entries.get_mut(fd) {
            Some(entry @ Some(_)) => {
                *entry = None;
                Ok(())
            }
            _ => Err(errno::EBADF),
        }
    }

    /// exec 时关掉标了 CLOEXEC 的项
    pub fn close_on_exec(&mut self) {
        for entry in &mut self.entries {
            if entry
                .as_ref()
                .is_some_and(|entry| entry.flags.contains(FdFlags::CLOEXEC))
            {
                *entry = None;
            }
        }
    }

    /// 进程退出：整表释放。之后任何 fd 都不可用
    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }

    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }
}

/// 启动时嵌入内核的可执行镜像表。
///
/// 文件系统在核心之外，execve 能找到的镜像就是登记在这里的这些
pub mod images {
    use alloc::collections::BTreeMap;

    use compact_str::CompactString;
    use klocks::SpinMutex;

    static IMAGES: SpinMutex<BTreeMap<CompactString, &'static [u8]>> =
        SpinMutex::new(BTreeMap::new());

    pub fn register(path: &str, image: &'static [u8]) {
        IMAGES.lock().insert(CompactString::from(path), image);
    }

    pub fn lookup(path: &str) -> Option<&'static [u8]> {
        IMAGES.lock().get(path).copied()
    }
}

/// 控制台。读永远是空的，写直接送往日志输出端
struct TtyFile;

impl File for TtyFile {
    fn read(&self, _buf: &mut [u8]) -> KResult<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> KResult<usize> {
        if let Ok(s) = core::str::from_utf8(buf) {
            info!("[tty] {}", s.trim_end_matches('\n'));
        }
        Ok(buf.len())
    }
}

/// /dev/null 语义
pub struct NullFile;

impl File for NullFile {
    fn read(&self, _buf: &mut [u8]) -> KResult<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> KResult<usize> {
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fds_allocate_lowest_free_slot() {
        let mut table = FdTable::with_stdio();
        let fd = table.insert(Arc::new(NullFile), FdFlags::empty()).unwrap();
        assert_eq!(fd, 3);
        table.close(1).unwrap();
        let fd = table.insert(Arc::new(NullFile), FdFlags::empty()).unwrap();
        assert_eq!(fd, 1);
    }

    #[test]
    fn close_on_exec_only_touches_marked_entries() {
        let mut table = FdTable::with_stdio();
        let keep = table.insert(Arc::new(NullFile), FdFlags::empty()).unwrap();
        let gone = table.insert(Arc::new(NullFile), FdFlags::CLOEXEC).unwrap();
        table.close_on_exec();
        assert!(table.get(keep).is_ok());
        assert_eq!(table.get(gone).err(), Some(errno::EBADF));
    }

    #[test]
    fn double_close_is_ebadf() {
        let mut table = FdTable::with_stdio();
        table.close(0).unwrap();
        assert_eq!(table.close(0).err(), Some(errno::EBADF));
        assert_eq!(table.close(99).err(), Some(errno::EBADF));
    }
}

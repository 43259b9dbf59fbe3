//! 全局进程表。
//!
//! 唯一的进程注册点，显式持有、锁保护。进程在创建时登记，
//! 在清理例程里注销；僵尸进程只能通过父进程的 children 列表找到

use alloc::{collections::BTreeMap, sync::Arc};

use klocks::{SpinMutex, SpinMutexGuard};

use super::Process;

pub static PROCESS_MANAGER: ProcessManager = ProcessManager::new();

pub struct ProcessManager(SpinMutex<BTreeMap<usize, Arc<Process>>>);

impl ProcessManager {
    const fn new() -> Self {
        Self(SpinMutex::new(BTreeMap::new()))
    }

    pub fn add(&self, pid: usize, process: &Arc<Process>) {
        self.0.lock().insert(pid, Arc::clone(process));
    }

    pub fn remove(&self, pid: usize) {
        self.0.lock().remove(&pid);
    }

    pub fn get(&self, pid: usize) -> Option<Arc<Process>> {
        self.0.lock().get(&pid).cloned()
    }

    pub fn init_proc(&self) -> Arc<Process> {
        Arc::clone(self.0.lock().get(&1).expect("init process should never die"))
    }

    pub fn lock_all(&self) -> SpinMutexGuard<'_, BTreeMap<usize, Arc<Process>>> {
        self.0.lock()
    }
}

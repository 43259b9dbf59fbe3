use defines::{
    config::SIGSET_SIZE,
    signal::KSignalAction,
};

use super::Signal;

/// 默认处置的分类
pub enum DefaultHandler {
    Terminate,
    Ignore,
    CoreDump,
    Stop,
    Continue,
}

impl DefaultHandler {
    pub fn new(signal: Signal) -> Self {
        #[allow(clippy::enum_glob_use)]
        use Signal::*;
        match signal {
            SIGABRT | SIGBUS | SIGFPE | SIGILL | SIGQUIT | SIGSEGV | SIGSYS | SIGTRAP | SIGXCPU
            | SIGXFSZ => DefaultHandler::CoreDump,
            SIGCHLD | SIGURG => DefaultHandler::Ignore,
            SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU => DefaultHandler::Stop,
            SIGCONT => DefaultHandler::Continue,
            _ => DefaultHandler::Terminate,
        }
    }
}

/// 由进程持有，所有线程共享
#[derive(Clone)]
pub struct SignalHandlers {
    actions: [KSignalAction; SIGSET_SIZE],
}

impl SignalHandlers {
    pub const fn new() -> Self {
        const DEFAULT_ACTION: KSignalAction = KSignalAction::new();
        Self {
            actions: [DEFAULT_ACTION; SIGSET_SIZE],
        }
    }

    pub fn action(&self, signal: Signal) -> &KSignalAction {
        &self.actions[signal as usize]
    }

    pub fn action_mut(&mut self, signal: Signal) -> &mut KSignalAction {
        &mut self.actions[signal as usize]
    }

    /// exec 之后全部回到默认处置
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SignalHandlers {
    fn default() -> Self {
        Self::new()
    }
}

//! 内核日志与 span 追踪。
//!
//! 输出端是启动时注册的一个 [`LogSink`]；写出由一把递归锁序列化，
//! 这样 panic 处理等本身会打日志的路径重入时不会把自己锁死

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod macros;
mod level;
mod record;
mod span;

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::vec::Vec;
use anstyle::{AnsiColor, Reset, Style};
use compact_str::CompactString;
use core::fmt::Write;
use klocks::RecursiveSpinLock;
use slab::Slab;
use spin::{Lazy, Mutex, Once};

pub use level::{Level, LevelFilter, CLOG};
pub use record::Record;
pub use span::{Loggable, Span};

use span::{SpanData, SpanId};

/// 日志的最终去处。实现方自行处理并发（sink 可能被任意 hart 写入）
pub trait LogSink: Sync {
    fn write_str(&self, s: &str);
}

static SINK: Once<&'static dyn LogSink> = Once::new();
static SINK_LOCK: RecursiveSpinLock = RecursiveSpinLock::new();
static MAX_LEVEL: AtomicUsize = AtomicUsize::new(CLOG as usize);

/// 注册输出端。只有第一次调用生效
pub fn set_sink(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

pub fn set_max_level(filter: LevelFilter) {
    MAX_LEVEL.store(filter as usize, Ordering::SeqCst);
}

pub fn max_level() -> LevelFilter {
    level::from_usize(MAX_LEVEL.load(Ordering::SeqCst))
}

pub static KERNEL_TRACER: Lazy<KernelTracer> = Lazy::new(|| KernelTracer {
    slab: Mutex::new(Slab::with_capacity(64)),
    span_stack: Mutex::new(Vec::with_capacity(32)),
});

pub struct KernelTracer {
    slab: Mutex<Slab<SpanData>>,
    span_stack: Mutex<Vec<SpanId>>,
}

impl KernelTracer {
    fn render(&self, writer: &mut impl Write, record: &Record<'_>, span_level: LevelFilter) {
        // 开头部分，即日志级别，如 `[ INFO]`
        let color = match record.level() {
            Level::Error => AnsiColor::Red,
            Level::Warn => AnsiColor::BrightYellow,
            Level::Info => AnsiColor::Blue,
            Level::Debug => AnsiColor::Green,
            Level::Trace => AnsiColor::BrightBlack,
        };
        write!(
            writer,
            "{}[{:>5}]{}",
            color.render_fg(),
            record.level(),
            Reset.render()
        )
        .unwrap();

        // Span 栈部分
        let mut has_span = false;
        {
            let slab = self.slab.lock();
            let stack = self.span_stack.lock();

            const SPAN_NAME_COLOR: Style = AnsiColor::White.on_default().bold();

            for id in stack.iter() {
                let span_data = slab.get(id.as_slab_index()).unwrap();
                if span_data.level() > span_level {
                    continue;
                }
                has_span = true;

                write!(
                    writer,
                    "-{}{}{}",
                    SPAN_NAME_COLOR.render(),
                    span_data.name(),
                    Reset.render()
                )
                .unwrap();
                if let Some(kvs) = span_data.kvs() {
                    write!(writer, "{{{kvs}}}").unwrap();
                }
            }
        }
        if has_span {
            write!(writer, ": ").unwrap();
        } else {
            write!(writer, " ").unwrap();
        }

        // 日志信息部分
        writeln!(writer, "{}", record.args()).unwrap();
    }
}

#[inline]
#[doc(hidden)]
pub fn log_impl(level: Level, args: core::fmt::Arguments<'_>) {
    if level > max_level() {
        return;
    }
    let Some(sink) = SINK.get() else {
        return;
    };
    let record = Record::new(level, args);
    let mut line = CompactString::new("");
    KERNEL_TRACER.render(&mut line, &record, max_level());
    let _guard = SINK_LOCK.lock();
    sink.write_str(&line);
}

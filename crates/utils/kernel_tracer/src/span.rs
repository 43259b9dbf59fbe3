//! Span：一段有名字的执行区间，日志输出时作为上下文前缀。
//!
//! 进入顺序构成一个栈，退出时必须与进入时配对

use core::{
    fmt::Write,
    marker::PhantomData,
    num::NonZeroU32,
};

use alloc::{string::String, vec::Vec};
use compact_str::CompactString;

use crate::{Level, KERNEL_TRACER};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SpanId(NonZeroU32);

impl SpanId {
    pub fn as_slab_index(&self) -> usize {
        self.0.get() as usize - 1
    }
}

pub struct Span {
    id: Option<SpanId>,
}

impl Span {
    /// 创建一个新的 span。只是注册，并没有实际启用。
    ///
    /// 调用 `entered()` 以进入该 span
    pub fn new<'a>(
        level: Level,
        name: &'static str,
        kvs: Option<&'a [(&'static str, &'a dyn Loggable)]>,
    ) -> Self {
        let kvs = kvs.map(|kvs| {
            let mut kvs_str = CompactString::new("");
            // 宏保证数组非空，这里不会 panic
            write!(kvs_str, "{}=", kvs[0].0).unwrap();
            kvs[0].1.log(&mut kvs_str);
            for (key, value) in &kvs[1..] {
                write!(kvs_str, " {key}=").unwrap();
                value.log(&mut kvs_str);
            }
            kvs_str
        });

        let span_data = SpanData { level, name, kvs };
        let id = KERNEL_TRACER.slab.lock().insert(span_data);
        let id = NonZeroU32::new(id as u32 + 1).unwrap();
        Span {
            id: Some(SpanId(id)),
        }
    }

    pub fn disabled() -> Self {
        Self { id: None }
    }

    pub fn entered(self) -> OwnedEnterGuard {
        if let Some(id) = &self.id {
            KERNEL_TRACER.span_stack.lock().push(id.clone());
        }
        OwnedEnterGuard {
            span: self,
            _not_send: PhantomData,
        }
    }
}

impl Drop for Span {
    #[inline]
    fn drop(&mut self) {
        if let Some(id) = &self.id {
            KERNEL_TRACER.slab.lock().remove(id.as_slab_index());
        }
    }
}

#[must_use = "once a span has been entered, it should be exited"]
pub struct OwnedEnterGuard {
    span: Span,
    _not_send: PhantomData<*const ()>,
}

impl Drop for OwnedEnterGuard {
    fn drop(&mut self) {
        if let Some(id) = &self.span.id {
            // 多个 hart 共享这个栈，进入退出可能交错，按 id 从尾部找到自己的那一项
            let mut stack = KERNEL_TRACER.span_stack.lock();
            if let Some(pos) = stack.iter().rposition(|span_id| span_id == id) {
                stack.remove(pos);
            }
        }
    }
}

pub(crate) struct SpanData {
    name: &'static str,
    level: Level,
    kvs: Option<CompactString>,
}

impl SpanData {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kvs(&self) -> Option<&str> {
        self.kvs.as_deref()
    }
}

/// 可用于 span 宏键值对中值的类型
pub trait Loggable {
    fn log(&self, writer: &mut CompactString);
}

// 要经过这个转一道。
// 无法 `impl<T: Display> Loggable for T` 后再给上游类型实现 Loggable，
// 因为上游随时可能为该类型实现 Display，导致冲突
trait SpecDisplay: core::fmt::Display {}

macro_rules! display_impl {
    ($($t:tt)*) => ($(
        impl SpecDisplay for $t {}
    )*);
}

display_impl!(u8 u16 u32 u64 usize i8 i16 i32 i64 isize str char String CompactString);

impl<T: SpecDisplay + ?Sized> Loggable for T {
    fn log(&self, writer: &mut CompactString) {
        core::fmt::write(writer, format_args!("{self}")).unwrap();
    }
}

impl<T: SpecDisplay + ?Sized> SpecDisplay for &T {}

impl<T: SpecDisplay> Loggable for [T] {
    fn log(&self, writer: &mut CompactString) {
        writer.push_str("[");
        let mut rest = false;
        for t in self {
            if rest {
                writer.push_str(", ");
            }
            core::fmt::write(writer, format_args!("{t}")).unwrap();
            rest = true;
        }
        writer.push_str("]");
    }
}

impl<T: SpecDisplay> Loggable for Vec<T> {
    fn log(&self, writer: &mut CompactString) {
        self.as_slice().log(writer);
    }
}

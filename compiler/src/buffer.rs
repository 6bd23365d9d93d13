// buffer.rs — Signal buffer pool with retain counts
//
// Each pooled class (float and integer signal) tracks every buffer it has
// minted under its current retain count. A buffer with count zero is free.
// Allocation prefers the most recently freed buffer that is not excluded;
// otherwise a new index is minted. Input, output, and zero buffers belong to
// the runtime and are never pooled.
//
// Preconditions: none.
// Postconditions: every minted buffer is in exactly one count bucket.
// Failure modes: retaining an untracked buffer or releasing below zero →
//                `PoolError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::connection::ConnKind;

// ── Buffers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferClass {
    Float,
    Int,
    Input,
    Output,
    Zero,
}

impl BufferClass {
    /// Type tag written to the IR document.
    pub fn tag(self) -> &'static str {
        match self {
            BufferClass::Float => "~f>",
            BufferClass::Int => "~i>",
            BufferClass::Input => "input",
            BufferClass::Output => "output",
            BufferClass::Zero => "zero",
        }
    }

    pub fn for_kind(kind: ConnKind) -> Option<BufferClass> {
        match kind {
            ConnKind::FloatSignal => Some(BufferClass::Float),
            ConnKind::IntSignal => Some(BufferClass::Int),
            _ => None,
        }
    }

    fn slot(self) -> Option<usize> {
        match self {
            BufferClass::Float => Some(0),
            BufferClass::Int => Some(1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Buffer {
    pub class: BufferClass,
    pub index: u32,
}

impl Buffer {
    /// Shared read-only sentinel.
    pub const ZERO: Buffer = Buffer {
        class: BufferClass::Zero,
        index: 0,
    };

    pub fn input(index: u32) -> Self {
        Self {
            class: BufferClass::Input,
            index,
        }
    }

    pub fn output(index: u32) -> Self {
        Self {
            class: BufferClass::Output,
            index,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.class == BufferClass::Zero
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.tag(), self.index)
    }
}

impl Serialize for Buffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Buffer", 2)?;
        s.serialize_field("type", self.class.tag())?;
        s.serialize_field("index", &self.index)?;
        s.end()
    }
}

// ── Pool ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("buffer {0} is not tracked by the pool")]
    Untracked(Buffer),
    #[error("buffer {0} released more often than it was retained")]
    Underflow(Buffer),
}

#[derive(Debug, Clone, Default)]
struct ClassPool {
    /// Retain count → buffer indices at that count, in order of arrival.
    by_count: BTreeMap<u32, Vec<u32>>,
    minted: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    classes: [ClassPool; 2],
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total buffers ever minted for a class.
    pub fn num_buffers(&self, class: BufferClass) -> u32 {
        class.slot().map_or(0, |s| self.classes[s].minted)
    }

    /// Take a free buffer (or mint one) and set its retain count to `count`.
    pub fn get_buffer(&mut self, class: BufferClass, count: u32, exclude: &[Buffer]) -> Buffer {
        let Some(slot) = class.slot() else {
            return Buffer::ZERO;
        };
        let pool = &mut self.classes[slot];
        let free = pool.by_count.entry(0).or_default();
        let reuse = free
            .iter()
            .rposition(|&i| !exclude.contains(&Buffer { class, index: i }));
        let index = match reuse {
            Some(pos) => free.remove(pos),
            None => {
                let i = pool.minted;
                pool.minted += 1;
                i
            }
        };
        pool.by_count.entry(count).or_default().push(index);
        Buffer { class, index }
    }

    /// Adjust the retain count of `buffer` by `delta`; returns the new count.
    /// Runtime-owned buffers are not tracked and always report zero.
    pub fn retain(&mut self, buffer: Buffer, delta: i64) -> Result<u32, PoolError> {
        let Some(slot) = buffer.class.slot() else {
            return Ok(0);
        };
        let pool = &mut self.classes[slot];
        let (count, pos) = pool
            .by_count
            .iter()
            .find_map(|(&k, list)| list.iter().position(|&i| i == buffer.index).map(|p| (k, p)))
            .ok_or(PoolError::Untracked(buffer))?;
        let next = i64::from(count) + delta;
        if next < 0 {
            return Err(PoolError::Underflow(buffer));
        }
        let next = next as u32;
        if next != count {
            if let Some(list) = pool.by_count.get_mut(&count) {
                list.remove(pos);
            }
            pool.by_count.entry(next).or_default().push(buffer.index);
        }
        Ok(next)
    }

    /// Consume one reference to `buffer`.
    pub fn release(&mut self, buffer: Buffer) -> Result<u32, PoolError> {
        self.retain(buffer, -1)
    }

    /// Current retain count, if the pool tracks the buffer.
    pub fn retain_count(&self, buffer: Buffer) -> Option<u32> {
        let slot = buffer.class.slot()?;
        self.classes[slot]
            .by_count
            .iter()
            .find_map(|(&k, list)| list.contains(&buffer.index).then_some(k))
    }

    /// Buffers whose retain count is above zero.
    pub fn live_buffers(&self) -> Vec<Buffer> {
        let mut out = Vec::new();
        for (class, pool) in [BufferClass::Float, BufferClass::Int].into_iter().zip(&self.classes) {
            for (_, list) in pool.by_count.range(1..) {
                out.extend(list.iter().map(|&index| Buffer { class, index }));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_new_buffers_when_none_are_free() {
        let mut pool = BufferPool::new();
        let a = pool.get_buffer(BufferClass::Float, 1, &[]);
        let b = pool.get_buffer(BufferClass::Float, 1, &[]);
        assert_eq!((a.index, b.index), (0, 1));
        assert_eq!(pool.num_buffers(BufferClass::Float), 2);
        assert_eq!(pool.num_buffers(BufferClass::Int), 0);
    }

    #[test]
    fn released_buffer_is_reused_most_recent_first() {
        let mut pool = BufferPool::new();
        let a = pool.get_buffer(BufferClass::Float, 1, &[]);
        let b = pool.get_buffer(BufferClass::Float, 1, &[]);
        assert_eq!(pool.release(a), Ok(0));
        assert_eq!(pool.release(b), Ok(0));
        let c = pool.get_buffer(BufferClass::Float, 2, &[]);
        assert_eq!(c, b);
        assert_eq!(pool.retain_count(c), Some(2));
    }

    #[test]
    fn excluded_buffers_are_skipped() {
        let mut pool = BufferPool::new();
        // an unconnected outlet is free immediately but excluded by its producer
        let a = pool.get_buffer(BufferClass::Float, 0, &[]);
        let b = pool.get_buffer(BufferClass::Float, 1, &[a]);
        assert_ne!(a, b);
        assert_eq!(pool.num_buffers(BufferClass::Float), 2);
    }

    #[test]
    fn retain_moves_between_counts() {
        let mut pool = BufferPool::new();
        let a = pool.get_buffer(BufferClass::Int, 1, &[]);
        assert_eq!(pool.retain(a, 2), Ok(3));
        assert_eq!(pool.live_buffers(), vec![a]);
        assert_eq!(pool.retain(a, -3), Ok(0));
        assert!(pool.live_buffers().is_empty());
    }

    #[test]
    fn underflow_and_untracked_are_errors() {
        let mut pool = BufferPool::new();
        let a = pool.get_buffer(BufferClass::Float, 0, &[]);
        assert_eq!(pool.release(a), Err(PoolError::Underflow(a)));
        let ghost = Buffer {
            class: BufferClass::Float,
            index: 42,
        };
        assert_eq!(pool.release(ghost), Err(PoolError::Untracked(ghost)));
    }

    #[test]
    fn runtime_buffers_are_not_pooled() {
        let mut pool = BufferPool::new();
        assert_eq!(pool.release(Buffer::input(0)), Ok(0));
        assert_eq!(pool.retain(Buffer::output(1), 4), Ok(0));
        assert_eq!(pool.release(Buffer::ZERO), Ok(0));
        assert_eq!(pool.retain_count(Buffer::ZERO), None);
    }

    #[test]
    fn serializes_as_type_and_index() {
        let b = Buffer {
            class: BufferClass::Float,
            index: 3,
        };
        assert_eq!(
            serde_json::to_value(b).unwrap(),
            serde_json::json!({"type": "~f>", "index": 3})
        );
    }
}

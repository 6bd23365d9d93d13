// id.rs — Node identity within one compile unit
//
// `NodeId` is a generation-checked arena key: a freed slot may be reused,
// but a stale id never aliases the node that reuses the slot. `IrId` is the
// object id written to the IR document, drawn from a monotonically
// increasing per-compile counter so output is deterministic.

use std::fmt;

/// Generation-checked key into the patch arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.index)?;
        if self.generation > 0 {
            write!(f, "v{}", self.generation)?;
        }
        Ok(())
    }
}

/// Object id as it appears in the IR document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrId(pub u32);

impl fmt::Display for IrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Allocator for IR ids and member insertion sequence numbers.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_ir: u32,
    next_seq: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_ir(&mut self) -> IrId {
        let id = IrId(self.next_ir);
        self.next_ir += 1;
        id
    }

    /// Sequence numbers order the members of a graph by insertion.
    pub fn alloc_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

use crate::cursor::{BlockRef, Cursor};

/// A message delivered by the stream, scoped to one block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockScopedEvent {
    Data(BlockData),
    Undo(UndoSignal),
}

/// Module output for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    /// Cursor valid after this block is applied. Its block is the block of the data.
    pub cursor: Cursor,
    /// Highest block that can no longer be undone, as reported by the stream.
    pub final_block_height: u64,
    /// Module output. `None` when the module produced nothing for this block.
    pub payload: Option<Payload>,
}

/// Type-tagged, encoded module output.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// Signals that all blocks after the cursor's block must be considered never-happened.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoSignal {
    /// Cursor at the last valid block.
    pub cursor: Cursor,
}

impl BlockData {
    pub fn block(&self) -> &BlockRef {
        &self.cursor.block
    }
}

impl UndoSignal {
    pub fn last_valid_block(&self) -> &BlockRef {
        &self.cursor.block
    }
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

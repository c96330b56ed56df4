use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::event::{BlockData, UndoSignal};

/// A block identified by its number and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    #[serde(rename = "blockNumber")]
    pub number: u64,
    #[serde(rename = "blockHash")]
    pub hash: String,
}

/// Resumable position in the block stream.
///
/// The token is opaque and is sent back verbatim to the stream when resuming. The block is
/// the last block applied at this position and is only used for ordering checks and
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub token: String,
    #[serde(flatten)]
    pub block: BlockRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// A data block did not move the cursor forward.
    NotIncreasing { current: u64, received: u64 },
    /// An undo signal pointed above the current cursor.
    UndoAboveHead { head: u64, target: u64 },
}

impl error_stack::Context for CursorError {}

impl Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::NotIncreasing { current, received } => write!(
                f,
                "block {received} received while the cursor is at block {current}"
            ),
            CursorError::UndoAboveHead { head, target } => write!(
                f,
                "undo to block {target} received while the cursor is at block {head}"
            ),
        }
    }
}

impl BlockRef {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
        }
    }
}

impl Cursor {
    pub fn new(token: impl Into<String>, block: BlockRef) -> Self {
        Self {
            token: token.into(),
            block,
        }
    }

    pub fn block_number(&self) -> u64 {
        self.block.number
    }

    /// Returns the cursor after `data` is applied on top of `current`.
    ///
    /// Block numbers must strictly increase between data blocks. Receiving the same block
    /// twice without an undo in between is an error.
    pub fn advance(current: Option<&Cursor>, data: &BlockData) -> Result<Cursor, CursorError> {
        if let Some(current) = current {
            if data.cursor.block.number <= current.block.number {
                return Err(CursorError::NotIncreasing {
                    current: current.block.number,
                    received: data.cursor.block.number,
                });
            }
        }

        Ok(data.cursor.clone())
    }

    /// Returns the cursor after `undo` is applied on top of `current`.
    ///
    /// The new cursor is always the cursor of the last valid block.
    pub fn rewind(current: Option<&Cursor>, undo: &UndoSignal) -> Result<Cursor, CursorError> {
        if let Some(current) = current {
            if undo.cursor.block.number > current.block.number {
                return Err(CursorError::UndoAboveHead {
                    head: current.block.number,
                    target: undo.cursor.block.number,
                });
            }
        }

        Ok(undo.cursor.clone())
    }
}

impl Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({}, {})", self.block.number, self.block.hash)
    }
}

/// A newtype to display a cursor that may be `None` as "blank".
pub struct DisplayCursor<'a>(pub &'a Option<Cursor>);

impl<'a> Display for DisplayCursor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(cursor) => write!(f, "{}", cursor),
            None => write!(f, "Cursor(blank)"),
        }
    }
}

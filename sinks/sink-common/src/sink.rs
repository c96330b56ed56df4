use std::fmt::Display;

use async_trait::async_trait;
use error_stack::Result;

use crate::cursor::{BlockRef, Cursor};

/// What a sink guarantees about its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCapabilities {
    /// Handling the same block twice has the same effect as handling it once.
    pub idempotent: bool,
    /// The sink can revert the effects of blocks in [Sink::handle_undo].
    pub compensable: bool,
}

/// Why the sink is asked to revert blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoReason {
    /// The chain forked and the stream sent an undo signal.
    Fork,
    /// The connector restarted from a persisted cursor. Blocks after it may have been
    /// handled without their cursor being persisted.
    Restart,
}

/// Block information passed to the sink together with the decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// Cursor valid after the block is applied.
    pub cursor: Cursor,
    pub final_block_height: u64,
}

/// A downstream consumer of decoded events.
///
/// Calls are serialized: the next call starts only after the previous one returned.
#[async_trait]
pub trait Sink<E>: Send
where
    E: Send + Sync + 'static,
{
    type Error: error_stack::Context;

    fn capabilities(&self) -> SinkCapabilities;

    /// Handle the event decoded from one block.
    ///
    /// Returning an error terminates the connector and the block is not committed.
    async fn handle_data(&mut self, ctx: &Context, event: &E) -> Result<(), Self::Error>;

    /// Revert the effects of all blocks after `last_valid_block`.
    ///
    /// Restart compensation is only requested from compensable sinks.
    async fn handle_undo(
        &mut self,
        last_valid_block: &BlockRef,
        reason: UndoReason,
    ) -> Result<(), Self::Error>;

    async fn cleanup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Context {
    pub fn block(&self) -> &BlockRef {
        &self.cursor.block
    }
}

impl Display for UndoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndoReason::Fork => f.write_str("fork"),
            UndoReason::Restart => f.write_str("restart"),
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Context(block={}, final={})",
            self.cursor.block, self.final_block_height
        )
    }
}

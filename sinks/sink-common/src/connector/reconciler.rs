use std::collections::VecDeque;

use error_stack::{Result, ResultExt};
use tracing::{debug, info, warn};

use crate::{
    cursor::{Cursor, DisplayCursor},
    error::SinkConnectorError,
    event::UndoSignal,
    sink::{Context, Sink, UndoReason},
};

/// A block waiting in the undo buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedBlock<E> {
    pub ctx: Context,
    /// `None` if the block produced no output.
    pub event: Option<E>,
}

/// Holds back the most recent blocks so that shallow forks never reach the sink.
///
/// A block is released once more than `capacity` blocks are buffered, or once it's at or
/// below the final block height.
#[derive(Debug)]
pub struct UndoBuffer<E> {
    capacity: usize,
    blocks: VecDeque<BufferedBlock<E>>,
}

impl<E> UndoBuffer<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            blocks: VecDeque::new(),
        }
    }

    pub fn push(&mut self, block: BufferedBlock<E>) {
        self.blocks.push_back(block);
    }

    /// Returns the blocks that can be sent to the sink, oldest first.
    pub fn release(&mut self, final_block_height: u64) -> Vec<BufferedBlock<E>> {
        let mut released = Vec::new();
        while let Some(oldest) = self.blocks.front() {
            let is_final = oldest.ctx.block().number <= final_block_height;
            if self.blocks.len() <= self.capacity && !is_final {
                break;
            }
            if let Some(block) = self.blocks.pop_front() {
                released.push(block);
            }
        }
        released
    }

    /// Drops all blocks above `block_number`. Returns how many were dropped.
    pub fn discard_above(&mut self, block_number: u64) -> usize {
        let before = self.blocks.len();
        self.blocks
            .retain(|block| block.ctx.block().number <= block_number);
        before - self.blocks.len()
    }

    /// Removes and returns all blocks, oldest first.
    pub fn drain(&mut self) -> Vec<BufferedBlock<E>> {
        self.blocks.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Applies undo signals to the buffered and committed state.
///
/// This is the only place where the sink compensation runs.
pub struct ForkReconciler<E> {
    buffer: UndoBuffer<E>,
}

impl<E> ForkReconciler<E>
where
    E: Send + Sync + 'static,
{
    pub fn new(undo_buffer_size: usize) -> Self {
        Self {
            buffer: UndoBuffer::new(undo_buffer_size),
        }
    }

    pub fn buffer(&mut self) -> &mut UndoBuffer<E> {
        &mut self.buffer
    }

    /// Rolls back everything after the undo target.
    ///
    /// Returns the new committed cursor. Buffered blocks above the target are dropped
    /// silently. If the sink already received blocks above the target it's asked to
    /// compensate them and the committed cursor becomes the undo cursor.
    pub async fn reconcile<S>(
        &mut self,
        sink: &mut S,
        committed: Option<&Cursor>,
        undo: &UndoSignal,
    ) -> Result<Option<Cursor>, SinkConnectorError>
    where
        S: Sink<E>,
    {
        let target = undo.last_valid_block();

        let discarded = self.buffer.discard_above(target.number);
        debug!(
            discarded = discarded,
            target = target.number,
            "discarded buffered blocks"
        );

        let Some(committed) = committed else {
            return Ok(None);
        };

        if committed.block_number() <= target.number {
            info!(
                target = %target,
                committed = %committed,
                "undo absorbed by buffer"
            );
            return Ok(Some(committed.clone()));
        }

        if !sink.capabilities().compensable {
            warn!(
                target = %target,
                committed = %committed,
                "sink cannot compensate. undone blocks remain visible downstream"
            );
        }

        sink.handle_undo(target, UndoReason::Fork)
            .await
            .change_context(SinkConnectorError::UndoReconciliation)
            .attach_printable_lazy(|| format!("failed to undo blocks after {target}"))
            .attach_printable_lazy(|| {
                format!(
                    "last committed cursor: {}",
                    DisplayCursor(&Some(committed.clone()))
                )
            })?;

        Ok(Some(undo.cursor.clone()))
    }

    /// Compensates blocks the sink may have handled after `persisted` before the
    /// connector stopped.
    ///
    /// Sinks that cannot compensate are not called.
    pub async fn compensate_restart<S>(
        &mut self,
        sink: &mut S,
        persisted: &Cursor,
    ) -> Result<(), SinkConnectorError>
    where
        S: Sink<E>,
    {
        if !sink.capabilities().compensable {
            info!(
                cursor = %persisted,
                "sink cannot compensate. blocks after the cursor may be handled twice"
            );
            return Ok(());
        }

        debug!(cursor = %persisted, "compensate blocks after persisted cursor");
        sink.handle_undo(&persisted.block, UndoReason::Restart)
            .await
            .change_context(SinkConnectorError::UndoReconciliation)
            .attach_printable_lazy(|| {
                format!("failed to compensate blocks after the persisted cursor {persisted}")
            })
    }
}

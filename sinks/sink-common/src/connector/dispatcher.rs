use std::time::Duration;

use error_stack::{Report, Result, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cursor::{Cursor, DisplayCursor},
    decoder::Decoder,
    error::{SinkConnectorError, SinkConnectorErrorResultExt},
    event::{BlockData, UndoSignal},
    persistence::PersistenceClientTrait,
    sink::{Context, Sink},
};

use super::reconciler::{BufferedBlock, ForkReconciler};

/// Invoked exactly once when the connector stops, with the error that stopped it if any.
pub type TerminationCallback = Box<dyn FnOnce(Option<&Report<SinkConnectorError>>) + Send>;

const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Serializes decoding, fork reconciliation and sink calls, and owns the cursor.
///
/// The dispatcher tracks two positions: the head is the last block received from the
/// stream, the committed cursor is the last block fully handled by the sink and persisted.
/// They differ only while blocks wait in the undo buffer.
pub struct Dispatcher<D, S, P>
where
    D: Decoder,
    S: Sink<D::Output>,
    P: PersistenceClientTrait + Send,
{
    decoder: D,
    sink: S,
    persistence: P,
    reconciler: ForkReconciler<D::Output>,
    head: Option<Cursor>,
    committed: Option<Cursor>,
    on_terminate: Option<TerminationCallback>,
    terminated: bool,
}

impl<D, S, P> Dispatcher<D, S, P>
where
    D: Decoder,
    S: Sink<D::Output>,
    P: PersistenceClientTrait + Send,
{
    pub fn new(decoder: D, sink: S, persistence: P, undo_buffer_size: usize) -> Self {
        Self {
            decoder,
            sink,
            persistence,
            reconciler: ForkReconciler::new(undo_buffer_size),
            head: None,
            committed: None,
            on_terminate: None,
            terminated: false,
        }
    }

    pub fn with_termination_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<&Report<SinkConnectorError>>) + Send + 'static,
    {
        self.on_terminate = Some(Box::new(callback));
        self
    }

    /// The last committed cursor. Streaming resumes from here.
    pub fn cursor(&self) -> &Option<Cursor> {
        &self.committed
    }

    /// The last block received from the stream.
    pub fn head(&self) -> &Option<Cursor> {
        &self.head
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Acquires the persistence lock and loads the committed cursor.
    ///
    /// When resuming from a persisted cursor the sink is asked to compensate everything
    /// after it, since the process may have stopped between a sink call and the cursor
    /// write.
    pub async fn initialize(
        &mut self,
        ct: CancellationToken,
    ) -> Result<Option<Cursor>, SinkConnectorError> {
        info!("acquiring persistence lock");
        tokio::select! {
            biased;

            _ = ct.cancelled() => {
                return Ok(None);
            }
            ret = self.persistence.lock() => {
                ret.attach_printable("failed to lock persistence")?;
                info!("lock acquired");
            }
            _ = tokio::time::sleep(LOCK_TIMEOUT) => {
                return Err(SinkConnectorError::Persistence)
                    .attach_printable("failed to acquire persistence lock within 30 seconds");
            }
        }

        let cursor = self.persistence.get_cursor().await?;

        if let Some(cursor) = &cursor {
            info!(cursor = %cursor, "restarting from last cursor");
            self.reconciler
                .compensate_restart(&mut self.sink, cursor)
                .await?;
        } else {
            info!("starting from blank cursor");
        }

        self.head = cursor.clone();
        self.committed = cursor.clone();

        Ok(cursor)
    }

    /// Drops buffered blocks and moves the head back to the committed cursor.
    ///
    /// Called before the stream is (re)opened from the committed cursor.
    pub fn reset(&mut self) {
        let buffer = self.reconciler.buffer();
        if !buffer.is_empty() {
            debug!(blocks = buffer.len(), "dropping buffered blocks");
        }
        buffer.clear();
        self.head = self.committed.clone();
    }

    #[tracing::instrument(skip_all, fields(block = data.block().number), err(Debug))]
    pub async fn on_data(&mut self, data: BlockData) -> Result<(), SinkConnectorError> {
        let head = Cursor::advance(self.head.as_ref(), &data)
            .transport("stream delivered a block out of order")?;

        let event = match &data.payload {
            None => None,
            Some(payload) => self
                .decoder
                .decode(payload)
                .change_context(SinkConnectorError::Decode)
                .attach_printable_lazy(|| format!("failed to decode block {}", data.block()))?,
        };

        self.head = Some(head);

        let ctx = Context {
            cursor: data.cursor,
            final_block_height: data.final_block_height,
        };

        let buffer = self.reconciler.buffer();
        buffer.push(BufferedBlock { ctx, event });
        let released = buffer.release(data.final_block_height);

        for block in released {
            self.apply(block).await?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(target = undo.last_valid_block().number), err(Debug))]
    pub async fn on_undo(&mut self, undo: UndoSignal) -> Result<(), SinkConnectorError> {
        info!(
            head = %DisplayCursor(&self.head),
            target = %undo.last_valid_block(),
            "handle undo"
        );

        let head = Cursor::rewind(self.head.as_ref(), &undo)
            .transport("stream sent an undo above the current block")?;

        let committed = self
            .reconciler
            .reconcile(&mut self.sink, self.committed.as_ref(), &undo)
            .await?;

        self.head = Some(head);

        if committed != self.committed {
            if let Some(cursor) = committed {
                self.commit(cursor).await?;
            }
        }

        Ok(())
    }

    /// Sends all buffered blocks to the sink.
    ///
    /// Used when the stream ended at the stop block and no more blocks will push them out.
    pub async fn flush(&mut self) -> Result<(), SinkConnectorError> {
        let blocks = self.reconciler.buffer().drain();
        for block in blocks {
            self.apply(block).await?;
        }
        Ok(())
    }

    /// Invokes the termination callback, cleans up the sink and releases the lock.
    ///
    /// Only the first call has any effect.
    pub async fn terminate(
        &mut self,
        error: Option<&Report<SinkConnectorError>>,
    ) -> Result<(), SinkConnectorError> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        match error {
            None => info!(cursor = %DisplayCursor(&self.committed), "sink terminated"),
            Some(err) => warn!(
                cursor = %DisplayCursor(&self.committed),
                err = ?err,
                "sink terminated with error"
            ),
        }

        if let Some(callback) = self.on_terminate.take() {
            callback(error);
        }

        let cleanup = self
            .sink
            .cleanup()
            .await
            .change_context(SinkConnectorError::Sink)
            .attach_printable("failed to cleanup sink");

        let unlock = self.persistence.unlock().await;

        cleanup?;
        unlock
    }

    async fn apply(&mut self, block: BufferedBlock<D::Output>) -> Result<(), SinkConnectorError> {
        if let Some(event) = &block.event {
            self.sink
                .handle_data(&block.ctx, event)
                .await
                .change_context(SinkConnectorError::Sink)
                .attach_printable_lazy(|| {
                    format!("failed to handle block {}", block.ctx.block())
                })?;
        }

        self.commit(block.ctx.cursor).await
    }

    async fn commit(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError> {
        debug!(cursor = %cursor, "commit cursor");
        self.persistence.put_cursor(cursor.clone()).await?;
        self.committed = Some(cursor);
        Ok(())
    }
}

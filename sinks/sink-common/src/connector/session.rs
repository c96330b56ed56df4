use std::fmt;

use async_trait::async_trait;
use error_stack::{Report, Result, ResultExt};
use exponential_backoff::Backoff;
use futures::stream::BoxStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cursor::{Cursor, DisplayCursor},
    decoder::Decoder,
    error::SinkConnectorError,
    event::BlockScopedEvent,
    persistence::PersistenceClientTrait,
    sink::Sink,
};

use super::dispatcher::Dispatcher;

/// Stream of block scoped events. Dropping it closes the stream.
pub type EventStream = BoxStream<'static, Result<BlockScopedEvent, SinkConnectorError>>;

/// A source of block scoped events that can resume from a cursor.
#[async_trait]
pub trait StreamSource: Send {
    /// Opens a new stream delivering the blocks after `cursor`, or from the configured
    /// start block if the cursor is blank.
    ///
    /// Transient failures must use [SinkConnectorError::Temporary].
    async fn open(&mut self, cursor: Option<Cursor>) -> Result<EventStream, SinkConnectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Reconciling,
    Terminated,
}

/// Owns the connection to the stream source and feeds the dispatcher one event at a time.
pub struct StreamSession<Src> {
    source: Src,
    backoff: Backoff,
    stop_block: Option<u64>,
    state: SessionState,
}

enum StreamEnd {
    /// Reconnect from the committed cursor.
    Reconnect(Report<SinkConnectorError>),
    /// Stop the session without error.
    Stop,
}

impl<Src> StreamSession<Src>
where
    Src: StreamSource,
{
    pub fn new(source: Src, backoff: Backoff) -> Self {
        Self {
            source,
            backoff,
            stop_block: None,
            state: SessionState::Connecting,
        }
    }

    /// Stop cleanly when the server ends the stream bounded by `stop_block`.
    pub fn with_stop_block(mut self, stop_block: Option<u64>) -> Self {
        self.stop_block = stop_block;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Streams until cancelled, until the stop block is reached or until an error that
    /// cannot be retried.
    ///
    /// The dispatcher is terminated exactly once before returning.
    pub async fn run<D, S, P>(
        &mut self,
        dispatcher: &mut Dispatcher<D, S, P>,
        ct: CancellationToken,
    ) -> Result<(), SinkConnectorError>
    where
        D: Decoder,
        S: Sink<D::Output>,
        P: PersistenceClientTrait + Send,
    {
        let result = match dispatcher.initialize(ct.clone()).await {
            Ok(_) => self.run_loop(dispatcher, ct).await,
            Err(err) => Err(err),
        };

        self.transition(SessionState::Terminated);

        let result = result.attach_printable_lazy(|| {
            format!("last committed cursor: {}", DisplayCursor(dispatcher.cursor()))
        });

        let terminated = dispatcher.terminate(result.as_ref().err()).await;

        result?;
        terminated
    }

    async fn run_loop<D, S, P>(
        &mut self,
        dispatcher: &mut Dispatcher<D, S, P>,
        ct: CancellationToken,
    ) -> Result<(), SinkConnectorError>
    where
        D: Decoder,
        S: Sink<D::Output>,
        P: PersistenceClientTrait + Send,
    {
        let mut attempt: usize = 0;

        loop {
            if ct.is_cancelled() {
                return Ok(());
            }

            self.transition(SessionState::Connecting);
            dispatcher.reset();
            let cursor = dispatcher.cursor().clone();
            info!(cursor = %DisplayCursor(&cursor), "opening stream");

            let opened = tokio::select! {
                biased;

                _ = ct.cancelled() => return Ok(()),
                opened = self.source.open(cursor) => opened,
            };

            let end = match opened {
                Ok(stream) => {
                    self.transition(SessionState::Streaming);
                    self.consume(stream, dispatcher, &mut attempt, ct.clone())
                        .await?
                }
                Err(err) if err.current_context().is_temporary() => StreamEnd::Reconnect(err),
                Err(err) => return Err(err),
            };

            let err = match end {
                StreamEnd::Stop => return Ok(()),
                StreamEnd::Reconnect(err) => err,
            };

            let Some(delay) = (&self.backoff).into_iter().nth(attempt) else {
                return Err(err)
                    .change_context(SinkConnectorError::Transport)
                    .attach_printable_lazy(|| format!("giving up after {attempt} retries"));
            };
            attempt += 1;

            warn!(
                err = ?err,
                attempt = attempt,
                delay = ?delay,
                "stream interrupted. reconnecting"
            );

            tokio::select! {
                biased;

                _ = ct.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn consume<D, S, P>(
        &mut self,
        mut stream: EventStream,
        dispatcher: &mut Dispatcher<D, S, P>,
        attempt: &mut usize,
        ct: CancellationToken,
    ) -> Result<StreamEnd, SinkConnectorError>
    where
        D: Decoder,
        S: Sink<D::Output>,
        P: PersistenceClientTrait + Send,
    {
        loop {
            let message = tokio::select! {
                biased;

                _ = ct.cancelled() => {
                    info!("sink stopped: cancelled");
                    return Ok(StreamEnd::Stop);
                }
                message = stream.next() => message,
            };

            match message {
                None => {
                    // The server only ends a bounded stream cleanly once it reached the stop
                    // block. The block before it may be a skipped slot.
                    if let Some(stop_block) = self.stop_block {
                        info!(
                            stop_block = stop_block,
                            head = %DisplayCursor(dispatcher.head()),
                            "stop block reached"
                        );
                        dispatcher.flush().await?;
                        return Ok(StreamEnd::Stop);
                    }
                    let err = Report::new(SinkConnectorError::Temporary)
                        .attach_printable("stream closed by the server");
                    return Ok(StreamEnd::Reconnect(err));
                }
                Some(Err(err)) if err.current_context().is_temporary() => {
                    return Ok(StreamEnd::Reconnect(err));
                }
                Some(Err(err)) => return Err(err),
                Some(Ok(BlockScopedEvent::Data(data))) => {
                    dispatcher.on_data(data).await?;
                    *attempt = 0;
                }
                Some(Ok(BlockScopedEvent::Undo(undo))) => {
                    self.transition(SessionState::Reconciling);
                    dispatcher.on_undo(undo).await?;
                    self.transition(SessionState::Streaming);
                }
            }
        }
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "session state changed");
            self.state = state;
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Streaming => f.write_str("streaming"),
            SessionState::Reconciling => f.write_str("reconciling"),
            SessionState::Terminated => f.write_str("terminated"),
        }
    }
}

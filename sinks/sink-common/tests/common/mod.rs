#![allow(dead_code)]

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use error_stack::{report, Report, Result};
use exponential_backoff::Backoff;
use futures::{stream, StreamExt};
use price_sink_common::{
    BlockData, BlockRef, BlockScopedEvent, Context, Cursor, Dispatcher, EventStream, Payload,
    PersistenceClientTrait, PriceUpdate, PriceUpdateDecoder, Sink, SinkCapabilities,
    SinkConnectorError, StreamSession, StreamSource, UndoReason, UndoSignal,
};
use price_sink_protocol::mydata::v1 as pb;
use prost::Message;
use tokio_util::sync::CancellationToken;

pub fn new_cursor(number: u64, hash: &str) -> Cursor {
    Cursor::new(format!("cursor-{number}-{hash}"), BlockRef::new(number, hash))
}

pub fn price_update(number: u64, hash: &str) -> Vec<u8> {
    pb::PriceUpdate {
        pair_address: format!("pair-{hash}"),
        token0: "TRUMP".to_string(),
        token1: "USDT".to_string(),
        price_usd: 12.5,
        volume_usd: 100.0,
        block_number: number,
        timestamp: 1_737_000_000 + number,
    }
    .encode_to_vec()
}

pub fn data(number: u64, hash: &str) -> BlockScopedEvent {
    data_with_final(number, hash, 0)
}

pub fn data_with_final(number: u64, hash: &str, final_block_height: u64) -> BlockScopedEvent {
    BlockScopedEvent::Data(BlockData {
        cursor: new_cursor(number, hash),
        final_block_height,
        payload: Some(Payload {
            type_url: "type.googleapis.com/mydata.v1.PriceUpdate".to_string(),
            value: price_update(number, hash),
        }),
    })
}

pub fn empty_data(number: u64, hash: &str) -> BlockScopedEvent {
    BlockScopedEvent::Data(BlockData {
        cursor: new_cursor(number, hash),
        final_block_height: 0,
        payload: None,
    })
}

pub fn undo(number: u64, hash: &str) -> BlockScopedEvent {
    BlockScopedEvent::Undo(UndoSignal {
        cursor: new_cursor(number, hash),
    })
}

pub fn temporary(reason: &'static str) -> Report<SinkConnectorError> {
    report!(SinkConnectorError::Temporary).attach_printable(reason)
}

pub fn test_backoff(retries: u32) -> Backoff {
    Backoff::new(
        retries,
        Duration::from_millis(1),
        Some(Duration::from_millis(5)),
    )
}

/// Shared log of what happened, in order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What one call to [StreamSource::open] returns.
pub enum Script {
    FailToOpen(Report<SinkConnectorError>),
    Events(Vec<Result<BlockScopedEvent, SinkConnectorError>>),
    /// Deliver the events, then never end.
    EventsThenPending(Vec<Result<BlockScopedEvent, SinkConnectorError>>),
}

/// A stream source replaying scripted sessions.
pub struct ScriptedSource {
    scripts: VecDeque<Script>,
    opened_from: Arc<Mutex<Vec<Option<Cursor>>>>,
    log: EventLog,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: scripts.into(),
            opened_from: Default::default(),
            log: EventLog::default(),
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn opened_from(&self) -> Arc<Mutex<Vec<Option<Cursor>>>> {
        self.opened_from.clone()
    }
}

fn event_label(event: &Result<BlockScopedEvent, SinkConnectorError>) -> String {
    match event {
        Ok(BlockScopedEvent::Data(data)) => format!("yield data {}", data.block().number),
        Ok(BlockScopedEvent::Undo(undo)) => format!("yield undo {}", undo.last_valid_block().number),
        Err(err) => format!("yield error {}", err.current_context()),
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn open(&mut self, cursor: Option<Cursor>) -> Result<EventStream, SinkConnectorError> {
        self.opened_from.lock().unwrap().push(cursor);

        let Some(script) = self.scripts.pop_front() else {
            return Err(report!(SinkConnectorError::Transport)
                .attach_printable("no more scripted sessions"));
        };

        let log = self.log.clone();
        match script {
            Script::FailToOpen(err) => Err(err),
            Script::Events(events) => Ok(stream::iter(events)
                .inspect(move |event| log.push(event_label(event)))
                .boxed()),
            Script::EventsThenPending(events) => Ok(stream::iter(events)
                .inspect(move |event| log.push(event_label(event)))
                .chain(stream::pending())
                .boxed()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Data { block: u64, pair: String },
    Undo { to_block: u64 },
    Restart { to_block: u64 },
    Cleanup,
}

#[derive(Debug)]
pub struct RecordingSinkError;
impl error_stack::Context for RecordingSinkError {}

impl fmt::Display for RecordingSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("recording sink error")
    }
}

/// A sink recording every call.
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    log: EventLog,
    fail_on_block: Option<u64>,
    fail_on_undo: bool,
    not_compensable: bool,
    cancel_after_block: Option<(u64, CancellationToken)>,
}

impl RecordingSink {
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing_on_block(mut self, block: u64) -> Self {
        self.fail_on_block = Some(block);
        self
    }

    pub fn failing_on_undo(mut self) -> Self {
        self.fail_on_undo = true;
        self
    }

    pub fn not_compensable(mut self) -> Self {
        self.not_compensable = true;
        self
    }

    pub fn cancelling_after_block(mut self, block: u64, ct: CancellationToken) -> Self {
        self.cancel_after_block = Some((block, ct));
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn data_blocks(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Data { block, .. } => Some(block),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Sink<PriceUpdate> for RecordingSink {
    type Error = RecordingSinkError;

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            idempotent: true,
            compensable: !self.not_compensable,
        }
    }

    async fn handle_data(
        &mut self,
        ctx: &Context,
        event: &PriceUpdate,
    ) -> Result<(), Self::Error> {
        let block = ctx.block().number;
        assert_eq!(block, event.block_number);

        if self.fail_on_block == Some(block) {
            return Err(report!(RecordingSinkError));
        }

        self.log.push(format!("handle data {block}"));
        self.calls.lock().unwrap().push(SinkCall::Data {
            block,
            pair: event.pair_address.clone(),
        });

        if let Some((cancel_block, ct)) = &self.cancel_after_block {
            if *cancel_block == block {
                ct.cancel();
            }
        }

        Ok(())
    }

    async fn handle_undo(
        &mut self,
        last_valid_block: &BlockRef,
        reason: UndoReason,
    ) -> Result<(), Self::Error> {
        if self.fail_on_undo {
            return Err(report!(RecordingSinkError));
        }

        let to_block = last_valid_block.number;
        self.log.push(format!("handle {reason} {to_block}"));
        let call = match reason {
            UndoReason::Fork => SinkCall::Undo { to_block },
            UndoReason::Restart => SinkCall::Restart { to_block },
        };
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), Self::Error> {
        self.calls.lock().unwrap().push(SinkCall::Cleanup);
        Ok(())
    }
}

#[derive(Default)]
pub struct PersistenceState {
    pub cursor: Option<Cursor>,
    pub writes: Vec<u64>,
    pub locked: bool,
}

/// An in memory cursor store that can be inspected after the run.
#[derive(Clone, Default)]
pub struct RecordingPersistence(pub Arc<Mutex<PersistenceState>>);

impl RecordingPersistence {
    pub fn with_cursor(cursor: Cursor) -> Self {
        let persistence = Self::default();
        persistence.0.lock().unwrap().cursor = Some(cursor);
        persistence
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.0.lock().unwrap().cursor.clone()
    }

    pub fn writes(&self) -> Vec<u64> {
        self.0.lock().unwrap().writes.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.0.lock().unwrap().locked
    }
}

#[async_trait]
impl PersistenceClientTrait for RecordingPersistence {
    async fn lock(&mut self) -> Result<(), SinkConnectorError> {
        self.0.lock().unwrap().locked = true;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), SinkConnectorError> {
        self.0.lock().unwrap().locked = false;
        Ok(())
    }

    async fn get_cursor(&mut self) -> Result<Option<Cursor>, SinkConnectorError> {
        Ok(self.cursor())
    }

    async fn put_cursor(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError> {
        let mut state = self.0.lock().unwrap();
        state.writes.push(cursor.block_number());
        state.cursor = Some(cursor);
        Ok(())
    }

    async fn delete_cursor(&mut self) -> Result<(), SinkConnectorError> {
        self.0.lock().unwrap().cursor = None;
        Ok(())
    }
}

/// Outcome of a connector run.
pub struct RunOutcome {
    pub result: Result<(), SinkConnectorError>,
    /// One entry per termination callback invocation.
    pub terminations: Vec<Option<SinkConnectorError>>,
}

pub struct TestConnector<P> {
    pub source: ScriptedSource,
    pub sink: RecordingSink,
    pub persistence: P,
    pub undo_buffer_size: usize,
    pub stop_block: Option<u64>,
    pub retries: u32,
}

impl<P> TestConnector<P>
where
    P: PersistenceClientTrait + Send,
{
    pub fn new(source: ScriptedSource, sink: RecordingSink, persistence: P) -> Self {
        Self {
            source,
            sink,
            persistence,
            undo_buffer_size: 0,
            stop_block: None,
            retries: 3,
        }
    }

    pub fn with_undo_buffer_size(mut self, size: usize) -> Self {
        self.undo_buffer_size = size;
        self
    }

    pub fn with_stop_block(mut self, stop_block: u64) -> Self {
        self.stop_block = Some(stop_block);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub async fn run(self, ct: CancellationToken) -> RunOutcome {
        let terminations = Arc::new(Mutex::new(Vec::new()));

        let mut dispatcher = Dispatcher::new(
            PriceUpdateDecoder::new(),
            self.sink,
            self.persistence,
            self.undo_buffer_size,
        )
        .with_termination_callback({
            let terminations = terminations.clone();
            move |err: Option<&Report<SinkConnectorError>>| {
                terminations
                    .lock()
                    .unwrap()
                    .push(err.map(|err| *err.current_context()));
            }
        });

        let mut session = StreamSession::new(self.source, test_backoff(self.retries))
            .with_stop_block(self.stop_block);

        let result = session.run(&mut dispatcher, ct).await;

        // Terminating again has no effect.
        dispatcher.terminate(None).await.unwrap();

        let terminations = terminations.lock().unwrap().clone();
        RunOutcome {
            result,
            terminations,
        }
    }
}

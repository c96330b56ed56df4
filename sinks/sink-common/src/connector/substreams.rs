use async_trait::async_trait;
use error_stack::{report, Report, Result, ResultExt};
use futures::{future, StreamExt};
use price_sink_sdk::{
    proto::{response::Message, BlockScopedData, BlockUndoSignal, Request},
    BlockStreamError, Code, Status, StreamClientBuilder, StreamMessage,
};
use tracing::{debug, info};

use crate::{
    cursor::{BlockRef, Cursor, DisplayCursor},
    error::{SinkConnectorError, SinkConnectorErrorReportExt, SinkConnectorErrorResultExt},
    event::{BlockData, BlockScopedEvent, Payload, UndoSignal},
    package::SubstreamsPackage,
};

use super::{
    session::{EventStream, StreamSource},
    StreamConfiguration,
};

/// A [StreamSource] backed by a Substreams endpoint.
pub struct SubstreamsSource {
    configuration: StreamConfiguration,
    package: SubstreamsPackage,
}

impl SubstreamsSource {
    pub fn new(configuration: StreamConfiguration, package: SubstreamsPackage) -> Self {
        Self {
            configuration,
            package,
        }
    }

    /// Builds the request that resumes after `cursor`.
    pub fn request(&self, cursor: Option<&Cursor>) -> Result<Request, SinkConnectorError> {
        let start_block = self
            .configuration
            .start_block
            .unwrap_or(self.package.initial_block);
        let start_block_num = i64::try_from(start_block)
            .configuration(&format!("start block {start_block} is out of range"))?;

        Ok(Request {
            start_block_num,
            start_cursor: cursor.map(|c| c.token.clone()).unwrap_or_default(),
            stop_block_num: self.configuration.stop_block.unwrap_or_default(),
            final_blocks_only: self.configuration.final_blocks_only,
            production_mode: self.configuration.production_mode,
            output_module: self.package.output_module.clone(),
            modules: self.package.modules.clone(),
        })
    }
}

#[async_trait]
impl StreamSource for SubstreamsSource {
    async fn open(&mut self, cursor: Option<Cursor>) -> Result<EventStream, SinkConnectorError> {
        let mut client = StreamClientBuilder::new()
            .with_max_message_size_bytes(
                self.configuration.max_message_size_bytes.as_u64() as usize
            )
            .with_metadata(self.configuration.metadata.clone())
            .with_bearer_token(self.configuration.bearer_token.clone())
            .with_timeout(self.configuration.timeout_duration)
            .connect(self.configuration.endpoint.clone())
            .await
            .map_err(|err| report!(err).temporary("failed to connect to stream"))?;

        let request = self.request(cursor.as_ref())?;
        debug!(
            start_block = request.start_block_num,
            stop_block = request.stop_block_num,
            cursor = %DisplayCursor(&cursor),
            module = %request.output_module,
            "start stream"
        );

        let stream = client.blocks(request).await.map_err(status_to_report)?;

        let stream = stream.filter_map(|message| future::ready(map_stream_message(message)));
        Ok(stream.boxed())
    }
}

/// Converts a stream message to a block scoped event.
///
/// Returns `None` for messages that carry no block.
pub fn map_stream_message(
    message: std::result::Result<StreamMessage, BlockStreamError>,
) -> Option<Result<BlockScopedEvent, SinkConnectorError>> {
    match message {
        Err(BlockStreamError::Tonic { source }) => Some(Err(status_to_report(source))),
        Err(err @ BlockStreamError::Timeout { .. }) => {
            Some(Err(report!(err).temporary("no message received from stream")))
        }
        Err(err) => Some(Err(report!(err).transport("invalid stream message"))),
        Ok(Message::Session(session)) => {
            info!(
                trace_id = %session.trace_id,
                resolved_start_block = session.resolved_start_block,
                linear_handoff_block = session.linear_handoff_block,
                max_parallel_workers = session.max_parallel_workers,
                "session initialized"
            );
            None
        }
        Ok(Message::Progress(_)) => {
            debug!("progress");
            None
        }
        Ok(Message::BlockScopedData(data)) => Some(block_scoped_data_to_event(data)),
        Ok(Message::BlockUndoSignal(undo)) => Some(undo_signal_to_event(undo)),
        Ok(Message::FatalError(err)) => Some(Err(report!(SinkConnectorError::Transport)
            .attach_printable(format!("stream fatal error: {err}")))),
        Ok(Message::DebugSnapshotData(_)) | Ok(Message::DebugSnapshotComplete(_)) => None,
    }
}

fn block_scoped_data_to_event(
    data: BlockScopedData,
) -> Result<BlockScopedEvent, SinkConnectorError> {
    let Some(clock) = data.clock else {
        return Err(report!(SinkConnectorError::Transport))
            .attach_printable("block scoped data without clock");
    };

    let payload = data
        .output
        .and_then(|output| output.map_output)
        .map(|any| Payload {
            type_url: any.type_url,
            value: any.value,
        });

    Ok(BlockScopedEvent::Data(BlockData {
        cursor: Cursor::new(data.cursor, BlockRef::new(clock.number, clock.id)),
        final_block_height: data.final_block_height,
        payload,
    }))
}

fn undo_signal_to_event(undo: BlockUndoSignal) -> Result<BlockScopedEvent, SinkConnectorError> {
    let Some(last_valid_block) = undo.last_valid_block else {
        return Err(report!(SinkConnectorError::Transport))
            .attach_printable("undo signal without last valid block");
    };

    Ok(BlockScopedEvent::Undo(UndoSignal {
        cursor: Cursor::new(
            undo.last_valid_cursor,
            BlockRef::new(last_valid_block.number, last_valid_block.id),
        ),
    }))
}

/// Returns true if the status code is worth retrying.
pub fn is_transient_status(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable
            | Code::DeadlineExceeded
            | Code::Aborted
            | Code::Internal
            | Code::Unknown
            | Code::ResourceExhausted
    )
}

fn status_to_report(status: Status) -> Report<SinkConnectorError> {
    let code = status.code();
    let message = format!("stream status {:?}: {}", code, status.message());
    if is_transient_status(code) {
        report!(status).temporary(&message)
    } else {
        report!(status).transport(&message)
    }
}

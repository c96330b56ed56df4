mod cli;
mod configuration;
mod connector;
mod cursor;
mod decoder;
mod error;
mod event;
mod package;
pub mod persistence;
mod price;
mod sink;

use std::path::Path;

use error_stack::{Report, Result, ResultExt};
use tokio_util::sync::CancellationToken;

pub use self::cli::*;
pub use self::configuration::*;
pub use self::connector::*;
pub use self::cursor::{BlockRef, Cursor, CursorError, DisplayCursor};
pub use self::decoder::{DecodeError, Decoder, ProtoDecoder};
pub use self::error::*;
pub use self::event::{BlockData, BlockScopedEvent, Payload, UndoSignal};
pub use self::package::{PackageError, SubstreamsPackage};
pub use self::persistence::*;
pub use self::price::{PriceUpdate, PriceUpdateDecoder, EXPECTED_OUTPUT_TYPE};
pub use self::sink::*;

/// Stream `module_name` from the package at `package_path` into `sink`.
///
/// Returns after the stream is cancelled, reaches the stop block or fails with an error
/// that cannot be retried. `on_terminate` runs exactly once if the connector started.
pub async fn run_sink_connector<S, F>(
    endpoint: &str,
    package_path: impl AsRef<Path>,
    module_name: &str,
    options: OptionsFromCli,
    sink: S,
    on_terminate: F,
    ct: CancellationToken,
) -> Result<(), SinkConnectorError>
where
    S: Sink<PriceUpdate>,
    F: FnOnce(Option<&Report<SinkConnectorError>>) + Send + 'static,
{
    let package = SubstreamsPackage::load(package_path, module_name, EXPECTED_OUTPUT_TYPE)
        .map_err(|err| err.configuration("failed to load substreams package"))?;

    let stream = options
        .stream
        .to_stream_configuration(endpoint)
        .map_err(|err| err.configuration("invalid stream options"))?;
    let stop_block = stream.stop_block;

    let persistence = Persistence::new_from_options(options.connector.persistence)
        .connect()
        .await
        .attach_printable("failed to connect to persistence")?;

    let source = SubstreamsSource::new(stream, package);
    let mut session =
        StreamSession::new(source, options.backoff.to_backoff()).with_stop_block(stop_block);

    let mut dispatcher = Dispatcher::new(
        PriceUpdateDecoder::new(),
        sink,
        persistence,
        options.connector.undo_buffer_size,
    )
    .with_termination_callback(on_terminate);

    session.run(&mut dispatcher, ct).await
}

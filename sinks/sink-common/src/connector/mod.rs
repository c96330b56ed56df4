mod dispatcher;
mod reconciler;
mod session;
mod substreams;

use std::time::Duration;

use bytesize::ByteSize;
use price_sink_sdk::{MetadataMap, Uri};

pub use self::{
    dispatcher::{Dispatcher, TerminationCallback},
    reconciler::{BufferedBlock, ForkReconciler, UndoBuffer},
    session::{EventStream, SessionState, StreamSession, StreamSource},
    substreams::{is_transient_status, map_stream_message, SubstreamsSource},
};

#[derive(Debug)]
pub struct StreamConfiguration {
    pub endpoint: Uri,
    pub max_message_size_bytes: ByteSize,
    pub metadata: MetadataMap,
    pub bearer_token: Option<String>,
    pub timeout_duration: Duration,
    /// First block to stream. Defaults to the module initial block.
    pub start_block: Option<u64>,
    /// Stop streaming before this block (exclusive).
    pub stop_block: Option<u64>,
    pub final_blocks_only: bool,
    pub production_mode: bool,
}

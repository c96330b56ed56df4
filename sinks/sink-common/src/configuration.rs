use std::{fmt, str::FromStr, time::Duration};

use bytesize::ByteSize;
use clap::Args;
use error_stack::{Result, ResultExt};
use exponential_backoff::Backoff;
use price_sink_sdk::{MetadataKey, MetadataMap, MetadataValue, Uri};

use crate::connector::StreamConfiguration;

/// Environment variable holding the Substreams API token.
pub const SUBSTREAMS_API_TOKEN_ENV: &str = "SUBSTREAMS_API_TOKEN";

#[derive(Args, Debug, Default)]
pub struct OptionsFromCli {
    #[clap(flatten)]
    pub connector: ConnectorOptions,
    #[clap(flatten)]
    pub stream: StreamOptions,
    #[clap(flatten)]
    pub backoff: BackoffOptions,
}

/// Options for the connector persistence.
#[derive(Args, Debug, Default)]
pub struct PersistenceOptions {
    #[command(flatten)]
    pub persistence_type: PersistenceTypeOptions,
    #[arg(long, env)]
    /// Unique identifier for this sink.
    pub sink_id: Option<String>,
}

#[derive(Args, Debug, Default)]
#[group(required = false, multiple = false)]
pub struct PersistenceTypeOptions {
    #[arg(long, env, requires = "sink_id")]
    /// Path to the directory used to persist the cursor.
    pub persist_to_fs: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ConnectorOptions {
    #[command(flatten)]
    pub persistence: PersistenceOptions,
    /// Number of blocks held back before they are sent to the sink.
    ///
    /// Forks shallower than this are absorbed without calling the sink. Blocks at or below
    /// the final block height are never held back.
    #[arg(long, env, default_value_t = 0)]
    pub undo_buffer_size: usize,
}

#[derive(Args, Debug, Default, Clone)]
pub struct StreamOptions {
    /// Connect without TLS when the endpoint has no scheme.
    #[arg(long, env)]
    pub plaintext: bool,
    /// Substreams API token, sent as bearer token.
    #[arg(long, env = SUBSTREAMS_API_TOKEN_ENV, hide_env_values = true)]
    pub api_token: Option<String>,
    /// Limits the maximum size of a decoded message. Accept message size in human readable form,
    /// e.g. 1kb, 1MB, 1GB. If not set the default is 100MB.
    #[arg(long, env)]
    pub max_message_size: Option<String>,
    /// Add metadata to the stream, in the `key: value` format. Can be specified multiple times.
    #[arg(long, short = 'M', env, value_delimiter = ',')]
    pub metadata: Option<Vec<String>>,
    /// Maximum timeout (in seconds) between stream messages. Defaults to 45s.
    #[arg(long, env)]
    pub timeout_duration_seconds: Option<u64>,
    /// Start streaming from the specified block. Defaults to the module initial block.
    ///
    /// Ignored when resuming from a persisted cursor.
    #[arg(long, env)]
    pub start_block: Option<u64>,
    /// Stop streaming data at (before) the specified block (non inclusive).
    ///
    /// If not specified, the stream will continue indefinitely.
    #[arg(long, env)]
    pub stop_block: Option<u64>,
    /// Only stream blocks that cannot be undone anymore.
    #[arg(long, env)]
    pub final_blocks_only: bool,
    /// Run the module in development mode.
    #[arg(long, env)]
    pub development_mode: bool,
}

/// Options for reconnecting to the stream.
#[derive(Args, Debug, Clone)]
pub struct BackoffOptions {
    /// Maximum number of consecutive reconnection attempts.
    #[arg(long, env, default_value_t = 10)]
    pub max_retries: u32,
    /// Delay before the first reconnection attempt.
    #[arg(long, env, default_value_t = 3)]
    pub min_retry_delay_seconds: u64,
    /// Upper bound for the delay between reconnection attempts.
    #[arg(long, env, default_value_t = 60)]
    pub max_retry_delay_seconds: u64,
}

#[derive(Debug)]
pub struct StreamOptionsError;
impl error_stack::Context for StreamOptionsError {}

impl fmt::Display for StreamOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid stream options")
    }
}

#[derive(Debug)]
pub struct InvalidByteSizeError(String);
impl error_stack::Context for InvalidByteSizeError {}

impl fmt::Display for InvalidByteSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid byte size: {}", self.0)
    }
}

impl StreamOptions {
    pub fn to_stream_configuration(
        self,
        endpoint: &str,
    ) -> Result<StreamConfiguration, StreamOptionsError> {
        let endpoint = resolve_endpoint(endpoint, self.plaintext)?;

        let max_message_size_bytes: ByteSize = self
            .max_message_size
            .as_ref()
            .map(|s| ByteSize::from_str(s))
            .transpose()
            .map_err(InvalidByteSizeError)
            .change_context(StreamOptionsError)?
            .unwrap_or(ByteSize::mb(100));

        let timeout_duration = Duration::from_secs(self.timeout_duration_seconds.unwrap_or(45));

        let mut metadata = MetadataMap::new();
        for entry in self.metadata.unwrap_or_default() {
            match entry.split_once(':') {
                None => {
                    return Err(StreamOptionsError)
                        .attach_printable("metadata must be in the `key: value` format")
                        .attach_printable_lazy(|| format!("got: {entry}"))
                }
                Some((key, value)) => {
                    let key = key
                        .trim()
                        .parse::<MetadataKey>()
                        .change_context(StreamOptionsError)
                        .attach_printable_lazy(|| format!("invalid metadata key: {key}"))?;
                    let value = value
                        .trim()
                        .parse::<MetadataValue>()
                        .change_context(StreamOptionsError)
                        .attach_printable_lazy(|| format!("invalid metadata value: {value}"))?;
                    metadata.insert(key, value);
                }
            }
        }

        if let (Some(start_block), Some(stop_block)) = (self.start_block, self.stop_block) {
            if stop_block <= start_block {
                return Err(StreamOptionsError).attach_printable_lazy(|| {
                    format!("stop block {stop_block} must be after start block {start_block}")
                });
            }
        }

        Ok(StreamConfiguration {
            endpoint,
            max_message_size_bytes,
            metadata,
            bearer_token: self.api_token.filter(|token| !token.is_empty()),
            timeout_duration,
            start_block: self.start_block,
            stop_block: self.stop_block,
            final_blocks_only: self.final_blocks_only,
            production_mode: !self.development_mode,
        })
    }
}

/// Parses the endpoint url. Endpoints without scheme, like `bsc.substreams.pinax.network:443`,
/// use TLS unless `plaintext` is set.
pub fn resolve_endpoint(endpoint: &str, plaintext: bool) -> Result<Uri, StreamOptionsError> {
    if endpoint.is_empty() {
        return Err(StreamOptionsError).attach_printable("missing stream endpoint");
    }

    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else if plaintext {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    };

    endpoint
        .parse::<Uri>()
        .change_context(StreamOptionsError)
        .attach_printable_lazy(|| format!("invalid stream endpoint: {endpoint}"))
}

impl BackoffOptions {
    pub fn to_backoff(&self) -> Backoff {
        let min_delay = Duration::from_secs(self.min_retry_delay_seconds);
        let max_delay = Duration::from_secs(self.max_retry_delay_seconds.max(1));
        let mut backoff = Backoff::new(self.max_retries, min_delay, Some(max_delay));
        backoff.set_factor(3);
        backoff
    }
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            max_retries: 10,
            min_retry_delay_seconds: 3,
            max_retry_delay_seconds: 60,
        }
    }
}

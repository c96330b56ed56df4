use std::time::Duration;

use snafu::{ResultExt, Snafu};
use tonic::{
    codegen::InterceptedService,
    metadata::MetadataMap,
    transport::{Channel, ClientTlsConfig, Uri},
};
use tracing::debug;

use crate::{client::StreamClient, interceptor::MetadataInterceptor};

/// Configure the [StreamClient] before connecting to the server.
pub struct StreamClientBuilder {
    bearer_token: Option<String>,
    max_message_size: Option<usize>,
    metadata: MetadataMap,
    timeout: Duration,
}

/// The error type for the [StreamClientBuilder].
#[derive(Debug, Snafu)]
pub enum StreamClientBuilderError {
    /// Connection error.
    #[snafu(display("Failed to connect to the server"))]
    Connection { source: tonic::transport::Error },
    /// The bearer token cannot be sent as a header.
    #[snafu(display("Invalid bearer token format"))]
    InvalidBearerToken {
        source: tonic::metadata::errors::InvalidMetadataValue,
    },
}

impl StreamClientBuilder {
    /// Create a new [StreamClientBuilder].
    pub fn new() -> Self {
        Default::default()
    }

    /// Authenticate with the given bearer token.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    /// Use the given `metadata` when connecting to the server.
    ///
    /// Notice: metadata will be merged with the authentication header if any.
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the maximum time to wait for a message from the server.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum message size (in bytes) that the client can receive.
    pub fn with_max_message_size_bytes(mut self, message_size: usize) -> Self {
        self.max_message_size = Some(message_size);
        self
    }

    /// Connect to the server, returning a [StreamClient] ready to use.
    ///
    /// TLS is used when the url scheme is `https`.
    pub async fn connect(self, url: Uri) -> Result<StreamClient, StreamClientBuilderError> {
        let use_tls = url.scheme_str() == Some("https");
        debug!(url = %url, tls = use_tls, "connecting to substreams endpoint");

        let mut endpoint = Channel::builder(url);
        if use_tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .context(ConnectionSnafu {})?;
        }

        let channel = endpoint.connect().await.context(ConnectionSnafu {})?;

        let mut interceptor = MetadataInterceptor::with_metadata(self.metadata);
        if let Some(token) = self.bearer_token {
            interceptor
                .insert_bearer_token(&token)
                .context(InvalidBearerTokenSnafu {})?;
        }

        let mut grpc = tonic::client::Grpc::new(InterceptedService::new(channel, interceptor));
        grpc = if let Some(max_message_size) = self.max_message_size {
            grpc.max_decoding_message_size(max_message_size)
        } else {
            grpc
        };

        Ok(StreamClient::new(grpc, self.timeout))
    }
}

impl Default for StreamClientBuilder {
    fn default() -> Self {
        Self {
            bearer_token: None,
            max_message_size: None,
            metadata: MetadataMap::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

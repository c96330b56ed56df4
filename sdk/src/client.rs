use std::{pin::Pin, task::Poll, time::Duration};

use http::uri::PathAndQuery;
use pin_project::pin_project;
use price_sink_protocol::substreams::rpc::v2::{
    response, Request, Response, STREAM_BLOCKS_PATH,
};
use snafu::Snafu;
use tokio_stream::{Elapsed, Stream, StreamExt, Timeout};
use tonic::{
    client::Grpc, codec::ProstCodec, codegen::InterceptedService, transport::Channel, Streaming,
};

use crate::{interceptor::MetadataInterceptor, StreamClientBuilder};

pub type StreamMessage = response::Message;

/// Error type for the block stream.
#[derive(Debug, Snafu)]
pub enum BlockStreamError {
    /// Error caused by the gRPC client.
    #[snafu(display("gRPC client error"))]
    Tonic { source: tonic::Status },
    /// Timeout error. The client did not receive a message in the specified time.
    #[snafu(display("gRPC stream timeout: {elapsed}"))]
    Timeout { elapsed: Elapsed },
    /// The response does not contain any message.
    #[snafu(display("Received empty message in response"))]
    EmptyMessageInResponse,
}

/// A stream of Substreams responses returned by [StreamClient::blocks].
#[derive(Debug)]
#[pin_project]
pub struct BlockStream {
    #[pin]
    inner: Pin<Box<Timeout<Streaming<Response>>>>,
}

/// A Substreams stream client.
#[derive(Clone)]
pub struct StreamClient {
    inner: Grpc<InterceptedService<Channel, MetadataInterceptor>>,
    timeout: Duration,
}

impl StreamClient {
    /// Create a new [StreamClientBuilder] to configure the client.
    pub fn builder() -> StreamClientBuilder {
        StreamClientBuilder::new()
    }

    pub(crate) fn new(
        inner: Grpc<InterceptedService<Channel, MetadataInterceptor>>,
        timeout: Duration,
    ) -> Self {
        Self { inner, timeout }
    }

    /// Start streaming block scoped data from the server.
    ///
    /// The returned stream fails with [BlockStreamError::Timeout] if no message is
    /// received within the configured timeout.
    pub async fn blocks(&mut self, request: Request) -> Result<BlockStream, tonic::Status> {
        self.inner.ready().await.map_err(|err| {
            tonic::Status::unavailable(format!("substreams service was not ready: {err}"))
        })?;

        let codec: ProstCodec<Request, Response> = ProstCodec::default();
        let path = PathAndQuery::from_static(STREAM_BLOCKS_PATH);
        let response = self
            .inner
            .server_streaming(tonic::Request::new(request), path, codec)
            .await?;

        let inner = response.into_inner().timeout(self.timeout);
        Ok(BlockStream {
            inner: Box::pin(inner),
        })
    }
}

impl Stream for BlockStream {
    type Item = Result<StreamMessage, BlockStreamError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(response_or_timeout)) => match response_or_timeout {
                Err(elapsed) => Poll::Ready(Some(Err(BlockStreamError::Timeout { elapsed }))),
                Ok(Err(tonic_error)) => Poll::Ready(Some(Err(BlockStreamError::Tonic {
                    source: tonic_error,
                }))),
                Ok(Ok(response)) => {
                    if let Some(message) = response.message {
                        Poll::Ready(Some(Ok(message)))
                    } else {
                        Poll::Ready(Some(Err(BlockStreamError::EmptyMessageInResponse)))
                    }
                }
            },
        }
    }
}

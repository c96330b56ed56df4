//! # Substreams SDK
//!
//! A minimal client for the `sf.substreams.rpc.v2.Stream/Blocks` endpoint.
//!
//!  - [StreamClientBuilder] configures authentication, metadata, message size and timeout.
//!  - [StreamClient::blocks] opens a stream starting at the block or cursor in the request.
//!
//! ## Connection issues
//!
//! The client does not reconnect automatically. If the connection is lost, you need to
//! open a new stream from the last cursor you processed. Handling reconnection in the
//! application is what lets it decide whether blocks are processed at least or at most once.

mod builder;
mod client;
mod interceptor;

pub use crate::builder::*;
pub use crate::client::*;
pub use crate::interceptor::{
    InvalidMetadataValue, MetadataInterceptor, MetadataKey, MetadataMap, MetadataValue,
};

pub use tonic::transport::Uri;
pub use tonic::{Code, Status};

/// Contains the Substreams types used by the client.
pub use price_sink_protocol::substreams::rpc::v2 as proto;

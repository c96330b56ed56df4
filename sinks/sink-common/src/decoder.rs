use std::{fmt, marker::PhantomData};

use error_stack::{report, Result, ResultExt};
use price_sink_protocol::{type_name_from_url, MessageType};
use prost::Message;

use crate::event::Payload;

/// Converts module output into a typed domain event.
///
/// A decoder pins exactly one expected output type. Any other type is a schema mismatch,
/// which cannot heal by retrying.
pub trait Decoder: Send {
    type Output: Send + Sync + 'static;

    /// Fully qualified name of the only accepted output type.
    fn expected_type(&self) -> &str;

    /// Decode the payload. Returns `None` if the module output is empty.
    fn decode(&self, payload: &Payload) -> Result<Option<Self::Output>, DecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    SchemaMismatch { expected: String, actual: String },
    Malformed { type_name: String },
}

impl error_stack::Context for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::SchemaMismatch { expected, actual } => write!(
                f,
                "schema mismatch: expected module output {expected}, got {actual}"
            ),
            DecodeError::Malformed { type_name } => {
                write!(f, "malformed module output of type {type_name}")
            }
        }
    }
}

/// Decodes a protobuf module output `M` and converts it to `E`.
pub struct ProtoDecoder<M, E> {
    _phantom: PhantomData<fn() -> (M, E)>,
}

impl<M, E> ProtoDecoder<M, E> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<M, E> Default for ProtoDecoder<M, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, E> Decoder for ProtoDecoder<M, E>
where
    M: MessageType,
    E: From<M> + Send + Sync + 'static,
{
    type Output = E;

    fn expected_type(&self) -> &str {
        M::TYPE_NAME
    }

    fn decode(&self, payload: &Payload) -> Result<Option<E>, DecodeError> {
        let actual = type_name_from_url(&payload.type_url);
        if actual != M::TYPE_NAME {
            return Err(report!(DecodeError::SchemaMismatch {
                expected: M::TYPE_NAME.to_string(),
                actual: actual.to_string(),
            }));
        }

        if payload.is_empty() {
            return Ok(None);
        }

        let message = M::decode(payload.value.as_slice()).change_context(DecodeError::Malformed {
            type_name: M::TYPE_NAME.to_string(),
        })?;

        Ok(Some(message.into()))
    }
}

//! # Substreams protocol
//!
//! Low-level types exchanged with a Substreams endpoint and the module output types
//! consumed by the price sink.
//!
//! The types are declared by hand with `prost` derives and only include the fields the sink
//! needs. Unknown fields are skipped when decoding.

pub mod mydata;
pub mod substreams;

/// A protobuf message with a fully qualified type name.
///
/// The type name is what appears after the last `/` in a `google.protobuf.Any` type url.
pub trait MessageType: prost::Message + Default {
    const TYPE_NAME: &'static str;
}

/// Returns the fully qualified type name encoded in a `google.protobuf.Any` type url.
pub fn type_name_from_url(type_url: &str) -> &str {
    match type_url.rsplit_once('/') {
        Some((_, name)) => name,
        None => type_url,
    }
}

use price_sink_protocol::{mydata::v1 as pb, MessageType};

use crate::decoder::ProtoDecoder;

/// Module output type the price sink accepts.
pub const EXPECTED_OUTPUT_TYPE: &str = pb::PriceUpdate::TYPE_NAME;

/// Decodes `mydata.v1.PriceUpdate` module output.
pub type PriceUpdateDecoder = ProtoDecoder<pb::PriceUpdate, PriceUpdate>;

/// Price of a trading pair observed in one block.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub pair_address: String,
    pub token0: String,
    pub token1: String,
    pub price_usd: f64,
    pub volume_usd: f64,
    pub block_number: u64,
    /// Unix timestamp in seconds, zero if unknown.
    pub timestamp: u64,
}

impl From<pb::PriceUpdate> for PriceUpdate {
    fn from(value: pb::PriceUpdate) -> Self {
        Self {
            pair_address: value.pair_address,
            token0: value.token0,
            token1: value.token1,
            price_usd: value.price_usd,
            volume_usd: value.volume_usd,
            block_number: value.block_number,
            timestamp: value.timestamp,
        }
    }
}

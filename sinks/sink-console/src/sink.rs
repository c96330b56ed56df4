use std::fmt;

use async_trait::async_trait;
use error_stack::Result;
use price_sink_common::{BlockRef, Context, PriceUpdate, Sink, SinkCapabilities, UndoReason};
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub struct SinkConsoleError;
impl error_stack::Context for SinkConsoleError {}

impl fmt::Display for SinkConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("console sink operation failed")
    }
}

/// Logs every price update.
///
/// Log lines can't be taken back, so undone updates stay in the output.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    updates: u64,
}

impl ConsoleSink {
    /// Number of price updates printed so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

#[async_trait]
impl Sink<PriceUpdate> for ConsoleSink {
    type Error = SinkConsoleError;

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            idempotent: false,
            compensable: false,
        }
    }

    #[instrument(skip_all, level = "DEBUG")]
    async fn handle_data(
        &mut self,
        ctx: &Context,
        event: &PriceUpdate,
    ) -> Result<(), Self::Error> {
        debug!(ctx = %ctx, "handle data");

        info!(
            block = ctx.block().number,
            pair = %event.pair_address,
            price_usd = event.price_usd,
            volume_usd = event.volume_usd,
            "price update"
        );

        self.updates += 1;
        Ok(())
    }

    async fn handle_undo(
        &mut self,
        last_valid_block: &BlockRef,
        reason: UndoReason,
    ) -> Result<(), Self::Error> {
        warn!(to_block = last_valid_block.number, reason = %reason, "fork undo");
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), Self::Error> {
        info!(updates = self.updates, "console sink stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use price_sink_common::{BlockRef, Context, Cursor, PriceUpdate, Sink, UndoReason};

    use super::ConsoleSink;

    fn new_update(block_number: u64) -> PriceUpdate {
        PriceUpdate {
            pair_address: "0xpair".to_string(),
            token0: "TRUMP".to_string(),
            token1: "USDT".to_string(),
            price_usd: 12.5,
            volume_usd: 2500.0,
            block_number,
            timestamp: 1_737_000_000,
        }
    }

    fn new_context(block_number: u64) -> Context {
        Context {
            cursor: Cursor::new("opaque", BlockRef::new(block_number, "0xabc")),
            final_block_height: 0,
        }
    }

    #[tokio::test]
    async fn test_prints_updates_and_undo() {
        let mut sink = ConsoleSink::default();
        let caps = sink.capabilities();
        assert!(!caps.compensable);
        assert!(!caps.idempotent);

        for number in 335_420_000..335_420_003 {
            sink.handle_data(&new_context(number), &new_update(number))
                .await
                .unwrap();
        }
        assert_eq!(sink.updates(), 3);

        // Undo only warns, nothing to compensate.
        sink.handle_undo(&BlockRef::new(335_420_000, "0xabc"), UndoReason::Fork)
            .await
            .unwrap();
        sink.cleanup().await.unwrap();
        assert_eq!(sink.updates(), 3);
    }
}

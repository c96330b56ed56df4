use async_trait::async_trait;
use error_stack::Result;

use crate::{cursor::Cursor, error::SinkConnectorError};

/// Client used to interact with the cursor store.
#[async_trait]
pub trait PersistenceClient {
    /// Attempts to acquire a lock on the sink.
    async fn lock(&mut self) -> Result<(), SinkConnectorError>;

    /// Unlock the previously acquired lock.
    async fn unlock(&mut self) -> Result<(), SinkConnectorError>;

    /// Reads the last committed cursor.
    async fn get_cursor(&mut self) -> Result<Option<Cursor>, SinkConnectorError>;

    /// Replaces the last committed cursor.
    async fn put_cursor(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError>;

    /// Deletes any stored cursor.
    async fn delete_cursor(&mut self) -> Result<(), SinkConnectorError>;
}

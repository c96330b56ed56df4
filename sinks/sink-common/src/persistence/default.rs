use async_trait::async_trait;
use error_stack::Result;

use crate::{cursor::Cursor, error::SinkConnectorError};

use super::common::PersistenceClient;

/// A [PersistenceClient] that keeps the cursor in memory.
///
/// The cursor is lost when the process exits, so every restart begins from the
/// configured start block.
#[derive(Default)]
pub struct InMemoryPersistence {
    cursor: Option<Cursor>,
}

#[async_trait]
impl PersistenceClient for InMemoryPersistence {
    async fn lock(&mut self) -> Result<(), SinkConnectorError> {
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), SinkConnectorError> {
        Ok(())
    }

    async fn get_cursor(&mut self) -> Result<Option<Cursor>, SinkConnectorError> {
        Ok(self.cursor.clone())
    }

    async fn put_cursor(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError> {
        self.cursor = Some(cursor);
        Ok(())
    }

    async fn delete_cursor(&mut self) -> Result<(), SinkConnectorError> {
        self.cursor = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryPersistence;
    use crate::{
        cursor::{BlockRef, Cursor},
        persistence::PersistenceClientTrait,
    };

    #[tokio::test]
    async fn test_in_memory_cursor() {
        let mut persistence = InMemoryPersistence::default();
        persistence.lock().await.unwrap();
        assert!(persistence.get_cursor().await.unwrap().is_none());

        let cursor = Cursor::new("c1", BlockRef::new(100, "a"));
        persistence.put_cursor(cursor.clone()).await.unwrap();
        assert_eq!(persistence.get_cursor().await.unwrap(), Some(cursor));

        persistence.delete_cursor().await.unwrap();
        assert!(persistence.get_cursor().await.unwrap().is_none());
        persistence.unlock().await.unwrap();
    }
}

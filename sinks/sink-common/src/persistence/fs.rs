//! Persist the sink cursor to a directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use error_stack::Result;
use tracing::info;

use crate::{cursor::Cursor, SinkConnectorError, SinkConnectorErrorResultExt};

use super::common::PersistenceClient;

pub struct DirPersistence {
    path: PathBuf,
    sink_id: String,
}

impl DirPersistence {
    pub fn initialize(
        path: impl AsRef<Path>,
        sink_id: impl Into<String>,
    ) -> Result<Self, SinkConnectorError> {
        let path = path.as_ref();

        fs::create_dir_all(path)
            .persistence(&format!("failed to create directory {:?}", path))?;

        Ok(Self {
            path: path.into(),
            sink_id: sink_id.into(),
        })
    }

    pub fn cursor_file_path(&self) -> PathBuf {
        self.path.join(format!("{}.cursor", self.sink_id))
    }
}

#[async_trait]
impl PersistenceClient for DirPersistence {
    /// Directory persistence has no lock. Only one sink may run per sink id.
    async fn lock(&mut self) -> Result<(), SinkConnectorError> {
        info!(
            sink_id = %self.sink_id,
            "directory persistence is not locked. do not run two sinks with the same id"
        );
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), SinkConnectorError> {
        Ok(())
    }

    async fn get_cursor(&mut self) -> Result<Option<Cursor>, SinkConnectorError> {
        let path = self.cursor_file_path();
        if path.exists() {
            let content = fs::read_to_string(&path)
                .persistence(&format!("failed to read cursor file {:?}", path))?;
            let cursor = serde_json::from_str(&content)
                .persistence("failed to deserialize cursor")?;
            Ok(Some(cursor))
        } else {
            Ok(None)
        }
    }

    async fn put_cursor(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError> {
        let serialized =
            serde_json::to_string(&cursor).persistence("failed to serialize cursor")?;
        let path = self.cursor_file_path();
        // Rename over the old file so readers never see a partial cursor.
        let tmp_path = path.with_extension("cursor.tmp");
        fs::write(&tmp_path, serialized)
            .persistence(&format!("failed to write cursor file {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .persistence(&format!("failed to replace cursor file {:?}", path))?;
        Ok(())
    }

    async fn delete_cursor(&mut self) -> Result<(), SinkConnectorError> {
        let path = self.cursor_file_path();
        fs::remove_file(&path)
            .persistence(&format!("failed to delete cursor file {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::DirPersistence;
    use crate::{
        cursor::{BlockRef, Cursor},
        persistence::PersistenceClientTrait,
    };

    fn new_cursor(number: u64, hash: &str) -> Cursor {
        Cursor::new(format!("opaque-{number}"), BlockRef::new(number, hash))
    }

    #[tokio::test]
    pub async fn test_get_put_delete_cursor() {
        let dir = TempDir::new("fs-persistence").unwrap();
        let sink_id = "test-sink".to_string();
        let mut persistence = DirPersistence::initialize(dir.path(), sink_id).unwrap();

        let cursor = persistence.get_cursor().await.unwrap();
        assert!(cursor.is_none());

        let new_cursor = new_cursor(123, "0x0123");
        persistence.put_cursor(new_cursor.clone()).await.unwrap();

        let cursor = persistence.get_cursor().await.unwrap();
        assert_eq!(cursor, Some(new_cursor));

        let content = std::fs::read_to_string(dir.path().join("test-sink.cursor")).unwrap();
        assert_eq!(
            content,
            r#"{"token":"opaque-123","blockNumber":123,"blockHash":"0x0123"}"#
        );

        persistence.delete_cursor().await.unwrap();
        let cursor = persistence.get_cursor().await.unwrap();
        assert!(cursor.is_none());
    }

    #[tokio::test]
    pub async fn test_lock_unlock() {
        let dir = TempDir::new("fs-persistence").unwrap();
        let sink_id = "test-sink".to_string();
        let mut persistence = DirPersistence::initialize(dir.path(), sink_id).unwrap();

        persistence.lock().await.unwrap();
        persistence.unlock().await.unwrap();
    }

    #[tokio::test]
    pub async fn test_multiple_sinks() {
        let dir = TempDir::new("fs-persistence").unwrap();
        let first_cursor = new_cursor(123, "0x0123");
        let second_cursor = new_cursor(789, "0x0789");

        let mut first = DirPersistence::initialize(dir.path(), "first-sink").unwrap();
        let mut second = DirPersistence::initialize(dir.path(), "second-sink").unwrap();

        first.put_cursor(first_cursor.clone()).await.unwrap();
        let cursor = second.get_cursor().await.unwrap();
        assert!(cursor.is_none());

        second.put_cursor(second_cursor.clone()).await.unwrap();
        let cursor = first.get_cursor().await.unwrap();
        assert_eq!(cursor, Some(first_cursor));

        first.delete_cursor().await.unwrap();
        let cursor = second.get_cursor().await.unwrap();
        assert_eq!(cursor, Some(second_cursor));

        second.delete_cursor().await.unwrap();
        let cursor = second.get_cursor().await.unwrap();
        assert!(cursor.is_none());
    }

    #[tokio::test]
    pub async fn test_corrupted_cursor_file() {
        let dir = TempDir::new("fs-persistence").unwrap();
        let mut persistence = DirPersistence::initialize(dir.path(), "test-sink").unwrap();
        std::fs::write(persistence.cursor_file_path(), "not json").unwrap();

        let err = persistence.get_cursor().await.unwrap_err();
        assert_eq!(
            *err.current_context(),
            crate::SinkConnectorError::Persistence
        );
    }
}

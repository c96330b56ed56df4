pub mod common;
mod default;
mod fs;

pub use self::common::PersistenceClient as PersistenceClientTrait;
pub use self::default::InMemoryPersistence;
pub use self::fs::DirPersistence;

use async_trait::async_trait;
use error_stack::Result;

use crate::{configuration::PersistenceOptions, cursor::Cursor, SinkConnectorError};

/// Persistence client factory.
pub struct Persistence {
    options: PersistenceOptions,
}

impl Persistence {
    pub fn new_from_options(options: PersistenceOptions) -> Self {
        Self { options }
    }

    pub async fn connect(&mut self) -> Result<PersistenceClient, SinkConnectorError> {
        let sink_id = self
            .options
            .sink_id
            .clone()
            .unwrap_or_else(|| "default".to_string());

        if let Some(dir_path) = &self.options.persistence_type.persist_to_fs {
            let persistence = DirPersistence::initialize(dir_path, sink_id)?;
            Ok(PersistenceClient::new_dir(persistence))
        } else {
            Ok(PersistenceClient::new_in_memory())
        }
    }
}

pub enum PersistenceClient {
    Dir(DirPersistence),
    InMemory(InMemoryPersistence),
}

impl PersistenceClient {
    pub fn new_dir(inner: DirPersistence) -> Self {
        Self::Dir(inner)
    }

    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryPersistence::default())
    }
}

#[async_trait]
impl PersistenceClientTrait for PersistenceClient {
    async fn lock(&mut self) -> Result<(), SinkConnectorError> {
        match self {
            Self::Dir(inner) => inner.lock().await,
            Self::InMemory(inner) => inner.lock().await,
        }
    }

    async fn unlock(&mut self) -> Result<(), SinkConnectorError> {
        match self {
            Self::Dir(inner) => inner.unlock().await,
            Self::InMemory(inner) => inner.unlock().await,
        }
    }

    async fn get_cursor(&mut self) -> Result<Option<Cursor>, SinkConnectorError> {
        match self {
            Self::Dir(inner) => inner.get_cursor().await,
            Self::InMemory(inner) => inner.get_cursor().await,
        }
    }

    async fn put_cursor(&mut self, cursor: Cursor) -> Result<(), SinkConnectorError> {
        match self {
            Self::Dir(inner) => inner.put_cursor(cursor).await,
            Self::InMemory(inner) => inner.put_cursor(cursor).await,
        }
    }

    async fn delete_cursor(&mut self) -> Result<(), SinkConnectorError> {
        match self {
            Self::Dir(inner) => inner.delete_cursor().await,
            Self::InMemory(inner) => inner.delete_cursor().await,
        }
    }
}

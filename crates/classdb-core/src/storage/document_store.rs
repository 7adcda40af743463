//! Document persistence for schema records.

use super::config::StoreConfig;
use super::document::Document;
use crate::error::{Error, Result};
use crate::types::RecordId;
use sled::{Db, Tree};
use tracing::debug;

/// Tree name for schema documents.
const DOCUMENT_TREE: &str = "catalog:documents";

/// Tree name for catalog metadata.
const META_TREE: &str = "catalog:meta";

/// Key for the schema root record id in the meta tree.
const SCHEMA_RECORD_KEY: &[u8] = b"schema_record";

/// Loads and saves schema documents.
pub trait DocumentStore: Send + Sync {
    /// Load the document stored under `id`.
    fn load(&self, id: RecordId) -> Result<Document>;

    /// Save a document, reusing `id` when given. Returns the document's id.
    fn save(&self, document: &Document, id: Option<RecordId>) -> Result<RecordId>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, id: RecordId) -> Result<()>;

    /// Id of the schema root record, if one was ever saved.
    fn root_id(&self) -> Result<Option<RecordId>>;

    /// Record the id of the schema root record.
    fn set_root_id(&self, id: RecordId) -> Result<()>;

    /// Flush pending writes.
    fn flush(&self) -> Result<()>;
}

/// Document store on top of sled trees.
pub struct SledDocumentStore {
    db: Db,
    documents: Tree,
    meta: Tree,
}

impl SledDocumentStore {
    /// Open the document trees in an existing sled database.
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self {
            db: db.clone(),
            documents: db.open_tree(DOCUMENT_TREE)?,
            meta: db.open_tree(META_TREE)?,
        })
    }

    /// Open a sled database from configuration and the document trees in it.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        let db = config.open()?;
        Self::open(&db)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn decode_id(bytes: &[u8]) -> Result<RecordId> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Deserialization("record id must be 8 bytes".to_string()))?;
    Ok(RecordId(u64::from_be_bytes(buf)))
}

impl DocumentStore for SledDocumentStore {
    fn load(&self, id: RecordId) -> Result<Document> {
        let bytes = self
            .documents
            .get(id.0.to_be_bytes())?
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    fn save(&self, document: &Document, id: Option<RecordId>) -> Result<RecordId> {
        let id = match id {
            Some(id) => id,
            None => RecordId(self.db.generate_id()?),
        };
        let bytes =
            serde_json::to_vec(document).map_err(|e| Error::Serialization(e.to_string()))?;
        self.documents.insert(id.0.to_be_bytes(), bytes)?;
        debug!(record = %id, kind = document.kind(), "saved schema document");
        Ok(id)
    }

    fn delete(&self, id: RecordId) -> Result<()> {
        self.documents.remove(id.0.to_be_bytes())?;
        Ok(())
    }

    fn root_id(&self) -> Result<Option<RecordId>> {
        match self.meta.get(SCHEMA_RECORD_KEY)? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_root_id(&self, id: RecordId) -> Result<()> {
        self.meta.insert(SCHEMA_RECORD_KEY, &id.0.to_be_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.documents.flush()?;
        self.meta.flush()?;
        Ok(())
    }
}

//! # Document Store (durable record store)
//!
//! SQLite-backed storage for raw text records, keyed by an auto-incrementing
//! internal id and secondarily by an externally assigned `doc_id` string.
//! Each vector DB partition (facts, summaries) owns one store file.
//!
//! ## Schema
//!
//! ```text
//! documents(
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     doc_id TEXT UNIQUE NOT NULL,
//!     text TEXT NOT NULL,
//!     metadata TEXT NOT NULL DEFAULT '{}',   -- JSON bag
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! )
//! ```
//!
//! Opening a fresh path creates the schema; opening an existing path reuses
//! it. Metadata filtering is equality over `json_extract`-ed scalar fields,
//! so queries like "all records where `metadata.user_id = 'u1'`" stay inside
//! SQLite.
//!
//! Writes are single statements and therefore atomic per record; a partial
//! insert or update is never observable.

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Nullable, Text};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::MemoryError;
use crate::models::{Document, NewDocument};
use crate::schema::documents;

const INIT_SQL: &str = "\
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT UNIQUE NOT NULL,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// An equality conjunction over JSON metadata fields.
///
/// Every `(key, value)` pair must match for a record to pass. Keys are
/// restricted to `[A-Za-z0-9_]` because they are spliced into the
/// `json_extract` path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter(Vec<(String, String)>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add an equality predicate. Builder-style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    fn validate(&self) -> bool {
        self.0.iter().all(|(key, _)| {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
    }
}

/// Durable record store over one SQLite file.
pub struct DocumentStore {
    conn: SqliteConnection,
    path: PathBuf,
}

impl DocumentStore {
    /// Open (or create) the store at `path`.
    ///
    /// Initialization is idempotent: the schema is created with
    /// `IF NOT EXISTS`, so reopening an existing file reuses its contents.
    ///
    /// # Errors
    /// Connection failures and schema creation failures surface here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let database_url = path.to_string_lossy().to_string();
        let mut conn = SqliteConnection::establish(&database_url)?;
        diesel::sql_query(INIT_SQL).execute(&mut conn)?;
        debug!(path = %path.display(), "document store opened");
        Ok(Self { conn, path })
    }

    /// Path of the underlying SQLite file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert one record and return its internal id.
    ///
    /// The insert is a single statement and atomic with respect to the
    /// record. A duplicate `doc_id` violates the unique constraint and
    /// surfaces as a storage error.
    pub fn insert(
        &mut self,
        doc_id: &str,
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<i32, MemoryError> {
        let metadata_str = serde_json::to_string(metadata)?;
        let new_document = NewDocument {
            doc_id,
            text,
            metadata: &metadata_str,
        };
        let inserted: Document = diesel::insert_into(documents::table)
            .values(&new_document)
            .returning(Document::as_returning())
            .get_result(&mut self.conn)?;
        Ok(inserted.id)
    }

    /// Fetch a record by internal id.
    pub fn get_by_internal_id(&mut self, internal_id: i32) -> Result<Option<Document>, MemoryError> {
        let row = documents::table
            .filter(documents::id.eq(internal_id))
            .first::<Document>(&mut self.conn)
            .optional()?;
        Ok(row)
    }

    /// Fetch a record by its external `doc_id`.
    pub fn get_by_doc_id(&mut self, doc_id: &str) -> Result<Option<Document>, MemoryError> {
        let row = documents::table
            .filter(documents::doc_id.eq(doc_id))
            .first::<Document>(&mut self.conn)
            .optional()?;
        Ok(row)
    }

    /// Fetch records that satisfy every metadata predicate, optionally
    /// restricted to a set of internal ids.
    ///
    /// Filter keys that fail validation make the whole call return `[]`
    /// rather than risking a malformed JSON path.
    pub fn get_documents(
        &mut self,
        filters: &MetadataFilter,
        ids: Option<&[i32]>,
    ) -> Result<Vec<Document>, MemoryError> {
        if !filters.validate() {
            debug!(?filters, "rejecting metadata filter with invalid key");
            return Ok(Vec::new());
        }

        let mut query = documents::table.into_boxed();
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(documents::id.eq_any(ids.to_vec()));
        }
        for (key, value) in filters.iter() {
            query = query.filter(
                sql::<Bool>("json_extract(metadata, '$.")
                    .sql(key)
                    .sql("') = ")
                    .bind::<Text, _>(value.clone()),
            );
        }
        let rows = query
            .order(documents::id.asc())
            .load::<Document>(&mut self.conn)?;
        Ok(rows)
    }

    /// Replace a record's text in place, bumping `updated_at`.
    ///
    /// Returns the number of affected rows (0 when the `doc_id` is unknown).
    pub fn update_text_by_doc_id(
        &mut self,
        doc_id: &str,
        new_text: &str,
    ) -> Result<usize, MemoryError> {
        let now = chrono::Utc::now()
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let affected = diesel::update(documents::table.filter(documents::doc_id.eq(doc_id)))
            .set((
                documents::text.eq(new_text),
                documents::updated_at.eq(now),
            ))
            .execute(&mut self.conn)?;
        Ok(affected)
    }

    /// Delete a record by internal id. Returns the number of affected rows.
    pub fn delete_by_internal_id(&mut self, internal_id: i32) -> Result<usize, MemoryError> {
        let affected = diesel::delete(documents::table.filter(documents::id.eq(internal_id)))
            .execute(&mut self.conn)?;
        Ok(affected)
    }

    /// Distinct `metadata.user_id` values across all records.
    pub fn get_user_ids(&mut self) -> Result<BTreeSet<String>, MemoryError> {
        let rows: Vec<Option<String>> = documents::table
            .select(sql::<Nullable<Text>>(
                "json_extract(metadata, '$.user_id')",
            ))
            .distinct()
            .load(&mut self.conn)?;
        Ok(rows.into_iter().flatten().collect())
    }
}

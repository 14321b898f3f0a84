// Models section
//
// Row models for the `documents` table plus the typed metadata records each
// vector DB partition serializes into the JSON `metadata` column. The facts
// partition and the summaries partition share the table shape but carry
// different metadata.
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

#[derive(Queryable, Identifiable, Debug, Selectable, Clone, PartialEq)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Document {
    pub id: i32,
    pub doc_id: String,
    pub text: String,
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewDocument<'a> {
    pub doc_id: &'a str,
    pub text: &'a str,
    pub metadata: &'a str,
}

impl Document {
    /// Parse the raw metadata column as an arbitrary JSON object.
    pub fn metadata_value(&self) -> Result<serde_json::Value, MemoryError> {
        Ok(serde_json::from_str(&self.metadata)?)
    }

    /// Parse the metadata column as fact-partition metadata.
    pub fn fact_metadata(&self) -> Result<FactMetadata, MemoryError> {
        Ok(serde_json::from_str(&self.metadata)?)
    }

    /// Parse the metadata column as summary-partition metadata.
    pub fn summary_metadata(&self) -> Result<SummaryMetadata, MemoryError> {
        Ok(serde_json::from_str(&self.metadata)?)
    }
}

/// Metadata attached to every fact record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FactMetadata {
    pub user_id: String,
    pub username: String,
    /// `doc_id` of the summary the fact was extracted from.
    pub summary_id: String,
}

/// Metadata attached to every summary record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SummaryMetadata {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

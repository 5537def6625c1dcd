//! Storage capability for attribute rows.
//!
//! The service only ever talks to a [`TaskStore`]; the DynamoDB client and the
//! in-process store are interchangeable behind it.

use crate::codec::{encode_tags, tag_values};
use crate::models::{AttributeRow, DataType};
use async_trait::async_trait;

mod dynamo;
mod memory;

pub use self::dynamo::DynamoStore;
pub use self::memory::MemoryStore;

/// In-place change to a single `(id, DataType)` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowUpdate {
    /// Overwrite the row's value, creating the row if absent.
    Set { data_type: DataType, value: String },
    /// Set arithmetic on the `Tags` row: `remove` first, then `add`. The row
    /// is read, recomputed and written back as one string.
    Tags {
        add: Vec<String>,
        remove: Vec<String>,
    },
}

impl RowUpdate {
    pub fn data_type(&self) -> DataType {
        match self {
            RowUpdate::Set { data_type, .. } => *data_type,
            RowUpdate::Tags { .. } => DataType::Tags,
        }
    }
}

/// Resulting tag set of a [`RowUpdate::Tags`]: `remove` first, then `add`,
/// without duplicates.
pub(crate) fn apply_tag_update(current: Vec<String>, add: &[String], remove: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(current.len() + add.len());
    for tag in current.into_iter().chain(add.iter().cloned()) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.retain(|tag| !remove.contains(tag) || add.contains(tag));
    tags
}

/// Write that brings a `Tags` row from its current value to the updated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagWrite {
    Unchanged,
    /// Write `value`, provided the row still holds `expected` (`None`: no row yet).
    Put {
        value: String,
        expected: Option<String>,
    },
    /// The tag set became empty: drop the row, provided it still holds `expected`.
    Delete { expected: String },
}

pub(crate) fn plan_tag_write(
    current: Option<&str>,
    add: &[String],
    remove: &[String],
) -> serde_json::Result<TagWrite> {
    let existing = current.map(tag_values).unwrap_or_default();
    let tags = apply_tag_update(existing, add, remove);

    if tags.is_empty() {
        return Ok(match current {
            Some(expected) => TagWrite::Delete {
                expected: expected.to_string(),
            },
            None => TagWrite::Unchanged,
        });
    }

    let value = encode_tags(&tags)?;
    if current == Some(value.as_str()) {
        return Ok(TagWrite::Unchanged);
    }
    Ok(TagWrite::Put {
        value,
        expected: current.map(str::to_string),
    })
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Every row stored under `id`.
    async fn query(&self, id: &str) -> anyhow::Result<Vec<AttributeRow>>;

    /// Rows whose data type is `data_type` and whose value is `value`, via the secondary index.
    async fn query_index(&self, data_type: DataType, value: &str)
        -> anyhow::Result<Vec<AttributeRow>>;

    /// Every row of every id in `ids`. Must return all rows, however many
    /// round trips the backend needs.
    async fn batch_get(&self, ids: &[String]) -> anyhow::Result<Vec<AttributeRow>>;

    /// Unconditional upsert of one row.
    async fn put(&self, row: AttributeRow) -> anyhow::Result<()>;

    async fn update(&self, id: &str, update: RowUpdate) -> anyhow::Result<()>;

    /// Removes every row stored under `id`.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}

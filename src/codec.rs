//! Conversion between a [`Task`] and its sparse attribute rows.

use crate::error::TaskError;
use crate::models::{AttributeRow, DataType, Task};
use tracing::debug;

/// Picks the single attribute a create call persists.
///
/// The first non-empty field in `Title > Status > Description > Tags` wins and
/// every other field of the input is dropped. Tags are stored as one JSON
/// array blob.
pub fn decompose(task: &Task) -> Result<AttributeRow, TaskError> {
    if task.id.trim().is_empty() {
        return Err(TaskError::validation("Missing id in the item"));
    }

    for data_type in DataType::CREATE_PRIORITY {
        if let Some(value) = task.scalar(data_type) {
            return Ok(AttributeRow::new(task.id.clone(), data_type, value));
        }
        if data_type == DataType::Tags && !task.tags.is_empty() {
            let blob = serde_json::to_string(&task.tags).map_err(|e| {
                TaskError::validation(format!("Failed to marshal tags into JSON: {}", e))
            })?;
            return Ok(AttributeRow::new(task.id.clone(), DataType::Tags, blob));
        }
    }

    Err(TaskError::validation("Missing DataType in the item"))
}

/// Decodes a request body into a task payload.
pub fn decode_task(body: &[u8]) -> Result<Task, TaskError> {
    serde_json::from_slice(body).map_err(|e| {
        TaskError::validation(format!("Failed to unmarshal task from JSON: {}", e))
    })
}

/// Applies one row's value onto a (possibly partial) task.
///
/// Scalar types overwrite, `Tags` accumulates. Unknown data types are ignored.
pub fn compose_field(task: &mut Task, data_type: &str, value: &str) {
    let data_type = match data_type.parse::<DataType>() {
        Ok(data_type) => data_type,
        Err(e) => {
            debug!(id = %task.id, "Ignoring row: {}", e);
            return;
        }
    };

    let field = match data_type {
        DataType::Tags => {
            task.tags.extend(tag_values(value));
            return;
        }
        DataType::Title => &mut task.title,
        DataType::Description => &mut task.description,
        DataType::Status => &mut task.status,
    };
    *field = Some(value.to_string());
}

/// Reads a `Tags` row value as a list of tags.
///
/// A value holding a JSON string array is expanded, anything else is one tag.
pub fn tag_values(value: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(value) {
        Ok(tags) => tags,
        Err(_) => vec![value.to_string()],
    }
}

/// Encodes the tag collection written back by the tag mutations.
///
/// A lone tag is stored bare so the secondary index can find it by value;
/// several tags, or a tag that would read back as an array, become a JSON array.
pub fn encode_tags(tags: &[String]) -> serde_json::Result<String> {
    match tags {
        [tag] if tag_values(tag) == [tag.clone()] => Ok(tag.clone()),
        _ => serde_json::to_string(tags),
    }
}

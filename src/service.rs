use crate::codec::decompose;
use crate::error::TaskError;
use crate::materializer::materialize;
use crate::models::{DataType, Task};
use crate::store::{RowUpdate, TaskStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

/// Task operations over the attribute-row store.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Vec<Task>, TaskError> {
        let id = required("id", id)?;
        info!(id = %id, "Fetching task by id");

        let rows = self
            .store
            .query(id)
            .await
            .map_err(|e| storage_error("Query failed", e))?;

        Ok(materialize(rows))
    }

    /// Reverse lookup: index query for matching rows, then one batched fetch
    /// of every row of the matched ids.
    pub async fn find_by_attribute(
        &self,
        data_type: DataType,
        value: &str,
    ) -> Result<Vec<Task>, TaskError> {
        info!(data_type = %data_type, value = %value, "Looking up tasks by attribute");

        let matches = self
            .store
            .query_index(data_type, value)
            .await
            .map_err(|e| storage_error("Query failed", e))?;

        let ids: Vec<String> = matches
            .into_iter()
            .map(|row| row.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            info!(data_type = %data_type, "No tasks matched");
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .batch_get(&ids)
            .await
            .map_err(|e| storage_error("Failed to retrieve tasks by IDs", e))?;

        let tasks = materialize(rows);
        info!(
            data_type = %data_type,
            matched_ids = ids.len(),
            tasks = tasks.len(),
            "Lookup completed"
        );
        Ok(tasks)
    }

    /// Persists exactly one attribute of `task`; see [`decompose`].
    pub async fn create(&self, task: Task) -> Result<(), TaskError> {
        let row = decompose(&task)?;
        info!(id = %row.id, data_type = %row.data_type, "Creating task");

        self.store
            .put(row)
            .await
            .map_err(|e| storage_error("Failed to create task", e))
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<(), TaskError> {
        let id = required("id", id)?;
        let tag = required("tag", tag)?;
        info!(id = %id, tag = %tag, "Adding tag to task");

        let update = RowUpdate::Tags {
            add: vec![tag.to_string()],
            remove: Vec::new(),
        };
        self.store
            .update(id, update)
            .await
            .map_err(|e| storage_error("Failed to add tag to task", e))
    }

    pub async fn replace_tag(&self, id: &str, old_tag: &str, new_tag: &str) -> Result<(), TaskError> {
        let id = required("id", id)?;
        let old_tag = required("old_tag", old_tag)?;
        let new_tag = required("new_tag", new_tag)?;
        info!(id = %id, old_tag = %old_tag, new_tag = %new_tag, "Replacing tag on task");

        let update = RowUpdate::Tags {
            add: vec![new_tag.to_string()],
            remove: vec![old_tag.to_string()],
        };
        self.store
            .update(id, update)
            .await
            .map_err(|e| storage_error("Failed to update tag on task", e))
    }

    /// Overwrites one scalar attribute, creating its row if absent.
    pub async fn update_attribute(
        &self,
        id: &str,
        data_type: DataType,
        value: &str,
    ) -> Result<(), TaskError> {
        let id = required("id", id)?;
        if !data_type.is_scalar() {
            return Err(TaskError::validation(
                "Tags are updated with the tag operations",
            ));
        }
        info!(id = %id, data_type = %data_type, "Updating task attribute");

        let update = RowUpdate::Set {
            data_type,
            value: value.to_string(),
        };
        self.store
            .update(id, update)
            .await
            .map_err(|e| storage_error(format!("Failed to update {} on task", data_type), e))
    }

    pub async fn delete(&self, id: &str) -> Result<(), TaskError> {
        let id = required("id", id)?;
        info!(id = %id, "Deleting task");

        self.store
            .delete(id)
            .await
            .map_err(|e| storage_error("Failed to delete task", e))
    }
}

fn required<'a>(name: &str, value: &'a str) -> Result<&'a str, TaskError> {
    if value.trim().is_empty() {
        return Err(TaskError::validation(format!("{} is required", name)));
    }
    Ok(value)
}

fn storage_error(context: impl Into<String>, source: anyhow::Error) -> TaskError {
    let err = TaskError::storage(context, source);
    error!("{}", err);
    err
}

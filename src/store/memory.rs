use super::{plan_tag_write, RowUpdate, TagWrite, TaskStore};
use crate::models::{AttributeRow, DataType};
use anyhow::bail;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process store with the same row semantics as the DynamoDB table.
///
/// Values are plain strings and [`TaskStore::query_index`] matches them
/// whole, as the secondary index does: a `Tags` row holding a JSON array is
/// not found by any single member. Calls are counted and can be made to
/// fail, which is what the handler tests rely on.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<(String, String), String>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = AttributeRow>,
    {
        let store = Self::new();
        for row in rows {
            store.insert(row);
        }
        store
    }

    /// Writes a row without counting it as a storage call.
    pub fn insert(&self, row: AttributeRow) {
        self.rows.insert((row.id, row.data_type), row.data_value);
    }

    /// Snapshot of every stored row, sorted by `(id, DataType)`.
    pub fn rows(&self) -> Vec<AttributeRow> {
        let mut rows: Vec<AttributeRow> = self
            .rows
            .iter()
            .map(|entry| {
                let (id, data_type) = entry.key();
                AttributeRow {
                    id: id.clone(),
                    data_type: data_type.clone(),
                    data_value: entry.value().clone(),
                }
            })
            .collect();
        rows.sort_by(|a, b| (&a.id, &a.data_type).cmp(&(&b.id, &b.data_type)));
        rows
    }

    /// Number of storage operations issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every following operation fail like an unreachable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin(&self, operation: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("storage unavailable during {}", operation);
        }
        Ok(())
    }

    fn rows_where<F>(&self, predicate: F) -> Vec<AttributeRow>
    where
        F: Fn(&str, &str, &str) -> bool,
    {
        self.rows()
            .into_iter()
            .filter(|row| predicate(&row.id, &row.data_type, &row.data_value))
            .collect()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn query(&self, id: &str) -> anyhow::Result<Vec<AttributeRow>> {
        self.begin("Query")?;
        Ok(self.rows_where(|row_id, _, _| row_id == id))
    }

    async fn query_index(
        &self,
        data_type: DataType,
        value: &str,
    ) -> anyhow::Result<Vec<AttributeRow>> {
        self.begin("Query")?;
        Ok(self.rows_where(|_, row_type, row_value| {
            row_type == data_type.as_str() && row_value == value
        }))
    }

    async fn batch_get(&self, ids: &[String]) -> anyhow::Result<Vec<AttributeRow>> {
        self.begin("BatchGetItem")?;
        Ok(self.rows_where(|row_id, _, _| ids.iter().any(|id| id == row_id)))
    }

    async fn put(&self, row: AttributeRow) -> anyhow::Result<()> {
        self.begin("PutItem")?;
        self.insert(row);
        Ok(())
    }

    async fn update(&self, id: &str, update: RowUpdate) -> anyhow::Result<()> {
        self.begin("UpdateItem")?;
        let key = (id.to_string(), update.data_type().as_str().to_string());

        match update {
            RowUpdate::Set { value, .. } => {
                self.rows.insert(key, value);
            }
            RowUpdate::Tags { add, remove } => {
                let current = self.rows.get(&key).map(|entry| entry.value().clone());
                match plan_tag_write(current.as_deref(), &add, &remove)? {
                    TagWrite::Unchanged => {}
                    TagWrite::Put { value, .. } => {
                        self.rows.insert(key, value);
                    }
                    TagWrite::Delete { .. } => {
                        self.rows.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.begin("BatchWriteItem")?;
        self.rows.retain(|(row_id, _), _| row_id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> MemoryStore {
        MemoryStore::with_rows(vec![
            AttributeRow::new("1", DataType::Title, "Task Title"),
            AttributeRow::new("1", DataType::Status, "Open"),
            AttributeRow::new("2", DataType::Title, "Task Title"),
            AttributeRow::new("3", DataType::Title, "Other"),
        ])
    }

    fn tags(add: &[&str], remove: &[&str]) -> RowUpdate {
        RowUpdate::Tags {
            add: add.iter().map(|t| t.to_string()).collect(),
            remove: remove.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn query_index_matches_type_and_value() {
        let store = seeded();
        let rows = store.query_index(DataType::Title, "Task Title").await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let rows = store.query_index(DataType::Status, "Task Title").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn tags_row_is_indexed_by_its_whole_value() {
        let store = seeded();
        store.update("3", tags(&["urgent"], &[])).await.unwrap();

        let rows = store.query_index(DataType::Tags, "urgent").await.unwrap();
        assert_eq!(rows, vec![AttributeRow::new("3", DataType::Tags, "urgent")]);

        store.update("3", tags(&["home"], &[])).await.unwrap();
        assert!(store
            .query_index(DataType::Tags, "urgent")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .query_index(DataType::Tags, r#"["urgent","home"]"#)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn tag_update_removes_then_adds() {
        let store = MemoryStore::new();
        store.update("1", tags(&["a", "b"], &[])).await.unwrap();
        store.update("1", tags(&["a"], &[])).await.unwrap();
        store.update("1", tags(&["c"], &["a"])).await.unwrap();

        assert_eq!(
            store.rows(),
            vec![AttributeRow::new("1", DataType::Tags, r#"["b","c"]"#)]
        );

        store.update("1", tags(&[], &["b", "c"])).await.unwrap();
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn tag_update_extends_the_create_blob() {
        let store = MemoryStore::with_rows(vec![AttributeRow::new(
            "1",
            DataType::Tags,
            r#"["a","b"]"#,
        )]);
        store.update("1", tags(&["c"], &["a"])).await.unwrap();
        assert_eq!(store.rows()[0].data_value, r#"["b","c"]"#);
    }

    #[tokio::test]
    async fn delete_removes_every_row_of_the_id() {
        let store = seeded();
        store.delete("1").await.unwrap();
        let ids: Vec<String> = store.rows().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn failing_store_counts_and_errors() {
        let store = seeded();
        store.set_failing(true);
        let err = store.query("1").await.unwrap_err();
        assert_eq!(err.to_string(), "storage unavailable during Query");
        assert_eq!(store.calls(), 1);
    }

    #[test]
    fn inserts_are_not_counted() {
        let store = seeded();
        assert_eq!(store.calls(), 0);
        assert_eq!(store.rows().len(), 4);
    }
}

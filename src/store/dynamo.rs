use super::{plan_tag_write, RowUpdate, TagWrite, TaskStore};
use crate::config::StoreConfig;
use crate::models::{AttributeRow, DataType, DATA_TYPE_ATTRIBUTE, DATA_VALUE_ATTRIBUTE, ID_ATTRIBUTE};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::operation::query::builders::QueryFluentBuilder;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, KeysAndAttributes, WriteRequest};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

/// BatchGetItem accepts at most 100 keys per request.
const MAX_BATCH_GET_KEYS: usize = 100;

/// Bound on the number of calls spent on one batch, unprocessed re-submits included.
const MAX_BATCH_ROUNDS: usize = 10;

type Item = HashMap<String, AttributeValue>;

/// Attribute rows in a DynamoDB table keyed by `id` (partition) and `DataType`
/// (sort), with a secondary index on `DataValue` (partition) and `id` (sort).
pub struct DynamoStore {
    client: Client,
    config: StoreConfig,
}

impl DynamoStore {
    pub fn new(client: Client, config: StoreConfig) -> Self {
        Self { client, config }
    }

    /// Builds the client from the ambient AWS configuration.
    pub async fn from_env(config: StoreConfig) -> Self {
        let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&aws_config), config)
    }

    async fn collect_pages(&self, query: QueryFluentBuilder, context: &str) -> Result<Vec<AttributeRow>> {
        let mut rows = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = query
                .clone()
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| context.to_string())?;

            rows.extend(output.items.unwrap_or_default().iter().filter_map(row_from_item));

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => {
                    debug!("{}: fetching next page", context);
                    start_key = Some(key);
                }
                _ => return Ok(rows),
            }
        }
    }

    async fn batch_get_chunk(&self, keys: Vec<Item>) -> Result<Vec<AttributeRow>> {
        let table = &self.config.table_name;
        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .build()
            .context("Failed to build batch get keys")?;

        let mut rows = Vec::new();
        let mut request_items = HashMap::from([(table.clone(), request)]);

        for round in 0.. {
            let output = self
                .client
                .batch_get_item()
                .set_request_items(Some(request_items))
                .send()
                .await
                .context("Failed to batch get rows")?;

            if let Some(items) = output.responses.and_then(|mut r| r.remove(table)) {
                rows.extend(items.iter().filter_map(row_from_item));
            }

            match continuation(output.unprocessed_keys, round, "BatchGetItem")? {
                Some(unprocessed) => {
                    debug!(round, "Re-submitting unprocessed keys");
                    request_items = unprocessed;
                }
                None => break,
            }
        }
        Ok(rows)
    }

    /// Raw `DataValue` of the id's `Tags` row, read consistently.
    async fn current_tags(&self, id: &str) -> Result<Option<String>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.table_name)
            .set_key(Some(row_key(id, DataType::Tags)))
            .consistent_read(true)
            .send()
            .await
            .context("Failed to read tags row")?;

        Ok(output.item.as_ref().and_then(row_from_item).map(|row| row.data_value))
    }

    async fn write_tags(&self, id: &str, write: TagWrite) -> Result<()> {
        let table = &self.config.table_name;
        match write {
            TagWrite::Unchanged => {}
            TagWrite::Put { value, expected } => {
                let row = AttributeRow::new(id, DataType::Tags, value);
                let mut request = self
                    .client
                    .put_item()
                    .table_name(table)
                    .set_item(Some(item_from_row(&row)))
                    .condition_expression(tag_condition(expected.is_some()))
                    .expression_attribute_names("#value", DATA_VALUE_ATTRIBUTE);
                if let Some(expected) = expected {
                    request = request.expression_attribute_values(":expected", AttributeValue::S(expected));
                }
                request.send().await.context("Failed to write tags row")?;
            }
            TagWrite::Delete { expected } => {
                self.client
                    .delete_item()
                    .table_name(table)
                    .set_key(Some(row_key(id, DataType::Tags)))
                    .condition_expression(tag_condition(true))
                    .expression_attribute_names("#value", DATA_VALUE_ATTRIBUTE)
                    .expression_attribute_values(":expected", AttributeValue::S(expected))
                    .send()
                    .await
                    .context("Failed to delete emptied tags row")?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for DynamoStore {
    async fn query(&self, id: &str) -> Result<Vec<AttributeRow>> {
        let query = self
            .client
            .query()
            .table_name(&self.config.table_name)
            .key_condition_expression("#id = :id")
            .expression_attribute_names("#id", ID_ATTRIBUTE)
            .expression_attribute_values(":id", AttributeValue::S(id.to_string()));

        self.collect_pages(query, "Failed to query rows by id").await
    }

    async fn query_index(&self, data_type: DataType, value: &str) -> Result<Vec<AttributeRow>> {
        // The index is keyed on (DataValue, id), so the data type can only be filtered.
        let query = self
            .client
            .query()
            .table_name(&self.config.table_name)
            .index_name(&self.config.index_name)
            .key_condition_expression("#value = :value")
            .filter_expression("#type = :type")
            .expression_attribute_names("#value", DATA_VALUE_ATTRIBUTE)
            .expression_attribute_names("#type", DATA_TYPE_ATTRIBUTE)
            .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
            .expression_attribute_values(":type", AttributeValue::S(data_type.as_str().to_string()));

        self.collect_pages(query, "Failed to query secondary index").await
    }

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<AttributeRow>> {
        let keys = batch_keys(ids);
        let mut rows = Vec::new();
        for chunk in keys.chunks(MAX_BATCH_GET_KEYS) {
            rows.extend(self.batch_get_chunk(chunk.to_vec()).await?);
        }
        Ok(rows)
    }

    async fn put(&self, row: AttributeRow) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.config.table_name)
            .set_item(Some(item_from_row(&row)))
            .send()
            .await
            .context("Failed to put row")?;
        Ok(())
    }

    async fn update(&self, id: &str, update: RowUpdate) -> Result<()> {
        match update {
            RowUpdate::Set { data_type, value } => {
                self.client
                    .update_item()
                    .table_name(&self.config.table_name)
                    .set_key(Some(row_key(id, data_type)))
                    .update_expression("SET #value = :value")
                    .expression_attribute_names("#value", DATA_VALUE_ATTRIBUTE)
                    .expression_attribute_values(":value", AttributeValue::S(value))
                    .send()
                    .await
                    .context("Failed to update row")?;
                Ok(())
            }
            RowUpdate::Tags { add, remove } => {
                let current = self.current_tags(id).await?;
                let write = plan_tag_write(current.as_deref(), &add, &remove)
                    .context("Failed to encode tags")?;
                self.write_tags(id, write).await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let table = &self.config.table_name;
        let requests = DataType::ALL
            .into_iter()
            .map(|data_type| -> Result<WriteRequest> {
                let delete = DeleteRequest::builder()
                    .set_key(Some(row_key(id, data_type)))
                    .build()
                    .context("Failed to build delete request")?;
                Ok(WriteRequest::builder().delete_request(delete).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut request_items = HashMap::from([(table.clone(), requests)]);

        for round in 0.. {
            let output = self
                .client
                .batch_write_item()
                .set_request_items(Some(request_items))
                .send()
                .await
                .context("Failed to delete rows")?;

            match continuation(output.unprocessed_items, round, "BatchWriteItem")? {
                Some(unprocessed) => {
                    debug!(round, id = %id, "Re-submitting unprocessed deletes");
                    request_items = unprocessed;
                }
                None => break,
            }
        }
        Ok(())
    }
}

/// What a batch call left unprocessed, if it must be sent again.
///
/// Fails once `round` (zero-based) is the last of [`MAX_BATCH_ROUNDS`] calls.
fn continuation<T>(
    unprocessed: Option<HashMap<String, T>>,
    round: usize,
    operation: &str,
) -> Result<Option<HashMap<String, T>>> {
    match unprocessed.filter(|items| !items.is_empty()) {
        None => Ok(None),
        Some(_) if round + 1 >= MAX_BATCH_ROUNDS => {
            warn!(operation, "Unprocessed items remain after {} calls", MAX_BATCH_ROUNDS);
            bail!(
                "{}: unprocessed items remain after {} calls",
                operation,
                MAX_BATCH_ROUNDS
            )
        }
        Some(items) => Ok(Some(items)),
    }
}

/// Condition guarding a tag write against a concurrent change of the row.
fn tag_condition(row_exists: bool) -> &'static str {
    if row_exists {
        "#value = :expected"
    } else {
        "attribute_not_exists(#value)"
    }
}

fn row_key(id: &str, data_type: DataType) -> Item {
    HashMap::from([
        (ID_ATTRIBUTE.to_string(), AttributeValue::S(id.to_string())),
        (
            DATA_TYPE_ATTRIBUTE.to_string(),
            AttributeValue::S(data_type.as_str().to_string()),
        ),
    ])
}

/// One key per known data type for every id.
fn batch_keys(ids: &[String]) -> Vec<Item> {
    ids.iter()
        .flat_map(|id| DataType::ALL.into_iter().map(move |data_type| row_key(id, data_type)))
        .collect()
}

fn item_from_row(row: &AttributeRow) -> Item {
    HashMap::from([
        (ID_ATTRIBUTE.to_string(), AttributeValue::S(row.id.clone())),
        (
            DATA_TYPE_ATTRIBUTE.to_string(),
            AttributeValue::S(row.data_type.clone()),
        ),
        (
            DATA_VALUE_ATTRIBUTE.to_string(),
            AttributeValue::S(row.data_value.clone()),
        ),
    ])
}

fn row_from_item(item: &Item) -> Option<AttributeRow> {
    let id = item.get(ID_ATTRIBUTE).and_then(|v| v.as_s().ok());
    let data_type = item.get(DATA_TYPE_ATTRIBUTE).and_then(|v| v.as_s().ok());
    let data_value = item.get(DATA_VALUE_ATTRIBUTE).and_then(|v| v.as_s().ok());

    match (id, data_type, data_value) {
        (Some(id), Some(data_type), Some(data_value)) => Some(AttributeRow {
            id: id.clone(),
            data_type: data_type.clone(),
            data_value: data_value.clone(),
        }),
        _ => {
            warn!("Skipping malformed row: {:?}", item.keys().collect::<Vec<_>>());
            None
        }
    }
}

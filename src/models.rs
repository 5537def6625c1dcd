use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== Storage layout =====

pub const ID_ATTRIBUTE: &str = "id";
pub const DATA_TYPE_ATTRIBUTE: &str = "DataType";
pub const DATA_VALUE_ATTRIBUTE: &str = "DataValue";

/// Sort key of an attribute row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Title,
    Description,
    Status,
    Tags,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Title,
        DataType::Description,
        DataType::Status,
        DataType::Tags,
    ];

    /// Order in which create picks the single attribute it persists.
    pub const CREATE_PRIORITY: [DataType; 4] = [
        DataType::Title,
        DataType::Status,
        DataType::Description,
        DataType::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Title => "Title",
            DataType::Description => "Description",
            DataType::Status => "Status",
            DataType::Tags => "Tags",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Tags)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDataType(pub String);

impl fmt::Display for UnknownDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type: {}", self.0)
    }
}

impl std::error::Error for UnknownDataType {}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.as_str() == s)
            .ok_or_else(|| UnknownDataType(s.to_string()))
    }
}

/// One persisted attribute of a task.
///
/// `DataValue` is always a plain string: it is the partition key of the
/// secondary index, which is typed S. A `Tags` row holds either one bare tag
/// or a JSON array of tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub id: String,
    /// Kept as a string: storage may hold data types this service does not know.
    pub data_type: String,
    pub data_value: String,
}

impl AttributeRow {
    pub fn new(id: impl Into<String>, data_type: DataType, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.as_str().to_string(),
            data_value: value.into(),
        }
    }
}

// ===== Wire model =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Scalar field for `data_type`, treating blank strings as absent.
    pub fn scalar(&self, data_type: DataType) -> Option<&str> {
        let field = match data_type {
            DataType::Title => &self.title,
            DataType::Description => &self.description,
            DataType::Status => &self.status,
            DataType::Tags => return None,
        };
        field.as_deref().filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_type_parses_storage_names_only() {
        assert_eq!("Title".parse::<DataType>(), Ok(DataType::Title));
        assert_eq!("Tags".parse::<DataType>(), Ok(DataType::Tags));
        assert_eq!(
            "title".parse::<DataType>(),
            Err(UnknownDataType("title".to_string()))
        );
    }

    #[test]
    fn task_omits_empty_fields_on_the_wire() {
        let task = Task {
            title: Some("Task Title".to_string()),
            ..Task::new("1")
        };
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({"id": "1", "title": "Task Title"})
        );
    }

    #[test]
    fn task_ignores_unknown_fields_when_decoding() {
        let task: Task = serde_json::from_str(
            r#"{"id":"1", "dataType":"Description", "dataValue":"Task Title"}"#,
        )
        .unwrap();
        assert_eq!(task, Task::new("1"));
    }

    #[test]
    fn blank_scalars_are_absent() {
        let task = Task {
            title: Some(String::new()),
            status: Some("Open".to_string()),
            ..Task::new("1")
        };
        assert_eq!(task.scalar(DataType::Title), None);
        assert_eq!(task.scalar(DataType::Status), Some("Open"));
        assert_eq!(task.scalar(DataType::Tags), None);
    }
}

const DEFAULT_TABLE_NAME: &str = "TaskManagement";
const DEFAULT_INDEX_NAME: &str = "GSI1";

/// Where the attribute rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub table_name: String,
    /// Secondary index keyed by `DataValue` (partition) and `id` (sort).
    pub index_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// Reads `TABLE_NAME` and `INDEX_NAME`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            table_name: read("TABLE_NAME", DEFAULT_TABLE_NAME),
            index_name: read("INDEX_NAME", DEFAULT_INDEX_NAME),
        }
    }
}

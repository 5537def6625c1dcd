use lambda_http::http::{Method, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source:#}")]
    Storage {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Method not allowed")]
    UnsupportedMethod(Method),
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    pub fn storage(context: impl Into<String>, source: anyhow::Error) -> Self {
        TaskError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Status code reported to the caller. The message body is the `Display` output.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            TaskError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn storage_error_embeds_underlying_detail() {
        let err = TaskError::storage("Query failed", anyhow!("ProvisionedThroughputExceeded"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Query failed: ProvisionedThroughputExceeded");
    }

    #[test]
    fn storage_error_keeps_context_chain() {
        let source = anyhow!("connection reset").context("Failed to query rows by id");
        let err = TaskError::storage("Query failed", source);
        assert_eq!(
            err.to_string(),
            "Query failed: Failed to query rows by id: connection reset"
        );
    }

    #[test]
    fn unsupported_method_maps_to_405() {
        let err = TaskError::UnsupportedMethod(Method::PATCH);
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.to_string(), "Method not allowed");
    }

    #[test]
    fn validation_is_a_client_error() {
        let err = TaskError::validation("Missing DataType in the item");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Missing DataType in the item");
    }
}

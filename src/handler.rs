use crate::codec::decode_task;
use crate::error::TaskError;
use crate::models::{DataType, Task};
use crate::service::TaskService;
use lambda_http::http::{header, Method, StatusCode};
use lambda_http::{Body, Error, Request, RequestExt, Response};
use tracing::{info, warn};

/// Query parameters accepted by a GET reverse lookup, in precedence order.
const LOOKUP_PARAMS: [(&str, DataType); 4] = [
    ("title", DataType::Title),
    ("status", DataType::Status),
    ("tag", DataType::Tags),
    ("description", DataType::Description),
];

/// Query parameters accepted by a PUT scalar update, in precedence order.
const UPDATE_PARAMS: [(&str, DataType); 3] = [
    ("title", DataType::Title),
    ("status", DataType::Status),
    ("description", DataType::Description),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetById { id: String },
    FindByAttribute { data_type: DataType, value: String },
    Create { task: Task },
    AddTag { id: String, tag: String },
    ReplaceTag { id: String, old_tag: String, new_tag: String },
    UpdateAttribute { id: String, data_type: DataType, value: String },
    Delete { id: String },
}

#[derive(Debug)]
enum Reply {
    Tasks(Vec<Task>),
    Text(StatusCode, String),
}

/// Picks the operation for a request without touching storage.
pub fn route(request: &Request) -> Result<Operation, TaskError> {
    let arg = |name: &str| param(request, name).map(str::to_string);

    match *request.method() {
        Method::GET => {
            if let Some(id) = arg("id") {
                return Ok(Operation::GetById { id });
            }
            LOOKUP_PARAMS
                .iter()
                .find_map(|&(name, data_type)| {
                    arg(name).map(|value| Operation::FindByAttribute {
                        data_type,
                        value,
                    })
                })
                .ok_or_else(|| {
                    TaskError::validation("GET requires one of id, title, status, tag, description")
                })
        }
        Method::POST => match (arg("id"), arg("tag")) {
            (Some(id), Some(tag)) => Ok(Operation::AddTag { id, tag }),
            _ => {
                let body: &[u8] = request.body();
                Ok(Operation::Create {
                    task: decode_task(body)?,
                })
            }
        },
        Method::PUT => {
            let id = arg("id").ok_or_else(|| TaskError::validation("id is required"))?;
            if let (Some(old_tag), Some(new_tag)) = (arg("old_tag"), arg("new_tag")) {
                return Ok(Operation::ReplaceTag {
                    id,
                    old_tag,
                    new_tag,
                });
            }
            UPDATE_PARAMS
                .iter()
                .find_map(|&(name, data_type)| arg(name).map(|value| (data_type, value)))
                .map(|(data_type, value)| Operation::UpdateAttribute {
                    id,
                    data_type,
                    value,
                })
                .ok_or_else(|| {
                    TaskError::validation(
                        "PUT requires old_tag and new_tag, or one of title, status, description",
                    )
                })
        }
        Method::DELETE => arg("id")
            .map(|id| Operation::Delete { id })
            .ok_or_else(|| TaskError::validation("id is required")),
        ref other => Err(TaskError::UnsupportedMethod(other.clone())),
    }
}

/// Query string first, then path parameters. Empty values count as missing.
fn param<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
        .or_else(|| {
            request
                .path_parameters_ref()
                .and_then(|params| params.first(name))
        })
        .filter(|value| !value.is_empty())
}

async fn execute(service: &TaskService, operation: Operation) -> Result<Reply, TaskError> {
    let reply = match operation {
        Operation::GetById { id } => Reply::Tasks(service.get_by_id(&id).await?),
        Operation::FindByAttribute { data_type, value } => {
            Reply::Tasks(service.find_by_attribute(data_type, &value).await?)
        }
        Operation::Create { task } => {
            service.create(task).await?;
            Reply::Text(StatusCode::CREATED, "Task created successfully".to_string())
        }
        Operation::AddTag { id, tag } => {
            service.add_tag(&id, &tag).await?;
            Reply::Text(StatusCode::OK, "Tag added to task successfully".to_string())
        }
        Operation::ReplaceTag {
            id,
            old_tag,
            new_tag,
        } => {
            service.replace_tag(&id, &old_tag, &new_tag).await?;
            Reply::Text(StatusCode::OK, "Tag updated on task successfully".to_string())
        }
        Operation::UpdateAttribute {
            id,
            data_type,
            value,
        } => {
            service.update_attribute(&id, data_type, &value).await?;
            Reply::Text(
                StatusCode::OK,
                format!("{} updated on task successfully", data_type),
            )
        }
        Operation::Delete { id } => {
            service.delete(&id).await?;
            Reply::Text(StatusCode::OK, "Task deleted successfully".to_string())
        }
    };
    Ok(reply)
}

/// Lambda entry point: routes, runs and renders one request.
///
/// Domain failures become responses; only a response that cannot be built is an `Err`.
pub async fn function_handler(service: &TaskService, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();

    let outcome = match route(&event) {
        Ok(operation) => execute(service, operation).await,
        Err(e) => Err(e),
    };

    let (status, content_type, body) = match outcome {
        Ok(Reply::Tasks(tasks)) => match serde_json::to_string(&tasks) {
            Ok(json) => (StatusCode::OK, "application/json", json),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("Failed to marshal tasks: {}", e),
            ),
        },
        Ok(Reply::Text(status, message)) => (status, "text/plain", message),
        Err(e) => {
            if !matches!(e, TaskError::Storage { .. }) {
                warn!(method = %method, path = %path, "Rejected request: {}", e);
            }
            (e.status_code(), "text/plain", e.to_string())
        }
    };

    info!(method = %method, path = %path, status = status.as_u16(), "Request completed");

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_http::http;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn request(method: &str, query: &[(&str, &str)], body: &str) -> Request {
        let params: HashMap<String, String> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body = if body.is_empty() {
            Body::Empty
        } else {
            Body::from(body.to_string())
        };
        http::Request::builder()
            .method(method)
            .uri("/tasks")
            .body(body)
            .unwrap()
            .with_query_string_parameters(params)
    }

    #[test]
    fn get_by_id_wins_over_lookups() {
        let op = route(&request("GET", &[("id", "1"), ("title", "T")], "")).unwrap();
        assert_eq!(op, Operation::GetById { id: "1".to_string() });
    }

    #[test]
    fn get_reads_id_from_path_parameters() {
        let params = HashMap::from([("id".to_string(), "42".to_string())]);
        let req = request("GET", &[], "").with_path_parameters(params);
        assert_eq!(
            route(&req).unwrap(),
            Operation::GetById { id: "42".to_string() }
        );
    }

    #[test]
    fn get_by_tag_is_a_lookup() {
        let op = route(&request("GET", &[("tag", "Tag1")], "")).unwrap();
        assert_eq!(
            op,
            Operation::FindByAttribute {
                data_type: DataType::Tags,
                value: "Tag1".to_string()
            }
        );
    }

    #[test]
    fn parameter_tables_cover_the_data_types() {
        let mut lookups: Vec<DataType> = LOOKUP_PARAMS.iter().map(|&(_, t)| t).collect();
        lookups.sort();
        let mut all = DataType::ALL.to_vec();
        all.sort();
        assert_eq!(lookups, all);

        assert!(UPDATE_PARAMS.iter().all(|(_, t)| t.is_scalar()));
        assert_eq!(UPDATE_PARAMS.len(), 3);
        assert!(UPDATE_PARAMS
            .iter()
            .all(|&(name, t)| LOOKUP_PARAMS.contains(&(name, t))));
    }

    #[test]
    fn get_without_selector_is_rejected() {
        let err = route(&request("GET", &[], "")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn post_with_id_and_tag_adds_a_tag() {
        let op = route(&request("POST", &[("id", "1"), ("tag", "Tag1")], "")).unwrap();
        assert_eq!(
            op,
            Operation::AddTag {
                id: "1".to_string(),
                tag: "Tag1".to_string()
            }
        );
    }

    #[test]
    fn post_body_creates() {
        let op = route(&request("POST", &[], r#"{"id":"1","title":"T"}"#)).unwrap();
        assert_eq!(
            op,
            Operation::Create {
                task: Task {
                    title: Some("T".to_string()),
                    ..Task::new("1")
                }
            }
        );
    }

    #[test]
    fn post_with_malformed_body_is_a_client_error() {
        let err = route(&request("POST", &[], "{")).unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[test]
    fn put_with_both_tags_replaces() {
        let op = route(&request(
            "PUT",
            &[("id", "1"), ("old_tag", "a"), ("new_tag", "b")],
            "",
        ))
        .unwrap();
        assert_eq!(
            op,
            Operation::ReplaceTag {
                id: "1".to_string(),
                old_tag: "a".to_string(),
                new_tag: "b".to_string()
            }
        );
    }

    #[test]
    fn put_with_scalar_updates() {
        let op = route(&request("PUT", &[("id", "1"), ("status", "Completed")], "")).unwrap();
        assert_eq!(
            op,
            Operation::UpdateAttribute {
                id: "1".to_string(),
                data_type: DataType::Status,
                value: "Completed".to_string()
            }
        );
    }

    #[test]
    fn put_needs_an_id_and_a_change() {
        assert!(route(&request("PUT", &[("status", "x")], "")).is_err());
        assert!(route(&request("PUT", &[("id", "1"), ("old_tag", "a")], "")).is_err());
    }

    #[test]
    fn delete_needs_an_id() {
        assert_eq!(
            route(&request("DELETE", &[("id", "1")], "")).unwrap(),
            Operation::Delete { id: "1".to_string() }
        );
        assert!(route(&request("DELETE", &[("id", "")], "")).is_err());
    }

    #[test]
    fn other_methods_are_unsupported() {
        let err = route(&request("PATCH", &[("id", "1")], "")).unwrap_err();
        assert!(matches!(err, TaskError::UnsupportedMethod(Method::PATCH)));
    }
}
